//! SQLite-backed job record store.
//!
//! One connection behind a mutex serves every worker. Guarded writes read the
//! stored version and status and apply the update under the same lock, so a
//! check and its write never interleave with another writer.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use rusqlite::Connection;

pub mod error;
pub mod job_repo;
pub mod migrations;
pub mod store;

pub use error::DatabaseError;
pub use store::JobStore;

use crate::job::{JobId, JobRecord, NewJobRecord};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared handle to the job record database. Clones use the same connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens the database file, creating it and its directory when missing,
    /// and brings the schema up to date.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        migrations::run_all(&mut conn)?;

        log::info!("Job store opened at {}", path.display());
        Ok(Self::from_connection(conn))
    }

    /// Private in-memory store, used by tests and one-off tooling.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let mut conn = Connection::open_in_memory()?;
        migrations::run_all(&mut conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    pub(crate) fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&conn)
    }

    /// Runs `write` only if the stored row still has `record.version` and its
    /// status may advance to `record.status`.
    ///
    /// `write` returns the number of rows it changed; zero counts as a
    /// conflict. On success the returned record carries the next version.
    pub(crate) fn guarded_write<F>(
        &self,
        record: &JobRecord,
        write: F,
    ) -> Result<JobRecord, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<usize, DatabaseError>,
    {
        let id = record.id;
        self.with_conn(|conn| {
            let (version, status) =
                job_repo::current_state(conn, id)?.ok_or(DatabaseError::NotFound(id))?;

            if version != record.version {
                return Err(DatabaseError::VersionConflict {
                    id,
                    expected: record.version,
                    actual: version,
                });
            }
            if !status.can_advance_to(&record.status) {
                return Err(DatabaseError::StatusRegression {
                    id,
                    from: status.as_str().to_string(),
                    to: record.status.as_str().to_string(),
                });
            }

            if write(conn)? == 0 {
                return Err(DatabaseError::VersionConflict {
                    id,
                    expected: record.version,
                    actual: record.version + 1,
                });
            }
            Ok(())
        })?;

        Ok(JobRecord {
            version: record.version + 1,
            ..record.clone()
        })
    }
}

impl JobStore for Database {
    fn create(&self, job: &NewJobRecord) -> Result<JobId, DatabaseError> {
        let id = job_repo::insert(self, job, Utc::now())?;
        log::debug!("Created job record {}", id);
        Ok(id)
    }

    fn read_by_id(&self, id: JobId) -> Result<Option<JobRecord>, DatabaseError> {
        job_repo::find_by_id(self, id)
    }

    fn read_all(&self) -> Result<Vec<JobRecord>, DatabaseError> {
        job_repo::list_all(self)
    }

    fn update_by_id(&self, id: JobId, record: &JobRecord) -> Result<JobRecord, DatabaseError> {
        if record.id != id {
            return Err(DatabaseError::InvalidRecord {
                id,
                reason: format!("record carries id {}", record.id),
            });
        }

        let mut record = record.clone();
        record.updated_at = Utc::now().max(record.created_at);
        record
            .check_invariants()
            .map_err(|reason| DatabaseError::InvalidRecord { id, reason })?;

        job_repo::update(self, &record)
    }
}

/// `~/.levelcheck/data/levelcheck.db`
pub fn default_database_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".levelcheck").join("data").join("levelcheck.db"))
}
