//! Record-store interface the pipeline depends on.

use super::DatabaseError;
use crate::job::{JobId, JobRecord, NewJobRecord};

/// Key/value access to job records.
///
/// Reads of a missing id return `Ok(None)`. Every update refreshes
/// `updated_at` and bumps the record version.
pub trait JobStore: Send + Sync {
    fn create(&self, job: &NewJobRecord) -> Result<JobId, DatabaseError>;

    fn read_by_id(&self, id: JobId) -> Result<Option<JobRecord>, DatabaseError>;

    fn read_all(&self) -> Result<Vec<JobRecord>, DatabaseError>;

    /// Full-record upsert of an existing record. Returns the record as stored.
    fn update_by_id(&self, id: JobId, record: &JobRecord) -> Result<JobRecord, DatabaseError>;
}
