//! Job repository: CRUD operations for the `job_records` table.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, types::Value, Connection, OptionalExtension, Row};

use super::{Database, DatabaseError};
use crate::job::{
    Assessment, Dimension, DimensionScore, JobId, JobRecord, JobStatus, NewJobRecord,
    ProficiencyLevel,
};

/// A raw job row from the database.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: i64,
    pub language: String,
    pub question_id: i64,
    pub file_name: String,
    pub file_path: String,
    pub status: String,
    pub failed_stage: Option<String>,
    pub failure_reason: Option<String>,
    pub transcript: Option<String>,
    pub level: Option<String>,
    /// `(explanation, score)` per dimension, in `Dimension::ALL` order.
    pub dimensions: Vec<(Option<String>, Option<f64>)>,
    pub overall_score: Option<f64>,
    pub version: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let mut dimensions = Vec::with_capacity(Dimension::ALL.len());
        for dimension in Dimension::ALL {
            let explanation: Option<String> =
                row.get(format!("{}_explanation", dimension.key()).as_str())?;
            let score: Option<f64> = row.get(format!("{}_score", dimension.key()).as_str())?;
            dimensions.push((explanation, score));
        }

        Ok(Self {
            id: row.get("id")?,
            language: row.get("language")?,
            question_id: row.get("question_id")?,
            file_name: row.get("file_name")?,
            file_path: row.get("file_path")?,
            status: row.get("status")?,
            failed_stage: row.get("failed_stage")?,
            failure_reason: row.get("failure_reason")?,
            transcript: row.get("transcript")?,
            level: row.get("level")?,
            dimensions,
            overall_score: row.get("overall_score")?,
            version: row.get("version")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    /// Builds the row image of a domain record.
    pub fn from_record(record: &JobRecord) -> Self {
        let (failed_stage, failure_reason) = match &record.status {
            JobStatus::Failed { stage, reason } => {
                (Some(stage.as_str().to_string()), Some(reason.clone()))
            }
            _ => (None, None),
        };

        let dimensions = Dimension::ALL
            .iter()
            .map(|d| match record.assessment.as_ref().and_then(|a| a.dimension(*d)) {
                Some(score) => (Some(score.explanation.clone()), Some(score.score)),
                None => (None, None),
            })
            .collect();

        Self {
            id: record.id.get(),
            language: record.language.clone(),
            question_id: record.question_id,
            file_name: record.file_name.clone(),
            file_path: record.file_path.to_string_lossy().into_owned(),
            status: record.status.as_str().to_string(),
            failed_stage,
            failure_reason,
            transcript: record.transcript.clone(),
            level: record
                .assessment
                .as_ref()
                .map(|a| a.level.as_str().to_string()),
            dimensions,
            overall_score: record.assessment.as_ref().map(|a| a.overall_score),
            version: record.version,
            created_at: record.created_at.to_rfc3339(),
            updated_at: record.updated_at.to_rfc3339(),
        }
    }

    /// Decodes the row into a domain record.
    pub fn into_record(self) -> Result<JobRecord, DatabaseError> {
        let status = JobStatus::from_columns(
            &self.status,
            self.failed_stage.as_deref(),
            self.failure_reason.as_deref(),
        )
        .map_err(|e| invalid_row(self.id, e))?;

        let assessment = match self.level.as_deref() {
            None => None,
            Some(level) => {
                let level: ProficiencyLevel =
                    level.parse().map_err(|e| invalid_row(self.id, e))?;
                let mut dimensions = BTreeMap::new();
                for (dimension, (explanation, score)) in
                    Dimension::ALL.iter().zip(self.dimensions.into_iter())
                {
                    let score = score.ok_or_else(|| {
                        invalid_row(self.id, format!("missing score for '{}'", dimension.key()))
                    })?;
                    dimensions.insert(
                        *dimension,
                        DimensionScore {
                            explanation: explanation.unwrap_or_default(),
                            score,
                        },
                    );
                }
                Some(
                    Assessment::new(level, dimensions, self.overall_score)
                        .map_err(|e| invalid_row(self.id, e))?,
                )
            }
        };

        Ok(JobRecord {
            id: JobId::new(self.id),
            language: self.language,
            question_id: self.question_id,
            file_name: self.file_name,
            file_path: PathBuf::from(self.file_path),
            status,
            transcript: self.transcript,
            assessment,
            version: self.version,
            created_at: parse_timestamp(self.id, &self.created_at)?,
            updated_at: parse_timestamp(self.id, &self.updated_at)?,
        })
    }
}

fn invalid_row(id: i64, reason: impl std::fmt::Display) -> DatabaseError {
    DatabaseError::InvalidRow(format!("job record {}: {}", id, reason))
}

fn parse_timestamp(id: i64, value: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| invalid_row(id, format!("bad timestamp '{}': {}", value, e)))
}

/// `a_explanation=?n, a_score=?n+1, ...` for every dimension, numbered from `first`.
fn dimension_assignments(first: usize) -> String {
    Dimension::ALL
        .iter()
        .enumerate()
        .map(|(i, d)| {
            let n = first + i * 2;
            format!(
                "{key}_explanation=?{n}, {key}_score=?{m}",
                key = d.key(),
                n = n,
                m = n + 1
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Inserts a new record at `saved` with version 1 and returns its id.
pub fn insert(
    db: &Database,
    job: &NewJobRecord,
    now: DateTime<Utc>,
) -> Result<JobId, DatabaseError> {
    let timestamp = now.to_rfc3339();
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO job_records (language, question_id, file_name, file_path, status,
             version, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 'saved', 1, ?5, ?5)",
            params![
                job.language,
                job.question_id,
                job.file_name,
                job.file_path.to_string_lossy(),
                timestamp,
            ],
        )?;
        Ok(JobId::new(conn.last_insert_rowid()))
    })
}

/// Finds a record by its id.
pub fn find_by_id(db: &Database, id: JobId) -> Result<Option<JobRecord>, DatabaseError> {
    db.with_conn(|conn| find_row(conn, id))?
        .map(JobRow::into_record)
        .transpose()
}

fn find_row(conn: &Connection, id: JobId) -> Result<Option<JobRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM job_records WHERE id = ?1",
            params![id.get()],
            JobRow::from_row,
        )
        .optional()?;
    Ok(row)
}

/// Lists every record, oldest first.
pub fn list_all(db: &Database) -> Result<Vec<JobRecord>, DatabaseError> {
    let rows = db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM job_records ORDER BY id ASC")?;
        let rows = stmt
            .query_map([], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })?;
    rows.into_iter().map(JobRow::into_record).collect()
}

/// Version and status currently stored for `id`.
pub(crate) fn current_state(
    conn: &Connection,
    id: JobId,
) -> Result<Option<(i64, JobStatus)>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT version, status, failed_stage, failure_reason FROM job_records WHERE id = ?1",
            params![id.get()],
            |r| {
                Ok((
                    r.get::<_, i64>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, Option<String>>(2)?,
                    r.get::<_, Option<String>>(3)?,
                ))
            },
        )
        .optional()?;

    row.map(|(version, status, stage, reason)| {
        JobStatus::from_columns(&status, stage.as_deref(), reason.as_deref())
            .map(|status| (version, status))
            .map_err(|e| invalid_row(id.get(), e))
    })
    .transpose()
}

/// Overwrites a record through [`Database::guarded_write`], so the write only
/// lands on the version the caller read and never moves the status backward.
/// Returns the record as stored, with the incremented version.
pub fn update(db: &Database, record: &JobRecord) -> Result<JobRecord, DatabaseError> {
    let row = JobRow::from_record(record);
    let sql = format!(
        "UPDATE job_records SET status=?1, failed_stage=?2, failure_reason=?3,
         transcript=?4, level=?5, overall_score=?6, updated_at=?7, version=version + 1,
         {}
         WHERE id=?8 AND version=?9",
        dimension_assignments(10)
    );

    let mut values: Vec<Value> = vec![
        row.status.into(),
        row.failed_stage.into(),
        row.failure_reason.into(),
        row.transcript.into(),
        row.level.into(),
        row.overall_score.into(),
        row.updated_at.into(),
        row.id.into(),
        row.version.into(),
    ];
    for (explanation, score) in row.dimensions {
        values.push(explanation.into());
        values.push(score.into());
    }

    db.guarded_write(record, |conn| {
        Ok(conn.execute(&sql, params_from_iter(values))?)
    })
}

/// Gets record counts grouped by status.
pub fn count_by_status(db: &Database) -> Result<Vec<(String, u64)>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*) FROM job_records GROUP BY status ORDER BY status",
        )?;
        let counts = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(counts)
    })
}
