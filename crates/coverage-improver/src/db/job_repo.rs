//! Job repository: CRUD operations for the `jobs` table.

use rusqlite::{params, params_from_iter, Row};

use super::{Database, DatabaseError};

/// A raw job row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRow {
    pub id: String,
    pub repository_id: String,
    pub target_path: String,
    pub status: String,
    pub result_artifact: Option<String>,
    /// JSON array of `{at, message}` entries.
    pub log: String,
    pub created_at: String,
    pub updated_at: String,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            repository_id: row.get("repository_id")?,
            target_path: row.get("target_path")?,
            status: row.get("status")?,
            result_artifact: row.get("result_artifact")?,
            log: row.get("log")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// One `(repository_id, status, count)` group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusCount {
    pub repository_id: String,
    pub status: String,
    pub count: u64,
}

/// Inserts a job, or overwrites every mutable column of an existing one.
/// `created_at` and the owning repository are never changed.
pub fn upsert(db: &Database, job: &JobRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO jobs (id, repository_id, target_path, status, result_artifact, log,
             created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
               status = excluded.status,
               result_artifact = excluded.result_artifact,
               log = excluded.log,
               updated_at = excluded.updated_at",
            params![
                job.id,
                job.repository_id,
                job.target_path,
                job.status,
                job.result_artifact,
                job.log,
                job.created_at,
                job.updated_at,
            ],
        )?;
        Ok(())
    })
}

/// Overwrites the mutable columns of a job only while it is still in
/// `expected_status`. Returns `false` when no row matched.
pub fn update_if_status(
    db: &Database,
    job: &JobRow,
    expected_status: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET status = ?1, result_artifact = ?2, log = ?3, updated_at = ?4
             WHERE id = ?5 AND status = ?6",
            params![
                job.status,
                job.result_artifact,
                job.log,
                job.updated_at,
                job.id,
                expected_status,
            ],
        )?;
        Ok(changed == 1)
    })
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM jobs WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], JobRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Lists jobs newest first, optionally for a single repository.
pub fn list(db: &Database, repository_id: Option<&str>) -> Result<Vec<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let rows = match repository_id {
            Some(repository_id) => {
                let mut stmt = conn.prepare(
                    "SELECT * FROM jobs WHERE repository_id = ?1
                     ORDER BY created_at DESC, id DESC",
                )?;
                let rows = stmt
                    .query_map(params![repository_id], JobRow::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt =
                    conn.prepare("SELECT * FROM jobs ORDER BY created_at DESC, id DESC")?;
                let rows = stmt
                    .query_map([], JobRow::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };
        Ok(rows)
    })
}

/// Jobs whose status is any of `statuses`, oldest first.
pub fn find_by_statuses(db: &Database, statuses: &[&str]) -> Result<Vec<JobRow>, DatabaseError> {
    if statuses.is_empty() {
        return Ok(Vec::new());
    }
    db.with_conn(|conn| {
        let placeholders: Vec<String> = (1..=statuses.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "SELECT * FROM jobs WHERE status IN ({}) ORDER BY created_at ASC, id ASC",
            placeholders.join(", ")
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(statuses.iter()), JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Counts jobs grouped by repository and status.
pub fn count_by_repository_and_status(
    db: &Database,
    repository_id: Option<&str>,
) -> Result<Vec<StatusCount>, DatabaseError> {
    db.with_conn(|conn| {
        let map = |row: &Row<'_>| {
            Ok(StatusCount {
                repository_id: row.get(0)?,
                status: row.get(1)?,
                count: row.get(2)?,
            })
        };
        let rows = match repository_id {
            Some(repository_id) => {
                let mut stmt = conn.prepare(
                    "SELECT repository_id, status, COUNT(*) FROM jobs
                     WHERE repository_id = ?1
                     GROUP BY repository_id, status ORDER BY repository_id",
                )?;
                let rows = stmt
                    .query_map(params![repository_id], map)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT repository_id, status, COUNT(*) FROM jobs
                     GROUP BY repository_id, status ORDER BY repository_id",
                )?;
                let rows = stmt.query_map([], map)?.collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };
        Ok(rows)
    })
}
