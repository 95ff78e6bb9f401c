//! Repository table access.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};

/// A raw repository row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryRow {
    pub id: String,
    pub owner: String,
    pub name: String,
    pub fork_mode: bool,
    pub fork_owner: Option<String>,
    pub fork_org: Option<String>,
    pub path: String,
    pub created_at: String,
    pub updated_at: String,
}

impl RepositoryRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            owner: row.get("owner")?,
            name: row.get("name")?,
            fork_mode: row.get("fork_mode")?,
            fork_owner: row.get("fork_owner")?,
            fork_org: row.get("fork_org")?,
            path: row.get("path")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Inserts a repository or updates the existing row with the same id.
pub fn upsert(db: &Database, repo: &RepositoryRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO repositories (id, owner, name, fork_mode, fork_owner, fork_org, path,
             created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
               path = excluded.path,
               updated_at = excluded.updated_at",
            params![
                repo.id,
                repo.owner,
                repo.name,
                repo.fork_mode,
                repo.fork_owner,
                repo.fork_org,
                repo.path,
                repo.created_at,
                repo.updated_at,
            ],
        )?;
        Ok(())
    })
}

pub fn find_by_id(db: &Database, id: &str) -> Result<Option<RepositoryRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM repositories WHERE id = ?1",
                params![id],
                RepositoryRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Oldest repository with this owner and name.
pub fn find_by_owner_and_name(
    db: &Database,
    owner: &str,
    name: &str,
) -> Result<Option<RepositoryRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM repositories WHERE owner = ?1 AND name = ?2
                 ORDER BY created_at ASC LIMIT 1",
                params![owner, name],
                RepositoryRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Looks a repository up by its full identity tuple. Absent fork fields
/// match `NULL` as well as the empty string.
pub fn find_by_identity(
    db: &Database,
    owner: &str,
    name: &str,
    fork_mode: bool,
    fork_owner: Option<&str>,
    fork_org: Option<&str>,
) -> Result<Option<RepositoryRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM repositories
                 WHERE owner = ?1 AND name = ?2 AND fork_mode = ?3
                   AND IFNULL(fork_owner, '') = ?4 AND IFNULL(fork_org, '') = ?5",
                params![
                    owner,
                    name,
                    fork_mode,
                    fork_owner.unwrap_or(""),
                    fork_org.unwrap_or("")
                ],
                RepositoryRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// All repositories, oldest first.
pub fn list(db: &Database) -> Result<Vec<RepositoryRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM repositories ORDER BY created_at ASC, id ASC")?;
        let rows = stmt
            .query_map([], RepositoryRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
