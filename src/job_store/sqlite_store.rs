use super::schema::JOBS_VERSIONED_SCHEMAS;
use super::JobStore;
use crate::jobs::{Job, JobFilter, JobStatus};
use crate::sqlite_persistence::open_versioned;
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;
use uuid::Uuid;

const JOB_COLUMNS: &str = "id, name, code, status, scheduled_at, output, error, \
     created_date, begin_exec_date, end_exec_date";

/// SQLite-backed job store. A single connection behind a mutex serializes all writes.
#[derive(Clone)]
pub struct SqliteJobStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteJobStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let is_new_db = !path.exists();

        let mut conn = Connection::open(path)
            .with_context(|| format!("Failed to open jobs database at {:?}", path))?;
        if is_new_db {
            info!("Creating new jobs database at {:?}", path);
        }
        open_versioned(&mut conn, JOBS_VERSIONED_SCHEMAS, is_new_db)
            .with_context(|| format!("Failed to initialize jobs database at {:?}", path))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Fresh store in a private in-memory database.
    pub fn in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        open_versioned(&mut conn, JOBS_VERSIONED_SCHEMAS, true)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn format_datetime(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn parse_datetime(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
            })
    }

    fn parse_optional_datetime(
        idx: usize,
        s: Option<String>,
    ) -> rusqlite::Result<Option<DateTime<Utc>>> {
        s.map(|s| Self::parse_datetime(idx, &s)).transpose()
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<Job> {
        let id: String = row.get(0)?;
        let status: String = row.get(3)?;
        let created_date: String = row.get(7)?;

        Ok(Job {
            id: Uuid::parse_str(&id).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
            })?,
            name: row.get(1)?,
            code: row.get(2)?,
            status: JobStatus::parse(&status).ok_or_else(|| {
                rusqlite::Error::InvalidColumnType(3, status.clone(), rusqlite::types::Type::Text)
            })?,
            scheduled_at: Self::parse_optional_datetime(4, row.get(4)?)?,
            output: row.get(5)?,
            error: row.get(6)?,
            created_date: Self::parse_datetime(7, &created_date)?,
            begin_exec_date: Self::parse_optional_datetime(8, row.get(8)?)?,
            end_exec_date: Self::parse_optional_datetime(9, row.get(9)?)?,
        })
    }

    fn query_jobs(&self, sql: &str, args: Vec<String>) -> Result<Vec<Job>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(sql)?;
        let jobs = stmt
            .query_map(params_from_iter(args.iter()), Self::row_to_job)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }
}

impl JobStore for SqliteJobStore {
    fn save(&self, job: &Job) -> Result<Job> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!(
                "INSERT INTO jobs ({JOB_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    code = excluded.code,
                    status = excluded.status,
                    scheduled_at = excluded.scheduled_at,
                    output = excluded.output,
                    error = excluded.error,
                    created_date = excluded.created_date,
                    begin_exec_date = excluded.begin_exec_date,
                    end_exec_date = excluded.end_exec_date"
            ),
            params![
                job.id.to_string(),
                job.name,
                job.code,
                job.status.as_str(),
                job.scheduled_at.as_ref().map(Self::format_datetime),
                job.output,
                job.error,
                Self::format_datetime(&job.created_date),
                job.begin_exec_date.as_ref().map(Self::format_datetime),
                job.end_exec_date.as_ref().map(Self::format_datetime),
            ],
        )
        .with_context(|| format!("Failed to save job {}", job.id))?;
        Ok(job.clone())
    }

    fn save_if_status(&self, job: &Job, expected: JobStatus) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn
            .execute(
                "UPDATE jobs SET
                    name = ?2, code = ?3, status = ?4, scheduled_at = ?5, output = ?6,
                    error = ?7, begin_exec_date = ?8, end_exec_date = ?9
                 WHERE id = ?1 AND status = ?10",
                params![
                    job.id.to_string(),
                    job.name,
                    job.code,
                    job.status.as_str(),
                    job.scheduled_at.as_ref().map(Self::format_datetime),
                    job.output,
                    job.error,
                    job.begin_exec_date.as_ref().map(Self::format_datetime),
                    job.end_exec_date.as_ref().map(Self::format_datetime),
                    expected.as_str(),
                ],
            )
            .with_context(|| format!("Failed to update job {}", job.id))?;
        Ok(updated == 1)
    }

    fn find_by_id(&self, id: Uuid) -> Result<Option<Job>> {
        let conn = self.conn.lock().unwrap();
        let job = conn
            .query_row(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
                params![id.to_string()],
                Self::row_to_job,
            )
            .optional()?;
        Ok(job)
    }

    fn find_by_name(&self, name: &str) -> Result<Option<Job>> {
        let conn = self.conn.lock().unwrap();
        let job = conn
            .query_row(
                &format!(
                    "SELECT {JOB_COLUMNS} FROM jobs WHERE name = ?1
                     ORDER BY created_date ASC, id ASC LIMIT 1"
                ),
                params![name],
                Self::row_to_job,
            )
            .optional()?;
        Ok(job)
    }

    fn find_all_by_status_in(&self, statuses: &[JobStatus]) -> Result<Vec<Job>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = (1..=statuses.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        self.query_jobs(
            &format!(
                "SELECT {JOB_COLUMNS} FROM jobs WHERE status IN ({placeholders})
                 ORDER BY created_date ASC, id ASC"
            ),
            statuses.iter().map(|s| s.as_str().to_string()).collect(),
        )
    }

    fn find_matching(&self, filter: &JobFilter) -> Result<Vec<Job>> {
        let mut clauses = Vec::new();
        let mut args = Vec::new();
        if let Some(status) = filter.status {
            args.push(status.as_str().to_string());
            clauses.push(format!("status = ?{}", args.len()));
        }
        if let Some(name) = &filter.name {
            args.push(name.clone());
            clauses.push(format!("name = ?{}", args.len()));
        }

        let mut sql = format!("SELECT {JOB_COLUMNS} FROM jobs");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        match filter.new_first {
            Some(true) => sql.push_str(" ORDER BY created_date DESC"),
            Some(false) => sql.push_str(" ORDER BY created_date ASC"),
            None => {}
        }
        self.query_jobs(&sql, args)
    }

    fn delete_by_id(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn
            .execute("DELETE FROM jobs WHERE id = ?1", params![id.to_string()])
            .with_context(|| format!("Failed to delete job {}", id))?;
        Ok(deleted > 0)
    }

    fn delete_all(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.execute("DELETE FROM jobs", [])?)
    }
}
