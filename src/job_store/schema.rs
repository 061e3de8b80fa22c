//! SQLite schema for the jobs database.

use crate::sqlite_column;
use crate::sqlite_persistence::{SqlType, Table, VersionedSchema};

// =============================================================================
// Version 1 - Jobs
// =============================================================================

/// Timestamps are RFC 3339 strings with a fixed microsecond precision, so
/// ordering by the raw column text is chronological.
const JOBS_TABLE_V1: Table = Table {
    name: "jobs",
    columns: &[
        sqlite_column!("id", SqlType::Text, is_primary_key = true),
        sqlite_column!("name", SqlType::Text, non_null = true),
        sqlite_column!("code", SqlType::Text, non_null = true),
        sqlite_column!("status", SqlType::Text, non_null = true),
        sqlite_column!("scheduled_at", SqlType::Text),
        sqlite_column!("output", SqlType::Text, non_null = true),
        sqlite_column!("error", SqlType::Text, non_null = true),
        sqlite_column!("created_date", SqlType::Text, non_null = true),
        sqlite_column!("begin_exec_date", SqlType::Text),
        sqlite_column!("end_exec_date", SqlType::Text),
    ],
    indices: &[
        ("idx_jobs_status", "status"),
        ("idx_jobs_name", "name"),
        ("idx_jobs_created_date", "created_date"),
    ],
};

pub const JOBS_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[JOBS_TABLE_V1],
    migration: None,
}];
