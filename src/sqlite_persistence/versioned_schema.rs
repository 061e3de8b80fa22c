use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection};

/// Offset added to schema versions before they are written to `PRAGMA user_version`,
/// so that a database created by some other tool is never mistaken for ours.
pub const BASE_DB_VERSION: usize = 99999;

#[macro_export]
macro_rules! sqlite_column {
    ($name:expr, $sql_type:expr $(, $field:ident = $value:expr)*) => {
        {
            #[allow(unused_mut)]
            let mut column = $crate::sqlite_persistence::Column {
                name: $name,
                sql_type: $sql_type,
                is_primary_key: false,
                non_null: false,
            };
            $(
                column.$field = $value;
            )*
            column
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Text,
    Integer,
}

impl SqlType {
    fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Text => "TEXT",
            SqlType::Integer => "INTEGER",
        }
    }

    fn from_sql(s: &str) -> Option<Self> {
        match s {
            "TEXT" => Some(SqlType::Text),
            "INTEGER" => Some(SqlType::Integer),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct Column {
    pub name: &'static str,
    pub sql_type: SqlType,
    pub is_primary_key: bool,
    pub non_null: bool,
}

pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column],
    /// (index name, indexed columns)
    pub indices: &'static [(&'static str, &'static str)],
}

impl Table {
    pub fn create(&self, conn: &Connection) -> Result<()> {
        let columns = self
            .columns
            .iter()
            .map(|column| {
                let mut definition = format!("{} {}", column.name, column.sql_type.as_sql());
                if column.is_primary_key {
                    definition.push_str(" PRIMARY KEY");
                }
                if column.non_null {
                    definition.push_str(" NOT NULL");
                }
                definition
            })
            .collect::<Vec<_>>()
            .join(", ");
        conn.execute(&format!("CREATE TABLE {} ({});", self.name, columns), params![])?;

        for (index_name, indexed) in self.indices {
            conn.execute(
                &format!("CREATE INDEX {} ON {}({});", index_name, self.name, indexed),
                params![],
            )?;
        }
        Ok(())
    }

    fn validate(&self, conn: &Connection) -> Result<()> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", self.name))?;
        let actual: Vec<(String, String, bool, bool)> = stmt
            .query_map(params![], |row| {
                Ok((
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i32>(3)? == 1,
                    row.get::<_, i32>(5)? > 0,
                ))
            })?
            .collect::<rusqlite::Result<_>>()
            .with_context(|| format!("Failed to read columns of table {}", self.name))?;

        if actual.len() != self.columns.len() {
            bail!(
                "Table {} has {} columns, expected {}. Found: {}",
                self.name,
                actual.len(),
                self.columns.len(),
                actual
                    .iter()
                    .map(|(name, ..)| name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        for ((name, sql_type, non_null, is_primary_key), expected) in
            actual.iter().zip(self.columns.iter())
        {
            if name != expected.name {
                bail!(
                    "Table {} column name mismatch: expected {}, got {}",
                    self.name,
                    expected.name,
                    name
                );
            }
            if SqlType::from_sql(sql_type) != Some(expected.sql_type) {
                bail!(
                    "Table {} column {} type mismatch: expected {:?}, got {}",
                    self.name,
                    expected.name,
                    expected.sql_type,
                    sql_type
                );
            }
            if *non_null != expected.non_null || *is_primary_key != expected.is_primary_key {
                bail!(
                    "Table {} column {} constraint mismatch: expected not-null={} pk={}, got not-null={} pk={}",
                    self.name,
                    expected.name,
                    expected.non_null,
                    expected.is_primary_key,
                    non_null,
                    is_primary_key
                );
            }
        }

        for (index_name, _) in self.indices {
            let exists = conn
                .query_row(
                    "SELECT 1 FROM sqlite_master WHERE type='index' AND name=?1 AND tbl_name=?2",
                    params![index_name, self.name],
                    |_| Ok(()),
                )
                .is_ok();
            if !exists {
                bail!("Table {} is missing index '{}'", self.name, index_name);
            }
        }
        Ok(())
    }
}

pub struct VersionedSchema {
    pub version: usize,
    pub tables: &'static [Table],
    /// Brings a database at the previous version up to this one.
    pub migration: Option<fn(&Connection) -> Result<()>>,
}

impl VersionedSchema {
    pub fn create(&self, conn: &Connection) -> Result<()> {
        for table in self.tables {
            table.create(conn)?;
        }
        conn.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + self.version),
            [],
        )?;
        Ok(())
    }

    pub fn validate(&self, conn: &Connection) -> Result<()> {
        for table in self.tables {
            table.validate(conn)?;
        }
        Ok(())
    }
}

/// Reads the schema version stored in `PRAGMA user_version`, minus [`BASE_DB_VERSION`].
pub fn read_schema_version(conn: &Connection) -> Result<i64> {
    let raw: i64 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    Ok(raw - BASE_DB_VERSION as i64)
}

/// Creates a fresh database with the latest schema, or validates an existing one
/// and runs any pending migrations in a single transaction.
pub fn open_versioned(
    conn: &mut Connection,
    schemas: &[VersionedSchema],
    is_new_db: bool,
) -> Result<()> {
    let latest = schemas.last().context("No schema versions defined")?;
    if is_new_db {
        return latest.create(conn);
    }

    let db_version = read_schema_version(conn)?;
    let schema = schemas
        .iter()
        .find(|schema| schema.version as i64 == db_version)
        .with_context(|| format!("Unknown database schema version {}", db_version))?;
    schema
        .validate(conn)
        .with_context(|| format!("Schema validation failed for version {}", db_version))?;

    if schema.version < latest.version {
        let tx = conn.transaction()?;
        for next in schemas.iter().filter(|s| s.version > schema.version) {
            tracing::info!("Migrating database schema to version {}", next.version);
            if let Some(migration) = next.migration {
                migration(&tx).with_context(|| {
                    format!("Failed to run migration to version {}", next.version)
                })?;
            }
        }
        tx.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + latest.version),
            [],
        )?;
        tx.commit()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOTES_V1: Table = Table {
        name: "notes",
        columns: &[
            sqlite_column!("id", SqlType::Text, is_primary_key = true),
            sqlite_column!("body", SqlType::Text, non_null = true),
        ],
        indices: &[("idx_notes_body", "body")],
    };

    const NOTES_V2: Table = Table {
        name: "notes",
        columns: &[
            sqlite_column!("id", SqlType::Text, is_primary_key = true),
            sqlite_column!("body", SqlType::Text, non_null = true),
            sqlite_column!("pinned", SqlType::Integer),
        ],
        indices: &[("idx_notes_body", "body")],
    };

    fn add_pinned(conn: &Connection) -> Result<()> {
        conn.execute("ALTER TABLE notes ADD COLUMN pinned INTEGER", [])?;
        Ok(())
    }

    const SCHEMAS: &[VersionedSchema] = &[
        VersionedSchema {
            version: 1,
            tables: &[NOTES_V1],
            migration: None,
        },
        VersionedSchema {
            version: 2,
            tables: &[NOTES_V2],
            migration: Some(add_pinned),
        },
    ];

    #[test]
    fn test_create_then_validate() {
        let mut conn = Connection::open_in_memory().unwrap();
        open_versioned(&mut conn, SCHEMAS, true).unwrap();

        assert_eq!(read_schema_version(&conn).unwrap(), 2);
        SCHEMAS[1].validate(&conn).unwrap();
    }

    #[test]
    fn test_migrates_older_database() {
        let mut conn = Connection::open_in_memory().unwrap();
        SCHEMAS[0].create(&conn).unwrap();

        open_versioned(&mut conn, SCHEMAS, false).unwrap();

        assert_eq!(read_schema_version(&conn).unwrap(), 2);
        SCHEMAS[1].validate(&conn).unwrap();
    }

    #[test]
    fn test_validate_detects_missing_index() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE notes (id TEXT PRIMARY KEY, body TEXT NOT NULL)", [])
            .unwrap();

        let err = SCHEMAS[0].validate(&conn).unwrap_err().to_string();
        assert!(err.contains("missing index"));
        assert!(err.contains("idx_notes_body"));
    }

    #[test]
    fn test_validate_detects_constraint_mismatch() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE notes (id TEXT PRIMARY KEY, body TEXT)", [])
            .unwrap();

        let err = SCHEMAS[0].validate(&conn).unwrap_err().to_string();
        assert!(err.contains("constraint mismatch"));
    }

    #[test]
    fn test_rejects_unknown_version() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute(&format!("PRAGMA user_version = {}", BASE_DB_VERSION + 7), [])
            .unwrap();

        let err = open_versioned(&mut conn, SCHEMAS, false).unwrap_err();
        assert!(err.to_string().contains("Unknown database schema version 7"));
    }
}
