//! Acceptance table schema
//!
//! Two tables hold all trust decisions:
//! - `acceptance_decision`: at most one decision per fingerprint
//! - `acceptance_email`: emails decided for under a fingerprint

use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

pub const EMAIL_TABLE: &str = "acceptance_email";
pub const DECISION_TABLE: &str = "acceptance_decision";

const CREATE_SCHEMA_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS acceptance_email (
        fpr text not null,
        email text not null,
        unique(fpr, email)
    );

    CREATE TABLE IF NOT EXISTS acceptance_decision (
        fpr text not null,
        decision text not null,
        unique(fpr)
    );

    CREATE UNIQUE INDEX IF NOT EXISTS acceptance_email_i1
        ON acceptance_email(fpr, email);

    CREATE UNIQUE INDEX IF NOT EXISTS acceptance__decision_i1
        ON acceptance_decision(fpr);
"#;

pub fn table_exists(conn: &Connection, name: &str) -> rusqlite::Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?",
            params![name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Create both tables and their indexes unless both tables already exist
///
/// Returns `true` when the schema was (re)created. A store holding only
/// one of the tables is treated like an empty one; existing rows are kept.
pub fn ensure_schema(conn: &mut Connection) -> rusqlite::Result<bool> {
    if table_exists(conn, EMAIL_TABLE)? && table_exists(conn, DECISION_TABLE)? {
        return Ok(false);
    }

    let tx = conn.transaction()?;
    tx.execute_batch(CREATE_SCHEMA_SQL)?;
    tx.commit()?;

    info!("Created acceptance tables");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'index' AND name LIKE 'acceptance%' ORDER BY name")
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<String>, _>>()
            .unwrap()
    }

    #[test]
    fn test_fresh_store_gets_schema() {
        let mut conn = Connection::open_in_memory().unwrap();
        assert!(!table_exists(&conn, EMAIL_TABLE).unwrap());

        assert!(ensure_schema(&mut conn).unwrap());
        assert!(table_exists(&conn, EMAIL_TABLE).unwrap());
        assert!(table_exists(&conn, DECISION_TABLE).unwrap());
        assert_eq!(
            index_names(&conn),
            vec!["acceptance__decision_i1".to_string(), "acceptance_email_i1".to_string()]
        );
    }

    #[test]
    fn test_ensure_schema_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        assert!(ensure_schema(&mut conn).unwrap());
        conn.execute("INSERT INTO acceptance_decision VALUES ('abc', 'verified')", [])
            .unwrap();

        assert!(!ensure_schema(&mut conn).unwrap());
        let count: i64 = conn
            .query_row("SELECT count(*) FROM acceptance_decision", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_partial_schema_is_completed() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE acceptance_email (fpr text not null, email text not null, unique(fpr, email));
             INSERT INTO acceptance_email VALUES ('abc', 'a@x');",
        )
        .unwrap();

        assert!(ensure_schema(&mut conn).unwrap());
        assert!(table_exists(&conn, DECISION_TABLE).unwrap());
        let count: i64 = conn
            .query_row("SELECT count(*) FROM acceptance_email", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_unique_constraints() {
        let mut conn = Connection::open_in_memory().unwrap();
        ensure_schema(&mut conn).unwrap();

        conn.execute("INSERT INTO acceptance_decision VALUES ('abc', 'verified')", [])
            .unwrap();
        assert!(conn
            .execute("INSERT INTO acceptance_decision VALUES ('abc', 'rejected')", [])
            .is_err());

        conn.execute("INSERT INTO acceptance_email VALUES ('abc', 'a@x')", [])
            .unwrap();
        assert!(conn
            .execute("INSERT INTO acceptance_email VALUES ('abc', 'a@x')", [])
            .is_err());
    }
}
