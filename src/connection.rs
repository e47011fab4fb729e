//! Thin wrapper over [`rusqlite::Connection`]: transaction bookkeeping and
//! table/index introspection. Statement preparation, parameter binding, and
//! row stepping are left to `rusqlite` directly; this layer only adds the
//! single non-nestable "transaction pending" flag the write engines rely on.

use crate::error::Result;
use rusqlite::Connection as SqliteConnection;
use std::cell::Cell;

pub struct DbConnection {
    conn: SqliteConnection,
    transaction_pending: Cell<bool>,
}

impl DbConnection {
    pub fn open(path: &str) -> Result<Self> {
        let conn = SqliteConnection::open(path)?;
        Ok(Self {
            conn,
            transaction_pending: Cell::new(false),
        })
    }

    pub fn open_read_only(path: &str) -> Result<Self> {
        let conn = SqliteConnection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        )?;
        Ok(Self {
            conn,
            transaction_pending: Cell::new(false),
        })
    }

    pub fn raw(&self) -> &SqliteConnection {
        &self.conn
    }

    pub fn is_transaction_pending(&self) -> bool {
        self.transaction_pending.get()
    }

    /// A nested `BEGIN` while one is already pending is rejected by SQLite
    /// itself; that `rusqlite::Error` propagates as [`Error::Database`] rather
    /// than being pre-empted here.
    pub fn begin_transaction(&self) -> Result<()> {
        self.conn.execute_batch("BEGIN")?;
        self.transaction_pending.set(true);
        Ok(())
    }

    /// A `COMMIT`/`ROLLBACK` with no transaction pending is rejected by SQLite
    /// itself; that `rusqlite::Error` propagates as [`Error::Database`] rather
    /// than being pre-empted here.
    pub fn end_transaction(&self, commit: bool) -> Result<()> {
        self.conn
            .execute_batch(if commit { "COMMIT" } else { "ROLLBACK" })?;
        self.transaction_pending.set(false);
        Ok(())
    }

    /// Runs `f` inside a transaction opened only if none is already pending
    /// ("outer wins"). Commits on success if this call opened the transaction;
    /// rolls back only a transaction this call opened.
    pub fn with_scoped_transaction<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let opened_here = !self.transaction_pending.get();
        if opened_here {
            self.begin_transaction()?;
        }
        match f() {
            Ok(value) => {
                if opened_here {
                    self.end_transaction(true)?;
                }
                Ok(value)
            }
            Err(err) => {
                if opened_here {
                    // Best-effort rollback; the original error is what the caller needs.
                    let _ = self.end_transaction(false);
                }
                Err(err)
            }
        }
    }

    pub fn table_exists(&self, name: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
            [name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Column names declared on a table, in declaration order.
    pub fn table_columns(&self, name: &str) -> Result<Vec<String>> {
        let sql = format!("PRAGMA table_info(\"{}\")", name.replace('"', "\"\""));
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
        let mut columns = Vec::new();
        for row in rows {
            columns.push(row?);
        }
        Ok(columns)
    }

    /// Names of indices defined on a table.
    pub fn table_indices(&self, name: &str) -> Result<Vec<String>> {
        let sql = format!("PRAGMA index_list(\"{}\")", name.replace('"', "\"\""));
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
        let mut indices = Vec::new();
        for row in rows {
            indices.push(row?);
        }
        Ok(indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoped_transaction_commits_when_opened_here() {
        let db = DbConnection::open(":memory:").unwrap();
        db.raw().execute_batch("CREATE TABLE t(x INTEGER)").unwrap();
        db.with_scoped_transaction(|| {
            db.raw().execute("INSERT INTO t VALUES (1)", [])?;
            Ok(())
        })
        .unwrap();
        assert!(!db.is_transaction_pending());
        let count: i64 = db
            .raw()
            .query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn scoped_transaction_participates_in_outer() {
        let db = DbConnection::open(":memory:").unwrap();
        db.raw().execute_batch("CREATE TABLE t(x INTEGER)").unwrap();
        db.begin_transaction().unwrap();
        db.with_scoped_transaction(|| {
            db.raw().execute("INSERT INTO t VALUES (1)", [])?;
            Ok(())
        })
        .unwrap();
        // The inner helper did not commit; the transaction is still pending.
        assert!(db.is_transaction_pending());
        db.end_transaction(true).unwrap();
    }

    #[test]
    fn rejects_nested_begin() {
        let db = DbConnection::open(":memory:").unwrap();
        db.begin_transaction().unwrap();
        assert!(db.begin_transaction().is_err());
        db.end_transaction(true).unwrap();
    }

    #[test]
    fn rejects_commit_without_begin() {
        let db = DbConnection::open(":memory:").unwrap();
        assert!(db.end_transaction(true).is_err());
    }
}
