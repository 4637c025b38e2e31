//! Database connection management.
//!
//! The mirror keeps two SQLite files under its storage directory:
//!
//! - **documents.db**: package documents and replication checkpoints
//! - **tarballs.db**: immutable tarball bytes

use std::path::Path;

use diesel::{sql_query, Connection, RunQueryDsl, SqliteConnection};

use crate::{
    error::{DbError, Result},
    migration::{apply_migrations, DbType},
};

/// Database connection wrapper with migration support.
pub struct DbConnection {
    conn: SqliteConnection,
    db_type: DbType,
}

impl DbConnection {
    /// Opens a database connection and runs migrations.
    ///
    /// `path` may be `:memory:` for a throwaway database.
    pub fn open<P: AsRef<Path>>(path: P, db_type: DbType) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy();
        let mut conn = SqliteConnection::establish(&path_str)?;

        sql_query("PRAGMA journal_mode = WAL;")
            .execute(&mut conn)
            .map_err(|e| DbError::ConnectionError(e.to_string()))?;
        sql_query("PRAGMA busy_timeout = 5000;")
            .execute(&mut conn)
            .map_err(|e| DbError::ConnectionError(e.to_string()))?;

        apply_migrations(&mut conn, &db_type)
            .map_err(|e| DbError::MigrationError(e.to_string()))?;

        Ok(Self { conn, db_type })
    }

    pub fn open_in_memory(db_type: DbType) -> Result<Self> {
        Self::open(":memory:", db_type)
    }

    pub fn db_type(&self) -> DbType {
        self.db_type
    }

    /// Flushes the write-ahead log into the main database file.
    pub fn checkpoint(&mut self) -> Result<()> {
        sql_query("PRAGMA wal_checkpoint(TRUNCATE);").execute(&mut self.conn)?;
        Ok(())
    }

    /// Gets a mutable reference to the underlying connection.
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }
}

impl std::ops::Deref for DbConnection {
    type Target = SqliteConnection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl std::ops::DerefMut for DbConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}
