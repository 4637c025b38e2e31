//! Database connection management.

use std::{
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};

use diesel::Connection as DieselConnection;
use tarn_db::{connection::DbConnection, error::DbError, migration::DbType};
use tracing::{debug, warn};

use crate::error::MirrorError;

type Result<T> = std::result::Result<T, MirrorError>;

/// Thread-safe handle around a [`DbConnection`].
///
/// Clones share the same connection. Once [`close`](Self::close) ran, every
/// further use fails with [`DbError::Closed`].
#[derive(Clone)]
pub struct DieselDatabase {
    conn: Arc<Mutex<Option<DbConnection>>>,
}

impl DieselDatabase {
    /// Opens the package document database with migrations.
    pub fn open_documents<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open(path, DbType::Documents)
    }

    /// Opens the tarball database with migrations.
    pub fn open_tarballs<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open(path, DbType::Tarballs)
    }

    pub fn open<P: AsRef<Path>>(path: P, db_type: DbType) -> Result<Self> {
        debug!(path = %path.as_ref().display(), ?db_type, "opening database");
        let conn = DbConnection::open(path, db_type)?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory(db_type: DbType) -> Result<Self> {
        let conn = DbConnection::open_in_memory(db_type)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: DbConnection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(Some(conn))),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<DbConnection>>> {
        Ok(self.conn.lock().map_err(DbError::from)?)
    }

    /// Executes a function with the connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut diesel::SqliteConnection) -> diesel::QueryResult<T>,
    {
        let mut guard = self.lock()?;
        let conn = guard.as_mut().ok_or(DbError::Closed)?;
        f(conn.conn()).map_err(|e| MirrorError::Store(e.into()))
    }

    /// Executes a function within a transaction.
    pub fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut diesel::SqliteConnection) -> diesel::QueryResult<T>,
    {
        let mut guard = self.lock()?;
        let conn = guard.as_mut().ok_or(DbError::Closed)?;
        conn.conn()
            .transaction(f)
            .map_err(|e| MirrorError::Store(e.into()))
    }

    /// Flushes the WAL and drops the connection. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        let mut guard = self.lock()?;
        if let Some(mut conn) = guard.take() {
            if let Err(err) = conn.checkpoint() {
                warn!(db_type = ?conn.db_type(), "WAL checkpoint on close failed: {err}");
            }
            debug!(db_type = ?conn.db_type(), "database closed");
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.conn.lock().map(|guard| guard.is_none()).unwrap_or(true)
    }
}
