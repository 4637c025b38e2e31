use std::error::Error;

use diesel::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tracing::debug;

pub const DOCUMENTS_MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/documents");
pub const TARBALLS_MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/tarballs");

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DbType {
    /// Package documents and replication checkpoints.
    Documents,
    /// Tarball bytes.
    Tarballs,
}

fn get_migrations(db_type: &DbType) -> EmbeddedMigrations {
    match db_type {
        DbType::Documents => DOCUMENTS_MIGRATIONS,
        DbType::Tarballs => TARBALLS_MIGRATIONS,
    }
}

pub fn apply_migrations(
    conn: &mut SqliteConnection,
    db_type: &DbType,
) -> Result<(), Box<dyn Error + Send + Sync + 'static>> {
    let applied = conn.run_pending_migrations(get_migrations(db_type))?;
    if !applied.is_empty() {
        debug!(?db_type, count = applied.len(), "applied migrations");
    }
    Ok(())
}
