//! Postgres persistence for room snapshots.

pub mod error;
pub mod pool;
pub mod schema;
pub mod store;

pub use error::{Error, Result};
pub use pool::DieselPool;
pub use store::{PgStore, Store, persist_snapshot};

pub const MIGRATIONS: diesel_migrations::EmbeddedMigrations =
    diesel_migrations::embed_migrations!("migrations");

/// Runs pending migrations on a blocking thread, for callers (the bridge's
/// startup path) that would otherwise need a direct `diesel_migrations`
/// dependency just for this one call.
pub async fn run_pending_migrations(pool: &DieselPool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        diesel_migrations::MigrationHarness::run_pending_migrations(&mut *conn, MIGRATIONS)
            .map(|_| ())
            .map_err(|e| Error::Migration(e.to_string()))
    })
    .await?
}
