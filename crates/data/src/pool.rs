//! Connection pooling around diesel's blocking Postgres connection.
//!
//! This bridge opens exactly one pool for its one lifetime, so there is no
//! `Deref`-to-raw-pool escape hatch or generic health-probe API here, only
//! what `new()` and the snapshot writer actually need: build the pool, make
//! sure Postgres is reachable before the supervisor starts relying on it,
//! and hand out connections.

use std::time::Duration;

use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use thiserror::Error;

pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;
pub type PgPooledConnection = r2d2::PooledConnection<ConnectionManager<PgConnection>>;

#[derive(Clone, Debug)]
pub struct DieselPool {
    inner: PgPool,
}

impl DieselPool {
    pub fn new(database_url: &str) -> Result<DieselPool, PoolError> {
        let manager = ConnectionManager::new(database_url);
        let inner = r2d2::Pool::builder().build_unchecked(manager);
        let pool = DieselPool { inner };

        pool.inner
            .get_timeout(Duration::from_secs(5))
            .map_err(PoolError::R2D2)?;

        Ok(pool)
    }

    pub fn get(&self) -> Result<PgPooledConnection, PoolError> {
        Ok(self.inner.get()?)
    }
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error(transparent)]
    R2D2(#[from] r2d2::PoolError),
}
