use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::cache::SharedCache;
use crate::config::Config;
use crate::hydrate::Hydrator;
use crate::images::ImageStore;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub cache: SharedCache,
    pub images: ImageStore,
}

impl AppState {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.config.cache.ttl_secs)
    }

    pub fn hydrator(&self) -> Hydrator<'_> {
        Hydrator::new(&self.db, self.cache.as_ref(), self.cache_ttl())
    }
}
