// Library exports for Iscogram
// This allows integration tests and the binary to share the application modules

pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod hydrate;
pub mod images;
pub mod routes;
pub mod state;

use crate::config::Config;
use crate::images::ImageStore;
use crate::state::AppState;

/// Open the store, apply migrations, connect the cache and prepare the
/// image mirror directory.
pub async fn build_state(config: Config) -> anyhow::Result<AppState> {
    let db_path = config.db_path();
    let pool = db::create_pool(&db_path)?;
    db::run_migrations(&pool)?;
    tracing::info!("Database: {}", db_path.display());

    let cache = cache::connect(&config.cache).await?;

    let images = ImageStore::new(&config.public_dir());
    std::fs::create_dir_all(images.dir())?;

    Ok(AppState {
        db: pool,
        config,
        cache,
        images,
    })
}
