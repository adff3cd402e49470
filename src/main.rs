mod cache_sweeper;
mod config;
mod error;
mod lookup;
mod movie;
mod movie_store;
mod normalize;
mod omdb;
mod routes;
mod stats;
mod types;

use anyhow::Context;
use config::Config;
use lookup::MovieLookupService;
use movie_store::{MemoryMovieStore, MovieStore, PgMovieStore};
use omdb::OmdbClient;
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc, time::Duration};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine, real deployments set the environment directly.
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,movieflix_cache=debug,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;

    tracing::info!(
        port = config.port,
        cache_expiry_hours = config.cache_expiry_hours,
        sweep_interval_secs = config.cache_sweep_interval.as_secs(),
        persistent = config.database_url.is_some(),
        "Starting MovieFlix cache"
    );

    let store: Arc<dyn MovieStore> = match &config.database_url {
        Some(database_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .min_connections(2)
                .acquire_timeout(Duration::from_secs(3))
                .idle_timeout(Duration::from_secs(600))
                .max_lifetime(Duration::from_secs(1800))
                .connect(database_url)
                .await
                .context("failed to connect to the movie database")?;
            let store = PgMovieStore::new(pool);
            store.migrate().await?;
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, caching movies in memory only");
            Arc::new(MemoryMovieStore::new())
        }
    };

    let omdb = OmdbClient::new(
        config.omdb_api_key.clone(),
        &config.omdb_base_url,
        config.upstream_timeout,
    )?;

    let lookup = MovieLookupService::new(store, Arc::new(omdb), config.cache_expiry_hours);

    cache_sweeper::start_cache_sweep_task(lookup.clone(), config.cache_sweep_interval);
    cache_sweeper::start_stats_task(lookup.clone(), config.stats_log_interval);

    let app = routes::router(types::AppState { lookup });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await?;
    Ok(())
}
