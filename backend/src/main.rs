use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::http::{header::AUTHORIZATION, header::CONTENT_TYPE, Method};
use sqlx::postgres;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ttt_match_engine::config::Config;
use ttt_match_engine::crud::PgMatchStore;
use ttt_match_engine::gate::TrustedBearer;
use ttt_match_engine::store::{MatchStore, MemoryMatchStore};
use ttt_match_engine::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=debug", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let store: Arc<dyn MatchStore> = match &config.database_url {
        Some(url) => {
            // set up connection pool
            let pool = postgres::PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .acquire_timeout(Duration::from_secs(3))
                .connect(url)
                .await
                .context("can't connect to database")?;

            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("failed to run migrations")?;

            Arc::new(PgMatchStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, matches are kept in memory only");
            Arc::new(MemoryMatchStore::new())
        }
    };

    let cors = CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_origin(Any)
        .allow_headers([CONTENT_TYPE, AUTHORIZATION]);

    let trace_layer =
        TraceLayer::new_for_http().on_response(DefaultOnResponse::new().level(Level::INFO));

    let state = Arc::new(AppState::new(
        store,
        Arc::new(TrustedBearer),
        config.lobby_page_size,
    ));
    let app = router(state).layer(cors).layer(trace_layer);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("can't bind {}", config.bind_addr))?;
    tracing::debug!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
