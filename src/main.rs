mod config;
mod error;
mod routes;
mod state;
mod store;

use std::net::SocketAddr;
use std::sync::Arc;

use store::{MemoryStore, PgStore, TaskStore, UserStore};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const MEMORY_URL_PREFIX: &str = "memory:";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,task_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::from_env()?;

    let (tasks, users, pg): (Arc<dyn TaskStore>, Arc<dyn UserStore>, Option<PgStore>) =
        if config.database_url.starts_with(MEMORY_URL_PREFIX) {
            tracing::warn!("using the in-memory store; data is lost on exit");
            let store = Arc::new(MemoryStore::new());
            (store.clone() as Arc<dyn TaskStore>, store as Arc<dyn UserStore>, None)
        } else {
            let store = PgStore::connect(&config.database_url).await?;
            tracing::info!("connected to database");
            let shared = Arc::new(store.clone());
            (shared.clone() as Arc<dyn TaskStore>, shared as Arc<dyn UserStore>, Some(store))
        };

    let state = state::AppState::new(&config, tasks, users);
    let app = routes::app(state, config.body_limit_bytes);

    let listener = TcpListener::bind(config.addr()).await?;
    tracing::info!(addr = %config.addr(), version = %config.version, "server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    if let Some(store) = pg {
        store.close().await;
    }
    tracing::info!("server stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
