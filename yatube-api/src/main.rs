use crate::server::{
    AuthSettings, ServerState,
    cache::{self, PageCache},
    media::MediaStorage,
};
use serde::Deserialize;
use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use yatube_common::{
    snowflake::{ProcessId, WorkerId},
    util::PositiveDuration,
};
use yatube_db::client::{DbClient, DbError};

mod server;

#[derive(Debug, Error)]
enum InitError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
    #[error("Error setting up the database: {0}")]
    Database(#[from] DbError),
    #[error("Error binding tcp listener: {0}")]
    TcpBind(std::io::Error),
    #[error("Error serving server: {0}")]
    TcpServe(std::io::Error),
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
struct Env {
    server_address: IpAddr,
    server_port: u16,
    #[serde(default = "default_database_url")]
    database_url: String,
    #[serde(default = "default_media_root")]
    media_root: PathBuf,
    #[serde(default)]
    worker_id: WorkerId,
    #[serde(default)]
    process_id: ProcessId,
    #[serde(default = "default_index_cache_seconds")]
    index_cache_seconds: u64,
    #[serde(default = "default_index_cache_max_entries")]
    index_cache_max_entries: usize,
    /// Zero disables expiry.
    #[serde(default = "default_auth_token_lifetime_seconds")]
    auth_token_lifetime_seconds: u32,
}

fn default_database_url() -> String {
    "sqlite://yatube.db?mode=rwc".to_owned()
}

fn default_media_root() -> PathBuf {
    PathBuf::from("media")
}

fn default_index_cache_seconds() -> u64 {
    20
}

fn default_index_cache_max_entries() -> usize {
    cache::DEFAULT_MAX_ENTRIES
}

fn default_auth_token_lifetime_seconds() -> u32 {
    // Two weeks
    1_209_600
}

fn install_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "yatube_api=debug,\
                yatube_common=debug,\
                yatube_db=debug,\
                tower_http=debug,axum::rejection=trace,sqlx=warn"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn get_env() -> Result<Env, InitError> {
    if let Err(e) = dotenvy::dotenv() {
        if e.not_found() {
            debug!("No .env file found");
        } else {
            return Err(e.into());
        }
    }

    envy::from_env().map_err(InitError::from)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(%err, "Could not listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(err) => {
                tracing::error!(%err, "Could not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutting down");
}

#[tokio::main]
async fn main() -> Result<(), InitError> {
    install_tracing();
    let env = get_env()?;

    let db_client = DbClient::connect(&env.database_url, env.worker_id, env.process_id).await?;
    db_client.migrate().await?;

    let state = ServerState {
        db_client: Arc::new(db_client),
        media: Arc::new(MediaStorage::new(env.media_root)),
        index_cache: Arc::new(PageCache::new(
            Duration::from_secs(env.index_cache_seconds),
            env.index_cache_max_entries,
        )),
        auth_settings: AuthSettings {
            token_lifetime: PositiveDuration::from_seconds(env.auth_token_lifetime_seconds),
        },
    };

    let tracing_layer = TraceLayer::new_for_http();
    let app = server::routes().with_state(state).layer(tracing_layer);

    let server_address = SocketAddr::new(env.server_address, env.server_port);
    let listener = tokio::net::TcpListener::bind(server_address)
        .await
        .map_err(InitError::TcpBind)?;
    info!(%server_address, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(InitError::TcpServe)?;

    Ok(())
}
