pub mod api;
pub mod authorization;
pub mod config;
pub mod core_state;
pub mod crypto;
pub mod db;
pub mod intelligence;
pub mod models;
pub mod notify;
pub mod reports;
pub mod review;

use std::sync::Arc;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Startup failed: {0}")]
    Core(#[from] core_state::CoreError),

    #[error("Failed to start async runtime: {0}")]
    Runtime(std::io::Error),

    #[error(transparent)]
    Server(#[from] api::ServerError),
}

/// Start the server and block until it shuts down.
pub fn run() -> Result<(), StartupError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = config::ServerConfig::from_env()?;
    // The LLM client is blocking; build and drop it outside the runtime.
    let core = Arc::new(core_state::CoreState::from_config(&config)?);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(StartupError::Runtime)?;
    let result = runtime.block_on(api::run_server(Arc::clone(&core), &config));
    runtime.shutdown_timeout(std::time::Duration::from_secs(5));

    result.map_err(StartupError::from)
}
