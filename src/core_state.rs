//! Process-wide state shared by every request handler.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::config::ServerConfig;
use crate::crypto::{generate_token, hash_password, CryptoError, JwtSigner};
use crate::db::{self, DatabaseError};
use crate::intelligence::ollama::{LlmClient, OllamaClient};
use crate::intelligence::{IntelligenceError, RecommendationEngine};
use crate::notify::{HttpMailer, LogMailer, Mailer, Notifier, NotifyError};

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("LLM client error: {0}")]
    Intelligence(#[from] IntelligenceError),
    #[error("Mailer error: {0}")]
    Notify(#[from] NotifyError),
}

pub struct CoreState {
    db_path: PathBuf,
    password_iterations: u32,
    /// Verified against when a login names no account, so both failures
    /// cost one full key derivation.
    dummy_password_hash: String,
    signer: JwtSigner,
    engine: RecommendationEngine,
    notifier: Notifier,
    started_at: Instant,
}

/// Startup check only; summaries fall back to the rule text while the
/// model is missing, so a failed probe never blocks startup.
fn probe_model(client: &dyn LlmClient, model: &str) {
    match client.is_model_available(model) {
        Ok(true) => tracing::info!(model, "LLM summaries enabled"),
        Ok(false) => tracing::warn!(
            model,
            available = ?client.list_models().unwrap_or_default(),
            "LLM model not installed, using rule summaries until it is"
        ),
        Err(e) => tracing::warn!(model, error = %e, "LLM server unreachable, using rule summaries until it is"),
    }
}

impl CoreState {
    /// Build state from configuration: migrate the database, pick the
    /// signing secret, connect the optional LLM and mail relay.
    ///
    /// Builds a blocking HTTP client, so call this outside the async runtime.
    pub fn from_config(config: &ServerConfig) -> Result<Self, CoreError> {
        let secret = match &config.jwt_secret {
            Some(secret) => secret.clone(),
            None => {
                tracing::warn!("LABWISE_JWT_SECRET not set, using a random secret; sessions end on restart");
                generate_token()
            }
        };
        let signer = JwtSigner::new(secret, chrono::Duration::hours(config.token_ttl_hours))?;

        let engine = match &config.ollama_url {
            Some(url) => {
                let ollama = OllamaClient::new(url, config.llm_timeout_secs)?;
                probe_model(&ollama, &config.ollama_model);
                let client: Arc<dyn LlmClient> = Arc::new(ollama);
                RecommendationEngine::with_llm(
                    client,
                    &config.ollama_model,
                    Duration::from_secs(config.llm_timeout_secs),
                )
            }
            None => RecommendationEngine::rules_only(),
        };

        let mailer: Arc<dyn Mailer> = match &config.mail_endpoint {
            Some(endpoint) => Arc::new(HttpMailer::new(endpoint)?),
            None => Arc::new(LogMailer),
        };
        let notifier = Notifier::new(mailer, &config.mail_from, &config.public_url);

        Self::new(
            &config.database_path,
            config.password_iterations,
            signer,
            engine,
            notifier,
        )
    }

    /// Assemble from parts. Opens the database once so migrations run
    /// before the first request.
    pub fn new(
        db_path: &Path,
        password_iterations: u32,
        signer: JwtSigner,
        engine: RecommendationEngine,
        notifier: Notifier,
    ) -> Result<Self, CoreError> {
        let conn = db::open_database(db_path)?;
        let version = db::get_current_version(&conn);
        tracing::info!(path = %db_path.display(), schema_version = version, "Database ready");

        Ok(Self {
            db_path: db_path.to_path_buf(),
            password_iterations,
            dummy_password_hash: hash_password(&generate_token(), password_iterations),
            signer,
            engine,
            notifier,
            started_at: Instant::now(),
        })
    }

    /// Open a fresh connection. One per request.
    pub fn open_db(&self) -> Result<rusqlite::Connection, CoreError> {
        db::open_database(&self.db_path).map_err(CoreError::Database)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn password_iterations(&self) -> u32 {
        self.password_iterations
    }

    pub fn dummy_password_hash(&self) -> &str {
        &self.dummy_password_hash
    }

    pub fn signer(&self) -> &JwtSigner {
        &self.signer
    }

    pub fn engine(&self) -> &RecommendationEngine {
        &self.engine
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// State over a temporary database, rules-only engine and log mailer.
#[cfg(test)]
pub(crate) fn test_core_state() -> (Arc<CoreState>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let signer = JwtSigner::new("test-secret-test-secret", chrono::Duration::hours(24)).unwrap();
    let notifier = Notifier::new(Arc::new(LogMailer), "test@labwise.local", "http://localhost:3000");
    let core = CoreState::new(
        &dir.path().join("test.db"),
        1_000,
        signer,
        RecommendationEngine::rules_only(),
        notifier,
    )
    .unwrap();
    (Arc::new(core), dir)
}
