use std::sync::Arc;
use std::time::Duration;

use crate::app_config::RelayConfig;
use crate::auth::{PasswordHasher, TokenService};
use crate::database::Repository;
use crate::errors::ApiError;
use crate::inference::FrameAnalyzer;
use crate::relay::{ChatRelay, PredictionRelay, RelaySettings};
use crate::session::SessionManager;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub repository: Repository,
    pub tokens: Arc<TokenService>,
    pub hasher: PasswordHasher,
    pub sessions: SessionManager,
    pub analyzer: Arc<dyn FrameAnalyzer>,
    pub predictions: PredictionRelay,
    pub chat: ChatRelay,
    /// Prediction sockets silent this long are closed
    pub idle_timeout: Duration,
    pub require_active_session: bool,
}

impl AppState {
    pub fn new(
        repository: Repository,
        tokens: TokenService,
        hasher: PasswordHasher,
        analyzer: Arc<dyn FrameAnalyzer>,
        relay: &RelayConfig,
    ) -> Self {
        Self {
            sessions: SessionManager::new(repository.clone()),
            predictions: PredictionRelay::new(analyzer.clone(), repository.clone(), RelaySettings::from(relay)),
            chat: ChatRelay::new(repository.clone()),
            repository,
            tokens: Arc::new(tokens),
            hasher,
            analyzer,
            idle_timeout: Duration::from_secs(relay.idle_timeout_secs),
            require_active_session: relay.require_active_session,
        }
    }

    /// bcrypt is slow on purpose, so it runs on the blocking pool
    pub async fn hash_password(&self, password: String) -> Result<String, ApiError> {
        let hasher = self.hasher;
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?
            .map_err(ApiError::from)
    }

    pub async fn verify_password(&self, password: String, hash: String) -> Result<bool, ApiError> {
        let hasher = self.hasher;
        tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))
    }
}
