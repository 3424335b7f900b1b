use anyhow::{Context, Result};
use log::{info, warn};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::api::{self, AppState};
use crate::app_config::Config;
use crate::auth::{PasswordHasher, TokenService};
use crate::database::models::{NewUser, UserRole};
use crate::database::{DatabaseConnection, DatabaseStats, Repository};
use crate::inference::EmotionPredictor;

// @module: Application controller wiring configuration, storage, inference and HTTP

/// Account created by `seed`
#[derive(Debug, Clone, Copy)]
pub struct SeedAccount {
    pub username: &'static str,
    pub password: &'static str,
    pub role: UserRole,
    pub first_name: &'static str,
    pub last_name: &'static str,
    pub email: &'static str,
    pub specialty: Option<&'static str>,
}

/// Demo accounts inserted into an empty database
pub const SEED_ACCOUNTS: [SeedAccount; 3] = [
    SeedAccount {
        username: "admin",
        password: "admin123",
        role: UserRole::Admin,
        first_name: "Admin",
        last_name: "EMOTIA",
        email: "admin@emotia.com",
        specialty: None,
    },
    SeedAccount {
        username: "psicologo",
        password: "psico123",
        role: UserRole::Psychologist,
        first_name: "Luis",
        last_name: "García",
        email: "lgarcia@emotia.com",
        specialty: Some("Terapia Cognitiva"),
    },
    SeedAccount {
        username: "paciente",
        password: "paciente123",
        role: UserRole::Patient,
        first_name: "Ana",
        last_name: "Torres",
        email: "ana@emotia.com",
        specialty: None,
    },
];

/// Main application controller
pub struct Controller {
    // @field: App configuration
    config: Config,
}

impl Controller {
    /// Create a controller for a validated configuration
    pub fn with_config(config: Config) -> Result<Self> {
        config.validate().context("Configuration validation failed")?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Open (and migrate) the configured database
    pub fn open_repository(&self) -> Result<Repository> {
        let connection = match &self.config.database.path {
            Some(path) => DatabaseConnection::new(path)?,
            None => DatabaseConnection::new_default()?,
        };
        info!("Using database at {}", connection.path().display());
        Ok(Repository::new(connection))
    }

    /// Token service for the configured secret, or a random one
    pub fn token_service(&self) -> TokenService {
        let auth = &self.config.auth;
        if auth.jwt_secret.trim().is_empty() {
            warn!("No JWT secret configured; using a random one, tokens will not survive a restart");
            TokenService::new(&TokenService::generate_secret(), auth.token_ttl_minutes)
        } else {
            TokenService::new(&auth.jwt_secret, auth.token_ttl_minutes)
        }
    }

    pub fn build_predictor(&self) -> Result<EmotionPredictor> {
        EmotionPredictor::from_config(&self.config.inference).context("Failed to initialize the emotion predictor")
    }

    /// Assemble the shared handler state
    pub fn build_state(&self) -> Result<AppState> {
        let repository = self.open_repository()?;
        let predictor = self.build_predictor()?;

        Ok(AppState::new(
            repository,
            self.token_service(),
            PasswordHasher::new(self.config.auth.bcrypt_cost),
            Arc::new(predictor),
            &self.config.relay,
        ))
    }

    /// Serve the API until Ctrl-C
    pub async fn serve(&self) -> Result<()> {
        let state = self.build_state()?;
        let address: SocketAddr = self
            .config
            .server
            .bind_address()
            .parse()
            .with_context(|| format!("Invalid bind address: {}", self.config.server.bind_address()))?;

        let listener = tokio::net::TcpListener::bind(address)
            .await
            .with_context(|| format!("Failed to bind {}", address))?;
        info!("EMOTIA listening on http://{}", address);

        axum::serve(listener, api::router(state))
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("HTTP server failed")?;

        info!("Server stopped");
        Ok(())
    }

    /// Create or migrate the schema and report table sizes
    pub fn init_db(&self) -> Result<DatabaseStats> {
        let repository = self.open_repository()?;
        let stats = repository.connection().stats()?;
        info!("Database ready: {}", stats);
        Ok(stats)
    }

    /// Insert the demo accounts when no user exists yet
    ///
    /// Returns the number of accounts created.
    pub async fn seed(&self) -> Result<usize> {
        let repository = self.open_repository()?;
        seed_users(&repository, PasswordHasher::new(self.config.auth.bcrypt_cost)).await
    }
}

/// Insert `SEED_ACCOUNTS` into an empty users table and assign the patient
pub async fn seed_users(repository: &Repository, hasher: PasswordHasher) -> Result<usize> {
    if repository.count_users(None, None).await? > 0 {
        info!("Users already exist, skipping seed");
        return Ok(0);
    }

    let mut psychologist_id = None;
    let mut patient_id = None;

    for account in SEED_ACCOUNTS {
        let password = account.password;
        let hash = tokio::task::spawn_blocking(move || hasher.hash(password))
            .await
            .context("Password hashing task failed")??;

        let mut user = NewUser::new(account.username, hash, account.role)
            .with_email(account.email)
            .with_name(account.first_name, account.last_name);
        user.specialty = account.specialty.map(str::to_string);

        let id = repository.create_user(&user).await?;
        info!("Seeded {} '{}' (id {})", account.role, account.username, id);

        match account.role {
            UserRole::Psychologist => psychologist_id = Some(id),
            UserRole::Patient => patient_id = Some(id),
            UserRole::Admin => {}
        }
    }

    if let (Some(patient), Some(psychologist)) = (patient_id, psychologist_id) {
        repository.assign_patient(patient, psychologist).await?;
    }

    Ok(SEED_ACCOUNTS.len())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
