/// Application context and dependency injection
use crate::{
    auth::verifier_from_config,
    config::ServerConfig,
    db,
    error::AuthResult,
    mailer::Mailer,
    service::AuthService,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub auth: AuthService,
    pub mailer: Mailer,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> AuthResult<Self> {
        config.validate()?;

        let db = db::create_pool(&config.storage.database_path, db::DatabaseOptions::default())
            .await?;
        db::run_migrations(&db).await?;
        db::test_connection(&db).await?;

        Self::with_pool(config, db)
    }

    /// Build the context over an existing, migrated pool
    pub fn with_pool(config: ServerConfig, db: SqlitePool) -> AuthResult<Self> {
        let mailer = Mailer::new(config.email.clone())?;
        if !mailer.is_configured() {
            tracing::warn!("SMTP_URL not set - codes and welcome mails will only be logged as skipped");
        }

        let verifier = verifier_from_config(config.google.as_ref());
        let auth = AuthService::new(db.clone(), &config, mailer.clone(), verifier);

        Ok(Self {
            config: Arc::new(config),
            db,
            auth,
            mailer,
        })
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }
}
