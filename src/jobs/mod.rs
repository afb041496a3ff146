use crate::metrics;
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{error, info};

pub mod tasks;

/// Job scheduler for background tasks
pub struct JobScheduler {
    context: Arc<crate::context::AppContext>,
}

impl JobScheduler {
    pub fn new(context: Arc<crate::context::AppContext>) -> Self {
        Self { context }
    }

    /// Start all background jobs
    pub fn start(self: Arc<Self>) {
        info!("Starting background job scheduler");

        tokio::spawn(Self::expired_session_cleanup_job(Arc::clone(&self)));
        tokio::spawn(Self::otp_cleanup_job(Arc::clone(&self)));
        tokio::spawn(Self::health_check_job(Arc::clone(&self)));

        info!("Background jobs started");
    }

    /// Cleanup expired sessions (runs every hour)
    async fn expired_session_cleanup_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(3600));

        loop {
            interval.tick().await;
            info!("Running expired session cleanup");

            match tasks::cleanup_expired_sessions(&scheduler.context).await {
                Ok(count) => {
                    metrics::record_background_job("session_cleanup", "success");
                    if count > 0 {
                        info!("Cleaned up {} expired or revoked sessions", count);
                    } else {
                        info!("Session cleanup: no expired sessions found");
                    }
                }
                Err(e) => {
                    metrics::record_background_job("session_cleanup", "error");
                    error!("Failed to cleanup expired sessions: {}", e);
                }
            }
        }
    }

    /// Cleanup used or expired one-time codes (runs every hour)
    async fn otp_cleanup_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(3600));

        loop {
            interval.tick().await;
            info!("Running one-time code cleanup");

            match tasks::cleanup_otp_codes(&scheduler.context).await {
                Ok(count) => {
                    metrics::record_background_job("otp_cleanup", "success");
                    if count > 0 {
                        info!("Cleaned up {} used or expired codes", count);
                    }
                }
                Err(e) => {
                    metrics::record_background_job("otp_cleanup", "error");
                    error!("Failed to cleanup one-time codes: {}", e);
                }
            }
        }
    }

    /// Health check job (runs every 5 minutes)
    async fn health_check_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(300));

        loop {
            interval.tick().await;

            match tasks::health_check(&scheduler.context).await {
                Ok(_) => metrics::record_background_job("health_check", "success"),
                Err(e) => {
                    metrics::record_background_job("health_check", "error");
                    error!("Health check failed: {}", e);
                }
            }
        }
    }
}
