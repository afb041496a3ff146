/// Background task implementations
use crate::{context::AppContext, db, error::AuthResult};

/// Delete sessions that are revoked or past their refresh expiry
pub async fn cleanup_expired_sessions(ctx: &AppContext) -> AuthResult<u64> {
    ctx.auth.sessions().cleanup_expired().await
}

/// Delete one-time codes that are used or expired
pub async fn cleanup_otp_codes(ctx: &AppContext) -> AuthResult<u64> {
    ctx.auth.otp().cleanup().await
}

/// Health check - verify the database answers
pub async fn health_check(ctx: &AppContext) -> AuthResult<()> {
    db::test_connection(&ctx.db).await
}
