/// Authentication orchestrator
///
/// Composes the hasher, token service, session store, lockout guard, ban
/// evaluator, OTP service and identity resolver into the public auth
/// operations. Step order inside each operation is fixed: ban and lock
/// checks run after the account lookup and before any password work.
use crate::{
    account::{
        AccountRepository, AccountView, AuthPayload, LoginRequest, OtpRequestResponse,
        RequestOtpRequest, ResetPasswordRequest, SignUpRequest, SignUpResponse,
        VerifyEmailRequest,
    },
    auth::{CredentialHasher, IdTokenVerifier, TokenService},
    config::ServerConfig,
    db::models::{Account, OtpType},
    error::{AuthError, AuthResult},
    guard::{BanEvaluator, BruteForceGuard, LockStatus},
    identity::{validation, IdentityResolver},
    mailer::Mailer,
    metrics,
    otp::OtpService,
    rbac::Identity,
    session::{ClientInfo, SessionStore, SqliteSessionStore},
};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use validator::Validate;

const OTP_REQUEST_MESSAGE: &str = "If an account exists with this email, a code has been sent.";

/// Auth orchestrator
#[derive(Clone)]
pub struct AuthService {
    accounts: AccountRepository,
    hasher: CredentialHasher,
    tokens: TokenService,
    sessions: Arc<dyn SessionStore>,
    guard: BruteForceGuard,
    bans: BanEvaluator,
    otp: OtpService,
    identities: IdentityResolver,
    mailer: Mailer,
    failure_delay: Duration,
    otp_ttl_minutes: i64,
}

impl AuthService {
    /// Wire the orchestrator over a database pool
    pub fn new(
        db: SqlitePool,
        config: &ServerConfig,
        mailer: Mailer,
        verifier: Arc<dyn IdTokenVerifier>,
    ) -> Self {
        let accounts = AccountRepository::new(db.clone());
        let hasher = CredentialHasher::new();
        let otp = OtpService::new(db.clone());

        let identities = IdentityResolver::new(
            accounts.clone(),
            hasher,
            otp.clone(),
            mailer.clone(),
            verifier,
            config.otp.ttl_minutes,
            config.service.frontend_url.clone(),
        );

        Self {
            hasher,
            tokens: TokenService::new(config.tokens.clone()),
            sessions: Arc::new(SqliteSessionStore::new(db)),
            guard: BruteForceGuard::new(accounts.clone(), config.lockout),
            bans: BanEvaluator::new(accounts.clone()),
            otp,
            identities,
            mailer,
            failure_delay: Duration::from_millis(config.service.failure_delay_ms),
            otp_ttl_minutes: config.otp.ttl_minutes,
            accounts,
        }
    }

    pub fn accounts(&self) -> &AccountRepository {
        &self.accounts
    }

    pub fn sessions(&self) -> Arc<dyn SessionStore> {
        self.sessions.clone()
    }

    pub fn otp(&self) -> &OtpService {
        &self.otp
    }

    /// Register a local account; no session is created until verification
    pub async fn sign_up(&self, request: SignUpRequest) -> AuthResult<SignUpResponse> {
        let result = self.identities.sign_up(request).await.map(|account| SignUpResponse {
            account: account.into(),
            message: "Account created successfully. Please check your email for the verification code."
                .to_string(),
        });
        observe("sign_up", &result);
        result
    }

    pub async fn login(&self, request: LoginRequest, client: &ClientInfo) -> AuthResult<AuthPayload> {
        let result = self.login_inner(request, client).await;
        observe("login", &result);
        result
    }

    async fn login_inner(
        &self,
        request: LoginRequest,
        client: &ClientInfo,
    ) -> AuthResult<AuthPayload> {
        let email = request.email.trim().to_lowercase();
        if email.is_empty() || request.password.is_empty() {
            return Err(AuthError::BadInput(
                "Email and password are required".to_string(),
            ));
        }

        let Some(mut account) = self.accounts.find_by_email(&email).await? else {
            tracing::info!("Login failed: no account for email");
            self.failure_pause().await;
            return Err(AuthError::InvalidCredentials {
                remaining_attempts: None,
            });
        };

        self.bans.ensure_not_banned(&mut account).await?;

        if let LockStatus::Locked {
            locked_until,
            minutes_remaining,
        } = self.guard.check(&account.id).await?
        {
            tracing::info!(account_id = %account.id, "Login refused: account locked");
            return Err(AuthError::AccountLocked {
                locked_until,
                minutes_remaining,
            });
        }

        let Some(password_hash) = account.password_hash.as_deref() else {
            self.failure_pause().await;
            return Err(AuthError::Unauthenticated(
                "Please sign in with Google".to_string(),
            ));
        };

        if !self.hasher.verify(&request.password, password_hash).await {
            let outcome = self.guard.record_failure(&account.id).await?;
            tracing::info!(
                account_id = %account.id,
                remaining = outcome.remaining_attempts,
                "Login failed: wrong password"
            );

            self.failure_pause().await;

            if let Some(locked_until) = outcome.locked_until {
                return Err(AuthError::AccountLocked {
                    locked_until,
                    minutes_remaining: self.guard.policy().lockout_minutes,
                });
            }

            return Err(AuthError::InvalidCredentials {
                remaining_attempts: Some(outcome.remaining_attempts),
            });
        }

        self.guard.reset(&account.id).await?;

        if !account.is_active {
            return Err(AuthError::Forbidden("Account is inactive".to_string()));
        }

        if !account.is_verified {
            return Err(AuthError::Unauthenticated(
                "Please verify your email address before logging in. Check your email for the verification code or request a new one."
                    .to_string(),
            ));
        }

        self.start_session(account, client, "Login successful").await
    }

    /// Sign in with a Google ID token
    pub async fn google_auth(&self, id_token: &str, client: &ClientInfo) -> AuthResult<AuthPayload> {
        let result = async {
            let mut account = self.identities.resolve_google(id_token).await?;
            self.bans.ensure_not_banned(&mut account).await?;
            self.start_session(account, client, "Google sign-in successful")
                .await
        }
        .await;
        observe("google_auth", &result);
        result
    }

    /// Rotate a refresh token. The session row is rewritten in place, so the
    /// presented refresh token stops working.
    pub async fn refresh(&self, refresh_token: Option<&str>) -> AuthResult<AuthPayload> {
        let result = self.refresh_inner(refresh_token).await;
        observe("refresh", &result);
        result
    }

    async fn refresh_inner(&self, refresh_token: Option<&str>) -> AuthResult<AuthPayload> {
        let token = refresh_token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::Unauthenticated("Refresh token is required".to_string()))?;

        let claims = self.tokens.verify_refresh_or_fail(token)?;

        let session = self
            .sessions
            .find_active_by_refresh_token(&claims.sub, token)
            .await?
            .ok_or_else(|| AuthError::Unauthenticated("Session expired or invalid".to_string()))?;

        let inactive_or_banned =
            || AuthError::Forbidden("Account is inactive or banned".to_string());

        let mut account = self
            .accounts
            .find_by_id(&claims.sub)
            .await?
            .ok_or_else(inactive_or_banned)?;

        if !account.is_active || self.bans.check(&mut account).await?.is_banned {
            return Err(inactive_or_banned());
        }

        let tokens = self.tokens.issue(&account)?;
        if !self.sessions.update_tokens(&session.id, token, &tokens).await? {
            tracing::info!(session_id = %session.id, "Refresh lost a race with a concurrent rotation");
            return Err(AuthError::Unauthenticated(
                "Session expired or invalid".to_string(),
            ));
        }

        Ok(AuthPayload {
            account: account.into(),
            tokens,
            message: "Token refreshed".to_string(),
        })
    }

    /// Revoke the session behind the presented access token. False when no
    /// such active session exists.
    pub async fn logout(&self, identity: &Identity, access_token: &str) -> AuthResult<bool> {
        let result = async {
            let Some(session) = self.sessions.find_active_by_access_token(access_token).await?
            else {
                return Ok(false);
            };

            if session.user_id != identity.id {
                return Ok(false);
            }

            self.sessions.revoke(&session.id).await
        }
        .await;
        observe("logout", &result);
        result
    }

    /// Revoke every session of the caller
    pub async fn logout_all(&self, identity: &Identity) -> AuthResult<bool> {
        let result = self.sessions.revoke_all(&identity.id).await.map(|_| true);
        observe("logout_all", &result);
        result
    }

    /// Confirm an email address with its code and sign the account in
    pub async fn verify_email(
        &self,
        request: VerifyEmailRequest,
        client: &ClientInfo,
    ) -> AuthResult<AuthPayload> {
        let result = self.verify_email_inner(request, client).await;
        observe("verify_email", &result);
        result
    }

    async fn verify_email_inner(
        &self,
        request: VerifyEmailRequest,
        client: &ClientInfo,
    ) -> AuthResult<AuthPayload> {
        let request = VerifyEmailRequest {
            email: request.email.trim().to_lowercase(),
            code: request.code.trim().to_string(),
        };
        request.validate().map_err(validation::into_bad_input)?;

        let account = self
            .accounts
            .find_by_email(&request.email)
            .await?
            .ok_or_else(|| AuthError::NotFound("User not found".to_string()))?;

        if !self
            .otp
            .verify(&account.id, &request.code, OtpType::EmailVerification)
            .await?
        {
            return Err(AuthError::BadInput(
                "Invalid or expired verification code".to_string(),
            ));
        }

        if account.is_verified {
            return Err(AuthError::BadInput("Email is already verified".to_string()));
        }

        self.accounts.mark_verified(&account.id).await?;
        let account = self.reload(&account.id).await?;
        tracing::info!(account_id = %account.id, "Email verified");

        self.start_session(account, client, "Email verified successfully")
            .await
    }

    /// Issue and mail a one-time code. The response never reveals whether
    /// the email belongs to an account.
    pub async fn request_otp(&self, request: RequestOtpRequest) -> AuthResult<OtpRequestResponse> {
        let result = self.request_otp_inner(request).await;
        observe("request_otp", &result);
        result
    }

    async fn request_otp_inner(&self, request: RequestOtpRequest) -> AuthResult<OtpRequestResponse> {
        let request = RequestOtpRequest {
            email: request.email.trim().to_lowercase(),
            otp_type: request.otp_type,
        };
        request.validate().map_err(validation::into_bad_input)?;

        let response = OtpRequestResponse {
            message: OTP_REQUEST_MESSAGE.to_string(),
            expires_in_minutes: self.otp_ttl_minutes,
        };

        let Some(mut account) = self.accounts.find_by_email(&request.email).await? else {
            self.failure_pause().await;
            return Ok(response);
        };

        if self.bans.check(&mut account).await?.is_banned {
            tracing::info!(account_id = %account.id, "Code request ignored: account banned");
            return Ok(response);
        }

        let skip_reason = match request.otp_type {
            OtpType::EmailVerification if account.is_verified => Some("email already verified"),
            OtpType::PasswordReset if account.password_hash.is_none() => {
                Some("account has no password")
            }
            _ => None,
        };
        if let Some(reason) = skip_reason {
            tracing::info!(account_id = %account.id, otp_type = %request.otp_type, "Code request ignored: {}", reason);
            return Ok(response);
        }

        let code = self
            .otp
            .generate(&account.id, request.otp_type, self.otp_ttl_minutes)
            .await?;

        let sent = match request.otp_type {
            OtpType::EmailVerification => {
                self.mailer
                    .send_verification_code(&account.email, &account.name, &code, self.otp_ttl_minutes)
                    .await
            }
            OtpType::PasswordReset => {
                self.mailer
                    .send_password_reset_code(&account.email, &account.name, &code, self.otp_ttl_minutes)
                    .await
            }
            OtpType::TwoFactorAuth | OtpType::LoginVerification => {
                self.mailer
                    .send_sign_in_code(&account.email, &account.name, &code, self.otp_ttl_minutes)
                    .await
            }
        };
        if let Err(e) = sent {
            tracing::warn!(account_id = %account.id, "Failed to send one-time code: {}", e);
        }

        Ok(response)
    }

    /// Set a new password with a PASSWORD_RESET code. Clears the lockout and
    /// revokes every session of the account.
    pub async fn reset_password(&self, request: ResetPasswordRequest) -> AuthResult<bool> {
        let result = self.reset_password_inner(request).await;
        observe("reset_password", &result);
        result
    }

    async fn reset_password_inner(&self, request: ResetPasswordRequest) -> AuthResult<bool> {
        let request = ResetPasswordRequest {
            email: request.email.trim().to_lowercase(),
            code: request.code.trim().to_string(),
            new_password: request.new_password,
        };
        request.validate().map_err(validation::into_bad_input)?;

        let invalid = || AuthError::BadInput("Invalid or expired reset code".to_string());

        let Some(account) = self.accounts.find_by_email(&request.email).await? else {
            self.failure_pause().await;
            return Err(invalid());
        };

        if !self
            .otp
            .verify(&account.id, &request.code, OtpType::PasswordReset)
            .await?
        {
            return Err(invalid());
        }

        let password_hash = self.hasher.hash(&request.new_password).await?;
        self.accounts
            .update_password(&account.id, &password_hash)
            .await?;
        self.guard.reset(&account.id).await?;
        self.sessions.revoke_all(&account.id).await?;

        tracing::info!(account_id = %account.id, "Password reset");
        Ok(true)
    }

    /// Account of the current caller, None when anonymous
    pub async fn me(&self, identity: Option<&Identity>) -> AuthResult<Option<AccountView>> {
        let Some(identity) = identity else {
            return Ok(None);
        };

        Ok(self
            .accounts
            .find_by_id(&identity.id)
            .await?
            .map(AccountView::from))
    }

    /// Resolve an access token to its caller. None when the token is
    /// invalid, expired, or its session is no longer active.
    pub async fn authenticate(&self, access_token: &str) -> AuthResult<Option<Identity>> {
        let Some(claims) = self.tokens.try_verify_access(access_token) else {
            return Ok(None);
        };

        let Some(session) = self
            .sessions
            .find_active_by_access_token(access_token)
            .await?
        else {
            return Ok(None);
        };

        if session.user_id != claims.sub {
            return Ok(None);
        }

        let Some(account) = self.accounts.find_by_id(&claims.sub).await? else {
            return Ok(None);
        };

        self.sessions.touch(&session.id).await?;
        Ok(Some(Identity::from(&account)))
    }

    /// Mint tokens, persist the session and stamp the login time
    async fn start_session(
        &self,
        account: Account,
        client: &ClientInfo,
        message: &str,
    ) -> AuthResult<AuthPayload> {
        let tokens = self.tokens.issue(&account)?;
        let session = self.sessions.create(&account.id, &tokens, client).await?;
        self.accounts.update_last_login(&account.id).await?;
        tracing::info!(account_id = %account.id, session_id = %session.id, "Session started");

        let account = self.reload(&account.id).await?;
        Ok(AuthPayload {
            account: account.into(),
            tokens,
            message: message.to_string(),
        })
    }

    async fn reload(&self, id: &str) -> AuthResult<Account> {
        self.accounts
            .find_by_id(id)
            .await?
            .ok_or_else(|| AuthError::Internal(format!("Account {} disappeared", id)))
    }

    async fn failure_pause(&self) {
        if !self.failure_delay.is_zero() {
            tokio::time::sleep(self.failure_delay).await;
        }
    }
}

fn observe<T>(operation: &str, result: &AuthResult<T>) {
    match result {
        Ok(_) => metrics::record_auth_event(operation, "success"),
        Err(e) => {
            if e.kind() == crate::error::ErrorKind::Internal {
                tracing::error!(operation, "Auth operation failed: {}", e);
            }
            metrics::record_auth_event(operation, e.kind().as_str());
        }
    }
}

#[cfg(test)]
mod tests;
