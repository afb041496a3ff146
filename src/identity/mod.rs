/// Identity resolution
///
/// Turns sign-up forms and Google assertions into account records: local
/// sign-up creates an unverified account and mails a verification code,
/// Google sign-in finds, links or creates a pre-verified account.
pub mod validation;

use crate::{
    account::{AccountRepository, NewAccount, SignUpRequest, DUPLICATE_ACCOUNT_MESSAGE},
    auth::{CredentialHasher, GoogleIdentity, IdTokenVerifier},
    db::models::{Account, OtpType},
    error::{AuthError, AuthResult},
    mailer::Mailer,
    otp::OtpService,
};
use std::sync::Arc;
use validator::Validate;

const MAX_USERNAME_BASE_LEN: usize = 20;
const MAX_USERNAME_ATTEMPTS: u32 = 10_000;

/// Resolves callers to accounts for sign-up and Google sign-in
#[derive(Clone)]
pub struct IdentityResolver {
    accounts: AccountRepository,
    hasher: CredentialHasher,
    otp: OtpService,
    mailer: Mailer,
    verifier: Arc<dyn IdTokenVerifier>,
    otp_ttl_minutes: i64,
    frontend_url: String,
}

impl IdentityResolver {
    pub fn new(
        accounts: AccountRepository,
        hasher: CredentialHasher,
        otp: OtpService,
        mailer: Mailer,
        verifier: Arc<dyn IdTokenVerifier>,
        otp_ttl_minutes: i64,
        frontend_url: String,
    ) -> Self {
        Self {
            accounts,
            hasher,
            otp,
            mailer,
            verifier,
            otp_ttl_minutes,
            frontend_url,
        }
    }

    /// Create an unverified local account and send its verification code
    pub async fn sign_up(&self, request: SignUpRequest) -> AuthResult<Account> {
        let request = normalize_sign_up(request);
        request.validate().map_err(validation::into_bad_input)?;

        if let Some(word) = validation::reserved_word(&request.username)
            .or_else(|| validation::reserved_word(&request.name))
        {
            return Err(AuthError::BadInput(format!(
                "Username and name cannot contain \"{}\"",
                word
            )));
        }

        if self.accounts.email_exists(&request.email).await?
            || self.accounts.username_exists(&request.username).await?
        {
            return Err(AuthError::BadInput(DUPLICATE_ACCOUNT_MESSAGE.to_string()));
        }

        let password_hash = self.hasher.hash(&request.password).await?;

        let account = self
            .accounts
            .create(NewAccount {
                email: request.email,
                username: request.username,
                name: request.name,
                avatar: request.avatar,
                google_id: None,
                password_hash: Some(password_hash),
                is_verified: false,
            })
            .await?;

        tracing::info!(account_id = %account.id, "Account created");

        let code = self
            .otp
            .generate(&account.id, OtpType::EmailVerification, self.otp_ttl_minutes)
            .await?;

        if let Err(e) = self
            .mailer
            .send_verification_code(&account.email, &account.name, &code, self.otp_ttl_minutes)
            .await
        {
            tracing::warn!(account_id = %account.id, "Failed to send verification email: {}", e);
        }

        Ok(account)
    }

    /// Verify a Google ID token and return the matching account, linking or
    /// creating one as needed. The account is always left active.
    pub async fn resolve_google(&self, id_token: &str) -> AuthResult<Account> {
        if id_token.trim().is_empty() {
            return Err(AuthError::BadInput("Google ID token is required".to_string()));
        }

        let identity = self.verifier.verify(id_token).await?;

        if let Some(account) = self.accounts.find_by_google_id(&identity.google_id).await? {
            self.accounts
                .update_google_profile(&account.id, None, identity.avatar.as_deref())
                .await?;
            return self.reload(&account.id).await;
        }

        if let Some(account) = self.accounts.find_by_email(&identity.email).await? {
            tracing::info!(account_id = %account.id, "Linking Google identity to existing account");
            self.accounts
                .link_google(&account.id, &identity.google_id, identity.avatar.as_deref())
                .await?;
            return self.reload(&account.id).await;
        }

        self.create_google_account(identity).await
    }

    async fn create_google_account(&self, identity: GoogleIdentity) -> AuthResult<Account> {
        let username = self.unique_username(&identity.name).await?;

        let account = self
            .accounts
            .create(NewAccount {
                email: identity.email,
                username,
                name: identity.name,
                avatar: identity.avatar,
                google_id: Some(identity.google_id),
                password_hash: None,
                is_verified: true,
            })
            .await?;

        tracing::info!(account_id = %account.id, "Account created from Google sign-in");

        let login_link = format!("{}/auth/login", self.frontend_url.trim_end_matches('/'));
        if let Err(e) = self
            .mailer
            .send_welcome(&account.email, &account.name, &login_link)
            .await
        {
            tracing::warn!(account_id = %account.id, "Failed to send welcome email: {}", e);
        }

        Ok(account)
    }

    /// First free username derived from `base`, suffixed with a counter
    pub async fn unique_username(&self, base: &str) -> AuthResult<String> {
        let base = username_base(base);

        if !self.accounts.username_exists(&base).await? {
            return Ok(base);
        }

        for counter in 1..=MAX_USERNAME_ATTEMPTS {
            let candidate = format!("{}{}", base, counter);
            if !self.accounts.username_exists(&candidate).await? {
                return Ok(candidate);
            }
        }

        Err(AuthError::Internal(format!(
            "No free username for base {}",
            base
        )))
    }

    async fn reload(&self, id: &str) -> AuthResult<Account> {
        self.accounts
            .find_by_id(id)
            .await?
            .ok_or_else(|| AuthError::Internal("Account disappeared during sign-in".to_string()))
    }
}

fn normalize_sign_up(request: SignUpRequest) -> SignUpRequest {
    SignUpRequest {
        email: request.email.trim().to_lowercase(),
        password: request.password,
        name: request.name.trim().to_string(),
        username: request.username.trim().to_lowercase(),
        avatar: request
            .avatar
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty()),
    }
}

/// Lowercase alphanumerics of `name`, truncated; "user" when nothing is left
fn username_base(name: &str) -> String {
    let base: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .take(MAX_USERNAME_BASE_LEN)
        .collect();

    if base.is_empty() {
        "user".to_string()
    } else {
        base
    }
}
