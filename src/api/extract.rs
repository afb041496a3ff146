/// Request extractors for tokens, callers and client metadata
use crate::{
    api::cookies::{ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE},
    context::AppContext,
    error::AuthError,
    rbac::{self, Identity},
    session::ClientInfo,
};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use axum_extra::headers::{
    authorization::Bearer, Authorization, Cookie, HeaderMapExt, UserAgent,
};
use std::convert::Infallible;

/// Access token from `Authorization: Bearer`, falling back to the cookie
pub fn access_token(headers: &HeaderMap) -> Option<String> {
    if let Some(Authorization(bearer)) = headers.typed_get::<Authorization<Bearer>>() {
        let token = bearer.token().trim();
        if !token.is_empty() {
            return Some(token.to_string());
        }
    }

    cookie_value(headers, ACCESS_TOKEN_COOKIE)
}

/// Refresh token carried in the cookie
pub fn refresh_token_cookie(headers: &HeaderMap) -> Option<String> {
    cookie_value(headers, REFRESH_TOKEN_COOKIE)
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .typed_get::<Cookie>()
        .and_then(|cookie| cookie.get(name).map(str::to_string))
        .filter(|value| !value.is_empty())
}

/// Device and address of the caller, recorded with new sessions
pub fn client_info(headers: &HeaderMap) -> ClientInfo {
    let device_info = headers
        .typed_get::<UserAgent>()
        .map(|ua| ua.as_str().to_string());

    let ip_address = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|h| h.to_str().ok()))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    ClientInfo {
        device_info,
        ip_address,
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ClientInfo {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(client_info(&parts.headers))
    }
}

/// Authenticated caller in good standing
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub identity: Identity,
    pub access_token: String,
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let OptionalAuthContext { auth } =
            OptionalAuthContext::resolve(&parts.headers, state).await?;

        let auth = auth.ok_or_else(|| {
            AuthError::Unauthenticated("Authentication required".to_string())
        })?;
        rbac::require_auth(Some(&auth.identity))?;

        Ok(auth)
    }
}

/// Caller if one is signed in; invalid or expired tokens count as anonymous
#[derive(Debug, Clone)]
pub struct OptionalAuthContext {
    pub auth: Option<AuthContext>,
}

impl OptionalAuthContext {
    async fn resolve(headers: &HeaderMap, state: &AppContext) -> Result<Self, AuthError> {
        let Some(token) = access_token(headers) else {
            return Ok(Self { auth: None });
        };

        let auth = state
            .auth
            .authenticate(&token)
            .await?
            .map(|identity| AuthContext {
                identity,
                access_token: token,
            });

        Ok(Self { auth })
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.auth.as_ref().map(|auth| &auth.identity)
    }
}

#[async_trait]
impl FromRequestParts<AppContext> for OptionalAuthContext {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        Self::resolve(&parts.headers, state).await
    }
}
