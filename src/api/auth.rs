/// /auth/* endpoints
use crate::{
    account::{
        AccountView, AuthPayload, GoogleAuthRequest, LoginRequest, OtpRequestResponse,
        RefreshTokenRequest, RequestOtpRequest, ResetPasswordRequest, SignUpRequest,
        SignUpResponse, SuccessResponse, VerifyEmailRequest,
    },
    api::{
        cookies,
        extract::{self, AuthContext, OptionalAuthContext},
    },
    context::AppContext,
    error::AuthResult,
    session::ClientInfo,
};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};

/// Build auth routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/auth/signup", post(sign_up))
        .route("/auth/login", post(login))
        .route("/auth/google", post(google_auth))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/auth/logout-all", post(logout_all))
        .route("/auth/verify-email", post(verify_email))
        .route("/auth/request-otp", post(request_otp))
        .route("/auth/reset-password", post(reset_password))
        .route("/auth/me", get(me))
}

/// Responds with the payload and both token cookies
fn signed_in(ctx: &AppContext, payload: AuthPayload) -> (HeaderMap, Json<AuthPayload>) {
    let headers = cookies::token_cookies(&ctx.config.cookies, &payload.tokens);
    (headers, Json(payload))
}

async fn sign_up(
    State(ctx): State<AppContext>,
    Json(req): Json<SignUpRequest>,
) -> AuthResult<(StatusCode, Json<SignUpResponse>)> {
    let response = ctx.auth.sign_up(req).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn login(
    State(ctx): State<AppContext>,
    client: ClientInfo,
    Json(req): Json<LoginRequest>,
) -> AuthResult<(HeaderMap, Json<AuthPayload>)> {
    let payload = ctx.auth.login(req, &client).await?;
    Ok(signed_in(&ctx, payload))
}

async fn google_auth(
    State(ctx): State<AppContext>,
    client: ClientInfo,
    Json(req): Json<GoogleAuthRequest>,
) -> AuthResult<(HeaderMap, Json<AuthPayload>)> {
    let payload = ctx.auth.google_auth(&req.id_token, &client).await?;
    Ok(signed_in(&ctx, payload))
}

/// Body field wins; the cookie is used when the body carries no token
async fn refresh(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    body: Option<Json<RefreshTokenRequest>>,
) -> AuthResult<(HeaderMap, Json<AuthPayload>)> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let token = req
        .refresh_token
        .filter(|t| !t.trim().is_empty())
        .or_else(|| extract::refresh_token_cookie(&headers));

    let payload = ctx.auth.refresh(token.as_deref()).await?;
    Ok(signed_in(&ctx, payload))
}

async fn logout(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> AuthResult<(HeaderMap, Json<SuccessResponse>)> {
    let success = ctx.auth.logout(&auth.identity, &auth.access_token).await?;
    Ok((
        cookies::clear_token_cookies(&ctx.config.cookies),
        Json(SuccessResponse { success }),
    ))
}

async fn logout_all(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> AuthResult<(HeaderMap, Json<SuccessResponse>)> {
    let success = ctx.auth.logout_all(&auth.identity).await?;
    Ok((
        cookies::clear_token_cookies(&ctx.config.cookies),
        Json(SuccessResponse { success }),
    ))
}

async fn verify_email(
    State(ctx): State<AppContext>,
    client: ClientInfo,
    Json(req): Json<VerifyEmailRequest>,
) -> AuthResult<(HeaderMap, Json<AuthPayload>)> {
    let payload = ctx.auth.verify_email(req, &client).await?;
    Ok(signed_in(&ctx, payload))
}

async fn request_otp(
    State(ctx): State<AppContext>,
    Json(req): Json<RequestOtpRequest>,
) -> AuthResult<Json<OtpRequestResponse>> {
    Ok(Json(ctx.auth.request_otp(req).await?))
}

async fn reset_password(
    State(ctx): State<AppContext>,
    Json(req): Json<ResetPasswordRequest>,
) -> AuthResult<Json<SuccessResponse>> {
    let success = ctx.auth.reset_password(req).await?;
    Ok(Json(SuccessResponse { success }))
}

/// Current caller, `null` when anonymous
async fn me(
    State(ctx): State<AppContext>,
    auth: OptionalAuthContext,
) -> AuthResult<Json<Option<AccountView>>> {
    Ok(Json(ctx.auth.me(auth.identity()).await?))
}
