use super::*;
use crate::{
    account::RefreshTokenRequest,
    auth::GoogleIdentity,
    db,
    error::ErrorKind,
};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};

struct StubVerifier;

#[async_trait]
impl IdTokenVerifier for StubVerifier {
    async fn verify(&self, id_token: &str) -> AuthResult<GoogleIdentity> {
        match id_token.strip_prefix("google:") {
            Some(email) => Ok(GoogleIdentity {
                google_id: format!("gid-{}", email),
                email: email.to_string(),
                name: "Google User".to_string(),
                avatar: None,
            }),
            None => Err(AuthError::Unauthenticated(
                "Invalid or expired Google token".to_string(),
            )),
        }
    }
}

async fn service() -> (AuthService, SqlitePool) {
    let pool = db::create_memory_pool().await.unwrap();
    let service = AuthService::new(
        pool.clone(),
        &ServerConfig::for_tests(),
        Mailer::disabled(),
        Arc::new(StubVerifier),
    );
    (service, pool)
}

fn client() -> ClientInfo {
    ClientInfo {
        device_info: Some("test-agent".into()),
        ip_address: Some("127.0.0.1".into()),
    }
}

fn ann() -> SignUpRequest {
    SignUpRequest {
        email: "a@x.com".into(),
        password: "Abcd123!".into(),
        name: "Ann".into(),
        username: "ann1".into(),
        avatar: None,
    }
}

fn login_request(password: &str) -> LoginRequest {
    LoginRequest {
        email: "a@x.com".into(),
        password: password.into(),
    }
}

async fn latest_code(pool: &SqlitePool, otp_type: OtpType) -> String {
    sqlx::query_scalar(
        "SELECT code FROM otp_code WHERE type = ?1 AND is_used = 0 ORDER BY created_at DESC LIMIT 1",
    )
    .bind(otp_type)
    .fetch_one(pool)
    .await
    .unwrap()
}

async fn count(pool: &SqlitePool, sql: &str) -> i64 {
    sqlx::query_scalar(sql).fetch_one(pool).await.unwrap()
}

async fn verified_ann(service: &AuthService, pool: &SqlitePool) -> AuthPayload {
    service.sign_up(ann()).await.unwrap();
    let code = latest_code(pool, OtpType::EmailVerification).await;
    service
        .verify_email(
            VerifyEmailRequest {
                email: "a@x.com".into(),
                code,
            },
            &client(),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_sign_up_creates_unverified_account_and_one_code() {
    let (service, pool) = service().await;
    let response = service.sign_up(ann()).await.unwrap();

    assert!(!response.account.is_verified);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM account").await, 1);
    assert_eq!(
        count(
            &pool,
            "SELECT COUNT(*) FROM otp_code WHERE type = 'EMAIL_VERIFICATION' AND is_used = 0"
        )
        .await,
        1
    );
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM session").await, 0);
}

#[tokio::test]
async fn test_unverified_login_is_unauthenticated_without_session() {
    let (service, pool) = service().await;
    service.sign_up(ann()).await.unwrap();

    let err = service
        .login(login_request("Abcd123!"), &client())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthenticated);
    assert!(err.to_string().contains("verify your email"));
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM session").await, 0);
}

#[tokio::test]
async fn test_verify_email_signs_in() {
    let (service, pool) = service().await;
    let payload = verified_ann(&service, &pool).await;

    assert!(payload.account.is_verified);
    assert!(payload.account.last_login.is_some());
    assert_eq!(
        count(&pool, "SELECT COUNT(*) FROM session WHERE is_active = 1").await,
        1
    );

    let identity = service
        .authenticate(&payload.tokens.access_token)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(identity.email, "a@x.com");
}

#[tokio::test]
async fn test_verify_email_errors() {
    let (service, pool) = service().await;

    let err = service
        .verify_email(
            VerifyEmailRequest {
                email: "nobody@x.com".into(),
                code: "123456".into(),
            },
            &client(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    service.sign_up(ann()).await.unwrap();
    let code = latest_code(&pool, OtpType::EmailVerification).await;
    let wrong = if code == "111111" { "222222" } else { "111111" };
    let err = service
        .verify_email(
            VerifyEmailRequest {
                email: "a@x.com".into(),
                code: wrong.into(),
            },
            &client(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadInput);

    let request = VerifyEmailRequest {
        email: "a@x.com".into(),
        code: code.clone(),
    };
    service.verify_email(request.clone(), &client()).await.unwrap();
    let err = service.verify_email(request, &client()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadInput);
}

#[tokio::test]
async fn test_login_and_refresh_rotation() {
    let (service, pool) = service().await;
    verified_ann(&service, &pool).await;

    let login = service.login(login_request("Abcd123!"), &client()).await.unwrap();
    let old_refresh = login.tokens.refresh_token.clone();
    let sessions_before = count(&pool, "SELECT COUNT(*) FROM session").await;

    let refreshed = service.refresh(Some(&old_refresh)).await.unwrap();
    assert_ne!(refreshed.tokens.refresh_token, old_refresh);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM session").await, sessions_before);

    let err = service.refresh(Some(&old_refresh)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthenticated);

    assert!(service
        .authenticate(&login.tokens.access_token)
        .await
        .unwrap()
        .is_none());
    assert!(service
        .authenticate(&refreshed.tokens.access_token)
        .await
        .unwrap()
        .is_some());

    service
        .refresh(Some(&refreshed.tokens.refresh_token))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_refresh_requires_token() {
    let (service, _) = service().await;
    let request = RefreshTokenRequest::default();
    let err = service
        .refresh(request.refresh_token.as_deref())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthenticated);

    let err = service.refresh(Some("garbage")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthenticated);
}

#[tokio::test]
async fn test_refresh_refused_for_banned_account() {
    let (service, pool) = service().await;
    let payload = verified_ann(&service, &pool).await;
    service
        .accounts()
        .ban(&payload.account.id, None, Some("abuse"))
        .await
        .unwrap();

    let err = service
        .refresh(Some(&payload.tokens.refresh_token))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
}

#[tokio::test]
async fn test_lockout_after_five_failures() {
    let (service, pool) = service().await;
    verified_ann(&service, &pool).await;

    for expected in (1..=4u32).rev() {
        match service.login(login_request("wrong"), &client()).await {
            Err(AuthError::InvalidCredentials { remaining_attempts }) => {
                assert_eq!(remaining_attempts, Some(expected))
            }
            other => panic!("unexpected: {:?}", other.map(|p| p.message)),
        }
    }

    let err = service
        .login(login_request("wrong"), &client())
        .await
        .unwrap_err();
    match &err {
        AuthError::AccountLocked { locked_until, .. } => {
            let delta = *locked_until - Utc::now();
            assert!(delta > ChronoDuration::minutes(14));
            assert!(delta <= ChronoDuration::minutes(15));
        }
        other => panic!("unexpected: {:?}", other),
    }
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    // Locked accounts are refused before the password is checked
    let err = service
        .login(login_request("Abcd123!"), &client())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::AccountLocked { .. }));
}

#[tokio::test]
async fn test_locking_failure_is_delayed() {
    let pool = db::create_memory_pool().await.unwrap();
    let mut config = ServerConfig::for_tests();
    config.service.failure_delay_ms = 50;
    let service = AuthService::new(
        pool.clone(),
        &config,
        Mailer::disabled(),
        Arc::new(StubVerifier),
    );
    verified_ann(&service, &pool).await;

    for _ in 0..4 {
        service
            .login(login_request("wrong"), &client())
            .await
            .unwrap_err();
    }

    let started = std::time::Instant::now();
    let err = service
        .login(login_request("wrong"), &client())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::AccountLocked { .. }));
    assert!(started.elapsed() >= Duration::from_millis(50));
}

#[tokio::test]
async fn test_success_resets_failure_count() {
    let (service, pool) = service().await;
    verified_ann(&service, &pool).await;

    for _ in 0..4 {
        service
            .login(login_request("wrong"), &client())
            .await
            .unwrap_err();
    }
    service.login(login_request("Abcd123!"), &client()).await.unwrap();

    match service.login(login_request("wrong"), &client()).await {
        Err(AuthError::InvalidCredentials { remaining_attempts }) => {
            assert_eq!(remaining_attempts, Some(4))
        }
        other => panic!("unexpected: {:?}", other.map(|p| p.message)),
    }
}

#[tokio::test]
async fn test_unknown_email_and_wrong_password_share_message() {
    let (service, pool) = service().await;
    verified_ann(&service, &pool).await;

    let unknown = service
        .login(
            LoginRequest {
                email: "ghost@x.com".into(),
                password: "whatever".into(),
            },
            &client(),
        )
        .await
        .unwrap_err();
    let wrong = service
        .login(login_request("nope"), &client())
        .await
        .unwrap_err();

    assert_eq!(unknown.kind(), ErrorKind::Unauthenticated);
    assert_eq!(unknown.to_string(), wrong.to_string());
}

#[tokio::test]
async fn test_banned_login_is_forbidden() {
    let (service, pool) = service().await;
    let payload = verified_ann(&service, &pool).await;
    let until = Utc::now() + ChronoDuration::minutes(30);
    service
        .accounts()
        .ban(&payload.account.id, Some(until), None)
        .await
        .unwrap();

    let err = service
        .login(login_request("Abcd123!"), &client())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    let ext = err.extensions().unwrap();
    assert_eq!(ext["isPermanent"], false);
    assert_eq!(ext["minutesRemaining"], 30);
}

#[tokio::test]
async fn test_inactive_login_is_forbidden() {
    let (service, pool) = service().await;
    let payload = verified_ann(&service, &pool).await;
    service
        .accounts()
        .set_active(&payload.account.id, false)
        .await
        .unwrap();

    let err = service
        .login(login_request("Abcd123!"), &client())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
}

#[tokio::test]
async fn test_google_only_account_cannot_use_password() {
    let (service, _) = service().await;
    service
        .google_auth("google:a@x.com", &client())
        .await
        .unwrap();

    let err = service
        .login(login_request("Abcd123!"), &client())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Unauthenticated(ref m) if m.contains("Google")));
}

#[tokio::test]
async fn test_google_links_unverified_local_account() {
    let (service, pool) = service().await;
    let local = service.sign_up(ann()).await.unwrap();

    let payload = service
        .google_auth("google:a@x.com", &client())
        .await
        .unwrap();
    assert_eq!(payload.account.id, local.account.id);
    assert!(payload.account.is_verified);
    assert!(payload.account.google_linked);
    assert_eq!(
        count(&pool, "SELECT COUNT(*) FROM session WHERE is_active = 1").await,
        1
    );
}

#[tokio::test]
async fn test_logout_is_idempotent() {
    let (service, pool) = service().await;
    let payload = verified_ann(&service, &pool).await;
    let identity = service
        .authenticate(&payload.tokens.access_token)
        .await
        .unwrap()
        .unwrap();

    assert!(service
        .logout(&identity, &payload.tokens.access_token)
        .await
        .unwrap());
    assert!(!service
        .logout(&identity, &payload.tokens.access_token)
        .await
        .unwrap());
    assert_eq!(
        count(&pool, "SELECT COUNT(*) FROM session WHERE is_active = 1").await,
        0
    );
}

#[tokio::test]
async fn test_logout_all_revokes_every_session() {
    let (service, pool) = service().await;
    let first = verified_ann(&service, &pool).await;
    service.login(login_request("Abcd123!"), &client()).await.unwrap();
    service.login(login_request("Abcd123!"), &client()).await.unwrap();

    let identity = service
        .authenticate(&first.tokens.access_token)
        .await
        .unwrap()
        .unwrap();
    assert!(service.logout_all(&identity).await.unwrap());
    assert_eq!(
        count(&pool, "SELECT COUNT(*) FROM session WHERE is_active = 1").await,
        0
    );
    assert!(service.logout_all(&identity).await.unwrap());
}

#[tokio::test]
async fn test_request_otp_does_not_reveal_accounts() {
    let (service, pool) = service().await;
    verified_ann(&service, &pool).await;

    let unknown = service
        .request_otp(RequestOtpRequest {
            email: "ghost@x.com".into(),
            otp_type: OtpType::PasswordReset,
        })
        .await
        .unwrap();
    let known = service
        .request_otp(RequestOtpRequest {
            email: "a@x.com".into(),
            otp_type: OtpType::PasswordReset,
        })
        .await
        .unwrap();
    let already_verified = service
        .request_otp(RequestOtpRequest {
            email: "a@x.com".into(),
            otp_type: OtpType::EmailVerification,
        })
        .await
        .unwrap();

    assert_eq!(unknown, known);
    assert_eq!(known, already_verified);
    assert_eq!(known.expires_in_minutes, 15);
    assert_eq!(
        count(
            &pool,
            "SELECT COUNT(*) FROM otp_code WHERE type = 'PASSWORD_RESET' AND is_used = 0"
        )
        .await,
        1
    );
    assert_eq!(
        count(
            &pool,
            "SELECT COUNT(*) FROM otp_code WHERE type = 'EMAIL_VERIFICATION' AND is_used = 0"
        )
        .await,
        0
    );
}

#[tokio::test]
async fn test_reset_password_revokes_sessions() {
    let (service, pool) = service().await;
    let payload = verified_ann(&service, &pool).await;

    for _ in 0..3 {
        service
            .login(login_request("wrong"), &client())
            .await
            .unwrap_err();
    }

    service
        .request_otp(RequestOtpRequest {
            email: "a@x.com".into(),
            otp_type: OtpType::PasswordReset,
        })
        .await
        .unwrap();
    let code = latest_code(&pool, OtpType::PasswordReset).await;

    assert!(service
        .reset_password(ResetPasswordRequest {
            email: "a@x.com".into(),
            code: code.clone(),
            new_password: "Newpass9!".into(),
        })
        .await
        .unwrap());

    assert!(service
        .authenticate(&payload.tokens.access_token)
        .await
        .unwrap()
        .is_none());
    assert!(service.login(login_request("Abcd123!"), &client()).await.is_err());

    let login = service.login(login_request("Newpass9!"), &client()).await;
    assert!(login.is_ok());

    let err = service
        .reset_password(ResetPasswordRequest {
            email: "a@x.com".into(),
            code,
            new_password: "Another9!".into(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadInput);
}

#[tokio::test]
async fn test_me() {
    let (service, pool) = service().await;
    assert!(service.me(None).await.unwrap().is_none());

    let payload = verified_ann(&service, &pool).await;
    let identity = service
        .authenticate(&payload.tokens.access_token)
        .await
        .unwrap()
        .unwrap();
    let me = service.me(Some(&identity)).await.unwrap().unwrap();
    assert_eq!(me.username, "ann1");
}
