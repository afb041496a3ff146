/// Auth cookie transport
///
/// Access and refresh tokens travel as a pair: both cookies are set on
/// every sign-in or refresh and both are cleared on logout.
use crate::{auth::TokenPair, config::CookieConfig};
use axum::http::{
    header::{InvalidHeaderValue, SET_COOKIE},
    HeaderMap, HeaderValue,
};
use chrono::{DateTime, Utc};

pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

/// Set-Cookie headers for both tokens, each expiring with its token
pub fn token_cookies(config: &CookieConfig, tokens: &TokenPair) -> HeaderMap {
    let now = Utc::now();
    let pair = [
        (
            ACCESS_TOKEN_COOKIE,
            tokens.access_token.as_str(),
            max_age(tokens.access_token_expires_at, now),
        ),
        (
            REFRESH_TOKEN_COOKIE,
            tokens.refresh_token.as_str(),
            max_age(tokens.refresh_token_expires_at, now),
        ),
    ];

    build(config, &pair)
}

/// Set-Cookie headers expiring both token cookies immediately
pub fn clear_token_cookies(config: &CookieConfig) -> HeaderMap {
    build(
        config,
        &[(ACCESS_TOKEN_COOKIE, "", 0), (REFRESH_TOKEN_COOKIE, "", 0)],
    )
}

fn build(config: &CookieConfig, cookies: &[(&str, &str, i64)]) -> HeaderMap {
    let values: Result<Vec<HeaderValue>, InvalidHeaderValue> = cookies
        .iter()
        .map(|(name, value, max_age)| cookie(config, name, value, *max_age))
        .collect();

    let mut headers = HeaderMap::new();
    match values {
        Ok(values) => {
            for value in values {
                headers.append(SET_COOKIE, value);
            }
        }
        // Neither cookie is sent when one of them cannot be encoded
        Err(e) => tracing::warn!("Failed to build auth cookies: {}", e),
    }
    headers
}

fn cookie(
    config: &CookieConfig,
    name: &str,
    value: &str,
    max_age: i64,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{name}={value}; Path=/; HttpOnly; SameSite=None; Max-Age={max_age}");
    if config.secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn max_age(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (expires_at - now).num_seconds().max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn pair() -> TokenPair {
        let now = Utc::now();
        TokenPair {
            access_token: "access.jwt".into(),
            refresh_token: "refresh.jwt".into(),
            access_token_expires_at: now + Duration::minutes(15),
            refresh_token_expires_at: now + Duration::days(7),
        }
    }

    #[test]
    fn test_sets_both_cookies() {
        let headers = token_cookies(&CookieConfig { secure: true }, &pair());
        let cookies: Vec<&str> = headers
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();

        assert_eq!(cookies.len(), 2);
        assert!(cookies[0].starts_with("accessToken=access.jwt;"));
        assert!(cookies[1].starts_with("refreshToken=refresh.jwt;"));
        for cookie in &cookies {
            assert!(cookie.contains("HttpOnly"));
            assert!(cookie.contains("SameSite=None"));
            assert!(cookie.ends_with("; Secure"));
        }

        let access_age: i64 = cookies[0]
            .split("Max-Age=")
            .nth(1)
            .and_then(|s| s.split(';').next())
            .unwrap()
            .parse()
            .unwrap();
        assert!(access_age > 890 && access_age <= 900);
    }

    #[test]
    fn test_clear_expires_both() {
        let headers = clear_token_cookies(&CookieConfig { secure: false });
        let cookies: Vec<&str> = headers
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();

        assert_eq!(cookies.len(), 2);
        for cookie in &cookies {
            assert!(cookie.contains("=; Path=/"));
            assert!(cookie.contains("Max-Age=0"));
            assert!(!cookie.contains("Secure"));
        }
    }

    #[test]
    fn test_max_age_never_negative() {
        let now = Utc::now();
        assert_eq!(max_age(now - Duration::minutes(1), now), 0);
    }
}
