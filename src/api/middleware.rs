/// Credential transport: bearer header and session cookies
use crate::{auth::TokenPair, config::AuthConfig};
use axum::http::{header::AUTHORIZATION, HeaderMap};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn cookie_value(jar: &CookieJar, name: &str) -> Option<String> {
    jar.get(name).map(|c| c.value().to_string()).filter(|v| !v.is_empty())
}

/// Access token from the Authorization header, falling back to the cookie
pub fn extract_access_token(headers: &HeaderMap) -> Option<String> {
    extract_bearer_token(headers).or_else(|| cookie_value(&CookieJar::from_headers(headers), ACCESS_TOKEN_COOKIE))
}

pub fn extract_refresh_cookie(jar: &CookieJar) -> Option<String> {
    cookie_value(jar, REFRESH_TOKEN_COOKIE)
}

fn session_cookie(name: &'static str, value: String, config: &AuthConfig) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(config.secure_cookies)
        .same_site(SameSite::Strict)
        .path("/")
        .build()
}

/// Set both session cookies
pub fn with_session_cookies(jar: CookieJar, pair: &TokenPair, config: &AuthConfig) -> CookieJar {
    jar.add(session_cookie(ACCESS_TOKEN_COOKIE, pair.access_token.clone(), config))
        .add(session_cookie(REFRESH_TOKEN_COOKIE, pair.refresh_token.clone(), config))
}

/// Expire both session cookies
pub fn without_session_cookies(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(ACCESS_TOKEN_COOKIE).path("/"))
        .remove(Cookie::build(REFRESH_TOKEN_COOKIE).path("/"))
}
