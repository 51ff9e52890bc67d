//! Signed authentication cookie.
//!
//! The cookie value is `<urlencoded username>.<hex hmac-sha256(username)>`,
//! keyed by the `cookie-hash-key` server config variable. The key is created
//! on first use and shared by every server process using the same store.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use crate::app::{NanorssError, Result};
use crate::domain::User;
use crate::server::AppState;
use crate::store::Database;

pub const COOKIE_NAME: &str = "nanorss";
pub const COOKIE_KEY_VARIABLE: &str = "cookie-hash-key";
const COOKIE_MAX_AGE_SECS: u64 = 60 * 60 * 24 * 365;

type HmacSha256 = Hmac<Sha256>;

/// Returns the signing key, generating and persisting it if missing.
pub fn cookie_key(store: &Database) -> Result<Vec<u8>> {
    let encoded = store.get_or_create_config_variable(COOKIE_KEY_VARIABLE, || {
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        Ok(hex::encode(key))
    })?;
    hex::decode(encoded.trim())
        .map_err(|e| NanorssError::Invalid(format!("bad {}: {}", COOKIE_KEY_VARIABLE, e)))
}

fn mac(key: &[u8], username: &str) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| NanorssError::Other(format!("cookie key: {}", e)))?;
    mac.update(username.as_bytes());
    Ok(mac)
}

pub fn sign(key: &[u8], username: &str) -> Result<String> {
    let signature = mac(key, username)?.finalize().into_bytes();
    Ok(format!(
        "{}.{}",
        urlencoding::encode(username),
        hex::encode(signature)
    ))
}

/// The username carried by `value`, if the signature checks out.
pub fn verify(key: &[u8], value: &str) -> Option<String> {
    let (encoded, signature) = value.rsplit_once('.')?;
    let username = urlencoding::decode(encoded).ok()?.into_owned();
    let signature = hex::decode(signature).ok()?;
    mac(key, &username).ok()?.verify_slice(&signature).ok()?;
    Some(username)
}

/// Extracts the raw `nanorss` cookie value from the request headers.
pub fn cookie_value(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == COOKIE_NAME)
        .map(|(_, value)| value)
}

pub fn set_cookie_header(value: &str) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        COOKIE_NAME, value, COOKIE_MAX_AGE_SECS
    )
}

pub fn clear_cookie_header() -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", COOKIE_NAME)
}

/// Resolves the request's cookie to a stored user.
pub fn authenticate(store: &Database, headers: &HeaderMap) -> Result<Option<User>> {
    let Some(value) = cookie_value(headers) else {
        return Ok(None);
    };
    let key = cookie_key(store)?;
    match verify(&key, value) {
        Some(username) => store.get_user(&username),
        None => Ok(None),
    }
}

pub fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, "Bad credentials").into_response()
}

/// Puts the authenticated [`User`] into the request extensions or answers 401.
pub async fn require_user(State(ctx): State<AppState>, mut request: Request, next: Next) -> Response {
    match authenticate(&ctx.store, request.headers()) {
        Ok(Some(user)) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Ok(None) => unauthorized(),
        Err(e) => {
            tracing::error!("Authentication failed: {}", e);
            unauthorized()
        }
    }
}
