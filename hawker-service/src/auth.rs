//! Push-request authentication.
//!
//! On the managed transport, every delivery carries a signed identity token
//! whose audience is this endpoint's own URL and whose issuer is the
//! provider's accounts domain. Signing keys come from the provider's JWKS
//! endpoint and are cached in-process; an unknown key id triggers one
//! refresh before the request is rejected.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

const GOOGLE_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";
const GOOGLE_ISSUERS: [&str; 2] = ["https://accounts.google.com", "accounts.google.com"];

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("invalid identity token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
    #[error("token key {0:?} is not in the provider key set")]
    UnknownKey(String),
    #[error("failed to fetch provider keys: {0}")]
    KeyFetch(String),
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: String,
    n: String,
    e: String,
}

#[derive(Debug, Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

/// The claims we care about; signature, expiry, audience, and issuer are
/// all enforced by the validation itself.
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct IdentityClaims {
    aud: String,
    iss: String,
}

pub struct PushAuthenticator {
    audience: String,
    http: reqwest::Client,
    keys: RwLock<HashMap<String, DecodingKey>>,
}

impl PushAuthenticator {
    pub fn new(audience: impl Into<String>) -> Self {
        Self {
            audience: audience.into(),
            http: reqwest::Client::new(),
            keys: RwLock::new(HashMap::new()),
        }
    }

    /// Verifies a bearer identity token.
    ///
    /// # Errors
    ///
    /// Fails when the token is malformed, signed by an unknown key, expired,
    /// or carries the wrong audience or issuer. All failures map to 401.
    pub async fn verify(&self, token: &str) -> Result<(), AuthError> {
        let header = decode_header(token)?;
        let kid = header.kid.ok_or_else(|| AuthError::UnknownKey(String::new()))?;
        let key = self.key_for(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.audience]);
        validation.set_issuer(&GOOGLE_ISSUERS);
        decode::<IdentityClaims>(token, &key, &validation)?;
        Ok(())
    }

    async fn key_for(&self, kid: &str) -> Result<DecodingKey, AuthError> {
        if let Some(key) = self.keys.read().await.get(kid) {
            return Ok(key.clone());
        }

        debug!(kid, "signing key not cached; refreshing JWKS");
        let jwks: JwkSet = self
            .http
            .get(GOOGLE_JWKS_URL)
            .send()
            .await
            .map_err(|e| AuthError::KeyFetch(e.to_string()))?
            .json()
            .await
            .map_err(|e| AuthError::KeyFetch(e.to_string()))?;

        let mut keys = self.keys.write().await;
        keys.clear();
        for jwk in jwks.keys {
            keys.insert(jwk.kid.clone(), DecodingKey::from_rsa_components(&jwk.n, &jwk.e)?);
        }
        keys.get(kid)
            .cloned()
            .ok_or_else(|| AuthError::UnknownKey(kid.to_string()))
    }
}
