//! Access-token slot with expiry hinting.
//!
//! Payloads are decoded, never verified; the backend owns signature
//! checks. Expiry parsing here only decides whether a refresh is worth
//! attempting before a request goes out. It is not an authorization
//! decision.

use std::sync::Mutex;

use base64::prelude::*;
use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ClientError;

/// Seconds before the real expiry at which a token is already treated as
/// expired, absorbing clock skew between client and backend.
const EXPIRY_LEEWAY_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub username: String,
    pub email: Option<String>,
    #[serde(rename = "type", alias = "typ")]
    pub token_type: TokenType,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn is_expired(&self) -> bool {
        self.exp - Utc::now().timestamp() <= EXPIRY_LEEWAY_SECS
    }
}

/// Decode the payload segment of a JWT-shaped string without verifying
/// the signature. Returns `None` for anything that is not three
/// dot-separated segments with a JSON payload of the expected shape.
pub fn parse_claims(token: &str) -> Option<Claims> {
    let mut parts = token.split('.');
    let (_header, payload, _signature) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let decoded = BASE64_URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claims: Claims = serde_json::from_slice(&decoded).ok()?;

    if claims.iat - Utc::now().timestamp() > 300 {
        warn!(iat = claims.iat, "token iat is in the future, clock skew?");
    }

    Some(claims)
}

/// Holds the single access token for a session.
///
/// Reads purge anything unusable: a malformed, wrong-typed, or expired
/// token behaves exactly like an absent one.
#[derive(Debug, Default)]
pub struct TokenStore {
    token: Mutex<Option<String>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a fresh access token. Refresh-typed or undecodable tokens
    /// are rejected rather than stored.
    pub fn set(&self, token: &str) -> Result<(), ClientError> {
        match parse_claims(token) {
            Some(claims) if claims.token_type == TokenType::Access => {
                debug!(user = %claims.username, exp = claims.exp, "access token stored");
                *self.token.lock().unwrap() = Some(token.to_owned());
                Ok(())
            }
            Some(_) => {
                warn!("refused to store refresh token as access token");
                Err(ClientError::MalformedToken)
            }
            None => Err(ClientError::MalformedToken),
        }
    }

    /// The current access token, if one is present and still usable.
    pub fn get(&self) -> Option<String> {
        let mut slot = self.token.lock().unwrap();
        let token = slot.clone()?;

        match parse_claims(&token) {
            Some(claims) if claims.token_type == TokenType::Access && !claims.is_expired() => {
                Some(token)
            }
            Some(claims) if claims.token_type != TokenType::Access => {
                warn!("stored token is not an access token, purging");
                *slot = None;
                None
            }
            Some(_) => {
                debug!("access token expired, purging");
                *slot = None;
                None
            }
            None => {
                warn!("stored token is malformed, purging");
                *slot = None;
                None
            }
        }
    }

    /// Claims of the current token, for display purposes only.
    pub fn claims(&self) -> Option<Claims> {
        self.get().as_deref().and_then(parse_claims)
    }

    pub fn clear(&self) {
        *self.token.lock().unwrap() = None;
    }
}
