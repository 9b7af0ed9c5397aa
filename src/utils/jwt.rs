use chrono::Duration;
use jsonwebtoken::{
    DecodingKey, EncodingKey, Header, TokenData, Validation, decode, encode,
    errors::ErrorKind,
};

use crate::consts::session_const::{JWT_ISSUER, SESSION_TTL_DAYS};
use crate::errors::{Error, Result};
use crate::utils::time::time_now;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Claims {
    pub id: String,
    /// Session id, must still be live in the session store.
    pub sid: String,
    pub email: String,
    /// Unix seconds. Signed like `chrono` timestamps, so no cast is needed.
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
}

impl Claims {
    pub fn new(id: String, sid: String, email: String) -> Self {
        Self::with_ttl(id, sid, email, Duration::days(SESSION_TTL_DAYS))
    }

    pub fn with_ttl(id: String, sid: String, email: String, ttl: Duration) -> Self {
        let now = time_now();
        Self {
            id,
            sid,
            email,
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
            iss: JWT_ISSUER.to_string(),
        }
    }
}

pub fn encode_jwt(claim: &Claims, secret: &str) -> Result<String> {
    let token = encode(
        &Header::default(),
        claim,
        &EncodingKey::from_secret(secret.as_ref()),
    )?;
    Ok(token)
}

pub fn decode_jwt(token: &str, secret: &str) -> Result<TokenData<Claims>> {
    let mut validation = Validation::default();
    validation.set_issuer(&[JWT_ISSUER]);

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => Error::TokenExpired,
        _ => Error::InvalidToken,
    })
}
