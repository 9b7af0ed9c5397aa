//! Process-wide record of live sessions.
//!
//! Login populates it, logout clears it. A signed token whose session is no
//! longer here is stale and gets treated as unauthenticated. Entries past
//! their token's `exp` are swept on every login.

use std::{collections::HashMap, sync::Arc};

use chrono::Duration;
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::consts::session_const::SESSION_TTL_DAYS;
use crate::errors::{Error, Result};
use crate::utils::{
    jwt::{Claims, decode_jwt, encode_jwt},
    time::time_now,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentUser {
    pub id: String,
    pub email: String,
    #[serde(skip)]
    pub session_id: String,
}

#[derive(Debug, Clone)]
struct LiveSession {
    user: CurrentUser,
    expires_at: i64,
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    secret: Arc<str>,
    ttl: Duration,
    live: Arc<RwLock<HashMap<String, LiveSession>>>,
}

impl SessionStore {
    pub fn new(secret: &str) -> Self {
        Self::with_ttl(secret, Duration::days(SESSION_TTL_DAYS))
    }

    pub fn with_ttl(secret: &str, ttl: Duration) -> Self {
        Self {
            secret: Arc::from(secret),
            ttl,
            live: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Registers a new session and returns its signed token.
    pub async fn open(&self, user_id: &str, email: &str) -> Result<(String, CurrentUser)> {
        let user = CurrentUser {
            id: user_id.to_string(),
            email: email.to_string(),
            session_id: Uuid::new_v4().simple().to_string(),
        };
        let claims = Claims::with_ttl(
            user.id.clone(),
            user.session_id.clone(),
            user.email.clone(),
            self.ttl,
        );
        let token = encode_jwt(&claims, &self.secret)?;

        let now = time_now().timestamp();
        let mut live = self.live.write().await;
        let before = live.len();
        live.retain(|_, session| session.expires_at > now);
        if live.len() < before {
            tracing::debug!(swept = before - live.len(), "expired sessions dropped");
        }
        live.insert(
            user.session_id.clone(),
            LiveSession {
                user: user.clone(),
                expires_at: claims.exp,
            },
        );
        Ok((token, user))
    }

    /// Verifies `token` and checks that its session is still live.
    pub async fn resolve(&self, token: &str) -> Result<CurrentUser> {
        let data = decode_jwt(token, &self.secret)?;
        let sid = data.claims.sid;

        let found = self.live.read().await.get(&sid).cloned();
        match found {
            Some(session) if session.expires_at <= time_now().timestamp() => {
                self.live.write().await.remove(&sid);
                Err(Error::TokenExpired)
            }
            Some(session) if session.user.id == data.claims.id => Ok(session.user),
            _ => {
                tracing::debug!(%sid, "stale session token");
                Err(Error::InvalidToken)
            }
        }
    }

    pub async fn live_count(&self) -> usize {
        self.live.read().await.len()
    }

    pub async fn close(&self, session_id: &str) -> bool {
        self.live.write().await.remove(session_id).is_some()
    }
}
