/**
 * Authentication Service
 *
 * Resolves session tokens to identities for the WebSocket gateway and the
 * HTTP API. Sessions live in memory with a fixed TTL; issuing them is a
 * tooling concern (demo scripts, tests).
 */

use crate::types::{Identity, Session};
use dashmap::DashMap;
use rand::RngCore;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Something that can turn a bearer token into an identity.
pub trait IdentityResolver: Send + Sync {
    fn verify(&self, token: &str) -> Result<Identity, AuthError>;
}

/// In-memory session store.
#[derive(Clone)]
pub struct AuthService {
    /// Active sessions (session_token -> Session)
    sessions: Arc<DashMap<String, Session>>,
    ttl: Duration,
    /// Periodic expiry sweep
    sweeper: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl AuthService {
    /// Create a new auth service issuing sessions valid for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            ttl,
            sweeper: Arc::new(Mutex::new(None)),
        }
    }

    /// Drop expired sessions every `period`. A second call while running is a no-op.
    pub fn start_cleanup(&self, period: Duration) {
        let mut sweeper = self.sweeper.lock().unwrap();
        if sweeper.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let service = self.clone();
        *sweeper = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                service.cleanup_expired();
            }
        }));
        debug!("Session sweep every {}s", period.as_secs());
    }

    pub fn stop_cleanup(&self) {
        if let Some(handle) = self.sweeper.lock().unwrap().take() {
            handle.abort();
        }
    }

    /// Issue a session for a user.
    pub fn issue_session(&self, user_id: &str, username: &str) -> Session {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let session = Session::new(
            hex::encode(bytes),
            user_id.to_string(),
            username.to_string(),
            self.ttl.as_millis() as i64,
        );
        self.sessions.insert(session.token.clone(), session.clone());
        info!("Issued session for {}", user_id);
        session
    }

    /// Invalidate a session. Returns false if the token was unknown.
    pub fn revoke(&self, token: &str) -> bool {
        self.sessions.remove(token).is_some()
    }

    /// Drop expired sessions.
    pub fn cleanup_expired(&self) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !session.is_expired());
        let removed = before - self.sessions.len();
        if removed > 0 {
            debug!("Removed {} expired sessions", removed);
        }
        removed
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

impl IdentityResolver for AuthService {
    fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let session = self
            .sessions
            .get(token)
            .map(|s| s.clone())
            .ok_or(AuthError::SessionNotFound)?;

        if session.is_expired() {
            self.sessions.remove(token);
            return Err(AuthError::SessionExpired);
        }

        Ok(session.identity())
    }
}

/// Authentication errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing session token")]
    MissingToken,

    #[error("Session not found")]
    SessionNotFound,

    #[error("Session expired")]
    SessionExpired,
}

impl axum::response::IntoResponse for AuthError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({
            "error": self.to_string(),
            "code": "UNAUTHORIZED",
        });

        (axum::http::StatusCode::UNAUTHORIZED, axum::Json(body)).into_response()
    }
}
