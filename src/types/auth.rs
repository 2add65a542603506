use serde::{Deserialize, Serialize};

/// Who is behind a connection or request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: String,
    pub username: String,
    /// True for connections that presented no valid token.
    #[serde(default)]
    pub guest: bool,
}

impl Identity {
    /// Anonymous identity for a connection without a valid token.
    pub fn guest() -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let short = &suffix[..8];
        Self {
            user_id: format!("guest_{}", short),
            username: format!("Guest {}", short),
            guest: true,
        }
    }
}

/// Issued session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Session token
    pub token: String,
    pub user_id: String,
    pub username: String,
    /// When session was created (ms)
    pub created_at: i64,
    /// When session expires (ms)
    pub expires_at: i64,
}

impl Session {
    /// Create a session for a user with the given token lifetime.
    pub fn new(token: String, user_id: String, username: String, ttl_ms: i64) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            token,
            user_id,
            username,
            created_at: now,
            expires_at: now + ttl_ms,
        }
    }

    pub fn is_expired(&self) -> bool {
        chrono::Utc::now().timestamp_millis() > self.expires_at
    }

    pub fn identity(&self) -> Identity {
        Identity {
            user_id: self.user_id.clone(),
            username: self.username.clone(),
            guest: false,
        }
    }
}
