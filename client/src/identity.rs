use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use rand::distributions::Alphanumeric;
use tracing::debug;

use crate::error::IdentityError;

/// Get current Unix timestamp in milliseconds
pub(crate) fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Short random suffix that keeps tokens unique within the same millisecond.
fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(Alphanumeric)
        .take(6)
        .map(char::from)
        .collect()
}

/// Characters outside `[A-Za-z0-9_-]` become `-` so the token is always
/// safe inside a URL path segment.
fn sanitize_user_id(user_id: &str) -> String {
    user_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// The identity one generation exchange runs under.
///
/// The token is minted once per session and never changes; it keys both the
/// dispatch call and the push stream, so the backend can route script events
/// back to the requester.
#[derive(Debug, Clone)]
pub struct SessionIdentity {
    user_id: String,
    token: String,
    created_at_ms: i64,
}

impl SessionIdentity {
    /// Mint a fresh session token for a signed-in user:
    /// `chat_{uid}_{unix_millis}_{suffix}`.
    pub fn mint(user_id: &str) -> Result<Self, IdentityError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(IdentityError::MissingUserId);
        }

        let created_at_ms = unix_millis();
        let token = format!(
            "chat_{}_{}_{}",
            sanitize_user_id(user_id),
            created_at_ms,
            random_suffix()
        );
        debug!("minted session token: {}", token);

        Ok(Self {
            user_id: user_id.to_string(),
            token,
            created_at_ms,
        })
    }

    /// The session token. Stable for the lifetime of this identity.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn created_at_ms(&self) -> i64 {
        self.created_at_ms
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
