use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Length of the opaque session token in hex characters.
pub const TOKEN_LEN: usize = 64;

/// A time-bounded, revocable proof of authenticated identity.
///
/// The raw token is returned to the caller once at creation; the store
/// only ever sees its digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token_digest: [u8; 32],
    pub user_id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

impl Session {
    pub fn new(user_id: Uuid, username: String, ttl: Duration) -> (String, Self) {
        let token = generate_token();
        let now = Utc::now();
        let session = Self {
            token_digest: token_digest(&token),
            user_id,
            username,
            created_at: now,
            expires_at: now + ttl,
            revoked: false,
        };
        (token, session)
    }

    /// A session is valid iff it is not revoked and its expiry is
    /// strictly in the future.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && self.expires_at > now
    }
}

/// Generate a fixed-length unguessable token: 256 bits from two v4
/// UUIDs, rendered as 64 hex characters.
pub fn generate_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

/// SHA-256 digest of a token, used as the storage key so raw tokens
/// never reach the persistence layer.
pub fn token_digest(token: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().into()
}

/// Digest of credential secret material, matching how `UserRecord`
/// stores it.
pub fn secret_digest(secret: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.finalize().into()
}

/// Byte-wise comparison that does not short-circuit on the first
/// mismatch. Both inputs are fixed-length digests.
pub fn constant_time_eq(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
