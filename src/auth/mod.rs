//! Session Authenticator: credential verification, session issuance,
//! verification, and revocation.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditKind, AuditSink};
use crate::config;
use crate::error::GatewayError;
use crate::store::{self, Store};

pub mod lockout;
pub mod session;

use lockout::LockoutTracker;
use session::{constant_time_eq, secret_digest, token_digest, Session};

/// Opaque identifier plus secret material, consumed once per attempt.
#[derive(Debug)]
pub struct Credential {
    pub identifier: String,
    pub secret: String,
}

/// The authenticated identity a valid session proves.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: Uuid,
    pub username: String,
}

#[derive(Debug, Clone)]
pub struct AuthOptions {
    pub session_ttl: chrono::Duration,
    pub lockout_window: chrono::Duration,
    pub lockout_max_attempts: u32,
}

impl Default for AuthOptions {
    fn default() -> Self {
        let security = &config::config().security;
        Self {
            session_ttl: security.session_ttl(),
            lockout_window: security.lockout_window(),
            lockout_max_attempts: security.lockout_max_attempts,
        }
    }
}

/// Session cache plus the revocation markers that keep it honest under
/// concurrent verifies.
#[derive(Default)]
struct SessionCache {
    sessions: HashMap<[u8; 32], Session>,
    /// Digests revoked while no cache entry existed. A verify that read
    /// the store before the revoke landed must not cache its stale
    /// snapshot as valid. Keyed to the revocation time so the purge can
    /// retire markers once any matching session has expired.
    revoked_digests: HashMap<[u8; 32], DateTime<Utc>>,
    /// Per-user watermark from revoke_all: sessions created at or before
    /// it are dead regardless of what the snapshot says.
    revoked_users: HashMap<Uuid, DateTime<Utc>>,
}

impl SessionCache {
    fn is_revoked(&self, digest: &[u8; 32], session: &Session) -> bool {
        self.revoked_digests.contains_key(digest)
            || self
                .revoked_users
                .get(&session.user_id)
                .is_some_and(|at| session.created_at <= *at)
    }
}

pub struct SessionAuthenticator {
    store: Arc<dyn Store>,
    audit: Arc<dyn AuditSink>,
    ttl: chrono::Duration,
    lockout: LockoutTracker,
    /// Process-wide session cache keyed by token digest, refreshed from
    /// the store on miss.
    cache: RwLock<SessionCache>,
}

impl SessionAuthenticator {
    pub fn new(store: Arc<dyn Store>, audit: Arc<dyn AuditSink>) -> Self {
        Self::with_options(store, audit, AuthOptions::default())
    }

    pub fn with_options(
        store: Arc<dyn Store>,
        audit: Arc<dyn AuditSink>,
        options: AuthOptions,
    ) -> Self {
        Self {
            store,
            audit,
            ttl: options.session_ttl,
            lockout: LockoutTracker::new(options.lockout_window, options.lockout_max_attempts),
            cache: RwLock::new(SessionCache::default()),
        }
    }

    /// Verify credentials and issue a new session. Returns the raw token
    /// (shown to the caller exactly once) alongside the session record.
    pub async fn authenticate(
        &self,
        credential: &Credential,
    ) -> Result<(String, Session), GatewayError> {
        // Locked identifiers fail fast, before any secret comparison.
        if self.lockout.is_locked(&credential.identifier).await {
            self.audit
                .append(AuditEvent::now(
                    AuditKind::LoginLockedOut,
                    &credential.identifier,
                ))
                .await;
            return Err(GatewayError::LockedOut);
        }

        let user = store::retrying("get_user", || self.store.get_user(&credential.identifier))
            .await?;

        let user = match user {
            Some(user) => user,
            None => return self.fail_attempt(&credential.identifier).await,
        };

        let supplied = secret_digest(&credential.secret);
        if !constant_time_eq(&supplied, &user.secret_digest) {
            return self.fail_attempt(&credential.identifier).await;
        }

        self.lockout.clear(&credential.identifier).await;

        let (token, session) = Session::new(user.id, user.username.clone(), self.ttl);
        store::retrying("save_session", || self.store.save_session(&session)).await?;
        self.cache
            .write()
            .await
            .sessions
            .insert(session.token_digest, session.clone());

        self.audit
            .append(
                AuditEvent::now(AuditKind::LoginSucceeded, &user.username)
                    .with_detail(user.id.to_string()),
            )
            .await;

        Ok((token, session))
    }

    /// Resolve a token to its owning identity. Unknown, revoked, and
    /// expired tokens all fail identically.
    pub async fn verify(&self, token: &str) -> Result<Identity, GatewayError> {
        let digest = token_digest(token);

        // Guard dropped before identity_if_valid, which may take the
        // write lock to evict an expired entry.
        let cached = {
            let cache = self.cache.read().await;
            if cache.revoked_digests.contains_key(&digest) {
                return Err(GatewayError::SessionInvalid);
            }
            cache.sessions.get(&digest).cloned()
        };
        if let Some(session) = cached {
            return self.identity_if_valid(session, &digest).await;
        }

        let mut session = store::retrying("get_session", || self.store.get_session(&digest))
            .await?
            .ok_or(GatewayError::SessionInvalid)?;

        if session.is_valid(Utc::now()) {
            // Re-check revocation under the write lock: a revoke that
            // landed between the store read and this insert has left a
            // marker, and the stale snapshot must not overwrite it.
            let mut cache = self.cache.write().await;
            if cache.is_revoked(&digest, &session) {
                session.revoked = true;
            }
            cache.sessions.insert(digest, session.clone());
        }
        self.identity_if_valid(session, &digest).await
    }

    async fn identity_if_valid(
        &self,
        session: Session,
        digest: &[u8; 32],
    ) -> Result<Identity, GatewayError> {
        let now = Utc::now();
        if session.is_valid(now) {
            Ok(Identity {
                user_id: session.user_id,
                username: session.username,
            })
        } else {
            // Expired entries are garbage; drop them from the cache.
            if session.expires_at <= now {
                self.cache.write().await.sessions.remove(digest);
            }
            Err(GatewayError::SessionInvalid)
        }
    }

    /// Idempotent revocation. The store is updated before the cache so a
    /// concurrent `verify` never observes a valid state after this
    /// returns.
    pub async fn revoke(&self, token: &str) -> Result<(), GatewayError> {
        let digest = token_digest(token);
        store::retrying("revoke_session", || self.store.revoke_session(&digest)).await?;

        let mut cache = self.cache.write().await;
        let subject = match cache.sessions.get_mut(&digest) {
            Some(session) => {
                session.revoked = true;
                session.username.clone()
            }
            None => "unknown-session".to_string(),
        };
        // The marker outlives the entry, so an in-flight verify holding a
        // pre-revoke snapshot cannot cache it as valid.
        cache.revoked_digests.insert(digest, Utc::now());
        drop(cache);

        self.audit
            .append(AuditEvent::now(AuditKind::SessionRevoked, subject))
            .await;
        Ok(())
    }

    /// Administrative action: revoke every live session of a user.
    pub async fn revoke_all(&self, user_id: Uuid) -> Result<u64, GatewayError> {
        let revoked =
            store::retrying("revoke_user_sessions", || self.store.revoke_user_sessions(user_id))
                .await?;

        let mut cache = self.cache.write().await;
        for session in cache.sessions.values_mut() {
            if session.user_id == user_id {
                session.revoked = true;
            }
        }
        cache.revoked_users.insert(user_id, Utc::now());
        drop(cache);

        self.audit
            .append(
                AuditEvent::now(AuditKind::SessionRevoked, user_id.to_string())
                    .with_detail(format!("revoked {} sessions", revoked)),
            )
            .await;
        Ok(revoked)
    }

    /// Garbage-collect expired sessions from the store and the cache,
    /// drop stale lockout entries, and retire revocation markers old
    /// enough that no live session can match them. Returns how many
    /// sessions the store removed.
    pub async fn purge_expired(&self) -> Result<u64, GatewayError> {
        let now = Utc::now();
        let purged = store::retrying("purge_expired_sessions", || {
            self.store.purge_expired_sessions(now)
        })
        .await?;

        let mut cache = self.cache.write().await;
        cache.sessions.retain(|_, session| session.is_valid(now));
        // A session revoked at time T expired by T + ttl at the latest,
        // so markers older than the ttl guard nothing.
        let marker_cutoff = now - self.ttl;
        cache.revoked_digests.retain(|_, at| *at > marker_cutoff);
        cache.revoked_users.retain(|_, at| *at > marker_cutoff);
        drop(cache);

        self.lockout.prune().await;
        Ok(purged)
    }

    /// Explicit teardown for shutdown: drop all cached sessions.
    pub async fn teardown(&self) {
        let mut cache = self.cache.write().await;
        cache.sessions.clear();
        cache.revoked_digests.clear();
        cache.revoked_users.clear();
    }

    async fn fail_attempt(&self, identifier: &str) -> Result<(String, Session), GatewayError> {
        self.lockout.record_failure(identifier).await;
        self.audit
            .append(AuditEvent::now(AuditKind::LoginFailed, identifier))
            .await;
        Err(GatewayError::InvalidCredential)
    }
}
