//! Postgres-backed store implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use uuid::Uuid;

use crate::auth::session::Session;
use crate::config;

use super::models::{
    PlanTier, Subscription, SubscriptionStatus, TenantRecord, TenantStatus, UserRecord,
};
use super::{Store, StoreError};

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect using the configured pool size. `database_url` usually
    /// comes from the DATABASE_URL environment variable.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let cfg = &config::config().store;
        let pool = PgPoolOptions::new()
            .max_connections(cfg.max_connections)
            .acquire_timeout(cfg.call_timeout())
            .connect(database_url)
            .await
            .map_err(map_sqlx)?;

        tracing::info!("connected to postgres store");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_sqlx(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::RowNotFound => StoreError::NotFound("row not found".to_string()),
        other => StoreError::Transient(other.to_string()),
    }
}

fn digest_from_column(bytes: Vec<u8>, column: &str) -> Result<[u8; 32], StoreError> {
    bytes
        .try_into()
        .map_err(|_| StoreError::Transient(format!("column {} is not a 32-byte digest", column)))
}

fn row_to_subscription(row: &sqlx::postgres::PgRow) -> Result<Subscription, StoreError> {
    let tier: String = row.get("tier");
    let status: String = row.get("status");
    Ok(Subscription {
        tenant_id: row.get("tenant_id"),
        tier: PlanTier::parse(&tier)
            .ok_or_else(|| StoreError::Transient(format!("unknown plan tier: {}", tier)))?,
        status: SubscriptionStatus::parse(&status)
            .ok_or_else(|| StoreError::Transient(format!("unknown subscription status: {}", status)))?,
        renews_at: row.get("renews_at"),
        status_changed_at: row.get("status_changed_at"),
    })
}

#[async_trait]
impl Store for PostgresStore {
    async fn get_user(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT id, username, secret_digest, created_at FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        row.map(|r| {
            Ok(UserRecord {
                id: r.get("id"),
                username: r.get("username"),
                secret_digest: digest_from_column(r.get("secret_digest"), "secret_digest")?,
                created_at: r.get("created_at"),
            })
        })
        .transpose()
    }

    async fn get_tenant(&self, tenant_id: Uuid) -> Result<Option<TenantRecord>, StoreError> {
        let row = sqlx::query("SELECT id, name, status, created_at FROM tenants WHERE id = $1")
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;

        row.map(|r| {
            let status: String = r.get("status");
            Ok(TenantRecord {
                id: r.get("id"),
                name: r.get("name"),
                status: TenantStatus::parse(&status)
                    .ok_or_else(|| StoreError::Transient(format!("unknown tenant status: {}", status)))?,
                created_at: r.get("created_at"),
            })
        })
        .transpose()
    }

    async fn get_tenant_memberships(&self, user_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        let rows = sqlx::query(
            "SELECT tenant_id FROM tenant_memberships WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(rows.iter().map(|r| r.get("tenant_id")).collect())
    }

    async fn get_subscription(&self, tenant_id: Uuid) -> Result<Option<Subscription>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT tenant_id, tier, status, renews_at, status_changed_at
            FROM subscriptions
            WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        row.map(|r| row_to_subscription(&r)).transpose()
    }

    async fn save_session(&self, session: &Session) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (token_digest, user_id, username, created_at, expires_at, revoked)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(session.token_digest.as_slice())
        .bind(session.user_id)
        .bind(&session.username)
        .bind(session.created_at)
        .bind(session.expires_at)
        .bind(session.revoked)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn get_session(&self, token_digest: &[u8; 32]) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT token_digest, user_id, username, created_at, expires_at, revoked
            FROM sessions
            WHERE token_digest = $1
            "#,
        )
        .bind(token_digest.as_slice())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        row.map(|r| {
            Ok(Session {
                token_digest: digest_from_column(r.get("token_digest"), "token_digest")?,
                user_id: r.get("user_id"),
                username: r.get("username"),
                created_at: r.get("created_at"),
                expires_at: r.get("expires_at"),
                revoked: r.get("revoked"),
            })
        })
        .transpose()
    }

    async fn revoke_session(&self, token_digest: &[u8; 32]) -> Result<(), StoreError> {
        // Idempotent by construction: re-running the update is a no-op.
        sqlx::query("UPDATE sessions SET revoked = true WHERE token_digest = $1")
            .bind(token_digest.as_slice())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    async fn revoke_user_sessions(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let result =
            sqlx::query("UPDATE sessions SET revoked = true WHERE user_id = $1 AND revoked = false")
                .bind(user_id)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx)?;
        Ok(result.rows_affected())
    }

    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(result.rows_affected())
    }

    async fn update_subscription_status(
        &self,
        tenant_id: Uuid,
        from: SubscriptionStatus,
        to: SubscriptionStatus,
        at: DateTime<Utc>,
    ) -> Result<Subscription, StoreError> {
        // Compare-and-set plus history append in one transaction so no
        // partial update is ever visible.
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        let row = sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = $3, status_changed_at = $4
            WHERE tenant_id = $1 AND status = $2
            RETURNING tenant_id, tier, status, renews_at, status_changed_at
            "#,
        )
        .bind(tenant_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        let row = row.ok_or_else(|| {
            StoreError::Conflict(format!(
                "subscription for tenant {} is not in status {}",
                tenant_id,
                from.as_str()
            ))
        })?;
        let updated = row_to_subscription(&row)?;

        sqlx::query(
            r#"
            INSERT INTO subscription_transitions (tenant_id, from_status, to_status, at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(tenant_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        tx.commit().await.map_err(map_sqlx)?;
        Ok(updated)
    }

    async fn list_past_due_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Subscription>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT tenant_id, tier, status, renews_at, status_changed_at
            FROM subscriptions
            WHERE status = 'past_due' AND status_changed_at < $1
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        rows.iter().map(row_to_subscription).collect()
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }
}
