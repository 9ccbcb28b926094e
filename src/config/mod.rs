use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub security: SecurityConfig,
    pub store: StoreConfig,
    pub billing: BillingConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Session lifetime from issuance to expiry.
    pub session_ttl_hours: u64,
    /// Failed attempts within the window before an identifier locks out.
    pub lockout_max_attempts: u32,
    /// Sliding lockout window length.
    pub lockout_window_secs: u64,
    /// How often expired sessions and stale lockout entries are purged.
    pub session_purge_interval_secs: u64,
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub max_connections: u32,
    /// Per-call deadline for persistence operations.
    pub call_timeout_ms: u64,
    /// Bounded retries for transient store failures.
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingConfig {
    /// Days a subscription may sit in past_due before cancellation.
    pub grace_period_days: i64,
    pub sweep_interval_secs: u64,
    pub event_queue_depth: usize,
    /// Most recent provider event ids remembered for dedup.
    pub event_dedup_capacity: usize,
    /// Features that stay available to lapsed subscriptions.
    pub degraded_features: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub enable_request_logging: bool,
    pub max_request_size_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Security overrides
        if let Ok(v) = env::var("SECURITY_SESSION_TTL_HOURS") {
            self.security.session_ttl_hours = v.parse().unwrap_or(self.security.session_ttl_hours);
        }
        if let Ok(v) = env::var("SECURITY_LOCKOUT_MAX_ATTEMPTS") {
            self.security.lockout_max_attempts = v.parse().unwrap_or(self.security.lockout_max_attempts);
        }
        if let Ok(v) = env::var("SECURITY_LOCKOUT_WINDOW_SECS") {
            self.security.lockout_window_secs = v.parse().unwrap_or(self.security.lockout_window_secs);
        }
        if let Ok(v) = env::var("SECURITY_SESSION_PURGE_INTERVAL_SECS") {
            self.security.session_purge_interval_secs =
                v.parse().unwrap_or(self.security.session_purge_interval_secs);
        }
        if let Ok(v) = env::var("SECURITY_ENABLE_CORS") {
            self.security.enable_cors = v.parse().unwrap_or(self.security.enable_cors);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }

        // Store overrides
        if let Ok(v) = env::var("STORE_MAX_CONNECTIONS") {
            self.store.max_connections = v.parse().unwrap_or(self.store.max_connections);
        }
        if let Ok(v) = env::var("STORE_CALL_TIMEOUT_MS") {
            self.store.call_timeout_ms = v.parse().unwrap_or(self.store.call_timeout_ms);
        }
        if let Ok(v) = env::var("STORE_RETRY_ATTEMPTS") {
            self.store.retry_attempts = v.parse().unwrap_or(self.store.retry_attempts);
        }
        if let Ok(v) = env::var("STORE_RETRY_BACKOFF_MS") {
            self.store.retry_backoff_ms = v.parse().unwrap_or(self.store.retry_backoff_ms);
        }

        // Billing overrides
        if let Ok(v) = env::var("BILLING_GRACE_PERIOD_DAYS") {
            self.billing.grace_period_days = v.parse().unwrap_or(self.billing.grace_period_days);
        }
        if let Ok(v) = env::var("BILLING_SWEEP_INTERVAL_SECS") {
            self.billing.sweep_interval_secs = v.parse().unwrap_or(self.billing.sweep_interval_secs);
        }
        if let Ok(v) = env::var("BILLING_EVENT_QUEUE_DEPTH") {
            self.billing.event_queue_depth = v.parse().unwrap_or(self.billing.event_queue_depth);
        }
        if let Ok(v) = env::var("BILLING_EVENT_DEDUP_CAPACITY") {
            self.billing.event_dedup_capacity =
                v.parse().unwrap_or(self.billing.event_dedup_capacity);
        }
        if let Ok(v) = env::var("BILLING_DEGRADED_FEATURES") {
            self.billing.degraded_features = v.split(',').map(|s| s.trim().to_string()).collect();
        }

        // API overrides
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }
        if let Ok(v) = env::var("API_MAX_REQUEST_SIZE_BYTES") {
            self.api.max_request_size_bytes = v.parse().unwrap_or(self.api.max_request_size_bytes);
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            security: SecurityConfig {
                session_ttl_hours: 24,
                lockout_max_attempts: 5,
                lockout_window_secs: 15 * 60,
                session_purge_interval_secs: 300,
                enable_cors: true,
                cors_origins: vec![
                    "http://localhost:3000".to_string(),
                    "http://localhost:5173".to_string(),
                ],
            },
            store: StoreConfig {
                max_connections: 10,
                call_timeout_ms: 5000,
                retry_attempts: 3,
                retry_backoff_ms: 50,
            },
            billing: BillingConfig {
                grace_period_days: 7,
                sweep_interval_secs: 60,
                event_queue_depth: 256,
                event_dedup_capacity: 1024,
                degraded_features: vec!["data-export".to_string(), "read-only-access".to_string()],
            },
            api: ApiConfig {
                enable_request_logging: true,
                max_request_size_bytes: 1024 * 1024, // 1MB
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            security: SecurityConfig {
                session_ttl_hours: 24,
                lockout_max_attempts: 5,
                lockout_window_secs: 15 * 60,
                session_purge_interval_secs: 3600,
                enable_cors: true,
                cors_origins: vec!["https://staging.example.com".to_string()],
            },
            store: StoreConfig {
                max_connections: 20,
                call_timeout_ms: 3000,
                retry_attempts: 3,
                retry_backoff_ms: 50,
            },
            billing: BillingConfig {
                grace_period_days: 7,
                sweep_interval_secs: 300,
                event_queue_depth: 1024,
                event_dedup_capacity: 8192,
                degraded_features: vec!["data-export".to_string(), "read-only-access".to_string()],
            },
            api: ApiConfig {
                enable_request_logging: true,
                max_request_size_bytes: 512 * 1024,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            security: SecurityConfig {
                session_ttl_hours: 24,
                lockout_max_attempts: 5,
                lockout_window_secs: 15 * 60,
                session_purge_interval_secs: 3600,
                enable_cors: true,
                cors_origins: vec!["https://app.example.com".to_string()],
            },
            store: StoreConfig {
                max_connections: 50,
                call_timeout_ms: 2000,
                retry_attempts: 3,
                retry_backoff_ms: 100,
            },
            billing: BillingConfig {
                grace_period_days: 7,
                sweep_interval_secs: 600,
                event_queue_depth: 4096,
                event_dedup_capacity: 16384,
                degraded_features: vec!["data-export".to_string(), "read-only-access".to_string()],
            },
            api: ApiConfig {
                enable_request_logging: false,
                max_request_size_bytes: 256 * 1024,
            },
        }
    }
}

impl SecurityConfig {
    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_ttl_hours as i64)
    }

    pub fn lockout_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.lockout_window_secs as i64)
    }
}

impl StoreConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl BillingConfig {
    pub fn grace_period(&self) -> chrono::Duration {
        chrono::Duration::days(self.grace_period_days)
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::development();
        assert_eq!(config.security.session_ttl_hours, 24);
        assert_eq!(config.security.lockout_max_attempts, 5);
        assert_eq!(config.billing.grace_period_days, 7);
        assert_eq!(config.billing.event_dedup_capacity, 1024);
    }

    #[test]
    fn test_default_production_config() {
        let config = AppConfig::production();
        assert!(!config.api.enable_request_logging);
        assert_eq!(config.store.call_timeout_ms, 2000);
    }

    #[test]
    fn test_duration_helpers() {
        let config = AppConfig::development();
        assert_eq!(config.security.session_ttl(), chrono::Duration::hours(24));
        assert_eq!(config.security.lockout_window(), chrono::Duration::minutes(15));
        assert_eq!(config.store.call_timeout(), Duration::from_millis(5000));
    }
}
