//! Configuration types.
//!
//! Optional subsystems (generative backend, SMTP) return `Option<Self>`
//! from `from_env()`; presence of the configuration is what selects the
//! implementation at construction time.

use std::time::Duration;

use secrecy::SecretString;

/// Generative-backend configuration. Present only when the backend is
/// enabled and a credential is set.
#[derive(Debug, Clone)]
pub struct GenerativeConfig {
    /// Chat-completions endpoint URL.
    pub endpoint: String,
    pub model: String,
    pub api_key: SecretString,
    /// Hard bound on the whole completion round trip.
    pub timeout: Duration,
}

impl GenerativeConfig {
    /// Read from environment. Returns `None` unless
    /// `TRIAGE_GENERATIVE_ENABLED` is truthy and `TRIAGE_API_KEY` is set;
    /// the composed generator then runs heuristic-only.
    pub fn from_env() -> Option<Self> {
        let enabled = std::env::var("TRIAGE_GENERATIVE_ENABLED")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        if !enabled {
            return None;
        }
        let api_key = std::env::var("TRIAGE_API_KEY").ok()?;
        if api_key.trim().is_empty() {
            return None;
        }

        let endpoint = std::env::var("TRIAGE_GENERATIVE_ENDPOINT")
            .unwrap_or_else(|_| "https://api.openai.com/v1/chat/completions".to_string());
        let model =
            std::env::var("TRIAGE_GENERATIVE_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let timeout_secs: u64 = std::env::var("TRIAGE_GENERATIVE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(12);

        Some(Self {
            endpoint,
            model,
            api_key: SecretString::from(api_key),
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

/// SMTP delivery configuration.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
}

impl SmtpConfig {
    /// Read from environment. Returns `None` when `TRIAGE_SMTP_HOST` is
    /// unset; the queue then uses the log-only transport.
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("TRIAGE_SMTP_HOST").ok()?;
        Some(Self {
            host,
            port: std::env::var("TRIAGE_SMTP_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(587),
            username: std::env::var("TRIAGE_SMTP_USERNAME").unwrap_or_default(),
            password: std::env::var("TRIAGE_SMTP_PASSWORD").unwrap_or_default(),
            from_address: std::env::var("TRIAGE_SMTP_FROM")
                .unwrap_or_else(|_| "support@localhost".to_string()),
        })
    }
}

/// Delivery-worker configuration.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Retry budget per outbound message.
    pub max_retry_count: u32,
    /// Background dispatch tick.
    pub dispatch_interval: Duration,
    /// Identity used for per-message claims.
    pub worker_id: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_retry_count: 3,
            dispatch_interval: Duration::from_secs(30),
            worker_id: format!("worker-{}", uuid::Uuid::new_v4()),
        }
    }
}

impl DeliveryConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_retry_count: std::env::var("TRIAGE_MAX_RETRY_COUNT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_retry_count),
            dispatch_interval: std::env::var("TRIAGE_DISPATCH_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.dispatch_interval),
            worker_id: defaults.worker_id,
        }
    }
}

/// Top-level configuration for the triage daemon.
#[derive(Debug, Clone)]
pub struct TriageConfig {
    pub db_path: String,
    pub generative: Option<GenerativeConfig>,
    pub smtp: Option<SmtpConfig>,
    pub delivery: DeliveryConfig,
}

impl TriageConfig {
    pub fn from_env() -> Self {
        Self {
            db_path: std::env::var("TRIAGE_DB_PATH")
                .unwrap_or_else(|_| "./data/triage.db".to_string()),
            generative: GenerativeConfig::from_env(),
            smtp: SmtpConfig::from_env(),
            delivery: DeliveryConfig::from_env(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_defaults() {
        let cfg = DeliveryConfig::default();
        assert_eq!(cfg.max_retry_count, 3);
        assert_eq!(cfg.dispatch_interval, Duration::from_secs(30));
        assert!(cfg.worker_id.starts_with("worker-"));
    }

    #[test]
    fn worker_ids_are_unique() {
        assert_ne!(
            DeliveryConfig::default().worker_id,
            DeliveryConfig::default().worker_id
        );
    }
}
