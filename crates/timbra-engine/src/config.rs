//! Engine configuration module.
//!
//! Configuration is loaded from environment variables with fallback to
//! defaults, then validated into typed settings. Timeouts live here, not as
//! constants next to the calls that use them.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Stamping provider connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Provider base URL (e.g., "https://services.provider.example").
    pub base_url: String,

    /// Account used to obtain short-lived bearer tokens.
    pub username: String,

    /// Account password.
    pub password: String,
}

/// Partner notification endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartnerSettings {
    /// Partner API base URL.
    pub base_url: String,

    /// Account for the partner token exchange.
    pub username: String,

    /// Account password.
    pub password: String,
}

/// Email relay settings for receiver delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailSettings {
    /// HTTP relay endpoint that accepts delivery requests.
    pub relay_url: String,

    /// Sender address shown to the receiver.
    pub sender: String,
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Stamping provider settings. Required.
    pub provider: ProviderSettings,

    /// Partner notification settings. Fan-out is skipped when absent.
    pub partner: Option<PartnerSettings>,

    /// Email relay settings. Delivery is skipped when absent.
    pub email: Option<EmailSettings>,

    /// Per-call timeout applied to every external HTTP call.
    pub call_timeout: Duration,

    /// Overall deadline for one stamping attempt. Rollback runs outside
    /// this budget - an expired attempt still compensates.
    pub attempt_deadline: Duration,

    /// Reconciliation queue poll interval.
    pub reconcile_poll_interval: Duration,

    /// Maximum reconciliation entries processed per pass.
    pub reconcile_batch_size: u32,
}

impl EngineConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let provider = ProviderSettings {
            base_url: require("STAMPING_PROVIDER_URL")?,
            username: require("STAMPING_PROVIDER_USER")?,
            password: require("STAMPING_PROVIDER_PASSWORD")?,
        };

        // Partner settings are all-or-nothing: a partial set is a deploy
        // mistake, not a request to skip fan-out.
        let partner = match (
            env::var("PARTNER_API_URL").ok(),
            env::var("PARTNER_API_USER").ok(),
            env::var("PARTNER_API_PASSWORD").ok(),
        ) {
            (Some(base_url), Some(username), Some(password)) => Some(PartnerSettings {
                base_url,
                username,
                password,
            }),
            (None, None, None) => None,
            _ => return Err(ConfigError::PartialPartnerConfig),
        };

        let email = env::var("EMAIL_RELAY_URL").ok().map(|relay_url| EmailSettings {
            relay_url,
            sender: env::var("EMAIL_SENDER").unwrap_or_else(|_| "facturacion@timbra.mx".to_string()),
        });

        let config = EngineConfig {
            provider,
            partner,
            email,
            call_timeout: duration_var("CALL_TIMEOUT_SECS", 10)?,
            attempt_deadline: duration_var("ATTEMPT_DEADLINE_SECS", 25)?,
            reconcile_poll_interval: duration_var("RECONCILE_POLL_INTERVAL_SECS", 30)?,
            reconcile_batch_size: env::var("RECONCILE_BATCH_SIZE")
                .unwrap_or_else(|_| "50".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("RECONCILE_BATCH_SIZE".to_string()))?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.attempt_deadline < self.call_timeout {
            return Err(ConfigError::DeadlineBelowCallTimeout);
        }
        Ok(())
    }
}

/// Reads a required environment variable.
fn require(name: &str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingRequired(name.to_string()))
}

/// Reads a seconds-valued environment variable with a default.
fn duration_var(name: &str, default_secs: u64) -> Result<Duration, ConfigError> {
    let secs: u64 = env::var(name)
        .unwrap_or_else(|_| default_secs.to_string())
        .parse()
        .map_err(|_| ConfigError::InvalidValue(name.to_string()))?;
    Ok(Duration::from_secs(secs))
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Partner settings are partial; set all of PARTNER_API_URL/USER/PASSWORD or none")]
    PartialPartnerConfig,

    #[error("ATTEMPT_DEADLINE_SECS must be at least CALL_TIMEOUT_SECS")]
    DeadlineBelowCallTimeout,
}
