use crate::application::checkout::DEFAULT_REFERENCE_PREFIX;
use crate::application::verification::DEFAULT_VERIFICATION_LEASE_SECS;
use crate::error::{EngineError, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_GATEWAY_URL: &str = "https://api.paystack.co";
pub const DEFAULT_GATEWAY_TIMEOUT_SECS: u64 = 30;

/// Runtime settings, read from `ENROLLPAY_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub gateway_url: String,
    pub gateway_secret: String,
    pub gateway_timeout: Duration,
    /// Secret for webhook signatures; the gateway secret unless set.
    pub webhook_secret: String,
    pub reference_prefix: String,
    pub verification_lease: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            gateway_secret: String::new(),
            gateway_timeout: Duration::from_secs(DEFAULT_GATEWAY_TIMEOUT_SECS),
            webhook_secret: String::new(),
            reference_prefix: DEFAULT_REFERENCE_PREFIX.to_string(),
            verification_lease: Duration::from_secs(DEFAULT_VERIFICATION_LEASE_SECS as u64),
        }
    }
}

impl Settings {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds settings from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let gateway_secret = lookup("ENROLLPAY_GATEWAY_SECRET").unwrap_or_default();
        let webhook_secret =
            lookup("ENROLLPAY_WEBHOOK_SECRET").unwrap_or_else(|| gateway_secret.clone());

        let settings = Self {
            gateway_url: lookup("ENROLLPAY_GATEWAY_URL").unwrap_or(defaults.gateway_url),
            gateway_timeout: parse_secs(&lookup, "ENROLLPAY_GATEWAY_TIMEOUT_SECS")?
                .unwrap_or(defaults.gateway_timeout),
            reference_prefix: lookup("ENROLLPAY_REFERENCE_PREFIX")
                .unwrap_or(defaults.reference_prefix),
            verification_lease: parse_secs(&lookup, "ENROLLPAY_VERIFICATION_LEASE_SECS")?
                .unwrap_or(defaults.verification_lease),
            gateway_secret,
            webhook_secret,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// A verification lease must outlive one gateway round-trip, otherwise a
    /// slow but healthy call is reclaimed while still in flight.
    pub fn validate(&self) -> Result<()> {
        if self.verification_lease <= self.gateway_timeout {
            return Err(EngineError::ConfigError(format!(
                "verification lease ({}s) must be longer than the gateway timeout ({}s)",
                self.verification_lease.as_secs(),
                self.gateway_timeout.as_secs()
            )));
        }
        Ok(())
    }
}

fn parse_secs<F>(lookup: &F, key: &str) -> Result<Option<Duration>>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            u64::from_str(raw.trim())
                .map(Duration::from_secs)
                .map_err(|e| EngineError::ConfigError(format!("{key}={raw:?}: {e}")))
        })
        .transpose()
}
