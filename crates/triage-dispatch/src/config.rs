//! Dispatch configuration.
//!
//! Read once from the environment at startup. The custom `Debug`
//! implementation redacts the SMS provider token.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::directory::{InMemoryDirectory, RosterError};
use crate::notifier::{
    HttpSmsGateway, LogGateway, NotifyError, RetryPolicy, SmsGateway, DEFAULT_BASE_DELAY,
    DEFAULT_MAX_RETRIES,
};
use crate::supervisor::{SmsAlerter, SupervisorAlerter, TracingAlerter};

/// Default claim deadline per attempt.
pub const DEFAULT_CLAIM_TIMEOUT: Duration = Duration::from_secs(120);

/// Coordinator and notifier settings.
#[derive(Clone)]
pub struct DispatchConfig {
    /// How long a paged technician has to accept before escalation.
    pub claim_timeout: Duration,
    /// Cap on technicians paged per dispatch. `None` means roster-bounded.
    pub max_attempts: Option<u32>,
    /// YAML roster file.
    pub roster_path: Option<PathBuf>,
    /// Phone paged on supervisor alerts.
    pub supervisor_phone: Option<String>,
    /// SMS provider endpoint. `None` selects the log gateway.
    pub sms_url: Option<Url>,
    pub sms_token: Option<String>,
    pub retry: RetryPolicy,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            claim_timeout: DEFAULT_CLAIM_TIMEOUT,
            max_attempts: None,
            roster_path: None,
            supervisor_phone: None,
            sms_url: None,
            sms_token: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl std::fmt::Debug for DispatchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchConfig")
            .field("claim_timeout", &self.claim_timeout)
            .field("max_attempts", &self.max_attempts)
            .field("roster_path", &self.roster_path)
            .field("supervisor_phone", &self.supervisor_phone)
            .field("sms_url", &self.sms_url.as_ref().map(Url::as_str))
            .field("sms_token", &self.sms_token.as_ref().map(|_| "[REDACTED]"))
            .field("retry", &self.retry)
            .finish()
    }
}

impl DispatchConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `TRIAGE_CLAIM_TIMEOUT_SECS` (default: 120)
    /// - `TRIAGE_MAX_ATTEMPTS` (default: unset, roster-bounded)
    /// - `TRIAGE_ROSTER_PATH` (default: unset, empty roster)
    /// - `TRIAGE_SUPERVISOR_PHONE` (default: unset, alerts are logged only)
    /// - `TRIAGE_SMS_URL` / `TRIAGE_SMS_TOKEN` (default: unset, log gateway)
    /// - `TRIAGE_SMS_TIMEOUT_SECS` (default: 5)
    /// - `TRIAGE_SMS_MAX_RETRIES` (default: 3)
    pub fn from_env() -> Result<Self, ConfigError> {
        let claim_timeout = Duration::from_secs(env_parse("TRIAGE_CLAIM_TIMEOUT_SECS", 120)?);
        if claim_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "TRIAGE_CLAIM_TIMEOUT_SECS".into(),
                "must be greater than zero".into(),
            ));
        }
        let max_attempts = match env_opt("TRIAGE_MAX_ATTEMPTS") {
            Some(raw) => match raw.parse::<u32>() {
                Ok(0) | Err(_) => {
                    return Err(ConfigError::Invalid(
                        "TRIAGE_MAX_ATTEMPTS".into(),
                        format!("expected a positive integer, got {raw:?}"),
                    ))
                }
                Ok(n) => Some(n),
            },
            None => None,
        };
        let sms_url = env_opt("TRIAGE_SMS_URL")
            .map(|raw| {
                Url::parse(&raw)
                    .map_err(|e| ConfigError::Invalid("TRIAGE_SMS_URL".into(), e.to_string()))
            })
            .transpose()?;

        Ok(Self {
            claim_timeout,
            max_attempts,
            roster_path: env_opt("TRIAGE_ROSTER_PATH").map(PathBuf::from),
            supervisor_phone: env_opt("TRIAGE_SUPERVISOR_PHONE"),
            sms_url,
            sms_token: env_opt("TRIAGE_SMS_TOKEN"),
            retry: RetryPolicy {
                max_retries: env_parse("TRIAGE_SMS_MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
                base_delay: DEFAULT_BASE_DELAY,
                attempt_timeout: Duration::from_secs(env_parse("TRIAGE_SMS_TIMEOUT_SECS", 5)?),
            },
        })
    }
}

impl DispatchConfig {
    /// The configured SMS gateway, or the log gateway if no URL is set.
    pub fn gateway(&self) -> Result<Arc<dyn SmsGateway>, NotifyError> {
        match &self.sms_url {
            Some(url) => Ok(Arc::new(HttpSmsGateway::new(
                url.clone(),
                self.sms_token.clone(),
                self.retry.attempt_timeout,
            )?)),
            None => {
                tracing::warn!("TRIAGE_SMS_URL not set, pages will be logged and not sent");
                Ok(Arc::new(LogGateway))
            }
        }
    }

    /// SMS alerts when a supervisor phone is set, log-only otherwise.
    pub fn alerter(&self, gateway: Arc<dyn SmsGateway>) -> Arc<dyn SupervisorAlerter> {
        match &self.supervisor_phone {
            Some(phone) => Arc::new(SmsAlerter::new(gateway, self.retry, phone.clone())),
            None => Arc::new(TracingAlerter),
        }
    }

    /// The roster at `roster_path`, or an empty directory.
    pub fn directory(&self) -> Result<InMemoryDirectory, RosterError> {
        match &self.roster_path {
            Some(path) => InMemoryDirectory::load(path),
            None => {
                tracing::warn!("TRIAGE_ROSTER_PATH not set, roster is empty");
                Ok(InMemoryDirectory::default())
            }
        }
    }
}

fn env_opt(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(var: &str, default: T) -> Result<T, ConfigError> {
    match env_opt(var) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(var.to_string(), format!("cannot parse {raw:?}"))),
        None => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = DispatchConfig::default();
        assert_eq!(cfg.claim_timeout, Duration::from_secs(120));
        assert_eq!(cfg.retry.max_retries, 3);
        assert_eq!(cfg.retry.attempt_timeout, Duration::from_secs(5));
        assert!(cfg.max_attempts.is_none());
    }

    #[test]
    fn env_parse_uses_default_when_var_absent() {
        let v: u64 = env_parse("NONEXISTENT_TRIAGE_VAR_12345", 7).unwrap();
        assert_eq!(v, 7);
    }

    #[test]
    fn env_parse_rejects_garbage() {
        std::env::set_var("TEST_TRIAGE_BAD_NUMBER", "soon");
        let result: Result<u64, _> = env_parse("TEST_TRIAGE_BAD_NUMBER", 1);
        std::env::remove_var("TEST_TRIAGE_BAD_NUMBER");
        assert!(result.is_err());
    }

    #[test]
    fn missing_roster_path_yields_empty_directory() {
        let dir = DispatchConfig::default().directory().unwrap();
        assert!(dir.is_empty());
    }

    #[test]
    fn debug_redacts_sms_token() {
        let cfg = DispatchConfig {
            sms_token: Some("sk-live-123".into()),
            ..DispatchConfig::default()
        };
        let dbg = format!("{cfg:?}");
        assert!(!dbg.contains("sk-live-123"));
        assert!(dbg.contains("[REDACTED]"));
    }
}
