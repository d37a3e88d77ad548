use std::time::Duration;

use tracing::warn;

use crate::api::metrics::DEFAULT_POLL_INTERVAL;
use crate::core::config::data::{Config, Environment};
use crate::core::settings::{SettingsError, SettingsValidator};
use crate::utils::url::normalize_base_url;

pub const DEFAULT_PRODUCTION_URL: &str = "https://ai.pocketjob.co.kr";
pub const DEFAULT_LOCAL_URL: &str = "http://localhost:8000";

/// Overrides the whole base URL, whatever the environment.
pub const API_URL_ENV: &str = "ASKLIAM_API_URL";
/// Selects the environment (`production` or `local`).
pub const ENVIRONMENT_ENV: &str = "ASKLIAM_ENV";

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

impl Config {
    pub fn url_for(&self, environment: Environment) -> String {
        let configured = match environment {
            Environment::Production => self.production_url.as_deref(),
            Environment::Local => self.local_url.as_deref(),
        };
        let fallback = match environment {
            Environment::Production => DEFAULT_PRODUCTION_URL,
            Environment::Local => DEFAULT_LOCAL_URL,
        };
        normalize_base_url(non_empty(configured).unwrap_or(fallback))
    }

    /// Flag, then the `ASKLIAM_ENV` value, then the config file, then
    /// production. An unparseable variable is logged and skipped.
    pub fn resolve_environment(
        &self,
        flag: Option<Environment>,
        env_value: Option<&str>,
    ) -> Environment {
        if let Some(environment) = flag {
            return environment;
        }
        if let Some(value) = non_empty(env_value) {
            match value.parse() {
                Ok(environment) => return environment,
                Err(err) => warn!(variable = ENVIRONMENT_ENV, error = %err, "ignoring environment override"),
            }
        }
        self.environment.unwrap_or_default()
    }

    /// Flag, then the `ASKLIAM_API_URL` value, then the URL of `environment`.
    pub fn resolve_base_url(
        &self,
        flag: Option<&str>,
        env_value: Option<&str>,
        environment: Environment,
    ) -> String {
        match non_empty(flag).or_else(|| non_empty(env_value)) {
            Some(url) => normalize_base_url(url),
            None => self.url_for(environment),
        }
    }

    pub fn metrics_interval(&self) -> Duration {
        match self.metrics_interval_secs {
            Some(secs) if secs > 0 => Duration::from_secs(secs),
            _ => DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn stream_idle_timeout(&self) -> Option<Duration> {
        self.stream_idle_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Profile defaults with the `[settings]` overrides applied, each one
    /// validated against its field's domain.
    pub fn settings_validator(&self) -> Result<SettingsValidator, SettingsError> {
        let mut validator = SettingsValidator::for_profile(self.profile.unwrap_or_default());
        validator.apply_partial(&self.settings)?;
        Ok(validator)
    }
}
