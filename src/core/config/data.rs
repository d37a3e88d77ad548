use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::core::settings::{PartialSettings, SettingsProfile};

/// Which deployment of the generation service to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Local,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Local => "local",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "local" | "dev" | "development" => Ok(Environment::Local),
            other => Err(format!(
                "unknown environment '{other}' (expected 'production' or 'local')"
            )),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    /// Deployment used when neither a flag nor `ASKLIAM_ENV` picks one
    pub environment: Option<Environment>,
    /// Origin of the production service
    pub production_url: Option<String>,
    /// Origin of a locally running service
    pub local_url: Option<String>,
    pub system_prompt: Option<String>,
    /// Default set the `[settings]` overrides are applied on top of
    pub profile: Option<SettingsProfile>,
    pub metrics_interval_secs: Option<u64>,
    /// Fail a turn when no data arrives for this long; unset waits forever
    pub stream_idle_timeout_secs: Option<u64>,
    /// Inference setting overrides, keyed by wire name (e.g. `temperature = 0.5`)
    #[serde(default, skip_serializing_if = "PartialSettings::is_empty")]
    pub settings: PartialSettings,
}

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}
