use crate::core::config::data::Config;
use crate::core::settings::{InferenceSettings, SettingField};

impl Config {
    pub fn print_all(&self) {
        print!("{}", self.describe());
    }

    /// Human-readable summary of the stored configuration.
    pub fn describe(&self) -> String {
        let mut out = String::from("Current configuration:\n");
        let or_unset = |value: Option<String>| value.unwrap_or_else(|| "(unset)".to_string());

        out.push_str(&format!(
            "  environment: {}\n",
            or_unset(self.environment.map(|e| e.to_string()))
        ));
        out.push_str(&format!("  production-url: {}\n", or_unset(self.production_url.clone())));
        out.push_str(&format!("  local-url: {}\n", or_unset(self.local_url.clone())));
        out.push_str(&format!(
            "  profile: {}\n",
            or_unset(self.profile.map(|p| format!("{p:?}").to_lowercase()))
        ));
        match &self.system_prompt {
            Some(prompt) if !prompt.is_empty() => {
                out.push_str(&format!("  system-prompt: {prompt}\n"))
            }
            _ => out.push_str("  system-prompt: (unset)\n"),
        }
        out.push_str(&format!("  metrics-interval: {}s\n", self.metrics_interval().as_secs()));
        match self.stream_idle_timeout() {
            Some(timeout) => {
                out.push_str(&format!("  stream-idle-timeout: {}s\n", timeout.as_secs()))
            }
            None => out.push_str("  stream-idle-timeout: off\n"),
        }
        if self.settings.is_empty() {
            out.push_str("  settings overrides: (none set)\n");
        } else {
            out.push_str("  settings overrides:\n");
            for (field, value) in self.settings.iter() {
                out.push_str(&format!("    {field} = {value}\n"));
            }
        }
        out
    }
}

/// One line per setting: name, current value and domain. Values that differ
/// from `defaults` are marked with `*`.
pub fn settings_table(settings: &InferenceSettings, defaults: &InferenceSettings) -> String {
    let width = SettingField::ALL
        .iter()
        .map(|field| field.name().len())
        .max()
        .unwrap_or(0);
    let mut out = String::new();
    for field in SettingField::ALL {
        let value = settings.get(field);
        let marker = if value != defaults.get(field) { "*" } else { " " };
        out.push_str(&format!(
            "{marker} {:<width$}  {:<8}  {}\n",
            field.name(),
            value.to_string(),
            field.domain()
        ));
    }
    out
}
