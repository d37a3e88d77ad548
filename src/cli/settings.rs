//! `settings`, `set` and `unset` subcommands.

use std::error::Error;
use std::path::Path;

use crate::core::config::{path_display, Config};
use crate::core::config::printing::settings_table;
use crate::core::settings::{
    InferenceSettings, SettingField, SettingValue, SettingsError,
};

/// Parses a setting name and value typed by the user.
pub fn parse_setting(field: &str, value: &str) -> Result<(SettingField, SettingValue), SettingsError> {
    let field: SettingField = field.parse()?;
    let value = SettingValue::parse_for(field, value)?;
    Ok((field, value))
}

pub fn show_settings(config: &Config, config_path: &Path) -> Result<(), Box<dyn Error>> {
    let validator = config.settings_validator()?;
    let defaults = InferenceSettings::for_profile(config.profile.unwrap_or_default());

    println!("Config file: {}", path_display(config_path));
    config.print_all();
    println!();
    println!("Inference settings (* = overridden):");
    print!("{}", settings_table(validator.settings(), &defaults));
    Ok(())
}

/// Validates the override against the stored settings, then saves it.
pub fn store_override(
    mut config: Config,
    config_path: &Path,
    field: &str,
    value: &str,
) -> Result<(SettingField, SettingValue), Box<dyn Error>> {
    let (field, value) = parse_setting(field, value)?;
    let mut validator = config.settings_validator()?;
    let updated = validator.validate_and_set(field, value)?;

    let stored = updated.get(field);
    config.settings.insert(field, stored);
    config.save_to_path(config_path)?;
    Ok((field, stored))
}

pub fn set_setting(
    config: Config,
    config_path: &Path,
    field: &str,
    value: &str,
) -> Result<(), Box<dyn Error>> {
    let (field, value) = store_override(config, config_path, field, value)?;
    println!("✅ Set {field} to: {value}");
    Ok(())
}

/// Removes an override; returns whether one was stored.
pub fn remove_override(
    mut config: Config,
    config_path: &Path,
    field: &str,
) -> Result<bool, Box<dyn Error>> {
    let field: SettingField = field.parse()?;
    if config.settings.remove(field).is_none() {
        return Ok(false);
    }
    config.save_to_path(config_path)?;
    Ok(true)
}

pub fn unset_setting(config: Config, config_path: &Path, field: &str) -> Result<(), Box<dyn Error>> {
    if remove_override(config, config_path, field)? {
        println!("✅ Unset {field}");
    } else {
        println!("{field} was not overridden");
    }
    Ok(())
}
