//! `set` / `unset` handling for config keys

use std::error::Error;
use std::fmt;

use tracing_subscriber::EnvFilter;

use crate::core::config::Config;
use crate::core::providers::find_provider;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    UnknownKey(String),
    UnknownProvider(String),
    MissingValue { key: &'static str, example: &'static str },
    InvalidFilter(String),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::UnknownKey(key) => write!(
                f,
                "❌ Unknown config key: {key} (expected default-provider, default-model or log-filter)"
            ),
            SettingsError::UnknownProvider(provider) => write!(
                f,
                "❌ Unknown provider '{provider}'. Run 'inkstream providers' to list them."
            ),
            SettingsError::MissingValue { key, example } => {
                write!(f, "⚠️  {key} needs more arguments.\nExample: {example}")
            }
            SettingsError::InvalidFilter(message) => write!(f, "❌ Invalid log filter: {message}"),
        }
    }
}

impl Error for SettingsError {}

/// Applies `inkstream set <key> <value...>` and returns a confirmation line.
pub fn set_value(config: &mut Config, key: &str, value: &[String]) -> Result<String, SettingsError> {
    let joined = value.join(" ");
    match key {
        "default-provider" => {
            let provider = find_provider(config, &joined)
                .ok_or_else(|| SettingsError::UnknownProvider(joined.clone()))?;
            config.default_provider = Some(provider.id.clone());
            Ok(format!("Set default-provider to: {}", provider.id))
        }
        "default-model" => {
            let Some((provider, model)) = joined.split_once(' ') else {
                return Err(SettingsError::MissingValue {
                    key: "default-model",
                    example: "inkstream set default-model openai gpt-4o",
                });
            };
            let model = model.trim();
            config.set_default_model(provider.to_string(), model.to_string());
            Ok(format!(
                "Set default-model for provider '{provider}' to: {model}"
            ))
        }
        "log-filter" => {
            EnvFilter::try_new(&joined)
                .map_err(|err| SettingsError::InvalidFilter(err.to_string()))?;
            config.log_filter = Some(joined.clone());
            Ok(format!("Set log-filter to: {joined}"))
        }
        _ => Err(SettingsError::UnknownKey(key.to_string())),
    }
}

pub fn unset_value(
    config: &mut Config,
    key: &str,
    value: Option<&str>,
) -> Result<String, SettingsError> {
    match key {
        "default-provider" => {
            config.default_provider = None;
            Ok("Unset default-provider".to_string())
        }
        "default-model" => {
            let provider = value.ok_or(SettingsError::MissingValue {
                key: "default-model",
                example: "inkstream unset default-model openai",
            })?;
            config.unset_default_model(provider);
            Ok(format!("Unset default-model for provider: {provider}"))
        }
        "log-filter" => {
            config.log_filter = None;
            Ok("Unset log-filter".to_string())
        }
        _ => Err(SettingsError::UnknownKey(key.to_string())),
    }
}
