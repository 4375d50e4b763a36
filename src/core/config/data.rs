use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CustomProvider {
    pub id: String,
    pub display_name: String,
    pub base_url: String,
    /// "openai" (server-sent events) or "ollama" (newline-delimited JSON)
    pub mode: Option<String>,
    /// Environment variable to read the API key from
    pub api_key_env: Option<String>,
    pub default_model: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Config {
    pub default_provider: Option<String>,
    /// `tracing` filter directive used when INKSTREAM_LOG is unset
    pub log_filter: Option<String>,
    /// Default model per provider ID
    #[serde(default)]
    pub default_models: BTreeMap<String, String>,
    #[serde(default)]
    pub custom_providers: Vec<CustomProvider>,
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

impl Config {
    pub fn get_custom_provider(&self, id: &str) -> Option<&CustomProvider> {
        self.custom_providers
            .iter()
            .find(|p| p.id.eq_ignore_ascii_case(id))
    }

    pub fn add_custom_provider(&mut self, provider: CustomProvider) {
        self.remove_custom_provider(&provider.id);
        self.custom_providers.push(provider);
    }

    pub fn remove_custom_provider(&mut self, id: &str) {
        self.custom_providers
            .retain(|p| !p.id.eq_ignore_ascii_case(id));
    }

    pub fn set_default_model(&mut self, provider: String, model: String) {
        self.default_models.insert(provider.to_lowercase(), model);
    }

    pub fn unset_default_model(&mut self, provider: &str) {
        self.default_models.remove(&provider.to_lowercase());
    }

    pub fn default_model_for(&self, provider: &str) -> Option<&str> {
        self.default_models
            .get(&provider.to_lowercase())
            .map(String::as_str)
    }

    pub fn print_all(&self) {
        println!("Current configuration:");
        match &self.default_provider {
            Some(provider) => println!("  default-provider: {provider}"),
            None => println!("  default-provider: (unset)"),
        }
        match &self.log_filter {
            Some(filter) => println!("  log-filter: {filter}"),
            None => println!("  log-filter: (unset)"),
        }
        if self.default_models.is_empty() {
            println!("  default-models: (none set)");
        } else {
            println!("  default-models:");
            for (provider, model) in &self.default_models {
                println!("    {provider}: {model}");
            }
        }
        for provider in &self.custom_providers {
            println!(
                "  custom-provider: {} ({}) at {}",
                provider.id, provider.display_name, provider.base_url
            );
        }
    }
}
