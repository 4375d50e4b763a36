//! Built-in provider definitions
//!
//! The list is embedded from `builtin_providers.toml` at build time.

use serde::{Deserialize, Serialize};

use crate::core::chat_stream::WireFormat;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinProvider {
    pub id: String,
    pub display_name: String,
    pub base_url: String,
    pub mode: Option<String>,
    /// Environment variable holding the API key. Local servers have none.
    pub api_key_env: Option<String>,
    pub default_model: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct BuiltinProvidersConfig {
    providers: Vec<BuiltinProvider>,
}

impl BuiltinProvider {
    pub fn wire_format(&self) -> WireFormat {
        WireFormat::from_mode(self.mode.as_deref())
    }
}

/// Load built-in providers from the embedded configuration
pub fn load_builtin_providers() -> Vec<BuiltinProvider> {
    const CONFIG_CONTENT: &str = include_str!("builtin_providers.toml");

    match toml::from_str::<BuiltinProvidersConfig>(CONFIG_CONTENT) {
        Ok(config) => config.providers,
        Err(err) => {
            tracing::error!(%err, "Embedded provider list is invalid");
            Vec::new()
        }
    }
}

/// Find a built-in provider by ID (case-insensitive)
pub fn find_builtin_provider(id: &str) -> Option<BuiltinProvider> {
    load_builtin_providers()
        .into_iter()
        .find(|p| p.id.eq_ignore_ascii_case(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_builtin_providers() {
        let providers = load_builtin_providers();
        let provider_ids: Vec<&str> = providers.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(provider_ids, vec!["openai", "openrouter", "lmstudio", "ollama"]);
    }

    #[test]
    fn test_find_builtin_provider() {
        let provider = find_builtin_provider("Ollama").expect("ollama is built in");
        assert_eq!(provider.id, "ollama");
        assert_eq!(provider.wire_format(), WireFormat::Ndjson);
        assert!(provider.api_key_env.is_none());

        let provider = find_builtin_provider("openai").expect("openai is built in");
        assert_eq!(provider.wire_format(), WireFormat::Sse);
        assert_eq!(provider.api_key_env.as_deref(), Some("OPENAI_API_KEY"));

        assert!(find_builtin_provider("nonexistent").is_none());
    }
}
