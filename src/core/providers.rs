use crate::core::builtin_providers::{find_builtin_provider, load_builtin_providers, BuiltinProvider};
use crate::core::chat_stream::WireFormat;
use crate::core::config::{Config, CustomProvider};
use std::error::Error;
use std::fmt;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const QUICK_FIXES: &[&str] = &[
    "inkstream providers              # List known providers",
    "inkstream -p ollama say ...      # Use a local Ollama server",
    "export OPENAI_API_KEY=sk-...     # Use environment variable (defaults to OpenAI API)",
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderMetadata {
    pub id: String,
    pub display_name: String,
    pub base_url: String,
    pub wire_format: WireFormat,
    pub api_key_env: Option<String>,
    pub default_model: Option<String>,
}

impl From<BuiltinProvider> for ProviderMetadata {
    fn from(provider: BuiltinProvider) -> Self {
        Self {
            wire_format: provider.wire_format(),
            id: provider.id,
            display_name: provider.display_name,
            base_url: provider.base_url,
            api_key_env: provider.api_key_env,
            default_model: provider.default_model,
        }
    }
}

impl From<&CustomProvider> for ProviderMetadata {
    fn from(provider: &CustomProvider) -> Self {
        Self {
            id: provider.id.clone(),
            display_name: provider.display_name.clone(),
            base_url: provider.base_url.clone(),
            wire_format: WireFormat::from_mode(provider.mode.as_deref()),
            api_key_env: provider.api_key_env.clone(),
            default_model: provider.default_model.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderSession {
    pub api_key: Option<String>,
    pub base_url: String,
    pub provider_id: String,
    pub provider_display_name: String,
    pub wire_format: WireFormat,
    pub model: String,
}

#[derive(Debug)]
pub struct ProviderResolutionError {
    message: String,
    quick_fixes: &'static [&'static str],
    exit_code: i32,
}

impl ProviderResolutionError {
    pub fn missing_authentication() -> Self {
        Self::new(
            "❌ No provider selected and OPENAI_API_KEY environment variable not set\n\nPlease either:\n1. Pass a provider with -p (for example a local server: -p ollama), or\n2. Set environment variables:\n   export OPENAI_API_KEY=\"your-api-key-here\"\n   export OPENAI_BASE_URL=\"https://api.openai.com/v1\"  # Optional",
            QUICK_FIXES,
            2,
        )
    }

    pub fn unknown_provider(provider: &str) -> Self {
        Self::new(
            format!("❌ Unknown provider '{provider}'. Run 'inkstream providers' to list them."),
            QUICK_FIXES,
            2,
        )
    }

    pub fn missing_api_key(provider: &str, env_var: &str) -> Self {
        Self::new(
            format!("❌ Provider '{provider}' needs an API key in the {env_var} environment variable."),
            QUICK_FIXES,
            2,
        )
    }

    pub fn missing_model(provider: &str) -> Self {
        Self::new(
            format!(
                "❌ No model selected for provider '{provider}'. Pass -m <model> or run 'inkstream set default-model {provider} <model>'."
            ),
            &[],
            2,
        )
    }

    fn new(
        message: impl Into<String>,
        quick_fixes: &'static [&'static str],
        exit_code: i32,
    ) -> Self {
        Self {
            message: message.into(),
            quick_fixes,
            exit_code,
        }
    }

    pub fn quick_fixes(&self) -> &'static [&'static str] {
        self.quick_fixes
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }
}

impl fmt::Display for ProviderResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for ProviderResolutionError {}

/// Where API keys and endpoint overrides come from.
pub trait CredentialSource {
    fn var(&self, name: &str) -> Option<String>;
}

/// Reads credentials from the process environment.
pub struct EnvCredentials;

impl CredentialSource for EnvCredentials {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|value| !value.is_empty())
    }
}

/// Custom providers from the config shadow built-in ones with the same ID.
pub fn find_provider(config: &Config, id: &str) -> Option<ProviderMetadata> {
    if let Some(custom) = config.get_custom_provider(id) {
        return Some(custom.into());
    }
    find_builtin_provider(id).map(ProviderMetadata::from)
}

pub fn list_providers(config: &Config) -> Vec<ProviderMetadata> {
    let mut providers: Vec<ProviderMetadata> = load_builtin_providers()
        .into_iter()
        .filter(|builtin| config.get_custom_provider(&builtin.id).is_none())
        .map(ProviderMetadata::from)
        .collect();
    providers.extend(config.custom_providers.iter().map(ProviderMetadata::from));
    providers
}

pub fn resolve_session<S: CredentialSource>(
    source: &S,
    config: &Config,
    provider_override: Option<&str>,
    model_override: Option<&str>,
) -> Result<ProviderSession, ProviderResolutionError> {
    let provider_name = provider_override
        .filter(|value| !value.is_empty())
        .or(config.default_provider.as_deref());
    let model_override = model_override.filter(|value| !value.is_empty());

    let Some(provider_name) = provider_name else {
        return resolve_env_session(source, config, model_override);
    };

    let metadata = find_provider(config, provider_name)
        .ok_or_else(|| ProviderResolutionError::unknown_provider(provider_name))?;

    let api_key = match metadata.api_key_env.as_deref() {
        Some(env_var) => Some(source.var(env_var).ok_or_else(|| {
            ProviderResolutionError::missing_api_key(&metadata.id, env_var)
        })?),
        None => None,
    };

    let model = model_override
        .map(str::to_owned)
        .or_else(|| config.default_model_for(&metadata.id).map(str::to_owned))
        .or_else(|| metadata.default_model.clone())
        .ok_or_else(|| ProviderResolutionError::missing_model(&metadata.id))?;

    Ok(ProviderSession {
        api_key,
        base_url: metadata.base_url,
        provider_id: metadata.id.to_lowercase(),
        provider_display_name: metadata.display_name,
        wire_format: metadata.wire_format,
        model,
    })
}

fn resolve_env_session<S: CredentialSource>(
    source: &S,
    config: &Config,
    model_override: Option<&str>,
) -> Result<ProviderSession, ProviderResolutionError> {
    let api_key = source
        .var("OPENAI_API_KEY")
        .ok_or_else(ProviderResolutionError::missing_authentication)?;

    let base_url = source
        .var("OPENAI_BASE_URL")
        .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string());

    let (provider_id, provider_display_name) = if base_url == DEFAULT_OPENAI_BASE_URL {
        ("openai".to_string(), "OpenAI".to_string())
    } else {
        (
            "openai-compatible".to_string(),
            "OpenAI-compatible".to_string(),
        )
    };

    let model = model_override
        .map(str::to_owned)
        .or_else(|| config.default_model_for(&provider_id).map(str::to_owned))
        .or_else(|| find_provider(config, "openai").and_then(|p| p.default_model))
        .ok_or_else(|| ProviderResolutionError::missing_model(&provider_id))?;

    Ok(ProviderSession {
        api_key: Some(api_key),
        base_url,
        provider_id,
        provider_display_name,
        wire_format: WireFormat::Sse,
        model,
    })
}
