//! Endpoint URL construction for configured provider base URLs

use crate::core::chat_stream::WireFormat;

/// Normalize a base URL by removing trailing slashes
///
/// # Examples
///
/// ```
/// use inkstream::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("https://api.example.com/v1/"), "https://api.example.com/v1");
/// assert_eq!(normalize_base_url("http://localhost:11434///"), "http://localhost:11434");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Join a base URL and an endpoint path with exactly one slash between them
///
/// ```
/// use inkstream::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("https://api.example.com/v1/", "/chat/completions"),
///     "https://api.example.com/v1/chat/completions"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalized_base, endpoint)
}

/// Chat endpoint for a provider.
///
/// Ollama serves its native API from the server root, but users often paste
/// the OpenAI-compatible `/v1` address, so a trailing `/v1` or `/api` is
/// dropped before `api/chat` is appended.
pub fn chat_url(base_url: &str, format: WireFormat) -> String {
    match format {
        WireFormat::Sse => construct_api_url(base_url, format.chat_endpoint()),
        WireFormat::Ndjson => {
            let base = normalize_base_url(base_url);
            let root = base
                .strip_suffix("/v1")
                .or_else(|| base.strip_suffix("/api"))
                .unwrap_or(&base);
            construct_api_url(root, format.chat_endpoint())
        }
    }
}
