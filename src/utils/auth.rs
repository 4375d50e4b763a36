//! Authentication headers for chat requests

/// Adds a bearer token when the provider needs one.
///
/// Local servers (LM Studio, Ollama) are reached without credentials, so a
/// missing key leaves the request untouched.
pub fn add_auth_headers(
    request: reqwest::RequestBuilder,
    api_key: Option<&str>,
) -> reqwest::RequestBuilder {
    match api_key {
        Some(key) if !key.is_empty() => request.header("Authorization", format!("Bearer {key}")),
        _ => request,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(api_key: Option<&str>) -> reqwest::Request {
        let client = reqwest::Client::new();
        add_auth_headers(client.post("https://example.com/v1/chat/completions"), api_key)
            .build()
            .unwrap()
    }

    #[test]
    fn bearer_header_is_set_for_keys() {
        let request = build(Some("test-key"));
        assert_eq!(
            request.headers().get("Authorization").unwrap(),
            "Bearer test-key"
        );
    }

    #[test]
    fn local_providers_send_no_authorization() {
        assert!(build(None).headers().get("Authorization").is_none());
        assert!(build(Some("")).headers().get("Authorization").is_none());
    }
}
