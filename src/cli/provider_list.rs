use crate::core::config::Config;
use crate::core::providers::{list_providers as known_providers, ProviderMetadata};

pub fn list_providers(config: &Config) {
    print!(
        "{}",
        format_provider_table(&known_providers(config), config.default_provider.as_deref())
    );
}

fn format_provider_table(providers: &[ProviderMetadata], default_provider: Option<&str>) -> String {
    if providers.is_empty() {
        return "No providers configured.\n".to_string();
    }

    let rows: Vec<[String; 4]> = providers
        .iter()
        .map(|provider| {
            let id = if default_provider.is_some_and(|d| d.eq_ignore_ascii_case(&provider.id)) {
                format!("{}*", provider.id)
            } else {
                provider.id.clone()
            };
            let credentials = match &provider.api_key_env {
                Some(env_var) => format!("${env_var}"),
                None => "none".to_string(),
            };
            [id, provider.display_name.clone(), provider.base_url.clone(), credentials]
        })
        .collect();

    let headers = ["Provider", "Display Name", "URL", "Key"];
    let widths: Vec<usize> = (0..headers.len())
        .map(|column| {
            rows.iter()
                .map(|row| row[column].chars().count())
                .chain(std::iter::once(headers[column].len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let format_row = |cells: &[&str]| -> String {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect();
        format!("{}\n", padded.join("  ").trim_end())
    };

    let mut content = String::from("Available Providers:\n\n");
    content.push_str(&format_row(&headers));
    for row in &rows {
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        content.push_str(&format_row(&cells));
    }
    if default_provider.is_some() {
        content.push_str("\n* = default provider\n");
    }
    content
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_marks_default_and_key_source() {
        let config = Config {
            default_provider: Some("OLLAMA".to_string()),
            ..Default::default()
        };
        let table = format_provider_table(&known_providers(&config), Some("OLLAMA"));

        assert!(table.starts_with("Available Providers:\n\nProvider"));
        assert!(table.contains("ollama*"));
        assert!(table.contains("$OPENAI_API_KEY"));
        assert!(table.ends_with("* = default provider\n"));
        let lmstudio = table.lines().find(|line| line.starts_with("lmstudio")).unwrap();
        assert!(lmstudio.ends_with("none"));
    }

    #[test]
    fn empty_list() {
        assert_eq!(format_provider_table(&[], None), "No providers configured.\n");
    }
}
