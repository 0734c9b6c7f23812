//! Provider credential resolution for roomai-api
//!
//! Each credential is resolved ENV → TOML. A missing credential is not an
//! error: the matching provider is left out of its fallback chain.

use roomai_common::config::TomlConfig;
use tracing::{info, warn};

pub const ANTHROPIC_KEY_ENV: &str = "ROOMAI_ANTHROPIC_API_KEY";
pub const OPENAI_KEY_ENV: &str = "ROOMAI_OPENAI_API_KEY";
pub const REPLICATE_TOKEN_ENV: &str = "ROOMAI_REPLICATE_API_TOKEN";
pub const HUGGINGFACE_TOKEN_ENV: &str = "ROOMAI_HUGGINGFACE_API_TOKEN";

/// API credentials available to provider clients
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderCredentials {
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub replicate_api_token: Option<String>,
    pub huggingface_api_token: Option<String>,
}

impl ProviderCredentials {
    /// Resolve every provider credential from the environment and TOML
    pub fn resolve(config: &TomlConfig) -> Self {
        let providers = &config.providers;
        Self {
            anthropic_api_key: resolve_credential(
                "Anthropic API key",
                ANTHROPIC_KEY_ENV,
                providers.anthropic_api_key.as_deref(),
            ),
            openai_api_key: resolve_credential(
                "OpenAI API key",
                OPENAI_KEY_ENV,
                providers.openai_api_key.as_deref(),
            ),
            replicate_api_token: resolve_credential(
                "Replicate API token",
                REPLICATE_TOKEN_ENV,
                providers.replicate_api_token.as_deref(),
            ),
            huggingface_api_token: resolve_credential(
                "HuggingFace API token",
                HUGGINGFACE_TOKEN_ENV,
                providers.huggingface_api_token.as_deref(),
            ),
        }
    }
}

/// Resolve one credential, environment first
pub fn resolve_credential(label: &str, env_var: &str, toml_value: Option<&str>) -> Option<String> {
    let env_key = std::env::var(env_var).ok().filter(|k| is_valid_key(k));
    let toml_key = toml_value.filter(|k| is_valid_key(k));

    if env_key.is_some() && toml_key.is_some() {
        warn!(
            "{} found in multiple sources: environment, TOML. Using environment (highest priority).",
            label
        );
    }

    if let Some(key) = env_key {
        info!("{} loaded from environment variable {}", label, env_var);
        return Some(key.trim().to_string());
    }

    if let Some(key) = toml_key {
        info!("{} loaded from TOML config", label);
        return Some(key.trim().to_string());
    }

    info!("{} not configured", label);
    None
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn environment_beats_toml() {
        std::env::set_var(OPENAI_KEY_ENV, "env-key");
        let key = resolve_credential("OpenAI API key", OPENAI_KEY_ENV, Some("toml-key"));
        std::env::remove_var(OPENAI_KEY_ENV);
        assert_eq!(key.as_deref(), Some("env-key"));
    }

    #[test]
    #[serial]
    fn blank_values_count_as_absent() {
        std::env::set_var(OPENAI_KEY_ENV, "   ");
        let key = resolve_credential("OpenAI API key", OPENAI_KEY_ENV, Some(" toml-key "));
        std::env::remove_var(OPENAI_KEY_ENV);
        assert_eq!(key.as_deref(), Some("toml-key"));

        assert!(resolve_credential("OpenAI API key", OPENAI_KEY_ENV, Some("")).is_none());
    }

    #[test]
    #[serial]
    fn resolves_all_providers_from_toml() {
        for var in [
            ANTHROPIC_KEY_ENV,
            OPENAI_KEY_ENV,
            REPLICATE_TOKEN_ENV,
            HUGGINGFACE_TOKEN_ENV,
        ] {
            std::env::remove_var(var);
        }
        let mut config = TomlConfig::default();
        config.providers.anthropic_api_key = Some("sk-ant".to_string());
        config.providers.replicate_api_token = Some("r8".to_string());

        let creds = ProviderCredentials::resolve(&config);
        assert_eq!(creds.anthropic_api_key.as_deref(), Some("sk-ant"));
        assert_eq!(creds.replicate_api_token.as_deref(), Some("r8"));
        assert!(creds.openai_api_key.is_none());
        assert!(creds.huggingface_api_token.is_none());
    }
}
