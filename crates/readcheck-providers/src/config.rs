//! Configuration loading and provider factory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use readcheck_core::generation::GenerationConfig;
use readcheck_core::grading::GradingConfig;
use readcheck_core::retry::RetryPolicy;
use readcheck_core::traits::LlmProvider;

use crate::anthropic::AnthropicProvider;
use crate::ollama::OllamaProvider;
use crate::openai::OpenAiProvider;

/// Configuration for a single LLM provider.
///
/// Note: Custom Debug impl masks API keys to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    OpenAI {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        org_id: Option<String>,
    },
    Anthropic {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
    },
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
    },
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderConfig::OpenAI {
                api_key: _,
                base_url,
                org_id,
            } => f
                .debug_struct("OpenAI")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .field("org_id", org_id)
                .finish(),
            ProviderConfig::Anthropic {
                api_key: _,
                base_url,
            } => f
                .debug_struct("Anthropic")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .finish(),
            ProviderConfig::Ollama { base_url } => f
                .debug_struct("Ollama")
                .field("base_url", base_url)
                .finish(),
        }
    }
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

/// Top-level readcheck configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadcheckConfig {
    /// Provider configurations keyed by name.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    /// Default provider to use.
    #[serde(default = "default_provider")]
    pub default_provider: String,
    /// Default model to use.
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Sampling temperature for question generation.
    #[serde(default = "default_question_temperature")]
    pub question_temperature: f64,
    /// Sampling temperature for grading. Lower keeps scores consistent.
    #[serde(default = "default_grading_temperature")]
    pub grading_temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Max retries on transient provider errors.
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    /// Initial delay between retries in milliseconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
    /// Passage library file or directory. The bundled library is used when unset.
    #[serde(default)]
    pub passages: Option<PathBuf>,
    /// Output directory for saved results.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_question_temperature() -> f64 {
    0.7
}
fn default_grading_temperature() -> f64 {
    0.3
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_retries() -> u32 {
    3
}
fn default_retry_delay() -> u64 {
    1000
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./readcheck-results")
}

impl Default for ReadcheckConfig {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider(),
            default_model: default_model(),
            question_temperature: default_question_temperature(),
            grading_temperature: default_grading_temperature(),
            max_tokens: default_max_tokens(),
            max_retries: default_retries(),
            retry_delay_ms: default_retry_delay(),
            passages: None,
            output_dir: default_output_dir(),
        }
    }
}

impl ReadcheckConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    /// Settings for question generation, optionally overriding the model.
    pub fn generation_config(&self, model: Option<&str>) -> GenerationConfig {
        GenerationConfig {
            model: model.unwrap_or(&self.default_model).to_string(),
            temperature: self.question_temperature,
            max_tokens: self.max_tokens,
            retry: self.retry_policy(),
        }
    }

    /// Settings for grading, optionally overriding the model.
    pub fn grading_config(&self, model: Option<&str>) -> GradingConfig {
        GradingConfig {
            model: model.unwrap_or(&self.default_model).to_string(),
            temperature: self.grading_temperature,
            max_tokens: self.max_tokens,
            retry: self.retry_policy(),
        }
    }

    /// Build the named provider, or the default one when `name` is `None`.
    pub fn provider(&self, name: Option<&str>) -> Result<Arc<dyn LlmProvider>> {
        let name = name.unwrap_or(&self.default_provider);
        let config = self.providers.get(name).with_context(|| {
            format!(
                "provider '{name}' is not configured. Add [providers.{name}] to readcheck.toml or set READCHECK_{}_KEY",
                name.to_uppercase()
            )
        })?;
        create_provider(name, config)
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start + 2..].find('}') else {
            break;
        };
        let var_name = &rest[start + 2..start + 2 + len];
        result.push_str(&rest[..start]);
        // Substituted values are not expanded again.
        result.push_str(&std::env::var(var_name).unwrap_or_default());
        rest = &rest[start + 2 + len + 1..];
    }
    result.push_str(rest);
    result
}

/// Resolve env vars in a provider config.
fn resolve_provider_config(config: &ProviderConfig) -> ProviderConfig {
    match config {
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => ProviderConfig::OpenAI {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_ref().map(|u| resolve_env_vars(u)),
            org_id: org_id.as_ref().map(|o| resolve_env_vars(o)),
        },
        ProviderConfig::Anthropic { api_key, base_url } => ProviderConfig::Anthropic {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_ref().map(|u| resolve_env_vars(u)),
        },
        ProviderConfig::Ollama { base_url } => ProviderConfig::Ollama {
            base_url: resolve_env_vars(base_url),
        },
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `readcheck.toml` in the current directory
/// 2. `~/.config/readcheck/config.toml`
///
/// Environment variable overrides: `READCHECK_OPENAI_KEY`, `READCHECK_ANTHROPIC_KEY`.
pub fn load_config() -> Result<ReadcheckConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<ReadcheckConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("readcheck.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match &config_path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            parse_config(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => ReadcheckConfig::default(),
    };

    // Relative library paths are relative to the config file.
    if let (Some(passages), Some(dir)) = (
        config.passages.as_mut(),
        config_path.as_deref().and_then(Path::parent),
    ) {
        if passages.is_relative() && !dir.as_os_str().is_empty() {
            *passages = dir.join(&*passages);
        }
    }

    apply_env_overrides(&mut config);
    tracing::debug!(?config, "loaded configuration");
    Ok(config)
}

/// Parse a config document and resolve `${VAR}` references.
pub fn parse_config(content: &str) -> Result<ReadcheckConfig> {
    let mut config: ReadcheckConfig = toml::from_str(content)?;
    config.providers = config
        .providers
        .iter()
        .map(|(k, v)| (k.clone(), resolve_provider_config(v)))
        .collect();
    Ok(config)
}

fn apply_env_overrides(config: &mut ReadcheckConfig) {
    if let Ok(key) = std::env::var("READCHECK_ANTHROPIC_KEY") {
        match config.providers.get_mut("anthropic") {
            Some(ProviderConfig::Anthropic { api_key, .. }) => *api_key = key,
            _ => {
                config.providers.insert(
                    "anthropic".into(),
                    ProviderConfig::Anthropic {
                        api_key: key,
                        base_url: None,
                    },
                );
            }
        }
    }

    if let Ok(key) = std::env::var("READCHECK_OPENAI_KEY") {
        match config.providers.get_mut("openai") {
            Some(ProviderConfig::OpenAI { api_key, .. }) => *api_key = key,
            _ => {
                config.providers.insert(
                    "openai".into(),
                    ProviderConfig::OpenAI {
                        api_key: key,
                        base_url: None,
                        org_id: None,
                    },
                );
            }
        }
    }
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("readcheck"))
}

/// Create a provider instance from its configuration.
pub fn create_provider(name: &str, config: &ProviderConfig) -> Result<Arc<dyn LlmProvider>> {
    let provider: Arc<dyn LlmProvider> = match config {
        ProviderConfig::Anthropic { api_key, base_url } => {
            Arc::new(AnthropicProvider::new(api_key, base_url.clone())?)
        }
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => Arc::new(OpenAiProvider::new(
            api_key,
            base_url.clone(),
            org_id.clone(),
        )?),
        ProviderConfig::Ollama { base_url } => Arc::new(OllamaProvider::new(base_url)?),
    };
    tracing::debug!(name, provider = provider.name(), "created provider");
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_env_vars_basic() {
        std::env::set_var("_READCHECK_TEST_VAR", "hello");
        assert_eq!(resolve_env_vars("${_READCHECK_TEST_VAR}"), "hello");
        assert_eq!(
            resolve_env_vars("prefix_${_READCHECK_TEST_VAR}_suffix"),
            "prefix_hello_suffix"
        );
        assert_eq!(resolve_env_vars("no vars here"), "no vars here");
        assert_eq!(resolve_env_vars("open ${brace"), "open ${brace");
        std::env::remove_var("_READCHECK_TEST_VAR");
    }

    #[test]
    fn resolve_env_vars_does_not_expand_values() {
        std::env::set_var("_READCHECK_SELF_REF", "${_READCHECK_SELF_REF}");
        assert_eq!(
            resolve_env_vars("key=${_READCHECK_SELF_REF}!"),
            "key=${_READCHECK_SELF_REF}!"
        );
        std::env::remove_var("_READCHECK_SELF_REF");
    }

    #[test]
    fn default_config() {
        let config = ReadcheckConfig::default();
        assert_eq!(config.default_provider, "openai");
        assert_eq!(config.default_model, "gpt-4o-mini");
        assert_eq!(config.question_temperature, 0.7);
        assert_eq!(config.grading_temperature, 0.3);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.output_dir, PathBuf::from("./readcheck-results"));
        assert!(config.passages.is_none());
    }

    #[test]
    fn parse_provider_config() {
        let toml_str = r#"
default_provider = "anthropic"
default_model = "claude-haiku-4-5-20251001"
grading_temperature = 0.1
passages = "passages"

[providers.anthropic]
type = "anthropic"
api_key = "sk-test"

[providers.openai]
type = "openai"
api_key = "sk-openai"

[providers.ollama]
type = "ollama"
"#;
        let config = parse_config(toml_str).unwrap();
        assert_eq!(config.providers.len(), 3);
        assert_eq!(config.default_provider, "anthropic");
        assert_eq!(config.grading_temperature, 0.1);
        assert_eq!(config.question_temperature, 0.7);
        assert_eq!(config.passages, Some(PathBuf::from("passages")));
        assert!(matches!(
            config.providers.get("anthropic"),
            Some(ProviderConfig::Anthropic { .. })
        ));
        assert!(matches!(
            config.providers.get("ollama"),
            Some(ProviderConfig::Ollama { base_url }) if base_url == "http://localhost:11434"
        ));
    }

    #[test]
    fn debug_masks_api_keys() {
        let config = ProviderConfig::OpenAI {
            api_key: "sk-secret".into(),
            base_url: None,
            org_id: None,
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("***"));
    }

    #[test]
    fn adapter_settings_follow_config() {
        let config = ReadcheckConfig {
            max_retries: 1,
            retry_delay_ms: 250,
            ..Default::default()
        };
        let generation = config.generation_config(None);
        assert_eq!(generation.model, "gpt-4o-mini");
        assert_eq!(generation.temperature, 0.7);
        assert_eq!(generation.retry.max_retries, 1);
        assert_eq!(generation.retry.initial_delay, Duration::from_millis(250));

        let grading = config.grading_config(Some("gpt-4o"));
        assert_eq!(grading.model, "gpt-4o");
        assert_eq!(grading.temperature, 0.3);
    }

    #[test]
    fn unknown_provider_is_reported() {
        let err = ReadcheckConfig::default()
            .provider(Some("nope"))
            .err()
            .unwrap();
        assert!(err.to_string().contains("provider 'nope' is not configured"));
    }

    #[test]
    fn load_missing_explicit_path_fails() {
        let err = load_config_from(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn relative_passages_resolve_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readcheck.toml");
        std::fs::write(&path, "passages = \"library\"\n").unwrap();
        let config = load_config_from(Some(&path)).unwrap();
        assert_eq!(config.passages, Some(dir.path().join("library")));
    }

    #[test]
    fn ollama_provider_needs_no_key() {
        let config = ProviderConfig::Ollama {
            base_url: default_ollama_url(),
        };
        let provider = create_provider("ollama", &config).unwrap();
        assert_eq!(provider.name(), "ollama");
    }
}
