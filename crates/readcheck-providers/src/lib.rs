//! readcheck-providers: LLM provider integrations.
//!
//! Implements the `LlmProvider` trait for OpenAI, Anthropic, and Ollama,
//! plus a scripted mock, and loads the `readcheck.toml` configuration that
//! selects between them.

pub mod anthropic;
pub mod config;
pub mod mock;
pub mod ollama;
pub mod openai;
mod transport;

pub use config::{create_provider, load_config, load_config_from, ProviderConfig, ReadcheckConfig};
pub use mock::{MockFailure, MockProvider};
pub use readcheck_core::error::ProviderError;
