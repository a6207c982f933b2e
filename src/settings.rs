//! Persisted app settings and the model provider catalogue.
//!
//! API keys are stored in cleartext in the local store (file mode 0600).
//! Environment variables can supply keys for a single run without
//! persisting them.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::store::{load_json, save_json, KeyValueStore, StoreError};

const SETTINGS_KEY: &str = "yapper_settings";

/// A model offered by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_length: Option<u32>,
    pub provider: String,
}

impl Model {
    fn new(id: &str, name: &str, provider: &str, context_length: u32) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: None,
            context_length: Some(context_length),
            provider: provider.to_string(),
        }
    }
}

/// A configured model backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelProvider {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub requires_api_key: bool,
    #[serde(default)]
    pub models: Vec<Model>,
}

impl ModelProvider {
    /// Whether the provider can be used as configured.
    pub fn is_configured(&self) -> bool {
        !self.requires_api_key || self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    /// Whether the provider offers a model with this id.
    pub fn has_model(&self, model_id: &str) -> bool {
        self.models.iter().any(|m| m.id == model_id)
    }
}

/// Built-in provider catalogue.
pub fn default_providers() -> Vec<ModelProvider> {
    vec![
        ModelProvider {
            id: "openai".to_string(),
            name: "OpenAI".to_string(),
            base_url: None,
            api_key: None,
            requires_api_key: true,
            models: vec![
                Model::new("gpt-4", "GPT-4", "openai", 8192),
                Model::new("gpt-4-turbo", "GPT-4 Turbo", "openai", 128_000),
                Model::new("gpt-3.5-turbo", "GPT-3.5 Turbo", "openai", 4096),
            ],
        },
        ModelProvider {
            id: "anthropic".to_string(),
            name: "Anthropic".to_string(),
            base_url: None,
            api_key: None,
            requires_api_key: true,
            models: vec![
                Model::new("claude-3-opus", "Claude 3 Opus", "anthropic", 200_000),
                Model::new("claude-3-sonnet", "Claude 3 Sonnet", "anthropic", 200_000),
                Model::new("claude-3-haiku", "Claude 3 Haiku", "anthropic", 200_000),
            ],
        },
        ModelProvider {
            id: "ollama".to_string(),
            name: "Ollama".to_string(),
            base_url: Some("http://localhost:11434".to_string()),
            api_key: None,
            requires_api_key: false,
            models: vec![
                Model::new("deepseek-coder-v2", "DeepSeek Coder", "ollama", 16384),
                Model::new("deepseek-r1", "DeepSeek R1", "ollama", 16384),
                Model::new("llama2", "Llama 2", "ollama", 4096),
                Model::new("codellama", "Code Llama", "ollama", 16384),
            ],
        },
    ]
}

/// User-level settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppSettings {
    pub providers: Vec<ModelProvider>,
    pub selected_model: String,
    pub selected_provider: String,
    pub streaming_enabled: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            providers: default_providers(),
            selected_model: "gpt-3.5-turbo".to_string(),
            selected_provider: "openai".to_string(),
            streaming_enabled: true,
        }
    }
}

impl AppSettings {
    /// Load settings, falling back to defaults for missing or malformed data.
    pub fn load(store: &Arc<dyn KeyValueStore>) -> Self {
        load_json(store.as_ref(), SETTINGS_KEY)
    }

    /// Persist settings.
    pub fn save(&self, store: &Arc<dyn KeyValueStore>) -> Result<(), StoreError> {
        save_json(store.as_ref(), SETTINGS_KEY, self)
    }

    /// Find a provider by id.
    pub fn provider(&self, id: &str) -> Option<&ModelProvider> {
        self.providers.iter().find(|p| p.id == id)
    }

    fn provider_mut(&mut self, id: &str) -> Option<&mut ModelProvider> {
        self.providers.iter_mut().find(|p| p.id == id)
    }

    /// The currently selected provider, if it exists.
    pub fn selected(&self) -> Option<&ModelProvider> {
        self.provider(&self.selected_provider)
    }

    /// Select a provider and model. Returns `false` if the provider is unknown.
    pub fn select(&mut self, provider_id: &str, model_id: &str) -> bool {
        if self.provider(provider_id).is_none() {
            return false;
        }
        self.selected_provider = provider_id.to_string();
        self.selected_model = model_id.to_string();
        true
    }

    /// Set a provider's API key. Returns `false` if the provider is unknown.
    pub fn set_api_key(&mut self, provider_id: &str, key: &str) -> bool {
        match self.provider_mut(provider_id) {
            Some(provider) => {
                provider.api_key = (!key.is_empty()).then(|| key.to_string());
                true
            }
            None => false,
        }
    }

    /// Set a provider's base URL. Returns `false` if the provider is unknown.
    pub fn set_base_url(&mut self, provider_id: &str, url: &str) -> bool {
        match self.provider_mut(provider_id) {
            Some(provider) => {
                provider.base_url = Some(url.trim_end_matches('/').to_string());
                true
            }
            None => false,
        }
    }

    /// Apply per-run overrides from a variable lookup.
    ///
    /// Recognised: `OPENAI_API_KEY`, `ANTHROPIC_API_KEY`, `OLLAMA_BASE_URL`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.set_api_key("openai", &key);
        }
        if let Some(key) = lookup("ANTHROPIC_API_KEY") {
            self.set_api_key("anthropic", &key);
        }
        if let Some(url) = lookup("OLLAMA_BASE_URL") {
            self.set_base_url("ollama", &url);
        }
    }
}
