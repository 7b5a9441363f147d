//! Chat endpoint settings resolved from a provider's `settings` map

use crate::config::ProviderConfig;
use crate::providers::error::ProviderResult;
use std::time::Duration;

/// Connection and generation defaults for an OpenAI-compatible endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSettings {
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub organization: Option<String>,
}

impl ChatSettings {
    pub fn openai_defaults() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: super::pricing::GPT_4O.to_string(),
            temperature: 0.3,
            max_tokens: 4096,
            timeout: Duration::from_secs(60),
            organization: None,
        }
    }

    pub fn copilot_defaults() -> Self {
        Self {
            base_url: "https://api.githubcopilot.com".to_string(),
            model: super::pricing::GPT_4.to_string(),
            ..Self::openai_defaults()
        }
    }

    /// Overlay values present in `config.settings` onto these defaults
    pub fn overlay(mut self, config: &ProviderConfig) -> ProviderResult<Self> {
        if let Some(base_url) = config.setting_str("base_url")? {
            self.base_url = base_url;
        }
        if let Some(model) = config.setting_str("model")? {
            self.model = model;
        }
        if let Some(temperature) = config.setting_f64("temperature")? {
            self.temperature = temperature;
        }
        if let Some(max_tokens) = config.setting_u64("max_tokens")? {
            self.max_tokens = max_tokens.min(u32::MAX as u64) as u32;
        }
        if let Some(timeout) = config.setting_duration("timeout")? {
            self.timeout = timeout;
        }
        if let Some(organization) = config.setting_str("organization")? {
            self.organization = Some(organization).filter(|o| !o.is_empty());
        }
        Ok(self)
    }
}
