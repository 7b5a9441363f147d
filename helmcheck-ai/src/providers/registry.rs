//! Provider construction by configured type

use crate::config::ProviderConfig;
use crate::providers::adapter::{Provider, ProviderKind};
use crate::providers::copilot::CopilotProvider;
use crate::providers::error::{ProviderError, ProviderResult};
use crate::providers::openai::OpenAIProvider;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Builds a provider from its configuration entry
pub trait ProviderFactory: Send + Sync {
    fn create(&self, config: &ProviderConfig) -> ProviderResult<Arc<dyn Provider>>;
}

impl<F> ProviderFactory for F
where
    F: Fn(&ProviderConfig) -> ProviderResult<Arc<dyn Provider>> + Send + Sync,
{
    fn create(&self, config: &ProviderConfig) -> ProviderResult<Arc<dyn Provider>> {
        self(config)
    }
}

/// Maps provider type names to factories
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    factories: HashMap<String, Arc<dyn ProviderFactory>>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("types", &self.supported_types())
            .finish()
    }
}

impl ProviderRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in OpenAI and Copilot adapters
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(ProviderKind::OpenAI.as_str(), |config: &ProviderConfig| {
            Ok(Arc::new(OpenAIProvider::from_config(config)?) as Arc<dyn Provider>)
        });
        registry.register(ProviderKind::Copilot.as_str(), |config: &ProviderConfig| {
            Ok(Arc::new(CopilotProvider::from_config(config)?) as Arc<dyn Provider>)
        });
        registry
    }

    /// Add or replace the factory for a type name
    pub fn register(&mut self, provider_type: impl Into<String>, factory: impl ProviderFactory + 'static) {
        self.factories
            .insert(provider_type.into().to_ascii_lowercase(), Arc::new(factory));
    }

    pub fn create(&self, config: &ProviderConfig) -> ProviderResult<Arc<dyn Provider>> {
        let factory = self
            .factories
            .get(&config.provider_type.to_ascii_lowercase())
            .ok_or_else(|| {
                ProviderError::NotSupported(format!(
                    "unsupported provider type '{}' for provider '{}'",
                    config.provider_type, config.name
                ))
            })?;
        factory.create(config)
    }

    pub fn supports(&self, provider_type: &str) -> bool {
        self.factories.contains_key(&provider_type.to_ascii_lowercase())
    }

    /// Registered type names, sorted
    pub fn supported_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let registry = ProviderRegistry::with_defaults();
        assert_eq!(registry.supported_types(), vec!["copilot", "openai"]);
        assert!(registry.supports("OpenAI"));
        assert!(!registry.supports("anthropic"));
    }

    #[test]
    fn test_unknown_type() {
        let registry = ProviderRegistry::with_defaults();
        let config = ProviderConfig {
            name: "claude".into(),
            provider_type: "anthropic".into(),
            ..Default::default()
        };
        assert!(matches!(registry.create(&config), Err(ProviderError::NotSupported(_))));
    }
}
