//! Credential sources and request authentication

use crate::config::{AuthConfig, SecretString};
use crate::providers::error::{ProviderError, ProviderResult};
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::RequestBuilder;
use std::fmt;
use std::sync::Arc;

/// Expected shape of a credential
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenFormat {
    /// `sk-` prefix, or at least 20 characters for proxies and test keys
    OpenAIKey,
    /// GitHub token prefixes, or at least 10 characters
    GitHubToken,
    /// Any non-empty value
    Any,
}

const GITHUB_PREFIXES: [&str; 4] = ["ghp_", "ghu_", "ghs_", "github_pat_"];

impl TokenFormat {
    pub fn accepts(&self, token: &str) -> bool {
        match self {
            TokenFormat::OpenAIKey => token.starts_with("sk-") || token.len() >= 20,
            TokenFormat::GitHubToken => {
                GITHUB_PREFIXES.iter().any(|p| token.starts_with(p)) || token.len() >= 10
            }
            TokenFormat::Any => !token.is_empty(),
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            TokenFormat::OpenAIKey => "OpenAI API key",
            TokenFormat::GitHubToken => "GitHub token",
            TokenFormat::Any => "token",
        }
    }
}

/// Supplies the bearer credential for each request
pub trait TokenSource: Send + Sync + fmt::Debug {
    fn token(&self) -> ProviderResult<SecretString>;

    /// Resolve the token and check it against `format`
    fn validate(&self, provider: &str, format: TokenFormat) -> ProviderResult<()> {
        let token = self.token()?;
        if token.expose_secret().is_empty() {
            return Err(ProviderError::not_configured(provider, "no credential provided"));
        }
        if !format.accepts(token.expose_secret()) {
            return Err(ProviderError::AuthenticationFailed {
                provider: provider.to_string(),
                reason: format!("invalid {} format", format.describe()),
            });
        }
        Ok(())
    }
}

/// A credential fixed at construction
#[derive(Debug, Clone)]
pub struct StaticToken {
    token: SecretString,
}

impl StaticToken {
    pub fn new(token: impl Into<SecretString>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl TokenSource for StaticToken {
    fn token(&self) -> ProviderResult<SecretString> {
        if self.token.expose_secret().is_empty() {
            return Err(ProviderError::not_configured("auth", "no credential provided"));
        }
        Ok(self.token.clone())
    }
}

/// A credential read from an environment variable on every request
#[derive(Debug, Clone)]
pub struct EnvToken {
    var: String,
}

impl EnvToken {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }

    pub fn var(&self) -> &str {
        &self.var
    }
}

impl TokenSource for EnvToken {
    fn token(&self) -> ProviderResult<SecretString> {
        match std::env::var(&self.var) {
            Ok(value) if !value.is_empty() => Ok(SecretString::new(value)),
            _ => Err(ProviderError::not_configured(
                "auth",
                format!("environment variable {} not set", self.var),
            )),
        }
    }
}

/// Which configured credential an adapter reads first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credential {
    ApiKey,
    Token,
}

/// Pick the credential source described by `auth`
///
/// A non-empty inline secret wins, preferred field first. Otherwise the
/// configured `token_env` variable is read, then `fallback_env`.
pub fn token_source(auth: &AuthConfig, prefer: Credential, fallback_env: &str) -> Arc<dyn TokenSource> {
    let (first, second) = match prefer {
        Credential::ApiKey => (&auth.api_key, &auth.token),
        Credential::Token => (&auth.token, &auth.api_key),
    };
    if let Some(secret) = [first, second]
        .into_iter()
        .flatten()
        .find(|secret| !secret.is_empty())
    {
        return Arc::new(StaticToken::new(secret.clone()));
    }
    let var = auth
        .token_env
        .as_deref()
        .filter(|var| !var.is_empty())
        .unwrap_or(fallback_env);
    Arc::new(EnvToken::new(var))
}

/// Attaches bearer credentials and standard headers
#[derive(Debug, Clone)]
pub struct BearerAuth {
    source: Arc<dyn TokenSource>,
    organization: Option<String>,
}

impl BearerAuth {
    pub fn new(source: impl TokenSource + 'static) -> Self {
        Self::shared(Arc::new(source))
    }

    pub fn shared(source: Arc<dyn TokenSource>) -> Self {
        Self {
            source,
            organization: None,
        }
    }

    pub fn with_organization(mut self, organization: Option<String>) -> Self {
        self.organization = organization.filter(|o| !o.is_empty());
        self
    }

    pub fn source(&self) -> &dyn TokenSource {
        self.source.as_ref()
    }

    /// Add authentication and identification headers to `builder`
    pub fn apply(&self, builder: RequestBuilder, accept: &str) -> ProviderResult<RequestBuilder> {
        let token = self.source.token()?;
        let mut builder = builder
            .bearer_auth(token.expose_secret())
            .header(ACCEPT, accept)
            .header(USER_AGENT, super::USER_AGENT);
        if let Some(organization) = &self.organization {
            builder = builder.header("OpenAI-Organization", organization);
        }
        Ok(builder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(TokenFormat::OpenAIKey, "sk-abc", true ; "openai prefix")]
    #[test_case(TokenFormat::OpenAIKey, "short", false ; "openai too short")]
    #[test_case(TokenFormat::OpenAIKey, "abcdefghijklmnopqrstuvwxyz", true ; "openai long key")]
    #[test_case(TokenFormat::GitHubToken, "ghp_x", true ; "github prefix")]
    #[test_case(TokenFormat::GitHubToken, "github_pat_1", true ; "github fine grained")]
    #[test_case(TokenFormat::GitHubToken, "abc", false ; "github too short")]
    #[test_case(TokenFormat::Any, "", false ; "any empty")]
    fn test_token_formats(format: TokenFormat, token: &str, expected: bool) {
        assert_eq!(format.accepts(token), expected);
    }

    #[test]
    fn test_static_token_validation() {
        let err = StaticToken::new("").validate("openai", TokenFormat::OpenAIKey).unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured { .. }));

        let err = StaticToken::new("bad").validate("openai", TokenFormat::OpenAIKey).unwrap_err();
        assert!(matches!(err, ProviderError::AuthenticationFailed { .. }));

        assert!(StaticToken::new("sk-test").validate("openai", TokenFormat::OpenAIKey).is_ok());
    }

    #[test]
    fn test_missing_env_token() {
        let source = EnvToken::new("HELMCHECK_TEST_TOKEN_THAT_IS_NEVER_SET");
        assert!(matches!(source.token(), Err(ProviderError::NotConfigured { .. })));
    }

    #[test]
    fn test_token_source_preference() {
        let auth = AuthConfig {
            api_key: Some("sk-from-key".into()),
            token: Some("ghp_from_token".into()),
            ..Default::default()
        };
        let key = token_source(&auth, Credential::ApiKey, "UNUSED").token().unwrap();
        assert_eq!(key.expose_secret(), "sk-from-key");
        let token = token_source(&auth, Credential::Token, "UNUSED").token().unwrap();
        assert_eq!(token.expose_secret(), "ghp_from_token");
    }

    #[test]
    fn test_token_source_env_fallback() {
        let auth = AuthConfig {
            api_key: Some("".into()),
            token_env: Some("HELMCHECK_TEST_TOKEN_THAT_IS_NEVER_SET".into()),
            ..Default::default()
        };
        let err = token_source(&auth, Credential::ApiKey, "OPENAI_API_KEY")
            .token()
            .unwrap_err();
        assert!(err.to_string().contains("HELMCHECK_TEST_TOKEN_THAT_IS_NEVER_SET"));
    }

    #[test]
    fn test_debug_hides_token() {
        let auth = BearerAuth::new(StaticToken::new("sk-very-secret"));
        assert!(!format!("{:?}", auth).contains("sk-very-secret"));
    }
}
