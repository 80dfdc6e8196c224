/// Caller identity
///
/// A request carries a credential in the token header. An `IdentityResolver`
/// maps it to the user or role statements run as.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::config::AuthConfig;
use crate::error::{DataApiError, Result};

/// Identity attached to one request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RequestIdentity {
    /// No credential was presented
    #[default]
    Anonymous,
    /// The credential mapped to this user or role
    Resolved(String),
    /// A credential was presented but could not be mapped
    Unresolved,
}

impl RequestIdentity {
    pub fn user_or_role(&self) -> Option<&str> {
        match self {
            RequestIdentity::Resolved(name) => Some(name),
            _ => None,
        }
    }
}

/// Per-request data handed to resolvers
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub identity: RequestIdentity,
    /// Cancelled when the caller goes away
    pub cancel: CancellationToken,
}

impl RequestContext {
    pub fn new(identity: RequestIdentity) -> Self {
        Self {
            identity,
            cancel: CancellationToken::new(),
        }
    }
}

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Map a credential to a user or role; `Ok(None)` when it is not recognized
    async fn resolve(&self, token: &str) -> Result<Option<String>>;
}

/// Fixed token to user-or-role table
#[derive(Debug, Clone, Default)]
pub struct StaticTokenResolver {
    tokens: BTreeMap<String, String>,
}

impl StaticTokenResolver {
    pub fn new(tokens: BTreeMap<String, String>) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl IdentityResolver for StaticTokenResolver {
    async fn resolve(&self, token: &str) -> Result<Option<String>> {
        Ok(self.tokens.get(token).cloned())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(alias = "userOrRole", alias = "role", alias = "user")]
    user_or_role: String,
}

/// Token service client
///
/// `GET <url>` with the token in the configured header; a 200 response carries
/// `{"user_or_role": "..."}`, and 401/403/404 mean the token is unknown.
pub struct HttpTokenResolver {
    url: String,
    header: String,
    client: Client,
}

impl HttpTokenResolver {
    pub fn new(url: String, header: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| DataApiError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            header,
            client,
        })
    }
}

#[async_trait]
impl IdentityResolver for HttpTokenResolver {
    async fn resolve(&self, token: &str) -> Result<Option<String>> {
        tracing::debug!("Resolving token through {}", self.url);

        let response = self
            .client
            .get(&self.url)
            .header(self.header.as_str(), token)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let body: TokenResponse = response.json().await?;
                Ok(Some(body.user_or_role))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => Ok(None),
            status => Err(DataApiError::Execution(format!(
                "Token service request failed with status {}",
                status
            ))),
        }
    }
}

/// Tries each resolver in turn
pub struct ChainedResolver {
    resolvers: Vec<Arc<dyn IdentityResolver>>,
}

impl ChainedResolver {
    pub fn new(resolvers: Vec<Arc<dyn IdentityResolver>>) -> Self {
        Self { resolvers }
    }
}

#[async_trait]
impl IdentityResolver for ChainedResolver {
    async fn resolve(&self, token: &str) -> Result<Option<String>> {
        for resolver in &self.resolvers {
            if let Some(identity) = resolver.resolve(token).await? {
                return Ok(Some(identity));
            }
        }
        Ok(None)
    }
}

/// Build the resolver described by configuration; `None` when no identity source is set
pub fn resolver_from_config(config: &AuthConfig) -> Result<Option<Arc<dyn IdentityResolver>>> {
    let mut resolvers: Vec<Arc<dyn IdentityResolver>> = Vec::new();
    if !config.tokens.is_empty() {
        resolvers.push(Arc::new(StaticTokenResolver::new(config.tokens.clone())));
    }
    if let Some(url) = &config.resolver_url {
        resolvers.push(Arc::new(HttpTokenResolver::new(
            url.clone(),
            config.token_header.clone(),
        )?));
    }

    Ok(match resolvers.len() {
        0 => None,
        1 => resolvers.pop(),
        _ => Some(Arc::new(ChainedResolver::new(resolvers))),
    })
}

/// Turn an optional credential into a request identity
///
/// Resolution failures are logged and treated as an unmapped credential.
pub async fn identify(resolver: Option<&dyn IdentityResolver>, token: Option<&str>) -> RequestIdentity {
    let token = match token.map(str::trim).filter(|t| !t.is_empty()) {
        Some(token) => token,
        None => return RequestIdentity::Anonymous,
    };
    let resolver = match resolver {
        Some(resolver) => resolver,
        None => return RequestIdentity::Unresolved,
    };

    match resolver.resolve(token).await {
        Ok(Some(identity)) => RequestIdentity::Resolved(identity),
        Ok(None) => RequestIdentity::Unresolved,
        Err(e) => {
            tracing::warn!("Token resolution failed: {}", e);
            RequestIdentity::Unresolved
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn static_resolver() -> StaticTokenResolver {
        let mut tokens = BTreeMap::new();
        tokens.insert("token1".to_string(), "user1".to_string());
        StaticTokenResolver::new(tokens)
    }

    #[tokio::test]
    async fn test_identify_with_known_token() {
        let resolver = static_resolver();
        assert_eq!(
            identify(Some(&resolver), Some("token1")).await,
            RequestIdentity::Resolved("user1".to_string())
        );
    }

    #[tokio::test]
    async fn test_identify_with_unknown_token() {
        let resolver = static_resolver();
        assert_eq!(identify(Some(&resolver), Some("nope")).await, RequestIdentity::Unresolved);
    }

    #[tokio::test]
    async fn test_identify_without_token() {
        let resolver = static_resolver();
        assert_eq!(identify(Some(&resolver), None).await, RequestIdentity::Anonymous);
        assert_eq!(identify(Some(&resolver), Some("  ")).await, RequestIdentity::Anonymous);
    }

    #[tokio::test]
    async fn test_chained_resolver_falls_through() {
        let mut second = BTreeMap::new();
        second.insert("token2".to_string(), "role2".to_string());
        let chain = ChainedResolver::new(vec![
            Arc::new(static_resolver()),
            Arc::new(StaticTokenResolver::new(second)),
        ]);
        assert_eq!(chain.resolve("token2").await.unwrap(), Some("role2".to_string()));
        assert_eq!(chain.resolve("token3").await.unwrap(), None);
    }

    #[test]
    fn test_resolver_from_config() {
        let mut config = AuthConfig::default();
        assert!(resolver_from_config(&config).unwrap().is_none());

        config.tokens.insert("t".to_string(), "u".to_string());
        assert!(resolver_from_config(&config).unwrap().is_some());
    }

    #[test]
    fn test_http_resolver_trims_trailing_slash() {
        let resolver = HttpTokenResolver::new(
            "https://auth.example.com/identity/".to_string(),
            "X-Cassandra-Token".to_string(),
        )
        .unwrap();
        assert_eq!(resolver.url, "https://auth.example.com/identity");
    }
}
