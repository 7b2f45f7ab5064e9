//! Client configuration.
//!
//! One client per trusted issuer:
//!
//! ```yaml
//! clients:
//!   - issuer: jwks-uri-client
//!     jwks-uri:
//!       uri: 'http://localhost:8080/keys'
//!       proxy:
//!         host: localhost
//!         port: 8081
//!       cache:
//!         time-to-live-seconds: 3600
//!   - issuer: jwks-pem-client
//!     jwks:
//!       - key-id: client-key-id
//!         algorithm: RS512
//!         public-key-pem: |
//!           -----BEGIN PUBLIC KEY-----
//!           ...
//!           -----END PUBLIC KEY-----
//! ```

use serde::Deserialize;
use std::time::Duration;

/// Keys trusted for one issuer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClientOptions {
    /// Expected `iss` claim.
    pub issuer: String,
    /// Remote key set.
    #[serde(default, alias = "jwksUri")]
    pub jwks_uri: Option<JwksUriOptions>,
    /// Inline public keys.
    #[serde(default)]
    pub jwks: Vec<InlineKey>,
}

impl ClientOptions {
    /// Options for `issuer` with no keys.
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            jwks_uri: None,
            jwks: Vec::new(),
        }
    }

    /// Add an inline key.
    #[must_use]
    pub fn with_key(mut self, key: InlineKey) -> Self {
        self.jwks.push(key);
        self
    }

    /// Fetch keys from a remote key set.
    #[must_use]
    pub fn with_jwks_uri(mut self, jwks_uri: JwksUriOptions) -> Self {
        self.jwks_uri = Some(jwks_uri);
        self
    }
}

/// A PEM-encoded public key.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct InlineKey {
    /// Matched against the token's `kid` header.
    #[serde(default, alias = "keyId")]
    pub key_id: Option<String>,
    /// JWS algorithm name, e.g. `RS256`.
    pub algorithm: String,
    /// SPKI public key.
    #[serde(alias = "public-key", alias = "publicKeyPem")]
    pub public_key_pem: String,
}

/// Where and how to fetch a remote key set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct JwksUriOptions {
    /// Key set URL.
    #[serde(default)]
    pub uri: Option<String>,
    /// HTTP proxy for the request.
    #[serde(default)]
    pub proxy: Option<ProxyOptions>,
    /// Cache fetched keys.
    #[serde(default)]
    pub cache: Option<CacheOptions>,
}

impl JwksUriOptions {
    /// Fetch from `uri`.
    #[must_use]
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: Some(uri.into()),
            ..Self::default()
        }
    }

    /// Cache fetched keys for `ttl`.
    #[must_use]
    pub const fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache = Some(CacheOptions {
            time_to_live_seconds: Some(ttl.as_secs()),
        });
        self
    }

    /// How long fetched keys stay valid, when caching is configured.
    #[must_use]
    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache
            .as_ref()
            .and_then(|c| c.time_to_live_seconds)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

/// HTTP proxy. Used only when both fields are set.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProxyOptions {
    /// Proxy host.
    #[serde(default)]
    pub host: Option<String>,
    /// Proxy port.
    #[serde(default)]
    pub port: Option<u16>,
}

impl ProxyOptions {
    /// `http://host:port`, when both parts are set.
    #[must_use]
    pub fn url(&self) -> Option<String> {
        match (&self.host, self.port) {
            (Some(host), Some(port)) => Some(format!("http://{host}:{port}")),
            _ => None,
        }
    }
}

/// Key set cache settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CacheOptions {
    /// Seconds a fetched key set is reused.
    #[serde(default, alias = "timeToLiveSeconds")]
    pub time_to_live_seconds: Option<u64>,
}
