//! Verification keys: inline PEM keys, remote key sets and their cache.

use crate::config::{InlineKey, JwksUriOptions};
use crate::error::{AuthError, Result};
use jsonwebtoken::jwk::Jwk;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// A public key able to verify one algorithm.
#[derive(Clone)]
pub struct VerificationKey {
    /// Key id, when the key declares one.
    pub kid: Option<String>,
    /// Algorithm, when the key declares one.
    pub algorithm: Option<Algorithm>,
    pub(crate) key: DecodingKey,
}

impl std::fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl VerificationKey {
    /// Build a key from an inline PEM entry.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidKey`] for an unknown or symmetric
    /// algorithm, or a PEM that does not match the algorithm's key type.
    pub fn from_inline(issuer: &str, entry: &InlineKey) -> Result<Self> {
        let invalid = |reason: String| AuthError::InvalidKey {
            issuer: issuer.to_string(),
            reason,
        };

        let algorithm = Algorithm::from_str(&entry.algorithm)
            .map_err(|_| invalid(format!("Unknown algorithm '{}'.", entry.algorithm)))?;
        let pem = entry.public_key_pem.as_bytes();
        let key = match algorithm {
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => DecodingKey::from_rsa_pem(pem),
            Algorithm::ES256 | Algorithm::ES384 => DecodingKey::from_ec_pem(pem),
            Algorithm::EdDSA => DecodingKey::from_ed_pem(pem),
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                return Err(invalid(format!(
                    "Algorithm '{}' has no public key.",
                    entry.algorithm
                )));
            }
        }
        .map_err(|e| invalid(format!("Invalid public key: {e}.")))?;

        Ok(Self {
            kid: entry.key_id.clone(),
            algorithm: Some(algorithm),
            key,
        })
    }

    /// Build a key from a JWK. `None` for keys that cannot verify
    /// signatures (unsupported key types, encryption-only algorithms).
    #[must_use]
    pub fn from_jwk(value: &Value) -> Option<Self> {
        let jwk: Jwk = serde_json::from_value(value.clone()).ok()?;
        let key = DecodingKey::from_jwk(&jwk).ok()?;
        let algorithm = match value.get("alg").and_then(Value::as_str) {
            Some(alg) => Some(Algorithm::from_str(alg).ok()?),
            None => None,
        };
        Some(Self {
            kid: value.get("kid").and_then(Value::as_str).map(str::to_string),
            algorithm,
            key,
        })
    }

    /// Whether this key may verify a token signed with `algorithm`.
    #[must_use]
    pub fn accepts(&self, algorithm: Algorithm) -> bool {
        self.algorithm.is_none_or(|a| a == algorithm)
    }
}

/// Keys to try for a token header, in preference order.
///
/// Keys whose id equals `kid` come first; when none match, every key
/// accepting `algorithm` is a candidate.
#[must_use]
pub fn candidates<'a>(
    keys: &'a [VerificationKey],
    kid: Option<&str>,
    algorithm: Algorithm,
) -> Vec<&'a VerificationKey> {
    if let Some(kid) = kid {
        let by_kid: Vec<_> = keys
            .iter()
            .filter(|k| k.kid.as_deref() == Some(kid) && k.accepts(algorithm))
            .collect();
        if !by_kid.is_empty() {
            return by_kid;
        }
    }
    keys.iter().filter(|k| k.accepts(algorithm)).collect()
}

struct CachedKeys {
    keys: Arc<[VerificationKey]>,
    fetched_at: Instant,
}

/// Fetches remote key sets and caches them per issuer.
#[derive(Clone, Default)]
pub struct JwksFetcher {
    cache: Arc<RwLock<HashMap<String, CachedKeys>>>,
}

impl std::fmt::Debug for JwksFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwksFetcher").finish_non_exhaustive()
    }
}

impl JwksFetcher {
    /// Keys published at `options.uri`, from cache when fresh.
    ///
    /// # Errors
    ///
    /// - [`AuthError::MissingJwksUri`] / [`AuthError::InvalidJwksUri`] for a
    ///   missing or unparsable URI
    /// - [`AuthError::JwksStatus`] when the endpoint does not answer 200
    /// - [`AuthError::JwksFetch`] on transport failure or a malformed body
    pub async fn keys(&self, issuer: &str, options: &JwksUriOptions) -> Result<Arc<[VerificationKey]>> {
        let uri = options
            .uri
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| AuthError::MissingJwksUri(issuer.to_string()))?;
        let url = reqwest::Url::parse(uri).map_err(|_| AuthError::InvalidJwksUri(issuer.to_string()))?;

        let ttl = options.cache_ttl();
        if let Some(ttl) = ttl {
            if let Some(cached) = self.cache.read().await.get(issuer) {
                if cached.fetched_at.elapsed() < ttl {
                    tracing::trace!(issuer, "Using cached jwks");
                    return Ok(Arc::clone(&cached.keys));
                }
            }
        }

        let keys: Arc<[VerificationKey]> = fetch(issuer, url, options).await?.into();
        if ttl.is_some() {
            self.cache.write().await.insert(
                issuer.to_string(),
                CachedKeys {
                    keys: Arc::clone(&keys),
                    fetched_at: Instant::now(),
                },
            );
        }
        Ok(keys)
    }
}

async fn fetch(issuer: &str, url: reqwest::Url, options: &JwksUriOptions) -> Result<Vec<VerificationKey>> {
    let fetch_error = |reason: String| AuthError::JwksFetch {
        issuer: issuer.to_string(),
        reason,
    };

    // Only the configured proxy is used, never the environment's.
    let mut builder = reqwest::Client::builder().no_proxy();
    if let Some(proxy) = options.proxy.as_ref().and_then(crate::config::ProxyOptions::url) {
        tracing::debug!(issuer, uri = %url, proxy = %proxy, "Configuring proxy for jwks request");
        builder = builder.proxy(reqwest::Proxy::all(&proxy).map_err(|e| fetch_error(e.to_string()))?);
    }
    let client = builder.build().map_err(|e| fetch_error(e.to_string()))?;

    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| {
            tracing::error!(issuer, uri = %url, error = %e, "Error retrieving jwks");
            fetch_error(e.to_string())
        })?;

    let status = response.status();
    if status != reqwest::StatusCode::OK {
        let body = response.text().await.unwrap_or_default();
        tracing::error!(issuer, uri = %url, status = status.as_u16(), response = %body, "Error retrieving jwks");
        return Err(AuthError::JwksStatus {
            issuer: issuer.to_string(),
            status: status.as_u16(),
        });
    }

    let body: Value = response
        .json()
        .await
        .map_err(|e| fetch_error(format!("Invalid jwks response: {e}.")))?;
    let entries = body
        .get("keys")
        .and_then(Value::as_array)
        .ok_or_else(|| fetch_error("Invalid jwks response: missing 'keys'.".to_string()))?;

    let keys: Vec<_> = entries.iter().filter_map(VerificationKey::from_jwk).collect();
    tracing::debug!(issuer, uri = %url, count = keys.len(), "Fetched jwks");
    Ok(keys)
}
