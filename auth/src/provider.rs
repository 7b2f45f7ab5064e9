//! The configuration-driven JWT provider.

use crate::config::ClientOptions;
use crate::error::{AuthError, Result};
use crate::keys::{JwksFetcher, VerificationKey, candidates};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Header, Validation};
use launchpad_core::ConfigTree;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// An authenticated token holder.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    /// Token claims plus the raw token under `access_token`.
    pub principal: Value,
    /// Token claims plus the decoded claims under `accessToken`.
    pub attributes: Value,
}

impl User {
    fn from_claims(token: &str, claims: Map<String, Value>) -> Self {
        let mut principal = claims.clone();
        principal.insert("access_token".to_string(), Value::String(token.to_string()));

        let mut attributes = claims.clone();
        attributes.insert("accessToken".to_string(), Value::Object(claims));

        Self {
            principal: Value::Object(principal),
            attributes: Value::Object(attributes),
        }
    }

    /// A claim from the token.
    #[must_use]
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// The `sub` claim.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.claim("sub").and_then(Value::as_str)
    }

    /// The `iss` claim.
    #[must_use]
    pub fn issuer(&self) -> Option<&str> {
        self.claim("iss").and_then(Value::as_str)
    }

    /// The raw token.
    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.principal.get("access_token").and_then(Value::as_str)
    }
}

struct Inner {
    clients: HashMap<String, ClientOptions>,
    jwks: JwksFetcher,
}

/// Verifies tokens against the keys configured for their issuer.
///
/// The issuer is read from the unverified payload, then the token is
/// verified with that issuer's inline keys and remote key set. Audience is
/// not checked. The provider cannot issue tokens.
///
/// Cheap to clone.
#[derive(Clone)]
pub struct JwtAuthProvider {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for JwtAuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut issuers: Vec<_> = self.inner.clients.keys().collect();
        issuers.sort();
        f.debug_struct("JwtAuthProvider")
            .field("issuers", &issuers)
            .finish_non_exhaustive()
    }
}

impl JwtAuthProvider {
    /// A provider trusting `clients`. A later client with the same issuer
    /// replaces an earlier one.
    #[must_use]
    pub fn new(clients: impl IntoIterator<Item = ClientOptions>) -> Self {
        let clients = clients
            .into_iter()
            .map(|client| (client.issuer.clone(), client))
            .collect();
        Self {
            inner: Arc::new(Inner {
                clients,
                jwks: JwksFetcher::default(),
            }),
        }
    }

    /// A provider built from the `clients` array of `config`.
    ///
    /// Entries that are not objects, or that lack an `issuer`, are skipped.
    /// A missing `clients` array yields a provider trusting no one.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if an entry does not deserialize.
    pub fn from_config(config: &ConfigTree) -> Result<Self> {
        let mut clients = Vec::new();
        for entry in config.get_array("/clients").into_iter().flatten() {
            if !entry.is_object() {
                continue;
            }
            if entry.get("issuer").and_then(Value::as_str).is_none() {
                tracing::warn!(client = %entry, "Skipping JWT client without issuer");
                continue;
            }
            let client: ClientOptions = serde_json::from_value(entry.clone())
                .map_err(|e| AuthError::Configuration(e.to_string()))?;
            clients.push(client);
        }
        Ok(Self::new(clients))
    }

    /// Issuers this provider trusts.
    #[must_use]
    pub fn issuers(&self) -> Vec<&str> {
        let mut issuers: Vec<_> = self.inner.clients.keys().map(String::as_str).collect();
        issuers.sort_unstable();
        issuers
    }

    /// Verify `token` and return its holder.
    ///
    /// # Errors
    ///
    /// - [`AuthError::MalformedToken`] if the token does not decode
    /// - [`AuthError::MissingIssuer`] / [`AuthError::UnknownIssuer`]
    /// - client configuration errors for the token's issuer
    /// - [`AuthError::JwksStatus`] / [`AuthError::JwksFetch`] if the remote
    ///   key set cannot be retrieved
    /// - [`AuthError::TokenExpired`], [`AuthError::NoMatchingKey`] or
    ///   [`AuthError::InvalidToken`] if verification fails
    pub async fn authenticate(&self, token: &str) -> Result<User> {
        if token.trim().is_empty() {
            return Err(AuthError::MissingToken);
        }

        let (header, payload) = parse_unverified(token)?;
        let issuer = payload
            .get("iss")
            .and_then(Value::as_str)
            .filter(|iss| !iss.trim().is_empty())
            .ok_or(AuthError::MissingIssuer)?;

        let client = self
            .inner
            .clients
            .get(issuer)
            .ok_or_else(|| AuthError::UnknownIssuer(issuer.to_string()))?;

        let keys = self.keys_for(client).await?;
        let claims = verify(token, &header, issuer, &keys)?;
        tracing::debug!(issuer, sub = ?claims.get("sub"), "JWT authenticated");
        Ok(User::from_claims(token, claims))
    }

    /// Verify the `token` field of a credentials object.
    ///
    /// # Errors
    ///
    /// [`AuthError::MissingToken`] when there is no string `token` field,
    /// otherwise as [`authenticate`](Self::authenticate).
    pub async fn authenticate_json(&self, credentials: &Value) -> Result<User> {
        let token = credentials
            .get("token")
            .and_then(Value::as_str)
            .ok_or(AuthError::MissingToken)?;
        self.authenticate(token).await
    }

    /// Token issuance is not supported.
    ///
    /// # Errors
    ///
    /// Always returns [`AuthError::Unsupported`].
    pub fn generate_token(&self, _claims: &Value) -> Result<String> {
        Err(AuthError::Unsupported("generateToken"))
    }

    async fn keys_for(&self, client: &ClientOptions) -> Result<Vec<VerificationKey>> {
        let issuer = client.issuer.as_str();
        if client.jwks_uri.is_none() && client.jwks.is_empty() {
            return Err(AuthError::MissingKeys(issuer.to_string()));
        }

        let mut keys = client
            .jwks
            .iter()
            .map(|entry| VerificationKey::from_inline(issuer, entry))
            .collect::<Result<Vec<_>>>()?;

        if let Some(jwks_uri) = &client.jwks_uri {
            let remote = self.inner.jwks.keys(issuer, jwks_uri).await?;
            keys.extend(remote.iter().cloned());
        }
        Ok(keys)
    }
}

/// Split a compact JWS and decode its header and payload without
/// verifying anything.
fn parse_unverified(token: &str) -> Result<(Header, Map<String, Value>)> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(AuthError::MalformedToken(format!(
            "Not enough or too many segments [{}]",
            segments.len()
        )));
    }

    let header = jsonwebtoken::decode_header(token)
        .map_err(|e| AuthError::MalformedToken(format!("Invalid JWT header: {e}")))?;
    let payload = URL_SAFE_NO_PAD
        .decode(segments[1].trim_end_matches('='))
        .map_err(|e| AuthError::MalformedToken(format!("Invalid JWT payload: {e}")))?;
    let claims = match serde_json::from_slice(&payload) {
        Ok(Value::Object(claims)) => claims,
        Ok(_) => return Err(AuthError::MalformedToken("Invalid JWT payload: not an object".to_string())),
        Err(e) => return Err(AuthError::MalformedToken(format!("Invalid JWT payload: {e}"))),
    };
    Ok((header, claims))
}

fn validation(header: &Header) -> Validation {
    let mut validation = Validation::new(header.alg);
    validation.leeway = 0;
    validation.validate_aud = false;
    validation.validate_nbf = true;
    validation.required_spec_claims.clear();
    validation
}

/// Try each candidate key; the first that verifies wins. Expiry is
/// reported as soon as a key accepts the signature.
fn verify(
    token: &str,
    header: &Header,
    issuer: &str,
    keys: &[VerificationKey],
) -> Result<Map<String, Value>> {
    let validation = validation(header);
    let mut last_error = None;

    for key in candidates(keys, header.kid.as_deref(), header.alg) {
        match jsonwebtoken::decode::<Map<String, Value>>(token, &key.key, &validation) {
            Ok(data) => return Ok(data.claims),
            Err(e) => match e.kind() {
                ErrorKind::ExpiredSignature => return Err(AuthError::TokenExpired),
                ErrorKind::ImmatureSignature => {
                    return Err(AuthError::InvalidToken("token not yet valid".to_string()));
                }
                _ => last_error = Some(e),
            },
        }
    }

    Err(match last_error {
        Some(e) => AuthError::InvalidToken(e.to_string()),
        None => AuthError::NoMatchingKey(issuer.to_string()),
    })
}
