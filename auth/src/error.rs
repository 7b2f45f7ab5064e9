//! Error types for token verification.

use thiserror::Error;

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Reasons a token is rejected or a client is misconfigured.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    // ═══════════════════════════════════════════════════════════
    // Token Errors
    // ═══════════════════════════════════════════════════════════

    /// Credentials carried no token.
    #[error("Missing 'token' in credentials.")]
    MissingToken,

    /// Token is not a three-segment compact JWS.
    #[error("{0}")]
    MalformedToken(String),

    /// Payload carries no (or a blank) `iss` claim.
    #[error("Invalid JWT payload. Missing 'issuer'.")]
    MissingIssuer,

    /// No client is configured for the token's issuer.
    #[error("Invalid JWT issuer: {0}.")]
    UnknownIssuer(String),

    /// `exp` is in the past.
    #[error("Invalid JWT token: token expired.")]
    TokenExpired,

    /// No configured key verifies the signature.
    #[error("Invalid JWT token: no matching key for issuer: {0}.")]
    NoMatchingKey(String),

    /// Signature or claim validation failed.
    #[error("Invalid JWT token: {0}.")]
    InvalidToken(String),

    // ═══════════════════════════════════════════════════════════
    // Client Configuration Errors
    // ═══════════════════════════════════════════════════════════

    /// Client has neither inline keys nor a key set URI.
    #[error("Invalid configuration for issuer: {0}. Missing both 'jwks-uri' and 'jwks'.")]
    MissingKeys(String),

    /// `jwks-uri` has no `uri`.
    #[error("Invalid configuration for issuer: {0}. Missing 'uri' for 'jwks-uri'.")]
    MissingJwksUri(String),

    /// `jwks-uri.uri` does not parse.
    #[error("Invalid configuration for issuer: {0}. Invalid 'uri' property for 'jwks-uri'.")]
    InvalidJwksUri(String),

    /// An inline key cannot be used.
    #[error("Invalid configuration for issuer: {issuer}. {reason}")]
    InvalidKey {
        /// Issuer the key belongs to
        issuer: String,
        /// What is wrong with it
        reason: String,
    },

    /// The `clients` section does not deserialize.
    #[error("Invalid JWT client configuration: {0}")]
    Configuration(String),

    // ═══════════════════════════════════════════════════════════
    // Remote Key Set Errors
    // ═══════════════════════════════════════════════════════════

    /// The key set endpoint answered with a non-200 status.
    #[error("Error retrieving jwks for issuer: {issuer}. Status: {status}.")]
    JwksStatus {
        /// Issuer whose keys were requested
        issuer: String,
        /// HTTP status code
        status: u16,
    },

    /// The key set request failed or its body is not a key set.
    #[error("Error retrieving jwks for issuer: {issuer}. {reason}")]
    JwksFetch {
        /// Issuer whose keys were requested
        issuer: String,
        /// Transport or decoding failure
        reason: String,
    },

    // ═══════════════════════════════════════════════════════════
    // Unsupported
    // ═══════════════════════════════════════════════════════════

    /// The provider only verifies tokens.
    #[error("Unsupported operation: {0}.")]
    Unsupported(&'static str),
}

impl AuthError {
    /// Returns `true` if the token itself was rejected, as opposed to the
    /// provider being misconfigured or a key set being unreachable.
    ///
    /// # Examples
    ///
    /// ```
    /// # use launchpad_auth::AuthError;
    /// assert!(AuthError::TokenExpired.is_token_error());
    /// assert!(!AuthError::MissingKeys("foo".into()).is_token_error());
    /// ```
    #[must_use]
    pub const fn is_token_error(&self) -> bool {
        matches!(
            self,
            Self::MissingToken
                | Self::MalformedToken(_)
                | Self::MissingIssuer
                | Self::UnknownIssuer(_)
                | Self::TokenExpired
                | Self::NoMatchingKey(_)
                | Self::InvalidToken(_)
        )
    }
}
