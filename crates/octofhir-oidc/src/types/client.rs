//! OAuth 2.0 Client domain types.
//!
//! A [`Client`] is the registration as seen by the token lifecycle: what it
//! may request, how its tokens are shaped and how long they live. Registration
//! storage itself lives outside this crate.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{AudienceStrategy, ScopeStrategy};

// =============================================================================
// Grant Type
// =============================================================================

/// OAuth 2.0 grant types.
///
/// Defines the authorization flows a client is allowed to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    /// Authorization Code flow (with PKCE for public clients).
    AuthorizationCode,
    /// Client Credentials flow (confidential clients only).
    ClientCredentials,
    /// Refresh Token flow.
    RefreshToken,
}

impl GrantType {
    /// Returns the OAuth 2.0 grant_type parameter value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::ClientCredentials => "client_credentials",
            Self::RefreshToken => "refresh_token",
        }
    }

    /// Parses a grant_type parameter value.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "authorization_code" => Some(Self::AuthorizationCode),
            "client_credentials" => Some(Self::ClientCredentials),
            "refresh_token" => Some(Self::RefreshToken),
            _ => None,
        }
    }
}

impl std::fmt::Display for GrantType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Lifespans
// =============================================================================

/// Token whose lifespan is being resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifespanKind {
    AccessToken,
    RefreshToken,
    IdToken,
}

/// Lifespan overrides for tokens issued by one grant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GrantLifespans {
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub access_token: Option<Duration>,

    /// Zero means refresh tokens issued by this grant never expire.
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<Duration>,

    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub id_token: Option<Duration>,
}

impl GrantLifespans {
    fn get(&self, kind: LifespanKind) -> Option<Duration> {
        match kind {
            LifespanKind::AccessToken => self.access_token,
            LifespanKind::RefreshToken => self.refresh_token,
            LifespanKind::IdToken => self.id_token,
        }
    }
}

/// Per-grant lifespan overrides of a client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientLifespans {
    pub authorization_code_grant: GrantLifespans,
    pub client_credentials_grant: GrantLifespans,
    pub refresh_token_grant: GrantLifespans,
}

impl ClientLifespans {
    /// Returns the override for tokens of `kind` issued by `grant`, if any.
    #[must_use]
    pub fn get(&self, grant: GrantType, kind: LifespanKind) -> Option<Duration> {
        match grant {
            GrantType::AuthorizationCode => self.authorization_code_grant.get(kind),
            GrantType::ClientCredentials => self.client_credentials_grant.get(kind),
            GrantType::RefreshToken => self.refresh_token_grant.get(kind),
        }
    }
}

// =============================================================================
// Client
// =============================================================================

/// OAuth 2.0 Client registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    /// Unique client identifier used in OAuth flows.
    pub client_id: String,

    /// Human-readable display name.
    pub name: String,

    /// Whether this is a confidential client (can authenticate itself).
    pub confidential: bool,

    /// OAuth 2.0 grant types this client is allowed to use.
    pub grant_types: Vec<GrantType>,

    /// Response types this client may request at the authorization endpoint.
    #[serde(default)]
    pub response_types: Vec<String>,

    /// Allowed redirect URIs for authorization code flow.
    #[serde(default)]
    pub redirect_uris: Vec<String>,

    /// OAuth scopes this client is allowed to request.
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Audiences this client is allowed to request.
    #[serde(default)]
    pub audience: Vec<String>,

    /// Issue RFC 9068 JWT access tokens instead of opaque ones.
    #[serde(default)]
    pub jwt_profile_access_tokens: bool,

    /// On refresh, drop requested scopes outside the original grant instead
    /// of rejecting the request.
    #[serde(default)]
    pub refresh_flow_ignore_original_granted_scopes: bool,

    /// Require a PKCE challenge regardless of the global policy.
    #[serde(default)]
    pub require_pkce: bool,

    /// Pin the PKCE challenge method (`S256` or `plain`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pkce_challenge_method: Option<String>,

    /// Per-grant lifespan overrides.
    #[serde(default)]
    pub lifespans: ClientLifespans,

    /// JWS algorithm for JARM responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_signed_response_alg: Option<String>,

    /// Key ID for JARM responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_signed_response_key_id: Option<String>,
}

impl Client {
    /// Creates a public client that is allowed nothing.
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            name: String::new(),
            confidential: false,
            grant_types: Vec::new(),
            response_types: Vec::new(),
            redirect_uris: Vec::new(),
            scopes: Vec::new(),
            audience: Vec::new(),
            jwt_profile_access_tokens: false,
            refresh_flow_ignore_original_granted_scopes: false,
            require_pkce: false,
            pkce_challenge_method: None,
            lifespans: ClientLifespans::default(),
            authorization_signed_response_alg: None,
            authorization_signed_response_key_id: None,
        }
    }

    /// Validates the client configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the client configuration is invalid.
    pub fn validate(&self) -> Result<(), ClientValidationError> {
        if self.client_id.is_empty() {
            return Err(ClientValidationError::EmptyClientId);
        }

        if self.grant_types.is_empty() {
            return Err(ClientValidationError::NoGrantTypes);
        }

        // Public clients cannot use client_credentials
        if !self.confidential && self.grant_types.contains(&GrantType::ClientCredentials) {
            return Err(ClientValidationError::PublicClientCredentials);
        }

        // Authorization code flow requires redirect URIs
        if self.grant_types.contains(&GrantType::AuthorizationCode) && self.redirect_uris.is_empty()
        {
            return Err(ClientValidationError::NoRedirectUris);
        }

        if let Some(method) = &self.pkce_challenge_method {
            if method != "S256" && method != "plain" {
                return Err(ClientValidationError::UnsupportedPkceMethod(method.clone()));
            }
        }

        Ok(())
    }

    /// Returns `true` for clients that cannot keep a secret.
    #[must_use]
    pub fn is_public(&self) -> bool {
        !self.confidential
    }

    /// Checks if the given redirect URI is allowed for this client.
    #[must_use]
    pub fn is_redirect_uri_allowed(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|allowed| allowed == uri)
    }

    /// Checks if the given scope is allowed for this client under `strategy`.
    #[must_use]
    pub fn is_scope_allowed(&self, strategy: ScopeStrategy, scope: &str) -> bool {
        strategy.matches(&self.scopes, scope)
    }

    /// Validates requested audiences against the client's allowed audiences.
    ///
    /// # Errors
    ///
    /// Returns `invalid_request` for the first audience that is not allowed.
    pub fn validate_audience<S: AsRef<str>>(
        &self,
        strategy: AudienceStrategy,
        requested: &[S],
    ) -> crate::AuthResult<()> {
        strategy.validate(&self.audience, requested)
    }

    /// Checks if the given grant type is allowed for this client.
    #[must_use]
    pub fn is_grant_type_allowed(&self, grant_type: GrantType) -> bool {
        self.grant_types.contains(&grant_type)
    }

    /// Checks if the given response type is allowed for this client.
    #[must_use]
    pub fn is_response_type_allowed(&self, response_type: &str) -> bool {
        self.response_types.iter().any(|allowed| allowed == response_type)
    }

    /// Resolves the lifespan of a token of `kind` issued by `grant`.
    ///
    /// Client overrides take precedence over `fallback`.
    #[must_use]
    pub fn effective_lifespan(&self, grant: GrantType, kind: LifespanKind, fallback: Duration) -> Duration {
        self.lifespans.get(grant, kind).unwrap_or(fallback)
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Errors that can occur during client validation.
#[derive(Debug, thiserror::Error)]
pub enum ClientValidationError {
    /// Client ID cannot be empty.
    #[error("Client ID cannot be empty")]
    EmptyClientId,

    /// At least one grant type is required.
    #[error("At least one grant type is required")]
    NoGrantTypes,

    /// Public clients cannot use client_credentials grant.
    #[error("Public clients cannot use client_credentials grant")]
    PublicClientCredentials,

    /// Authorization code flow requires redirect URIs.
    #[error("Authorization code flow requires redirect URIs")]
    NoRedirectUris,

    /// The pinned PKCE method is not supported.
    #[error("Unsupported PKCE challenge method: {0}")]
    UnsupportedPkceMethod(String),
}

// =============================================================================
// Tests
// =============================================================================
