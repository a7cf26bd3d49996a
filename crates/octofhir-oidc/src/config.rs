//! Token lifecycle configuration.
//!
//! [`OidcConfig`] is resolved once, with every default applied, and is never
//! mutated afterwards. Secrets (HMAC keys, signing keys) are not part of the
//! configuration; they are handed to the strategies at construction.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::AuthResult;
use crate::error::AuthError;

/// Root configuration of the token lifecycle core.
///
/// # Example (TOML)
///
/// ```toml
/// [oidc]
/// issuer = "https://auth.example.com"
/// refresh_token_scopes = ["offline_access", "offline"]
///
/// [oidc.lifespans]
/// access_token = "1h"
/// refresh_token = "90d"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OidcConfig {
    /// Issuer used for `at+jwt` access tokens and ID tokens.
    pub issuer: String,

    /// Global token lifespans.
    pub lifespans: LifespanConfig,

    /// Opaque token format.
    pub tokens: TokenFormatConfig,

    /// PKCE enforcement policy.
    pub pkce: PkceConfig,

    /// Scopes that make a grant eligible for refresh.
    /// An empty list means every grant may be refreshed.
    pub refresh_token_scopes: Vec<String>,

    /// How requested scopes are matched against allowed scopes.
    pub scope_strategy: ScopeStrategy,

    /// How requested audiences are matched against allowed audiences.
    pub audience_strategy: AudienceStrategy,

    /// JWT secured authorization response mode.
    pub jarm: JarmConfig,
}

impl Default for OidcConfig {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:8080".to_string(),
            lifespans: LifespanConfig::default(),
            tokens: TokenFormatConfig::default(),
            pkce: PkceConfig::default(),
            refresh_token_scopes: vec!["offline_access".to_string(), "offline".to_string()],
            scope_strategy: ScopeStrategy::default(),
            audience_strategy: AudienceStrategy::default(),
            jarm: JarmConfig::default(),
        }
    }
}

/// Global token lifespans. Client overrides take precedence.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct LifespanConfig {
    /// Access token lifespan.
    #[serde(with = "humantime_serde")]
    pub access_token: Duration,

    /// Refresh token lifespan. Zero means refresh tokens never expire.
    #[serde(with = "humantime_serde")]
    pub refresh_token: Duration,

    /// Authorization code lifespan.
    /// Codes should be short-lived for security.
    #[serde(with = "humantime_serde")]
    pub authorize_code: Duration,

    /// ID token lifespan.
    #[serde(with = "humantime_serde")]
    pub id_token: Duration,
}

impl Default for LifespanConfig {
    fn default() -> Self {
        Self {
            access_token: Duration::from_secs(3600),               // 1 hour
            refresh_token: Duration::from_secs(90 * 24 * 3600),   // 90 days
            authorize_code: Duration::from_secs(600),             // 10 minutes
            id_token: Duration::from_secs(3600),                  // 1 hour
        }
    }
}

/// Opaque token format.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenFormatConfig {
    /// Organization tag of issued tokens, e.g. `octo` in `octo_at_...`.
    pub prefix_organization: String,

    /// Foreign organization tag still accepted on presented tokens during a
    /// migration window.
    pub legacy_prefix_organization: Option<String>,

    /// Random key length in bytes. At least 32.
    pub entropy_bytes: usize,

    /// How the `scope` claim of JWT access tokens is rendered.
    pub jwt_scope_field: JwtScopeField,
}

impl Default for TokenFormatConfig {
    fn default() -> Self {
        Self {
            prefix_organization: "octo".to_string(),
            legacy_prefix_organization: Some("ory".to_string()),
            entropy_bytes: 32,
            jwt_scope_field: JwtScopeField::default(),
        }
    }
}

/// Rendering of the scope claim in JWT access tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JwtScopeField {
    /// `scope`: space separated string (RFC 9068).
    #[default]
    String,
    /// `scp`: JSON array.
    List,
    /// Both `scope` and `scp`.
    Both,
}

/// PKCE enforcement policy.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PkceConfig {
    /// Require a code challenge on every authorization code request.
    pub enforce: bool,

    /// Require a code challenge for public clients.
    pub enforce_for_public_clients: bool,

    /// Accept the `plain` challenge method.
    pub allow_plain: bool,
}

/// JARM configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct JarmConfig {
    /// Issuer of response JWTs. Falls back to the session's ID token issuer.
    pub issuer: Option<String>,

    /// Lifespan of response JWTs.
    #[serde(with = "humantime_serde")]
    pub lifespan: Duration,
}

impl Default for JarmConfig {
    fn default() -> Self {
        Self {
            issuer: None,
            lifespan: Duration::from_secs(600), // 10 minutes
        }
    }
}

// ============================================================================
// Scope Strategy
// ============================================================================

/// Scope matching strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeStrategy {
    /// The needle must equal one of the allowed scopes.
    Exact,
    /// An allowed scope `foo` also covers `foo.bar` and `foo.bar.baz`.
    #[default]
    Hierarchic,
    /// An allowed scope `foo.*` covers `foo.bar`; `*` matches one segment.
    Wildcard,
}

impl ScopeStrategy {
    /// Returns `true` if `needle` is covered by one of the `haystack` scopes.
    #[must_use]
    pub fn matches<S: AsRef<str>>(self, haystack: &[S], needle: &str) -> bool {
        haystack.iter().any(|allowed| {
            let allowed = allowed.as_ref();
            if allowed == needle {
                return true;
            }
            match self {
                Self::Exact => false,
                Self::Hierarchic => {
                    let allowed_parts: Vec<&str> = allowed.split('.').collect();
                    let needle_parts: Vec<&str> = needle.split('.').collect();
                    needle_parts.len() >= allowed_parts.len()
                        && allowed_parts.iter().zip(&needle_parts).all(|(a, n)| a == n)
                }
                Self::Wildcard => {
                    let allowed_parts: Vec<&str> = allowed.split('.').collect();
                    let needle_parts: Vec<&str> = needle.split('.').collect();
                    allowed_parts.len() == needle_parts.len()
                        && allowed_parts
                            .iter()
                            .zip(&needle_parts)
                            .all(|(a, n)| *a == "*" || a == n)
                }
            }
        })
    }
}

// ============================================================================
// Audience Strategy
// ============================================================================

/// Audience matching strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AudienceStrategy {
    /// Every requested audience must appear verbatim in the allowed list.
    Exact,
    /// Requested audiences are URLs: scheme and host must be equal and the
    /// requested path must start with the allowed path. Non-URL values fall
    /// back to exact comparison.
    #[default]
    Url,
}

impl AudienceStrategy {
    /// Validates every `needle` against the `haystack` of allowed audiences.
    ///
    /// # Errors
    ///
    /// Returns `invalid_request` naming the first audience that is not allowed.
    pub fn validate<H: AsRef<str>, N: AsRef<str>>(
        self,
        haystack: &[H],
        needles: &[N],
    ) -> AuthResult<()> {
        for needle in needles {
            let needle = needle.as_ref();
            let allowed = haystack.iter().any(|h| match self {
                Self::Exact => h.as_ref() == needle,
                Self::Url => audience_url_matches(h.as_ref(), needle),
            });
            if !allowed {
                return Err(AuthError::invalid_request(format!(
                    "Requested audience '{needle}' has not been whitelisted by the OAuth 2.0 Client."
                )));
            }
        }
        Ok(())
    }
}

fn audience_url_matches(allowed: &str, needle: &str) -> bool {
    if allowed == needle {
        return true;
    }
    let (Ok(allowed), Ok(needle)) = (url::Url::parse(allowed), url::Url::parse(needle)) else {
        return false;
    };
    allowed.scheme() == needle.scheme()
        && allowed.host_str() == needle.host_str()
        && allowed.port_or_known_default() == needle.port_or_known_default()
        && needle
            .path()
            .starts_with(allowed.path().trim_end_matches('/'))
}

// ============================================================================
// Validation
// ============================================================================

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl OidcConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if the issuer or the prefix organization
    /// is empty, and `ConfigError::InvalidValue` if:
    /// - The issuer is not an absolute URL
    /// - The access token, authorization code or ID token lifespan is zero
    /// - The token entropy is below 32 bytes
    /// - An organization tag contains characters other than ASCII alphanumerics
    /// - The legacy organization equals the canonical one
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.is_empty() {
            return Err(ConfigError::Missing("issuer".to_string()));
        }
        if url::Url::parse(&self.issuer).is_err() {
            return Err(ConfigError::InvalidValue(format!(
                "issuer must be an absolute URL, got '{}'",
                self.issuer
            )));
        }

        for (name, value) in [
            ("access_token", self.lifespans.access_token),
            ("authorize_code", self.lifespans.authorize_code),
            ("id_token", self.lifespans.id_token),
            ("jarm", self.jarm.lifespan),
        ] {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue(format!(
                    "{name} lifespan must be > 0"
                )));
            }
        }

        if self.tokens.entropy_bytes < 32 {
            return Err(ConfigError::InvalidValue(format!(
                "entropy_bytes must be >= 32, got {}",
                self.tokens.entropy_bytes
            )));
        }

        if self.tokens.prefix_organization.is_empty() {
            return Err(ConfigError::Missing("tokens.prefix_organization".to_string()));
        }
        validate_organization(&self.tokens.prefix_organization)?;
        if let Some(legacy) = &self.tokens.legacy_prefix_organization {
            validate_organization(legacy)?;
            if *legacy == self.tokens.prefix_organization {
                return Err(ConfigError::InvalidValue(
                    "legacy_prefix_organization must differ from prefix_organization".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Returns `true` if the granted scopes make the grant refreshable.
    #[must_use]
    pub fn is_refresh_eligible<S: AsRef<str>>(&self, granted: &[S]) -> bool {
        self.refresh_token_scopes.is_empty()
            || self
                .refresh_token_scopes
                .iter()
                .any(|s| granted.iter().any(|g| g.as_ref() == s))
    }
}

fn validate_organization(org: &str) -> Result<(), ConfigError> {
    if org.is_empty() || !org.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ConfigError::InvalidValue(format!(
            "Invalid token prefix organization: '{org}'. Must be ASCII alphanumeric"
        )));
    }
    Ok(())
}
