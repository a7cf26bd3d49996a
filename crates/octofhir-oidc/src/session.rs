//! Session and claim views.
//!
//! A [`Session`] holds everything known about the authenticated subject for
//! one authorization lifecycle. Two claim sets are derived from it:
//!
//! - [`Session::id_token_claims`]: the full ID token claim set.
//! - [`Session::access_token_claims`]: the restricted set embedded in JWT
//!   access tokens. Only allow-listed claims are copied, and registered claim
//!   names never are.
//!
//! `Session` is `Clone` with owned maps and vectors only, so a clone is a full
//! deep copy. Refresh rotation relies on this to give each token generation
//! its own session.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::amr::AuthenticationMethods;
use crate::claims::ClaimRequest;
use crate::config::JwtScopeField;
use crate::error::AuthError;
use crate::request::{AuthorizeRequest, TokenKind};
use crate::types::ConsentRecord;

/// Namespace under which the session's extra map is embedded in tokens.
pub const CLAIM_EXTRA: &str = "ext";

/// Claims that are always rendered from dedicated fields and never copied
/// from the allow-list.
pub const REGISTERED_CLAIMS: &[&str] = &[
    "jti", "sid", "at_hash", "c_hash", "iat", "nbf", "rat", "exp", "auth_time", "iss", "sub",
    "nonce", "azp", "aud",
];

fn is_registered_claim(name: &str) -> bool {
    REGISTERED_CLAIMS.contains(&name)
}

fn unix(t: OffsetDateTime) -> Value {
    Value::from(t.unix_timestamp())
}

// ============================================================================
// ID Token Claims
// ============================================================================

/// OpenID Connect ID token claims.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdTokenClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,

    #[serde(default, rename = "iss")]
    pub issuer: String,

    #[serde(default, rename = "sub")]
    pub subject: String,

    #[serde(default, rename = "aud")]
    pub audience: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    #[serde(default, rename = "exp", with = "time::serde::timestamp::option")]
    pub expires_at: Option<OffsetDateTime>,

    #[serde(default, rename = "iat", with = "time::serde::timestamp::option")]
    pub issued_at: Option<OffsetDateTime>,

    #[serde(default, rename = "rat", with = "time::serde::timestamp::option")]
    pub requested_at: Option<OffsetDateTime>,

    #[serde(default, with = "time::serde::timestamp::option")]
    pub auth_time: Option<OffsetDateTime>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_hash: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub c_hash: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acr: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub amr: Vec<String>,

    /// Additional claims such as profile, email or groups.
    #[serde(default)]
    pub extra: Map<String, Value>,
}

impl IdTokenClaims {
    /// Renders the claims as one flat map. Registered claims win over extra
    /// claims of the same name.
    #[must_use]
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = self.extra.clone();

        if let Some(jti) = &self.jti {
            map.insert("jti".into(), Value::from(jti.as_str()));
        }
        if !self.issuer.is_empty() {
            map.insert("iss".into(), Value::from(self.issuer.as_str()));
        }
        if !self.subject.is_empty() {
            map.insert("sub".into(), Value::from(self.subject.as_str()));
        }
        if !self.audience.is_empty() {
            map.insert("aud".into(), Value::from(self.audience.clone()));
        }
        if let Some(nonce) = &self.nonce {
            map.insert("nonce".into(), Value::from(nonce.as_str()));
        }
        for (name, value) in [
            ("exp", self.expires_at),
            ("iat", self.issued_at),
            ("rat", self.requested_at),
            ("auth_time", self.auth_time),
        ] {
            if let Some(value) = value {
                map.insert(name.into(), unix(value));
            }
        }
        for (name, value) in [
            ("at_hash", &self.at_hash),
            ("c_hash", &self.c_hash),
            ("acr", &self.acr),
        ] {
            if let Some(value) = value {
                map.insert(name.into(), Value::from(value.as_str()));
            }
        }
        if !self.amr.is_empty() {
            map.insert("amr".into(), Value::from(self.amr.clone()));
        }

        map
    }
}

// ============================================================================
// JWT Access Token Claims
// ============================================================================

/// Claims of an RFC 9068 JWT access token.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JwtClaims {
    pub jti: Option<String>,
    pub issuer: Option<String>,
    pub subject: String,
    pub audience: Vec<String>,
    pub client_id: Option<String>,
    pub scope: Vec<String>,
    pub issued_at: Option<OffsetDateTime>,
    pub not_before: Option<OffsetDateTime>,
    pub expires_at: Option<OffsetDateTime>,
    pub extra: Map<String, Value>,
}

impl JwtClaims {
    /// Fills `jti`, `iat` and `iss` when they are unset.
    #[must_use]
    pub fn with_defaults(mut self, now: OffsetDateTime, issuer: &str) -> Self {
        if self.jti.is_none() {
            self.jti = Some(Uuid::new_v4().to_string());
        }
        if self.issued_at.is_none() {
            self.issued_at = Some(now);
        }
        if self.issuer.is_none() && !issuer.is_empty() {
            self.issuer = Some(issuer.to_string());
        }
        self
    }

    /// Renders the claims as a JWT payload.
    #[must_use]
    pub fn to_map(&self, scope_field: JwtScopeField) -> Map<String, Value> {
        let mut map = self.extra.clone();

        if let Some(jti) = &self.jti {
            map.insert("jti".into(), Value::from(jti.as_str()));
        }
        if let Some(issuer) = &self.issuer {
            map.insert("iss".into(), Value::from(issuer.as_str()));
        }
        map.insert("sub".into(), Value::from(self.subject.as_str()));
        map.insert("aud".into(), Value::from(self.audience.clone()));
        if let Some(client_id) = &self.client_id {
            map.insert("client_id".into(), Value::from(client_id.as_str()));
        }
        for (name, value) in [
            ("iat", self.issued_at),
            ("nbf", self.not_before),
            ("exp", self.expires_at),
        ] {
            if let Some(value) = value {
                map.insert(name.into(), unix(value));
            }
        }
        if matches!(scope_field, JwtScopeField::String | JwtScopeField::Both) {
            map.insert("scope".into(), Value::from(self.scope.join(" ")));
        }
        if matches!(scope_field, JwtScopeField::List | JwtScopeField::Both) {
            map.insert("scp".into(), Value::from(self.scope.clone()));
        }

        map
    }

    /// Parses a decoded JWT payload.
    ///
    /// `aud` may be a string or an array; the scope may arrive as a `scope`
    /// string or an `scp` array.
    ///
    /// # Errors
    ///
    /// Returns `token_claim` if a registered claim has the wrong type.
    pub fn from_map(mut map: Map<String, Value>) -> AuthResult<Self> {
        fn string(map: &mut Map<String, Value>, name: &str) -> AuthResult<Option<String>> {
            match map.remove(name) {
                None | Some(Value::Null) => Ok(None),
                Some(Value::String(s)) => Ok(Some(s)),
                Some(_) => Err(AuthError::token_claim(format!("Claim '{name}' must be a string."))),
            }
        }

        fn timestamp(map: &mut Map<String, Value>, name: &str) -> AuthResult<Option<OffsetDateTime>> {
            match map.remove(name) {
                None | Some(Value::Null) => Ok(None),
                Some(Value::Number(n)) => n
                    .as_i64()
                    .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
                    .map(Some)
                    .ok_or_else(|| {
                        AuthError::token_claim(format!("Claim '{name}' is not a valid timestamp."))
                    }),
                Some(_) => Err(AuthError::token_claim(format!("Claim '{name}' must be a number."))),
            }
        }

        fn strings(value: Value, name: &str) -> AuthResult<Vec<String>> {
            match value {
                Value::String(s) => Ok(vec![s]),
                Value::Array(items) => items
                    .into_iter()
                    .map(|item| match item {
                        Value::String(s) => Ok(s),
                        _ => Err(AuthError::token_claim(format!(
                            "Claim '{name}' must contain strings only."
                        ))),
                    })
                    .collect(),
                Value::Null => Ok(Vec::new()),
                _ => Err(AuthError::token_claim(format!("Claim '{name}' has an invalid type."))),
            }
        }

        let audience = match map.remove("aud") {
            Some(value) => strings(value, "aud")?,
            None => Vec::new(),
        };
        let scope = match (map.remove("scope"), map.remove("scp")) {
            (Some(Value::String(s)), _) => s.split_whitespace().map(str::to_string).collect(),
            (_, Some(value)) => strings(value, "scp")?,
            (Some(_), None) => {
                return Err(AuthError::token_claim("Claim 'scope' must be a string."));
            }
            (None, None) => Vec::new(),
        };

        Ok(Self {
            jti: string(&mut map, "jti")?,
            issuer: string(&mut map, "iss")?,
            subject: string(&mut map, "sub")?.unwrap_or_default(),
            client_id: string(&mut map, "client_id")?,
            issued_at: timestamp(&mut map, "iat")?,
            not_before: timestamp(&mut map, "nbf")?,
            expires_at: timestamp(&mut map, "exp")?,
            audience,
            scope,
            extra: map,
        })
    }
}

// ============================================================================
// Session
// ============================================================================

/// Claim container owned by one authorization lifecycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Subject identifier.
    pub subject: String,

    /// Login name of the subject, never put into tokens.
    #[serde(default)]
    pub username: String,

    /// Client the session was created for.
    #[serde(default)]
    pub client_id: String,

    /// ID token claims.
    #[serde(default)]
    pub claims: IdTokenClaims,

    /// Key ID used to sign the ID token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,

    /// Explicit expiry per token kind.
    #[serde(default)]
    pub expires_at: HashMap<TokenKind, OffsetDateTime>,

    /// Consent challenge this session originates from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge_id: Option<Uuid>,

    /// Extra ID token claims that may be copied into JWT access tokens.
    #[serde(default)]
    pub allowed_top_level_claims: Vec<String>,

    /// Session data embedded under `ext`.
    #[serde(default)]
    pub extra: Map<String, Value>,
}

/// Authentication context used by [`Session::from_consent`].
#[derive(Debug, Clone)]
pub struct SessionIdentity {
    pub issuer: String,
    pub key_id: Option<String>,
    pub username: String,
    pub amr: AuthenticationMethods,
    pub auth_time: OffsetDateTime,
    /// Profile claims released into the ID token.
    pub extra_claims: Map<String, Value>,
    pub allowed_top_level_claims: Vec<String>,
}

impl Session {
    /// Creates an empty session for `subject`.
    #[must_use]
    pub fn new(subject: impl Into<String>) -> Self {
        let subject = subject.into();
        Self {
            claims: IdTokenClaims {
                subject: subject.clone(),
                ..Default::default()
            },
            subject,
            ..Default::default()
        }
    }

    /// Assembles the session of an authorization request the user consented
    /// to. The client ID is always part of `aud`, and `azp` and `client_id`
    /// are set to it.
    ///
    /// Profile claims the `claims` parameter constrains for the ID token are
    /// withheld unless their value satisfies the constraint.
    #[must_use]
    pub fn from_consent(
        consent: &ConsentRecord,
        request: &AuthorizeRequest,
        identity: SessionIdentity,
    ) -> Self {
        let client_id = consent.client_id.clone();

        let mut audience = consent.granted_audience.clone();
        if !audience.contains(&client_id) {
            audience.push(client_id.clone());
        }

        let mut extra = identity.extra_claims;
        extra.retain(|name, value| {
            request
                .claims
                .id_token
                .get(name)
                .is_none_or(|constraint| ClaimRequest::matches(Some(constraint), value))
        });
        extra.insert("azp".into(), Value::from(client_id.as_str()));
        extra.insert("client_id".into(), Value::from(client_id.as_str()));

        Self {
            subject: consent.subject.clone(),
            username: identity.username,
            client_id: client_id.clone(),
            claims: IdTokenClaims {
                jti: Some(Uuid::new_v4().to_string()),
                issuer: identity.issuer,
                subject: consent.subject.clone(),
                audience,
                nonce: request.form_value("nonce").map(str::to_string),
                expires_at: None,
                issued_at: None,
                requested_at: Some(consent.requested_at),
                auth_time: Some(identity.auth_time),
                at_hash: None,
                c_hash: None,
                acr: None,
                amr: identity.amr.to_rfc8176().into_iter().map(str::to_string).collect(),
                extra,
            },
            key_id: identity.key_id,
            expires_at: HashMap::new(),
            challenge_id: Some(consent.challenge_id),
            allowed_top_level_claims: identity.allowed_top_level_claims,
            extra: Map::new(),
        }
    }

    /// Returns the explicit expiry of the token of `kind`.
    #[must_use]
    pub fn expires_at(&self, kind: TokenKind) -> Option<OffsetDateTime> {
        self.expires_at.get(&kind).copied()
    }

    /// Sets the explicit expiry of the token of `kind`, rounded to seconds.
    pub fn set_expires_at(&mut self, kind: TokenKind, at: OffsetDateTime) {
        self.expires_at.insert(kind, at.replace_nanosecond(0).unwrap_or(at));
    }

    /// Removes the explicit expiry of the token of `kind`.
    pub fn clear_expires_at(&mut self, kind: TokenKind) {
        self.expires_at.remove(&kind);
    }

    /// Full ID token claim set.
    #[must_use]
    pub fn id_token_claims(&self) -> Map<String, Value> {
        let mut map = self.claims.to_map();
        if !self.extra.is_empty() {
            map.insert(CLAIM_EXTRA.into(), Value::Object(self.extra.clone()));
        }
        map
    }

    /// Claim set embedded in JWT access tokens.
    ///
    /// Always carries `sub`, `exp`, `iat` and `client_id`. Extra ID token
    /// claims are copied only when allow-listed, `amr` included.
    #[must_use]
    pub fn access_token_claims(&self) -> JwtClaims {
        let mut extra = Map::new();

        for name in &self.allowed_top_level_claims {
            if is_registered_claim(name) {
                continue;
            }
            if name == "amr" {
                if !self.claims.amr.is_empty() {
                    extra.insert("amr".into(), Value::from(self.claims.amr.clone()));
                }
                continue;
            }
            if let Some(value) = self.claims.extra.get(name) {
                extra.insert(name.clone(), value.clone());
            }
        }

        if !self.extra.is_empty() {
            extra.insert(CLAIM_EXTRA.into(), Value::Object(self.extra.clone()));
        }

        JwtClaims {
            subject: self.subject.clone(),
            client_id: Some(self.client_id.clone()),
            issued_at: Some(OffsetDateTime::now_utc()),
            expires_at: self.expires_at(TokenKind::AccessToken),
            extra,
            ..Default::default()
        }
    }
}
