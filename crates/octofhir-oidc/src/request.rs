//! Requests and responses flowing through the grant handlers.
//!
//! [`Request`] is the value persisted per token signature: who asked, what
//! was requested, what was granted, and the session. [`AccessRequest`] and
//! [`AuthorizeRequest`] wrap it with endpoint-specific state and dereference
//! to it.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use url::Url;
use uuid::Uuid;

use crate::AuthResult;
use crate::claims::ClaimsRequests;
use crate::error::AuthError;
use crate::session::Session;
use crate::types::Client;

// ============================================================================
// Token Kind
// ============================================================================

/// Kind of token managed by the lifecycle core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    AccessToken,
    RefreshToken,
    AuthorizeCode,
}

impl TokenKind {
    /// Short tag used in the opaque token prefix.
    #[must_use]
    pub fn part(self) -> &'static str {
        match self {
            Self::AccessToken => "at",
            Self::RefreshToken => "rt",
            Self::AuthorizeCode => "ac",
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AccessToken => "access_token",
            Self::RefreshToken => "refresh_token",
            Self::AuthorizeCode => "authorize_code",
        }
    }

    /// Parses an RFC 7009 / RFC 7662 `token_type_hint`.
    #[must_use]
    pub fn from_hint(hint: &str) -> Option<Self> {
        match hint {
            "access_token" => Some(Self::AccessToken),
            "refresh_token" => Some(Self::RefreshToken),
            _ => None,
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn split_spaces(value: Option<&String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in value.map(String::as_str).unwrap_or_default().split_whitespace() {
        if !out.iter().any(|s| s == item) {
            out.push(item.to_string());
        }
    }
    out
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|s| s == value) {
        list.push(value.to_string());
    }
}

// ============================================================================
// Request
// ============================================================================

/// One authorization lifecycle as persisted alongside its tokens.
#[derive(Debug, Clone)]
pub struct Request {
    /// Identifier shared by every token of the lineage.
    pub id: String,
    pub requested_at: OffsetDateTime,
    pub client: Arc<Client>,
    pub requested_scopes: Vec<String>,
    pub granted_scopes: Vec<String>,
    pub requested_audience: Vec<String>,
    pub granted_audience: Vec<String>,
    pub form: HashMap<String, String>,
    pub session: Session,
}

impl Request {
    /// Creates a request with a fresh ID.
    #[must_use]
    pub fn new(client: Arc<Client>, session: Session) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            requested_at: OffsetDateTime::now_utc(),
            client,
            requested_scopes: Vec::new(),
            granted_scopes: Vec::new(),
            requested_audience: Vec::new(),
            granted_audience: Vec::new(),
            form: HashMap::new(),
            session,
        }
    }

    /// Creates a request from form parameters, reading `scope` and `audience`.
    #[must_use]
    pub fn from_form(client: Arc<Client>, form: HashMap<String, String>, session: Session) -> Self {
        let mut request = Self::new(client, session);
        request.requested_scopes = split_spaces(form.get("scope"));
        request.requested_audience = split_spaces(form.get("audience"));
        request.form = form;
        request
    }

    /// Returns a form parameter.
    #[must_use]
    pub fn form_value(&self, key: &str) -> Option<&str> {
        self.form.get(key).map(String::as_str)
    }

    pub fn set_requested_scopes<S: AsRef<str>>(&mut self, scopes: &[S]) {
        self.requested_scopes.clear();
        for scope in scopes {
            push_unique(&mut self.requested_scopes, scope.as_ref());
        }
    }

    pub fn set_requested_audience<S: AsRef<str>>(&mut self, audience: &[S]) {
        self.requested_audience.clear();
        for aud in audience {
            push_unique(&mut self.requested_audience, aud.as_ref());
        }
    }

    pub fn grant_scope(&mut self, scope: &str) {
        push_unique(&mut self.granted_scopes, scope);
    }

    pub fn grant_audience(&mut self, audience: &str) {
        push_unique(&mut self.granted_audience, audience);
    }

    #[must_use]
    pub fn has_granted_scope(&self, scope: &str) -> bool {
        self.granted_scopes.iter().any(|s| s == scope)
    }

    /// Merges `other` into this request. Identity, client, session and
    /// timestamp are taken from `other`; scopes, audiences and form values
    /// are accumulated.
    pub fn merge(&mut self, other: &Request) {
        for scope in &other.requested_scopes {
            push_unique(&mut self.requested_scopes, scope);
        }
        for scope in &other.granted_scopes {
            push_unique(&mut self.granted_scopes, scope);
        }
        for aud in &other.requested_audience {
            push_unique(&mut self.requested_audience, aud);
        }
        for aud in &other.granted_audience {
            push_unique(&mut self.granted_audience, aud);
        }
        for (key, value) in &other.form {
            self.form.insert(key.clone(), value.clone());
        }
        self.id.clone_from(&other.id);
        self.requested_at = other.requested_at;
        self.client = Arc::clone(&other.client);
        self.session = other.session.clone();
    }

    /// Returns a copy whose form keeps only the `allowed` parameters.
    #[must_use]
    pub fn sanitize(&self, allowed: &[&str]) -> Request {
        let mut copy = self.clone();
        copy.form.retain(|key, _| allowed.contains(&key.as_str()));
        copy
    }
}

// ============================================================================
// Access Request
// ============================================================================

/// Token endpoint request.
#[derive(Debug, Clone)]
pub struct AccessRequest {
    pub request: Request,
    pub grant_types: Vec<String>,
    pub handled_grant_types: Vec<String>,
}

impl AccessRequest {
    /// Creates a token request; `grant_type` is read from the form.
    #[must_use]
    pub fn new(client: Arc<Client>, form: HashMap<String, String>, session: Session) -> Self {
        let grant_types = split_spaces(form.get("grant_type"));
        Self {
            request: Request::from_form(client, form, session),
            grant_types,
            handled_grant_types: Vec::new(),
        }
    }

    /// Returns `true` if exactly `grant_type` was requested.
    #[must_use]
    pub fn is_exactly_grant_type(&self, grant_type: &str) -> bool {
        self.grant_types.len() == 1 && self.grant_types[0] == grant_type
    }

    pub fn mark_handled(&mut self, grant_type: &str) {
        push_unique(&mut self.handled_grant_types, grant_type);
    }
}

impl Deref for AccessRequest {
    type Target = Request;

    fn deref(&self) -> &Request {
        &self.request
    }
}

impl DerefMut for AccessRequest {
    fn deref_mut(&mut self) -> &mut Request {
        &mut self.request
    }
}

/// Token endpoint response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessResponse {
    pub access_token: String,
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AccessResponse {
    /// Sets the access token with the `bearer` token type.
    pub fn set_access_token(&mut self, token: String) {
        self.access_token = token;
        self.token_type = "bearer".to_string();
    }

    /// Sets `expires_in` from an absolute expiry.
    pub fn set_expires_at(&mut self, at: OffsetDateTime) {
        self.expires_in = Some((at - OffsetDateTime::now_utc()).whole_seconds().max(0));
    }

    pub fn set_scopes(&mut self, scopes: &[String]) {
        self.scope = Some(scopes.join(" "));
    }

    /// Returns the granted scopes as a list.
    #[must_use]
    pub fn scopes(&self) -> Vec<&str> {
        self.scope.as_deref().unwrap_or_default().split_whitespace().collect()
    }
}

// ============================================================================
// Authorize Request
// ============================================================================

/// Where and how the authorization response is delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseMode {
    /// Decided by the response type.
    #[default]
    #[serde(rename = "")]
    Default,
    #[serde(rename = "query")]
    Query,
    #[serde(rename = "fragment")]
    Fragment,
    #[serde(rename = "form_post")]
    FormPost,
    /// JARM mode decided by the response type.
    #[serde(rename = "jwt")]
    Jwt,
    #[serde(rename = "query.jwt")]
    QueryJwt,
    #[serde(rename = "fragment.jwt")]
    FragmentJwt,
    #[serde(rename = "form_post.jwt")]
    FormPostJwt,
}

impl ResponseMode {
    /// Parses a `response_mode` parameter.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "" => Some(Self::Default),
            "query" => Some(Self::Query),
            "fragment" => Some(Self::Fragment),
            "form_post" => Some(Self::FormPost),
            "jwt" => Some(Self::Jwt),
            "query.jwt" => Some(Self::QueryJwt),
            "fragment.jwt" => Some(Self::FragmentJwt),
            "form_post.jwt" => Some(Self::FormPostJwt),
            _ => None,
        }
    }

    /// Returns `true` for JARM modes.
    #[must_use]
    pub fn is_jwt(self) -> bool {
        matches!(
            self,
            Self::Jwt | Self::QueryJwt | Self::FragmentJwt | Self::FormPostJwt
        )
    }

    /// Resolves `Default` and `Jwt` to a concrete mode. Code flow answers
    /// in the query, every other flow in the fragment.
    #[must_use]
    pub fn resolve(self, code_flow: bool) -> Self {
        match (self, code_flow) {
            (Self::Default, true) => Self::Query,
            (Self::Default, false) => Self::Fragment,
            (Self::Jwt, true) => Self::QueryJwt,
            (Self::Jwt, false) => Self::FragmentJwt,
            (mode, _) => mode,
        }
    }
}

/// Authorization endpoint request.
#[derive(Debug, Clone)]
pub struct AuthorizeRequest {
    pub request: Request,
    pub response_types: Vec<String>,
    pub redirect_uri: Option<Url>,
    pub state: Option<String>,
    pub response_mode: ResponseMode,
    /// Parsed `claims` parameter.
    pub claims: ClaimsRequests,
    pub handled_response_types: Vec<String>,
}

impl AuthorizeRequest {
    /// Parses an authorization request.
    ///
    /// The redirect URI must be registered; when it is omitted and the client
    /// registered exactly one, that one is used.
    ///
    /// # Errors
    ///
    /// Returns `invalid_request` for an unknown response mode, a malformed
    /// `claims` parameter or an unregistered or malformed redirect URI, and
    /// `unsupported_response_type`
    /// when the client may not use the requested response type.
    pub fn new(client: Arc<Client>, form: HashMap<String, String>, session: Session) -> AuthResult<Self> {
        let response_types = split_spaces(form.get("response_type"));
        let joined = response_types.join(" ");
        if response_types.is_empty() {
            return Err(AuthError::unsupported_response_type(""));
        }
        if !client.response_types.is_empty() && !client.is_response_type_allowed(&joined) {
            return Err(AuthError::unsupported_response_type(joined));
        }

        let response_mode = match form.get("response_mode") {
            Some(mode) => ResponseMode::parse(mode).ok_or_else(|| {
                AuthError::invalid_request(format!("The response mode '{mode}' is not supported."))
            })?,
            None => ResponseMode::Default,
        };

        let redirect_uri = match form.get("redirect_uri") {
            Some(uri) if !client.is_redirect_uri_allowed(uri) => {
                return Err(AuthError::invalid_request(
                    "The 'redirect_uri' parameter does not match any of the registered redirect URIs.",
                ));
            }
            Some(uri) => Some(uri.as_str()),
            None if client.redirect_uris.len() == 1 => Some(client.redirect_uris[0].as_str()),
            None => None,
        };
        let redirect_uri = redirect_uri
            .map(Url::parse)
            .transpose()
            .map_err(|e| {
                AuthError::invalid_request("The 'redirect_uri' parameter is malformed.")
                    .with_debug(e.to_string())
            })?;

        let state = form.get("state").cloned();
        let claims = match form.get("claims") {
            Some(raw) => ClaimsRequests::parse(raw)?,
            None => ClaimsRequests::default(),
        };

        Ok(Self {
            request: Request::from_form(client, form, session),
            response_types,
            redirect_uri,
            state,
            response_mode,
            claims,
            handled_response_types: Vec::new(),
        })
    }

    /// Returns `true` if exactly `response_type` was requested.
    #[must_use]
    pub fn is_exactly_response_type(&self, response_type: &str) -> bool {
        self.response_types.len() == 1 && self.response_types[0] == response_type
    }

    #[must_use]
    pub fn has_response_type(&self, response_type: &str) -> bool {
        self.response_types.iter().any(|r| r == response_type)
    }

    pub fn set_response_type_handled(&mut self, response_type: &str) {
        push_unique(&mut self.handled_response_types, response_type);
    }

    #[must_use]
    pub fn did_handle_all_response_types(&self) -> bool {
        self.response_types
            .iter()
            .all(|r| self.handled_response_types.contains(r))
    }

    /// Response mode with `Default` and `Jwt` resolved.
    #[must_use]
    pub fn effective_response_mode(&self) -> ResponseMode {
        self.response_mode
            .resolve(self.is_exactly_response_type("code"))
    }
}

impl Deref for AuthorizeRequest {
    type Target = Request;

    fn deref(&self) -> &Request {
        &self.request
    }
}

impl DerefMut for AuthorizeRequest {
    fn deref_mut(&mut self) -> &mut Request {
        &mut self.request
    }
}

/// Authorization endpoint response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizeResponse {
    pub parameters: BTreeMap<String, String>,
    pub response_mode: ResponseMode,
}

impl AuthorizeResponse {
    pub fn add_parameter(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.parameters.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }
}
