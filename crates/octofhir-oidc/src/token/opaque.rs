//! HMAC-signed opaque tokens.
//!
//! Issued tokens have the form
//!
//! ```text
//! <org>_<kind>_<base64url(key)>.<base64url(HMAC-SHA512/256(secret, key))>
//! ```
//!
//! where `kind` is `at`, `rt` or `ac`. The HMAC segment is the token's
//! signature: it is the only value persisted for lookup, and the prefix never
//! takes part in the cryptographic input.

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha512_256;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::config::OidcConfig;
use crate::error::AuthError;
use crate::request::{Request, TokenKind};

type HmacSha512_256 = Hmac<Sha512_256>;

/// Minimum HMAC secret length in bytes.
pub const MIN_SECRET_LENGTH: usize = 32;

/// Opaque token strategy.
#[derive(Clone)]
pub struct OpaqueStrategy {
    secret: Arc<Vec<u8>>,
    rotated_secrets: Arc<Vec<Vec<u8>>>,
    config: Arc<OidcConfig>,
}

impl std::fmt::Debug for OpaqueStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpaqueStrategy")
            .field("rotated_secrets", &self.rotated_secrets.len())
            .finish_non_exhaustive()
    }
}

impl OpaqueStrategy {
    /// Creates a strategy signing with `secret`.
    ///
    /// # Errors
    ///
    /// Returns `misconfiguration` if the secret is shorter than 32 bytes.
    pub fn new(secret: impl Into<Vec<u8>>, config: Arc<OidcConfig>) -> AuthResult<Self> {
        let secret = secret.into();
        check_secret(&secret)?;
        Ok(Self {
            secret: Arc::new(secret),
            rotated_secrets: Arc::new(Vec::new()),
            config,
        })
    }

    /// Adds previous secrets that are still accepted for validation.
    ///
    /// # Errors
    ///
    /// Returns `misconfiguration` if any secret is shorter than 32 bytes.
    pub fn with_rotated_secrets(mut self, secrets: Vec<Vec<u8>>) -> AuthResult<Self> {
        for secret in &secrets {
            check_secret(secret)?;
        }
        self.rotated_secrets = Arc::new(secrets);
        Ok(self)
    }

    /// Canonical prefix of `kind`, e.g. `octo_at_`.
    #[must_use]
    pub fn prefix(&self, kind: TokenKind) -> String {
        format!("{}_{}_", self.config.tokens.prefix_organization, kind.part())
    }

    fn legacy_prefix(&self, kind: TokenKind) -> Option<String> {
        self.config
            .tokens
            .legacy_prefix_organization
            .as_ref()
            .map(|org| format!("{org}_{}_", kind.part()))
    }

    /// Removes the longest matching canonical or legacy prefix.
    fn strip_prefix<'a>(&self, kind: TokenKind, token: &'a str) -> &'a str {
        let canonical = self.prefix(kind);
        let legacy = self.legacy_prefix(kind);
        let mut best: Option<&'a str> = None;
        for prefix in std::iter::once(canonical.as_str()).chain(legacy.as_deref()) {
            if let Some(rest) = token.strip_prefix(prefix) {
                if best.is_none_or(|b| rest.len() < b.len()) {
                    best = Some(rest);
                }
            }
        }
        best.unwrap_or(token)
    }

    /// Generates a token of `kind`, returning `(token, signature)`.
    ///
    /// # Errors
    ///
    /// Returns `server_error` if the random generator fails.
    pub fn generate(&self, kind: TokenKind) -> AuthResult<(String, String)> {
        let mut key = vec![0u8; self.config.tokens.entropy_bytes.max(MIN_SECRET_LENGTH)];
        OsRng.try_fill_bytes(&mut key).map_err(|e| {
            AuthError::server_error().with_debug(format!("Unable to read random bytes: {e}"))
        })?;

        let signature = URL_SAFE_NO_PAD.encode(self.sign(&self.secret, &key)?);
        let token = format!(
            "{}{}.{}",
            self.prefix(kind),
            URL_SAFE_NO_PAD.encode(&key),
            signature
        );
        Ok((token, signature))
    }

    /// Returns the signature segment of `token`. Tokens without a separator
    /// yield an empty signature, which never matches a stored one.
    #[must_use]
    pub fn signature(&self, kind: TokenKind, token: &str) -> String {
        self.strip_prefix(kind, token)
            .split_once('.')
            .map(|(_, signature)| signature.to_string())
            .unwrap_or_default()
    }

    /// Validates `token` against the request it was issued for.
    ///
    /// Expiry is checked before the signature so that an expired token is
    /// reported as such even when it was also tampered with.
    ///
    /// # Errors
    ///
    /// - `token_expired` if the session expiry (or, without one,
    ///   `requested_at` plus the configured lifespan) has passed
    /// - `invalid_token_format` if the token is malformed
    /// - `token_signature_mismatch` if no secret produces its signature
    pub fn validate(&self, kind: TokenKind, request: &Request, token: &str) -> AuthResult<()> {
        let now = OffsetDateTime::now_utc();

        match request.session.expires_at(kind) {
            Some(expires_at) if expires_at < now => {
                return Err(AuthError::token_expired(format!(
                    "The {} expired at {}.",
                    kind_label(kind),
                    expires_at.unix_timestamp()
                )));
            }
            Some(_) => {}
            None => {
                if let Some(lifespan) = self.fallback_lifespan(kind) {
                    if request.requested_at + lifespan < now {
                        return Err(AuthError::token_expired(format!(
                            "The {} expired.",
                            kind_label(kind)
                        )));
                    }
                }
            }
        }

        self.verify(kind, token)
    }

    /// Lifespan applied when the session carries no explicit expiry. Refresh
    /// tokens without an explicit expiry never expire.
    fn fallback_lifespan(&self, kind: TokenKind) -> Option<std::time::Duration> {
        match kind {
            TokenKind::AccessToken => Some(self.config.lifespans.access_token),
            TokenKind::AuthorizeCode => Some(self.config.lifespans.authorize_code),
            TokenKind::RefreshToken => None,
        }
    }

    fn verify(&self, kind: TokenKind, token: &str) -> AuthResult<()> {
        let malformed = || AuthError::invalid_token_format("The token is malformed.");

        let (key, signature) = self
            .strip_prefix(kind, token)
            .split_once('.')
            .ok_or_else(malformed)?;
        if key.is_empty() || signature.is_empty() {
            return Err(malformed());
        }
        let key = URL_SAFE_NO_PAD
            .decode(key)
            .map_err(|e| malformed().with_debug(e.to_string()))?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|e| malformed().with_debug(e.to_string()))?;

        let secrets = std::iter::once(self.secret.as_slice())
            .chain(self.rotated_secrets.iter().map(Vec::as_slice));
        for secret in secrets {
            let mut mac = HmacSha512_256::new_from_slice(secret)
                .map_err(|e| AuthError::server_error().with_debug(e.to_string()))?;
            mac.update(&key);
            if mac.verify_slice(&signature).is_ok() {
                return Ok(());
            }
        }

        Err(AuthError::token_signature_mismatch(
            "Token signature mismatch. Check that you provided a valid token in the right format.",
        ))
    }

    fn sign(&self, secret: &[u8], key: &[u8]) -> AuthResult<Vec<u8>> {
        let mut mac = HmacSha512_256::new_from_slice(secret)
            .map_err(|e| AuthError::server_error().with_debug(e.to_string()))?;
        mac.update(key);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

fn check_secret(secret: &[u8]) -> AuthResult<()> {
    if secret.len() < MIN_SECRET_LENGTH {
        return Err(AuthError::misconfiguration(format!(
            "The HMAC secret must be at least {MIN_SECRET_LENGTH} bytes long."
        )));
    }
    Ok(())
}

fn kind_label(kind: TokenKind) -> &'static str {
    match kind {
        TokenKind::AccessToken => "access token",
        TokenKind::RefreshToken => "refresh token",
        TokenKind::AuthorizeCode => "authorization code",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::session::Session;
    use crate::types::{Client, ClientLifespans, GrantType};

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn strategy() -> OpaqueStrategy {
        OpaqueStrategy::new(SECRET, Arc::new(OidcConfig::default())).unwrap()
    }

    fn request() -> Request {
        let client = Client {
            client_id: "app".to_string(),
            name: "App".to_string(),
            confidential: true,
            grant_types: vec![GrantType::RefreshToken],
            response_types: vec![],
            redirect_uris: vec![],
            scopes: vec![],
            audience: vec![],
            jwt_profile_access_tokens: false,
            refresh_flow_ignore_original_granted_scopes: false,
            require_pkce: false,
            pkce_challenge_method: None,
            lifespans: ClientLifespans::default(),
            authorization_signed_response_alg: None,
            authorization_signed_response_key_id: None,
        };
        Request::new(Arc::new(client), Session::new("alice"))
    }

    #[test]
    fn test_generate_and_validate() {
        let strategy = strategy();
        for kind in [TokenKind::AccessToken, TokenKind::RefreshToken, TokenKind::AuthorizeCode] {
            let (token, signature) = strategy.generate(kind).unwrap();
            assert!(token.starts_with(&format!("octo_{}_", kind.part())));
            assert_eq!(strategy.signature(kind, &token), signature);
            assert!(strategy.validate(kind, &request(), &token).is_ok());
        }
    }

    #[test]
    fn test_signature_is_not_valid_for_other_secret() {
        let (token, _) = strategy().generate(TokenKind::AccessToken).unwrap();
        let other = OpaqueStrategy::new(
            b"fedcba9876543210fedcba9876543210".to_vec(),
            Arc::new(OidcConfig::default()),
        )
        .unwrap();
        let err = other
            .validate(TokenKind::AccessToken, &request(), &token)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TokenSignatureMismatch);
    }

    #[test]
    fn test_rotated_secret_still_validates() {
        let (token, _) = strategy().generate(TokenKind::RefreshToken).unwrap();
        let rotated = OpaqueStrategy::new(
            b"fedcba9876543210fedcba9876543210".to_vec(),
            Arc::new(OidcConfig::default()),
        )
        .unwrap()
        .with_rotated_secrets(vec![SECRET.to_vec()])
        .unwrap();
        assert!(rotated.validate(TokenKind::RefreshToken, &request(), &token).is_ok());
    }

    #[test]
    fn test_legacy_prefix_is_stripped() {
        let strategy = strategy();
        let (token, signature) = strategy.generate(TokenKind::AccessToken).unwrap();
        let legacy = token.replacen("octo_at_", "ory_at_", 1);
        assert_eq!(strategy.signature(TokenKind::AccessToken, &legacy), signature);
        assert!(strategy.validate(TokenKind::AccessToken, &request(), &legacy).is_ok());

        let bare = token.replacen("octo_at_", "", 1);
        assert_eq!(strategy.signature(TokenKind::AccessToken, &bare), signature);
    }

    #[test]
    fn test_explicit_expiry_checked_before_signature() {
        let strategy = strategy();
        let mut request = request();
        request.session.set_expires_at(
            TokenKind::AccessToken,
            OffsetDateTime::now_utc() - time::Duration::minutes(1),
        );

        let err = strategy
            .validate(TokenKind::AccessToken, &request, "octo_at_garbage.garbage")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TokenExpired);
    }

    #[test]
    fn test_fallback_lifespan() {
        let strategy = strategy();
        let (token, _) = strategy.generate(TokenKind::AuthorizeCode).unwrap();
        let mut request = request();
        request.requested_at = OffsetDateTime::now_utc() - time::Duration::hours(2);

        let err = strategy
            .validate(TokenKind::AuthorizeCode, &request, &token)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TokenExpired);

        // Refresh tokens without an explicit expiry never expire.
        let (token, _) = strategy.generate(TokenKind::RefreshToken).unwrap();
        request.requested_at = OffsetDateTime::now_utc() - time::Duration::days(365);
        assert!(strategy.validate(TokenKind::RefreshToken, &request, &token).is_ok());
    }

    #[test]
    fn test_malformed_tokens() {
        let strategy = strategy();
        for token in ["", "octo_at_", "octo_at_abc", "octo_at_.sig", "octo_at_abc.", "octo_at_!!!.???"] {
            let err = strategy
                .validate(TokenKind::AccessToken, &request(), token)
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidTokenFormat, "token {token:?}");
        }
    }

    #[test]
    fn test_short_secret_rejected() {
        let err = OpaqueStrategy::new(b"short".to_vec(), Arc::new(OidcConfig::default())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Misconfiguration);
    }
}
