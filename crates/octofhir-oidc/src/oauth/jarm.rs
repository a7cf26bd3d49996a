//! JWT Secured Authorization Response Mode (JARM).
//!
//! The authorization response parameters are wrapped into a signed JWT
//! addressed to the client, delivered as the single `response` parameter.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::config::OidcConfig;
use crate::error::AuthError;
use crate::session::Session;
use crate::token::jwt::{JwtHeaderOptions, JwtSigner};
use crate::types::Client;

/// Signs authorization responses for the JWT response modes.
#[derive(Debug, Clone)]
pub struct JarmEncoder {
    signer: Option<Arc<JwtSigner>>,
    config: Arc<OidcConfig>,
}

impl JarmEncoder {
    #[must_use]
    pub fn new(signer: Option<Arc<JwtSigner>>, config: Arc<OidcConfig>) -> Self {
        Self { signer, config }
    }

    /// Encodes `parameters` into a response JWT for `client`.
    ///
    /// The signing key is picked by the client's
    /// `authorization_signed_response_key_id`, then by its
    /// `authorization_signed_response_alg`, then the default key is used.
    ///
    /// # Errors
    ///
    /// Returns `misconfiguration` when no signer is configured, when no
    /// session is available, or when no issuer can be determined, and
    /// `server_error` when signing fails.
    pub fn encode(
        &self,
        client: &Client,
        session: Option<&Session>,
        parameters: &BTreeMap<String, String>,
    ) -> AuthResult<String> {
        let signer = self.signer.as_ref().ok_or_else(|| {
            AuthError::misconfiguration("The JARM response modes are not available.")
                .with_debug("No signing key is configured for JWT secured authorization responses.")
        })?;
        let session = session.ok_or_else(|| {
            AuthError::misconfiguration("The JARM response could not be created.")
                .with_debug("The authorization request carries no session.")
        })?;

        let issuer = match &self.config.jarm.issuer {
            Some(issuer) if !issuer.is_empty() => issuer.clone(),
            _ if !session.claims.issuer.is_empty() => session.claims.issuer.clone(),
            _ => {
                return Err(AuthError::misconfiguration("The JARM response could not be created.")
                    .with_debug("No issuer is configured and the ID token claims carry none."));
            }
        };

        let now = OffsetDateTime::now_utc();
        let expires_at = now + self.config.jarm.lifespan;

        let mut claims = Map::new();
        claims.insert("jti".to_string(), Value::String(Uuid::new_v4().to_string()));
        claims.insert("iss".to_string(), Value::String(issuer));
        claims.insert(
            "aud".to_string(),
            Value::Array(vec![Value::String(client.client_id.clone())]),
        );
        claims.insert("iat".to_string(), Value::from(now.unix_timestamp()));
        claims.insert("exp".to_string(), Value::from(expires_at.unix_timestamp()));
        for (key, value) in parameters {
            claims.insert(key.clone(), Value::String(value.clone()));
        }

        let options = JwtHeaderOptions {
            kid: client.authorization_signed_response_key_id.clone(),
            alg: client.authorization_signed_response_alg.clone(),
            ..Default::default()
        };
        signer.encode(&claims, &options).map_err(|e| {
            AuthError::server_error()
                .with_debug(e.to_string())
                .with_source(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::token::jwt::{SigningAlgorithm, SigningKeyPair};

    fn signer() -> Arc<JwtSigner> {
        let ec = SigningKeyPair::generate_ec().unwrap();
        let rsa = SigningKeyPair::generate_rsa(SigningAlgorithm::RS256).unwrap();
        Arc::new(JwtSigner::new(ec).with_key(rsa))
    }

    fn parameters() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("code".to_string(), "octo_ac_abc.def".to_string()),
            ("state".to_string(), "xyz".to_string()),
        ])
    }

    fn session(issuer: &str) -> Session {
        let mut session = Session::new("alice");
        session.claims.issuer = issuer.to_string();
        session
    }

    #[test]
    fn test_response_claims() {
        let signer = signer();
        let encoder = JarmEncoder::new(Some(signer.clone()), Arc::new(OidcConfig::default()));
        let client = Client::new("app");

        let jwt = encoder
            .encode(&client, Some(&session("https://id.example.com")), &parameters())
            .unwrap();
        let (header, claims) = signer.decode(&jwt).unwrap();

        assert_eq!(header.kid.as_deref(), Some(signer.current_kid()));
        assert_eq!(claims["iss"], "https://id.example.com");
        assert_eq!(claims["aud"], serde_json::json!(["app"]));
        assert_eq!(claims["code"], "octo_ac_abc.def");
        assert_eq!(claims["state"], "xyz");
        let lifetime = claims["exp"].as_i64().unwrap() - claims["iat"].as_i64().unwrap();
        assert_eq!(lifetime, 600);
    }

    #[test]
    fn test_configured_issuer_takes_precedence() {
        let signer = signer();
        let mut config = OidcConfig::default();
        config.jarm.issuer = Some("https://jarm.example.com".to_string());
        let encoder = JarmEncoder::new(Some(signer.clone()), Arc::new(config));

        let jwt = encoder
            .encode(&Client::new("app"), Some(&session("https://id.example.com")), &parameters())
            .unwrap();
        let (_, claims) = signer.decode(&jwt).unwrap();
        assert_eq!(claims["iss"], "https://jarm.example.com");
    }

    #[test]
    fn test_client_selects_algorithm() {
        let signer = signer();
        let encoder = JarmEncoder::new(Some(signer.clone()), Arc::new(OidcConfig::default()));
        let client = Client {
            authorization_signed_response_alg: Some("RS256".to_string()),
            ..Client::new("app")
        };

        let jwt = encoder
            .encode(&client, Some(&session("https://id.example.com")), &parameters())
            .unwrap();
        let (header, _) = signer.decode(&jwt).unwrap();
        assert_eq!(header.alg, jsonwebtoken::Algorithm::RS256);
    }

    #[test]
    fn test_misconfiguration() {
        let config = Arc::new(OidcConfig::default());
        let client = Client::new("app");

        let without_signer = JarmEncoder::new(None, config.clone());
        let err = without_signer
            .encode(&client, Some(&session("https://id.example.com")), &parameters())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Misconfiguration);

        let encoder = JarmEncoder::new(Some(signer()), config);
        let err = encoder.encode(&client, None, &parameters()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Misconfiguration);

        let err = encoder
            .encode(&client, Some(&session("")), &parameters())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Misconfiguration);
    }
}
