//! JWT signing and verification.
//!
//! [`JwtSigner`] is a keyring: the first key signs by default, further keys
//! can be selected by key ID or algorithm (e.g. a client's
//! `authorization_signed_response_alg`) and are all accepted for
//! verification. Keys are picked for verification from the token header.
//!
//! ## Supported Algorithms
//!
//! - **RS256**: RSA with SHA-256 (widely compatible)
//! - **RS384**: RSA with SHA-384
//! - **ES384**: ECDSA with P-384 curve (smaller keys)
//!
//! ## Example
//!
//! ```ignore
//! use octofhir_oidc::token::jwt::{JwtSigner, SigningAlgorithm, SigningKeyPair};
//!
//! let signer = JwtSigner::new(SigningKeyPair::generate_rsa(SigningAlgorithm::RS256)?)
//!     .with_key(SigningKeyPair::generate_ec()?);
//!
//! let token = signer.encode(&claims, &JwtHeaderOptions::typed("at+jwt"))?;
//! let (header, claims) = signer.decode(&token)?;
//! ```

use std::fmt;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, decode_header, encode,
};
use p384::SecretKey as EcSecretKey;
use p384::ecdsa::SigningKey as EcSigningKey;
use p384::pkcs8::{DecodePrivateKey as EcDecodePrivateKey, EncodePrivateKey as EcEncodePrivateKey};
use rand::rngs::OsRng;
use rsa::RsaPrivateKey;
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use serde::Serialize;
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::error::AuthError;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during JWT operations.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Failed to encode a token.
    #[error("Failed to encode token: {message}")]
    EncodingError {
        /// Description of the encoding error.
        message: String,
    },

    /// The token is not a well-formed JWT.
    #[error("Failed to decode token: {message}")]
    DecodingError {
        /// Description of the decoding error.
        message: String,
    },

    /// The token has expired.
    #[error("Token expired")]
    Expired,

    /// The token signature is invalid.
    #[error("Invalid signature")]
    InvalidSignature,

    /// The token claims are invalid.
    #[error("Invalid claims: {message}")]
    InvalidClaims {
        /// Description of why claims are invalid.
        message: String,
    },

    /// No key of the keyring can verify or produce the token.
    #[error("Key not found: {kid}")]
    KeyNotFound {
        /// The key ID (or algorithm) that was not found.
        kid: String,
    },

    /// Failed to generate a cryptographic key.
    #[error("Key generation error: {message}")]
    KeyGenerationError {
        /// Description of the key generation error.
        message: String,
    },

    /// Invalid key format or data.
    #[error("Invalid key: {message}")]
    InvalidKey {
        /// Description of why the key is invalid.
        message: String,
    },
}

impl JwtError {
    /// Creates a new `EncodingError`.
    #[must_use]
    pub fn encoding_error(message: impl Into<String>) -> Self {
        Self::EncodingError {
            message: message.into(),
        }
    }

    /// Creates a new `DecodingError`.
    #[must_use]
    pub fn decoding_error(message: impl Into<String>) -> Self {
        Self::DecodingError {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidClaims` error.
    #[must_use]
    pub fn invalid_claims(message: impl Into<String>) -> Self {
        Self::InvalidClaims {
            message: message.into(),
        }
    }

    /// Creates a new `KeyNotFound` error.
    #[must_use]
    pub fn key_not_found(kid: impl Into<String>) -> Self {
        Self::KeyNotFound { kid: kid.into() }
    }

    /// Creates a new `KeyGenerationError`.
    #[must_use]
    pub fn key_generation_error(message: impl Into<String>) -> Self {
        Self::KeyGenerationError {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidKey` error.
    #[must_use]
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidToken
            | ErrorKind::InvalidAlgorithmName
            | ErrorKind::MissingAlgorithm
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => Self::decoding_error(err.to_string()),
            ErrorKind::InvalidAlgorithm => Self::key_not_found(err.to_string()),
            ErrorKind::InvalidAudience
            | ErrorKind::InvalidIssuer
            | ErrorKind::InvalidSubject
            | ErrorKind::ImmatureSignature
            | ErrorKind::MissingRequiredClaim(_) => Self::invalid_claims(err.to_string()),
            ErrorKind::InvalidRsaKey(_)
            | ErrorKind::InvalidEcdsaKey
            | ErrorKind::InvalidKeyFormat => Self::invalid_key(err.to_string()),
            _ => Self::decoding_error(err.to_string()),
        }
    }
}

/// Maps verification failures onto the token error taxonomy.
impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        let mapped = match &err {
            JwtError::DecodingError { .. } => {
                AuthError::invalid_token_format("The token is not a valid JWT.")
            }
            JwtError::InvalidSignature | JwtError::KeyNotFound { .. } => {
                AuthError::token_signature_mismatch("The token signature could not be verified.")
            }
            JwtError::Expired => AuthError::token_expired("The token has expired."),
            JwtError::InvalidClaims { .. } => {
                AuthError::token_claim("The token contains invalid claims.")
            }
            JwtError::EncodingError { .. }
            | JwtError::KeyGenerationError { .. }
            | JwtError::InvalidKey { .. } => {
                AuthError::request_unauthorized("The token could not be validated.")
            }
        };
        mapped.with_debug(err.to_string()).with_source(err)
    }
}

// ============================================================================
// Signing Algorithm
// ============================================================================

/// Supported signing algorithms for JWT tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigningAlgorithm {
    /// RSA with SHA-256 (widely compatible).
    RS256,
    /// RSA with SHA-384.
    RS384,
    /// ECDSA with P-384 curve.
    ES384,
}

impl SigningAlgorithm {
    /// Converts to the `jsonwebtoken` Algorithm type.
    #[must_use]
    pub fn to_jwt_algorithm(self) -> Algorithm {
        match self {
            Self::RS256 => Algorithm::RS256,
            Self::RS384 => Algorithm::RS384,
            Self::ES384 => Algorithm::ES384,
        }
    }

    /// Converts from the `jsonwebtoken` Algorithm type.
    #[must_use]
    pub fn from_jwt_algorithm(alg: Algorithm) -> Option<Self> {
        match alg {
            Algorithm::RS256 => Some(Self::RS256),
            Algorithm::RS384 => Some(Self::RS384),
            Algorithm::ES384 => Some(Self::ES384),
            _ => None,
        }
    }

    /// Parses the JWS `alg` name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "RS256" => Some(Self::RS256),
            "RS384" => Some(Self::RS384),
            "ES384" => Some(Self::ES384),
            _ => None,
        }
    }

    /// Returns the algorithm name as used in JWK/JWT headers.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::ES384 => "ES384",
        }
    }

    /// Returns `true` if this is an RSA-based algorithm.
    #[must_use]
    pub fn is_rsa(&self) -> bool {
        matches!(self, Self::RS256 | Self::RS384)
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Signing Key Pair
// ============================================================================

/// A signing key pair for JWT operations.
pub struct SigningKeyPair {
    /// Key ID.
    pub kid: String,

    /// Signing algorithm.
    pub algorithm: SigningAlgorithm,

    /// Encoding key (private key) for signing.
    encoding_key: EncodingKey,

    /// Decoding key (public key) for verification.
    decoding_key: DecodingKey,

    /// When the key was created.
    pub created_at: OffsetDateTime,
}

impl fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyPair")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

impl SigningKeyPair {
    /// Generates a new RSA key pair.
    ///
    /// # Arguments
    /// * `algorithm` - The signing algorithm (must be RS256 or RS384)
    ///
    /// # Errors
    /// Returns an error if key generation fails or algorithm is not RSA-based.
    pub fn generate_rsa(algorithm: SigningAlgorithm) -> Result<Self, JwtError> {
        if !algorithm.is_rsa() {
            return Err(JwtError::invalid_key(format!(
                "Algorithm {} is not RSA-based",
                algorithm
            )));
        }

        let private_key = RsaPrivateKey::new(&mut OsRng, 2048)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;

        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;
        let public_pem = private_key
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;

        Self::from_pem(
            uuid::Uuid::new_v4().to_string(),
            algorithm,
            &private_pem,
            &public_pem,
        )
    }

    /// Generates a new EC key pair using P-384 curve.
    ///
    /// # Errors
    /// Returns an error if key generation fails.
    pub fn generate_ec() -> Result<Self, JwtError> {
        let private_pem = EcSecretKey::random(&mut OsRng)
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;

        Self::from_pem(
            uuid::Uuid::new_v4().to_string(),
            SigningAlgorithm::ES384,
            &private_pem,
            "",
        )
    }

    /// Loads a key pair from PEM strings.
    ///
    /// # Arguments
    /// * `kid` - Key ID
    /// * `algorithm` - Signing algorithm
    /// * `private_pem` - PKCS#8 PEM-encoded private key
    /// * `public_pem` - PEM-encoded public key (RSA only; EC keys derive it)
    ///
    /// # Errors
    /// Returns an error if the PEM data is invalid.
    pub fn from_pem(
        kid: impl Into<String>,
        algorithm: SigningAlgorithm,
        private_pem: &str,
        public_pem: &str,
    ) -> Result<Self, JwtError> {
        let (encoding_key, decoding_key) = if algorithm.is_rsa() {
            let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
                .map_err(|e| JwtError::invalid_key(e.to_string()))?;
            let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
                .map_err(|e| JwtError::invalid_key(e.to_string()))?;
            (encoding_key, decoding_key)
        } else {
            let encoding_key = EncodingKey::from_ec_pem(private_pem.as_bytes())
                .map_err(|e| JwtError::invalid_key(e.to_string()))?;
            let secret_key = EcSecretKey::from_pkcs8_pem(private_pem)
                .map_err(|e| JwtError::invalid_key(e.to_string()))?;
            (encoding_key, ec_decoding_key(&secret_key)?)
        };

        Ok(Self {
            kid: kid.into(),
            algorithm,
            encoding_key,
            decoding_key,
            created_at: OffsetDateTime::now_utc(),
        })
    }
}

fn ec_decoding_key(secret_key: &EcSecretKey) -> Result<DecodingKey, JwtError> {
    let signing_key = EcSigningKey::from(secret_key);
    let point = signing_key.verifying_key().to_encoded_point(false);
    let x = point
        .x()
        .ok_or_else(|| JwtError::invalid_key("Missing x coordinate"))?;
    let y = point
        .y()
        .ok_or_else(|| JwtError::invalid_key("Missing y coordinate"))?;

    let x_b64 = URL_SAFE_NO_PAD.encode(x.as_slice());
    let y_b64 = URL_SAFE_NO_PAD.encode(y.as_slice());
    DecodingKey::from_ec_components(&x_b64, &y_b64).map_err(|e| JwtError::invalid_key(e.to_string()))
}

// ============================================================================
// JWT Signer
// ============================================================================

/// Header choices for one signing operation.
#[derive(Debug, Clone, Default)]
pub struct JwtHeaderOptions {
    /// `typ` header, e.g. `at+jwt`.
    pub typ: Option<String>,
    /// Sign with the key of this ID.
    pub kid: Option<String>,
    /// Sign with the first key of this algorithm.
    pub alg: Option<String>,
}

impl JwtHeaderOptions {
    #[must_use]
    pub fn typed(typ: impl Into<String>) -> Self {
        Self {
            typ: Some(typ.into()),
            ..Default::default()
        }
    }
}

/// Keyring for encoding and decoding JWT tokens.
///
/// This type is thread-safe (`Send + Sync`) and can be shared across
/// async tasks.
#[derive(Debug)]
pub struct JwtSigner {
    keys: Vec<SigningKeyPair>,
}

impl JwtSigner {
    /// Creates a keyring whose default signing key is `default_key`.
    #[must_use]
    pub fn new(default_key: SigningKeyPair) -> Self {
        Self {
            keys: vec![default_key],
        }
    }

    /// Adds a key usable for verification and explicit selection.
    #[must_use]
    pub fn with_key(mut self, key: SigningKeyPair) -> Self {
        self.keys.push(key);
        self
    }

    /// Returns the default signing key ID.
    #[must_use]
    pub fn current_kid(&self) -> &str {
        &self.keys[0].kid
    }

    fn signing_key(&self, options: &JwtHeaderOptions) -> Result<&SigningKeyPair, JwtError> {
        if let Some(kid) = &options.kid {
            return self
                .keys
                .iter()
                .find(|k| &k.kid == kid)
                .ok_or_else(|| JwtError::key_not_found(kid.clone()));
        }
        if let Some(alg) = &options.alg {
            let alg = SigningAlgorithm::parse(alg)
                .ok_or_else(|| JwtError::invalid_key(format!("Unsupported algorithm: {alg}")))?;
            return self
                .keys
                .iter()
                .find(|k| k.algorithm == alg)
                .ok_or_else(|| JwtError::key_not_found(alg.as_str()));
        }
        Ok(&self.keys[0])
    }

    /// Encodes claims into a JWT string.
    ///
    /// # Errors
    /// Returns an error if no matching key exists or encoding fails.
    pub fn encode<T: Serialize>(
        &self,
        claims: &T,
        options: &JwtHeaderOptions,
    ) -> Result<String, JwtError> {
        let key = self.signing_key(options)?;
        let mut header = Header::new(key.algorithm.to_jwt_algorithm());
        header.kid = Some(key.kid.clone());
        header.typ = options.typ.clone();

        encode(&header, claims, &key.encoding_key)
            .map_err(|e| JwtError::encoding_error(e.to_string()))
    }

    /// Decodes and validates a JWT string, returning its header and claims.
    ///
    /// The verifying key is chosen by the header's `kid`, or by its `alg`
    /// when no `kid` is present. `exp` is required; `aud` is validated by
    /// the caller.
    ///
    /// # Errors
    /// Returns an error if decoding or validation fails.
    pub fn decode(&self, token: &str) -> Result<(Header, Map<String, Value>), JwtError> {
        let header = decode_header(token).map_err(JwtError::from)?;
        let alg = SigningAlgorithm::from_jwt_algorithm(header.alg)
            .ok_or_else(|| JwtError::key_not_found(format!("{:?}", header.alg)))?;

        let key = match &header.kid {
            Some(kid) => self
                .keys
                .iter()
                .find(|k| &k.kid == kid && k.algorithm == alg)
                .ok_or_else(|| JwtError::key_not_found(kid.clone()))?,
            None => self
                .keys
                .iter()
                .find(|k| k.algorithm == alg)
                .ok_or_else(|| JwtError::key_not_found(alg.as_str()))?,
        };

        let mut validation = Validation::new(alg.to_jwt_algorithm());
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.validate_aud = false; // Audience validated at application layer

        let data = decode::<Map<String, Value>>(token, &key.decoding_key, &validation)?;
        Ok((data.header, data.claims))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(exp_offset: i64) -> Value {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        json!({"sub": "user123", "iat": now, "exp": now + exp_offset})
    }

    #[test]
    fn test_rs256_encode_decode() {
        let signer = JwtSigner::new(SigningKeyPair::generate_rsa(SigningAlgorithm::RS256).unwrap());

        let token = signer
            .encode(&claims(3600), &JwtHeaderOptions::typed("at+jwt"))
            .unwrap();
        assert_eq!(token.split('.').count(), 3);

        let (header, decoded) = signer.decode(&token).unwrap();
        assert_eq!(header.typ.as_deref(), Some("at+jwt"));
        assert_eq!(header.kid.as_deref(), Some(signer.current_kid()));
        assert_eq!(decoded["sub"], "user123");
    }

    #[test]
    fn test_es384_encode_decode() {
        let signer = JwtSigner::new(SigningKeyPair::generate_ec().unwrap());
        let token = signer
            .encode(&claims(3600), &JwtHeaderOptions::default())
            .unwrap();
        let (header, decoded) = signer.decode(&token).unwrap();
        assert_eq!(header.alg, Algorithm::ES384);
        assert_eq!(decoded["sub"], "user123");
    }

    #[test]
    fn test_select_key_by_algorithm() {
        let signer = JwtSigner::new(SigningKeyPair::generate_rsa(SigningAlgorithm::RS256).unwrap())
            .with_key(SigningKeyPair::generate_ec().unwrap());

        let options = JwtHeaderOptions {
            alg: Some("ES384".to_string()),
            ..Default::default()
        };
        let token = signer.encode(&claims(3600), &options).unwrap();
        let (header, _) = signer.decode(&token).unwrap();
        assert_eq!(header.alg, Algorithm::ES384);

        let options = JwtHeaderOptions {
            alg: Some("RS384".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            signer.encode(&claims(3600), &options),
            Err(JwtError::KeyNotFound { .. })
        ));
    }

    #[test]
    fn test_expired_token_rejected() {
        let signer = JwtSigner::new(SigningKeyPair::generate_rsa(SigningAlgorithm::RS256).unwrap());
        let token = signer
            .encode(&claims(-3600), &JwtHeaderOptions::default())
            .unwrap();

        let err = signer.decode(&token).unwrap_err();
        assert!(matches!(err, JwtError::Expired));
        assert_eq!(AuthError::from(err).kind(), crate::error::ErrorKind::TokenExpired);
    }

    #[test]
    fn test_foreign_key_rejected() {
        let signer1 = JwtSigner::new(SigningKeyPair::generate_rsa(SigningAlgorithm::RS256).unwrap());
        let signer2 = JwtSigner::new(SigningKeyPair::generate_rsa(SigningAlgorithm::RS256).unwrap());

        let token = signer1
            .encode(&claims(3600), &JwtHeaderOptions::default())
            .unwrap();
        let err = signer2.decode(&token).unwrap_err();
        assert!(matches!(err, JwtError::KeyNotFound { .. }));
        assert_eq!(
            AuthError::from(err).kind(),
            crate::error::ErrorKind::TokenSignatureMismatch
        );
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let signer = JwtSigner::new(SigningKeyPair::generate_rsa(SigningAlgorithm::RS256).unwrap());
        let token = signer
            .encode(&claims(3600), &JwtHeaderOptions::default())
            .unwrap();

        let other = signer
            .encode(&json!({"sub": "mallory", "exp": 4_000_000_000i64}), &JwtHeaderOptions::default())
            .unwrap();
        let mut parts: Vec<&str> = token.split('.').collect();
        let other_parts: Vec<&str> = other.split('.').collect();
        parts[1] = other_parts[1];

        let err = signer.decode(&parts.join(".")).unwrap_err();
        assert!(matches!(err, JwtError::InvalidSignature));
    }

    #[test]
    fn test_malformed_token() {
        let signer = JwtSigner::new(SigningKeyPair::generate_ec().unwrap());
        let err = signer.decode("not.a.jwt").unwrap_err();
        assert!(matches!(err, JwtError::DecodingError { .. }));
        assert_eq!(
            AuthError::from(err).kind(),
            crate::error::ErrorKind::InvalidTokenFormat
        );
    }

    #[test]
    fn test_not_yet_valid_token() {
        let signer = JwtSigner::new(SigningKeyPair::generate_ec().unwrap());
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let token = signer
            .encode(
                &json!({"sub": "a", "exp": now + 7200, "nbf": now + 3600}),
                &JwtHeaderOptions::default(),
            )
            .unwrap();
        let err = signer.decode(&token).unwrap_err();
        assert_eq!(AuthError::from(err).kind(), crate::error::ErrorKind::TokenClaim);
    }

    #[test]
    fn test_signing_algorithm_properties() {
        assert!(SigningAlgorithm::RS256.is_rsa());
        assert!(!SigningAlgorithm::ES384.is_rsa());
        assert_eq!(SigningAlgorithm::parse("RS384"), Some(SigningAlgorithm::RS384));
        assert_eq!(SigningAlgorithm::parse("HS256"), None);
        assert_eq!(SigningAlgorithm::ES384.to_string(), "ES384");
    }

    #[test]
    fn test_ec_key_loads_from_pkcs8_pem() {
        let private_pem = EcSecretKey::random(&mut OsRng)
            .to_pkcs8_pem(LineEnding::LF)
            .unwrap();
        let key = SigningKeyPair::from_pem("ec-1", SigningAlgorithm::ES384, &private_pem, "").unwrap();
        assert_eq!(key.kid, "ec-1");

        let signer = JwtSigner::new(key);
        let token = signer.encode(&claims(3600), &JwtHeaderOptions::default()).unwrap();
        let (header, decoded) = signer.decode(&token).unwrap();
        assert_eq!(header.alg, Algorithm::ES384);
        assert_eq!(header.kid.as_deref(), Some("ec-1"));
        assert_eq!(decoded["sub"], "user123");
    }

    #[test]
    fn test_rsa_key_loads_from_pem() {
        let private_key = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let private_pem = private_key.to_pkcs8_pem(LineEnding::LF).unwrap();
        let public_pem = private_key
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .unwrap();

        let key =
            SigningKeyPair::from_pem("rsa-1", SigningAlgorithm::RS384, &private_pem, &public_pem)
                .unwrap();
        let signer = JwtSigner::new(key);
        let token = signer.encode(&claims(3600), &JwtHeaderOptions::default()).unwrap();
        let (header, _) = signer.decode(&token).unwrap();
        assert_eq!(header.alg, Algorithm::RS384);
        assert_eq!(header.kid.as_deref(), Some("rsa-1"));
    }

    #[test]
    fn test_malformed_pem_is_invalid_key() {
        assert!(matches!(
            SigningKeyPair::from_pem("k", SigningAlgorithm::ES384, "not a pem", ""),
            Err(JwtError::InvalidKey { .. })
        ));
    }

    #[test]
    fn test_generate_rsa_requires_rsa_algorithm() {
        assert!(matches!(
            SigningKeyPair::generate_rsa(SigningAlgorithm::ES384),
            Err(JwtError::InvalidKey { .. })
        ));
    }
}
