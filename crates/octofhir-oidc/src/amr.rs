//! Authentication Methods References (RFC 8176).
//!
//! Converts authentication evidence collected during login into the `amr`
//! claim vocabulary and back, and classifies it into factors and channels.
//!
//! # Example
//!
//! ```
//! use octofhir_oidc::amr::AuthenticationMethods;
//!
//! let amr = AuthenticationMethods::from_rfc8176(&["pwd", "sms"]);
//! assert!(amr.multi_factor());
//! assert_eq!(amr.to_rfc8176(), vec!["pwd", "sms", "mfa", "mca"]);
//! ```

use serde::{Deserialize, Serialize};

/// RFC 8176 code for password authentication.
pub const AMR_PASSWORD: &str = "pwd";
/// RFC 8176 code for one-time password authentication.
pub const AMR_ONE_TIME_PASSWORD: &str = "otp";
/// RFC 8176 code for out-of-band confirmation (push, SMS).
pub const AMR_OUT_OF_BAND: &str = "sms";
/// RFC 8176 code for a hardware-secured key.
pub const AMR_HARDWARE_KEY: &str = "hwk";
/// RFC 8176 code for a user presence test.
pub const AMR_USER_PRESENCE: &str = "user";
/// RFC 8176 code for a PIN or pattern verification.
pub const AMR_PERSONAL_IDENTIFICATION_NUMBER: &str = "pin";
/// RFC 8176 code for multiple-factor authentication.
pub const AMR_MULTI_FACTOR: &str = "mfa";
/// RFC 8176 code for multiple-channel authentication.
pub const AMR_MULTI_CHANNEL: &str = "mca";

/// Authentication evidence of one login.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationMethods {
    /// Username and password.
    pub password: bool,
    /// TOTP or HOTP code.
    pub otp: bool,
    /// Out-of-band confirmation such as a push notification.
    pub out_of_band: bool,
    /// WebAuthn or another hardware-backed credential.
    pub hardware_key: bool,
    /// The user demonstrated presence (e.g. touched the authenticator).
    pub user_presence: bool,
    /// The user was verified by the authenticator (PIN, biometric).
    pub user_verified: bool,
}

impl AuthenticationMethods {
    /// Parses RFC 8176 values. Synthetic (`mfa`, `mca`) and unknown values
    /// are ignored; they are derived, never stored.
    #[must_use]
    pub fn from_rfc8176<S: AsRef<str>>(values: &[S]) -> Self {
        let mut methods = Self::default();
        for value in values {
            match value.as_ref() {
                AMR_PASSWORD => methods.password = true,
                AMR_ONE_TIME_PASSWORD => methods.otp = true,
                AMR_OUT_OF_BAND => methods.out_of_band = true,
                AMR_HARDWARE_KEY => methods.hardware_key = true,
                AMR_USER_PRESENCE => methods.user_presence = true,
                AMR_PERSONAL_IDENTIFICATION_NUMBER => methods.user_verified = true,
                _ => {}
            }
        }
        methods
    }

    /// Renders the RFC 8176 values, one per flag, followed by `mfa` and `mca`
    /// when the derived predicates hold.
    #[must_use]
    pub fn to_rfc8176(&self) -> Vec<&'static str> {
        let mut values = Vec::with_capacity(8);
        for (set, code) in [
            (self.password, AMR_PASSWORD),
            (self.otp, AMR_ONE_TIME_PASSWORD),
            (self.out_of_band, AMR_OUT_OF_BAND),
            (self.hardware_key, AMR_HARDWARE_KEY),
            (self.user_presence, AMR_USER_PRESENCE),
            (self.user_verified, AMR_PERSONAL_IDENTIFICATION_NUMBER),
        ] {
            if set {
                values.push(code);
            }
        }
        if self.multi_factor() {
            values.push(AMR_MULTI_FACTOR);
        }
        if self.multi_channel() {
            values.push(AMR_MULTI_CHANNEL);
        }
        values
    }

    /// Something the user knows.
    #[must_use]
    pub fn knowledge_factor(&self) -> bool {
        self.password
    }

    /// Something the user has.
    #[must_use]
    pub fn possession_factor(&self) -> bool {
        self.otp || self.hardware_key || self.out_of_band
    }

    /// Knowledge and possession.
    #[must_use]
    pub fn multi_factor(&self) -> bool {
        self.knowledge_factor() && self.possession_factor()
    }

    /// Evidence collected through the browser.
    #[must_use]
    pub fn browser_channel(&self) -> bool {
        self.password || self.otp || self.hardware_key
    }

    /// Evidence collected through a separate service channel.
    #[must_use]
    pub fn service_channel(&self) -> bool {
        self.out_of_band
    }

    #[must_use]
    pub fn multi_channel(&self) -> bool {
        self.browser_channel() && self.service_channel()
    }
}
