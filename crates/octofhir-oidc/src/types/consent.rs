//! Resource owner consent decisions.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// A resource owner's decision for one authorization transaction.
///
/// Created when the consent screen is shown and completed when the user
/// responds. It is never modified after the response is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRecord {
    /// Correlates the decision with one authorization request.
    pub challenge_id: Uuid,

    /// Client that asked for consent.
    pub client_id: String,

    /// Subject that gave (or refused) consent.
    pub subject: String,

    /// When the consent was requested.
    #[serde(with = "time::serde::rfc3339")]
    pub requested_at: OffsetDateTime,

    /// When the user responded, if they did.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub responded_at: Option<OffsetDateTime>,

    /// Whether the user authorized the request.
    #[serde(default)]
    pub granted: bool,

    #[serde(default)]
    pub requested_scopes: Vec<String>,
    #[serde(default)]
    pub granted_scopes: Vec<String>,
    #[serde(default)]
    pub requested_audience: Vec<String>,
    #[serde(default)]
    pub granted_audience: Vec<String>,
}

impl ConsentRecord {
    /// Starts a pending consent for `subject`.
    #[must_use]
    pub fn new(client_id: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            challenge_id: Uuid::new_v4(),
            client_id: client_id.into(),
            subject: subject.into(),
            requested_at: OffsetDateTime::now_utc(),
            responded_at: None,
            granted: false,
            requested_scopes: Vec::new(),
            granted_scopes: Vec::new(),
            requested_audience: Vec::new(),
            granted_audience: Vec::new(),
        }
    }

    /// Records the user's response.
    #[must_use]
    pub fn respond(mut self, granted: bool, scopes: Vec<String>, audience: Vec<String>) -> Self {
        self.responded_at = Some(OffsetDateTime::now_utc());
        self.granted = granted;
        if granted {
            self.granted_scopes = scopes;
            self.granted_audience = audience;
        }
        self
    }

    /// Returns `true` if the user responded and authorized the request.
    #[must_use]
    pub fn is_authorized(&self) -> bool {
        self.responded_at.is_some() && self.granted
    }

    /// Returns `true` if the consent was requested longer than `lifespan` ago.
    #[must_use]
    pub fn has_expired(&self, lifespan: Duration) -> bool {
        self.requested_at + lifespan < OffsetDateTime::now_utc()
    }
}
