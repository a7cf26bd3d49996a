//! OpenID Connect `claims` request parameter.
//!
//! The parameter is parsed once per authorization request and consulted when
//! ID token and userinfo claims are assembled. [`ClaimRequest::matches`] is
//! the single decision point for whether a concrete claim value satisfies a
//! requested constraint.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::AuthResult;
use crate::error::AuthError;

/// Tolerance used when comparing integer and floating point claim values.
const NUMBER_EPSILON: f64 = 1e-9;

/// Constraint on a single requested claim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimRequest {
    /// The client considers the claim required for its use case.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub essential: bool,

    /// The claim must have exactly this value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    /// The claim must have one of these values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<Value>>,
}

impl ClaimRequest {
    /// Checks `actual` against an optional request.
    ///
    /// A missing request matches nothing. A request without `value` and
    /// `values` matches any recognized type. Recognized types are numbers,
    /// strings and arrays of strings; anything else never matches.
    #[must_use]
    pub fn matches(request: Option<&Self>, actual: &Value) -> bool {
        let Some(request) = request else {
            return false;
        };

        match actual {
            Value::Number(_) | Value::String(_) => {
                request
                    .value
                    .as_ref()
                    .is_none_or(|expected| scalar_eq(expected, actual))
                    && request
                        .values
                        .as_ref()
                        .is_none_or(|set| set.iter().any(|expected| scalar_eq(expected, actual)))
            }
            Value::Array(items) => {
                let Some(actual_set) = items
                    .iter()
                    .map(Value::as_str)
                    .collect::<Option<Vec<&str>>>()
                else {
                    return false;
                };

                request.value.as_ref().is_none_or(|expected| {
                    expected
                        .as_str()
                        .is_some_and(|expected| actual_set.contains(&expected))
                }) && request.values.as_ref().is_none_or(|set| {
                    set.iter()
                        .filter_map(Value::as_str)
                        .any(|expected| actual_set.contains(&expected))
                })
            }
            _ => false,
        }
    }
}

fn scalar_eq(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::String(e), Value::String(a)) => e == a,
        (Value::Number(e), Value::Number(a)) => match (e.as_i64(), a.as_i64()) {
            (Some(e), Some(a)) => e == a,
            _ => match (e.as_f64(), a.as_f64()) {
                (Some(e), Some(a)) => (e - a).abs() < NUMBER_EPSILON,
                _ => false,
            },
        },
        _ => false,
    }
}

/// Where a requested claim should be released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimTarget {
    IdToken,
    Userinfo,
}

/// Parsed `claims` request parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimsRequests {
    /// Claims requested in the ID token.
    #[serde(
        default,
        deserialize_with = "deserialize_requests",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub id_token: BTreeMap<String, ClaimRequest>,

    /// Claims requested from the userinfo endpoint.
    #[serde(
        default,
        deserialize_with = "deserialize_requests",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub userinfo: BTreeMap<String, ClaimRequest>,
}

/// `"email": null` requests the claim without constraints.
fn deserialize_requests<'de, D>(deserializer: D) -> Result<BTreeMap<String, ClaimRequest>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, Option<ClaimRequest>>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(name, request)| (name, request.unwrap_or_default()))
        .collect())
}

impl ClaimsRequests {
    /// Parses the raw `claims` form value. An empty value yields no requests.
    ///
    /// # Errors
    ///
    /// Returns `invalid_request` if the value is not a valid claims object.
    pub fn parse(raw: &str) -> AuthResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(raw).map_err(|e| {
            AuthError::invalid_request("The 'claims' parameter is malformed.")
                .with_debug(e.to_string())
                .with_source(e)
        })
    }

    fn target(&self, target: ClaimTarget) -> &BTreeMap<String, ClaimRequest> {
        match target {
            ClaimTarget::IdToken => &self.id_token,
            ClaimTarget::Userinfo => &self.userinfo,
        }
    }

    /// Returns `true` if no claim was requested for either target.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.id_token.is_empty() && self.userinfo.is_empty()
    }

    /// Names of the claims marked essential for `target`.
    #[must_use]
    pub fn essential_claims(&self, target: ClaimTarget) -> Vec<&str> {
        self.target(target)
            .iter()
            .filter(|(_, request)| request.essential)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Names of every claim requested for `target`.
    #[must_use]
    pub fn requested_claim_names(&self, target: ClaimTarget) -> Vec<&str> {
        self.target(target).keys().map(String::as_str).collect()
    }

    /// Keeps the `available` claims that were requested for `target` and
    /// whose values satisfy the request.
    #[must_use]
    pub fn filter_claims(&self, target: ClaimTarget, available: &Map<String, Value>) -> Map<String, Value> {
        self.target(target)
            .iter()
            .filter_map(|(name, request)| {
                let value = available.get(name)?;
                ClaimRequest::matches(Some(request), value).then(|| (name.clone(), value.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn values(set: Value) -> ClaimRequest {
        ClaimRequest {
            values: serde_json::from_value(set).ok(),
            ..Default::default()
        }
    }

    #[test]
    fn test_none_never_matches() {
        assert!(!ClaimRequest::matches(None, &json!("a")));
        assert!(!ClaimRequest::matches(None, &json!(1)));
    }

    #[test]
    fn test_unconstrained_matches_recognized_types() {
        let request = ClaimRequest::default();
        assert!(ClaimRequest::matches(Some(&request), &json!("a")));
        assert!(ClaimRequest::matches(Some(&request), &json!(1.5)));
        assert!(ClaimRequest::matches(Some(&request), &json!(["a", "b"])));
        assert!(!ClaimRequest::matches(Some(&request), &json!(true)));
        assert!(!ClaimRequest::matches(Some(&request), &json!({"a": 1})));
        assert!(!ClaimRequest::matches(Some(&request), &Value::Null));
        assert!(!ClaimRequest::matches(Some(&request), &json!([1, 2])));
    }

    #[test]
    fn test_values_set_of_numbers() {
        let request = values(json!([1, 2]));
        assert!(ClaimRequest::matches(Some(&request), &json!(1)));
        assert!(ClaimRequest::matches(Some(&request), &json!(2)));
        assert!(!ClaimRequest::matches(Some(&request), &json!(3)));
    }

    #[test]
    fn test_number_comparison_is_tolerant() {
        let request = ClaimRequest {
            value: Some(json!(5)),
            ..Default::default()
        };
        assert!(ClaimRequest::matches(Some(&request), &json!(5.0)));
        assert!(!ClaimRequest::matches(Some(&request), &json!(5.5)));
        assert!(!ClaimRequest::matches(Some(&request), &json!("5")));
    }

    #[test]
    fn test_string_set_actual() {
        let request = ClaimRequest {
            value: Some(json!("admin")),
            ..Default::default()
        };
        assert!(ClaimRequest::matches(Some(&request), &json!(["dev", "admin"])));
        assert!(!ClaimRequest::matches(Some(&request), &json!(["dev"])));

        let request = values(json!(["ops", "admin"]));
        assert!(ClaimRequest::matches(Some(&request), &json!(["dev", "admin"])));
        assert!(!ClaimRequest::matches(Some(&request), &json!(["dev"])));
    }

    #[test]
    fn test_parse_claims_parameter() {
        let requests = ClaimsRequests::parse(
            r#"{"id_token": {"email": null, "acr": {"essential": true, "values": ["urn:mace:incommon:iap:silver"]}},
                "userinfo": {"groups": {"value": "admin"}}}"#,
        )
        .unwrap();

        assert_eq!(requests.essential_claims(ClaimTarget::IdToken), vec!["acr"]);
        assert_eq!(
            requests.requested_claim_names(ClaimTarget::IdToken),
            vec!["acr", "email"]
        );
        assert_eq!(
            requests.requested_claim_names(ClaimTarget::Userinfo),
            vec!["groups"]
        );
        assert!(ClaimsRequests::parse("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_malformed_claims() {
        let err = ClaimsRequests::parse("{not json").unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_request");
        assert!(err.debug().is_some());
    }

    #[test]
    fn test_filter_claims() {
        let requests = ClaimsRequests::parse(
            r#"{"userinfo": {"email": null, "groups": {"value": "admin"}, "missing": null}}"#,
        )
        .unwrap();
        let available = json!({
            "email": "john@example.com",
            "groups": ["dev"],
            "name": "John"
        });
        let Value::Object(available) = available else {
            unreachable!()
        };

        let filtered = requests.filter_claims(ClaimTarget::Userinfo, &available);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered["email"], json!("john@example.com"));
    }
}
