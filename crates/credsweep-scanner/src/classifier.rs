//! Outcome classification for Azure AD autologon responses.
//!
//! Classification is a total function: every response maps to exactly one
//! [`Outcome`]. A non-empty SSO token always wins; otherwise the provider
//! error text is matched against [`ERROR_CODE_TABLE`], and anything that
//! matches no entry becomes [`Outcome::UnknownError`]. The HTTP status is
//! never consulted.

use crate::response::{AuthResponse, RawResponse};
use credsweep_core::Outcome;

/// Raw token reported when a response carries neither a token nor an error.
pub const UNPARSEABLE_RESPONSE: &str = "unparseable response";

/// Provider error-code prefixes and the outcome each one signals.
///
/// Prefixes are disjoint, so table order does not affect the result.
pub static ERROR_CODE_TABLE: [(&str, Outcome); 6] = [
    // Valid user, incorrect password
    ("AADSTS50126", Outcome::ValidUserWrongPassword),
    // User exists without a password in Azure AD
    ("AADSTS50056", Outcome::ValidUserNoPasswordSet),
    // Password accepted, MFA needed for this resource
    ("AADSTS50076", Outcome::ValidUserMfaRequired),
    // Maximum pass-through authentication time exceeded
    ("AADSTS50014", Outcome::ValidUserAuthWindowExceeded),
    ("AADSTS50034", Outcome::InvalidUser),
    ("AADSTS50053", Outcome::AccountLocked),
];

/// Classify the structured fields of a response.
#[must_use]
pub fn classify(response: &AuthResponse) -> Outcome {
    if let Some(token) = response
        .sso_token
        .as_deref()
        .map(str::trim)
        .filter(|token| !token.is_empty())
    {
        return Outcome::Authenticated {
            sso_token: token.to_string(),
        };
    }

    match response
        .error_text
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
    {
        Some(text) => ERROR_CODE_TABLE
            .iter()
            .find(|(prefix, _)| text.starts_with(prefix))
            .map_or_else(
                || Outcome::UnknownError {
                    raw: text.to_string(),
                },
                |(_, outcome)| outcome.clone(),
            ),
        None => Outcome::UnknownError {
            raw: UNPARSEABLE_RESPONSE.to_string(),
        },
    }
}

/// Parse and classify a delivered response.
#[must_use]
pub fn classify_raw(response: &RawResponse) -> Outcome {
    classify(&response.fields())
}
