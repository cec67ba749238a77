//! Shared types used across credsweep.
//!
//! This module defines the identity-provider target, the candidates under
//! test, the closed outcome taxonomy and the findings handed to result sinks.

use crate::error::{ConfigError, ConfigResult};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Default Azure AD seamless-SSO autologon host.
pub const DEFAULT_HOST: &str = "autologon.microsoftazuread-sso.com";

/// Default WS-Trust username/password endpoint path on the autologon host.
pub const DEFAULT_BASE_PATH: &str = "/winauth/trust/2005/usernamemixed";

/// Identity provider endpoint tested during a run.
///
/// Immutable for the lifetime of a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    /// Endpoint host, optionally with an explicit `http://` or `https://` scheme
    pub host: String,
    /// Path appended after the tenant domain
    pub base_path: String,
    /// Tenant domain, e.g. `contoso.com`
    pub domain: String,
}

impl Target {
    /// Create a target from its three parts.
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        base_path: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            base_path: base_path.into(),
            domain: domain.into(),
        }
    }

    /// Create a target for `domain` on the default autologon endpoint.
    #[must_use]
    pub fn for_domain(domain: impl Into<String>) -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_BASE_PATH, domain)
    }

    /// Full endpoint URL: `https://{host}/{domain}{base_path}`.
    ///
    /// A host that already carries a scheme is used as-is.
    #[must_use]
    pub fn endpoint_url(&self) -> String {
        let host = self.host.trim().trim_end_matches('/');
        let origin = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{host}")
        };

        let path = self.base_path.trim();
        if path.is_empty() || path.starts_with('/') {
            format!("{origin}/{}{path}", self.domain.trim())
        } else {
            format!("{origin}/{}/{path}", self.domain.trim())
        }
    }

    /// User principal name for `username` in this tenant.
    #[must_use]
    pub fn qualified_username(&self, username: &str) -> String {
        format!("{username}@{}", self.domain.trim())
    }

    /// Validate a tenant domain: non-blank and shaped like a DNS name.
    pub fn validate_domain(domain: &str) -> ConfigResult<()> {
        static DOMAIN_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex = DOMAIN_REGEX.get_or_init(|| {
            Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*$")
                .expect("valid regex")
        });

        let domain = domain.trim();
        if domain.is_empty() {
            return Err(ConfigError::BlankDomain);
        }

        if regex.is_match(domain) {
            Ok(())
        } else {
            Err(ConfigError::InvalidValue {
                field: "target.domain".to_string(),
                reason: format!("'{domain}' is not a valid domain name"),
            })
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.domain, self.host)
    }
}

/// Password under test. Wiped from memory on drop and redacted in `Debug`.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Password(String);

impl Password {
    /// Wrap a password string.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the plaintext password.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

/// One (username, password) pair under test.
///
/// `password` is `None` when only the existence of the username is being
/// confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Username without the tenant suffix
    pub username: String,
    /// Password, or `None` for the absent sentinel
    pub password: Option<Password>,
}

impl Candidate {
    /// Candidate with a password.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Some(Password::new(password)),
        }
    }

    /// Candidate that only re-confirms a username.
    #[must_use]
    pub fn username_only(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: None,
        }
    }
}

/// Classified result of testing one candidate against a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// Credential pair is fully valid
    Authenticated {
        /// Desktop SSO token issued by the provider
        sso_token: String,
    },
    /// Username exists, password is wrong
    ValidUserWrongPassword,
    /// Username exists but has no password in the directory
    ValidUserNoPasswordSet,
    /// Password is correct but an additional factor is required
    ValidUserMfaRequired,
    /// Username exists but the pass-through authentication window was exceeded
    ValidUserAuthWindowExceeded,
    /// Username does not exist
    InvalidUser,
    /// Account is locked by the provider
    AccountLocked,
    /// Response could not be mapped to a known outcome
    UnknownError {
        /// Raw provider error text
        raw: String,
    },
    /// Request never produced a response
    TransportFailure {
        /// Transport-level cause
        cause: String,
    },
}

impl Outcome {
    /// Fieldless kind of this outcome.
    #[must_use]
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Authenticated { .. } => OutcomeKind::Authenticated,
            Self::ValidUserWrongPassword => OutcomeKind::ValidUserWrongPassword,
            Self::ValidUserNoPasswordSet => OutcomeKind::ValidUserNoPasswordSet,
            Self::ValidUserMfaRequired => OutcomeKind::ValidUserMfaRequired,
            Self::ValidUserAuthWindowExceeded => OutcomeKind::ValidUserAuthWindowExceeded,
            Self::InvalidUser => OutcomeKind::InvalidUser,
            Self::AccountLocked => OutcomeKind::AccountLocked,
            Self::UnknownError { .. } => OutcomeKind::UnknownError,
            Self::TransportFailure { .. } => OutcomeKind::TransportFailure,
        }
    }

    /// Whether this outcome produces a finding.
    #[must_use]
    pub fn is_reportable(&self) -> bool {
        self.kind().is_reportable()
    }

    /// Whether this outcome proves the tested password correct.
    #[must_use]
    pub fn confirms_password(&self) -> bool {
        self.kind().confirms_password()
    }

    /// Whether no further passwords need to be tried for this username.
    #[must_use]
    pub fn resolves_user(&self) -> bool {
        matches!(
            self,
            Self::InvalidUser
                | Self::AccountLocked
                | Self::Authenticated { .. }
                | Self::ValidUserMfaRequired
        )
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownError { raw } => write!(f, "unknown error ({raw})"),
            Self::TransportFailure { cause } => write!(f, "transport failure ({cause})"),
            other => write!(f, "{}", other.kind().display_name()),
        }
    }
}

/// Fieldless mirror of [`Outcome`], used for counting and persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// See [`Outcome::Authenticated`]
    Authenticated,
    /// See [`Outcome::ValidUserWrongPassword`]
    ValidUserWrongPassword,
    /// See [`Outcome::ValidUserNoPasswordSet`]
    ValidUserNoPasswordSet,
    /// See [`Outcome::ValidUserMfaRequired`]
    ValidUserMfaRequired,
    /// See [`Outcome::ValidUserAuthWindowExceeded`]
    ValidUserAuthWindowExceeded,
    /// See [`Outcome::InvalidUser`]
    InvalidUser,
    /// See [`Outcome::AccountLocked`]
    AccountLocked,
    /// See [`Outcome::UnknownError`]
    UnknownError,
    /// See [`Outcome::TransportFailure`]
    TransportFailure,
}

impl OutcomeKind {
    /// Every kind, in taxonomy order.
    pub const ALL: [Self; 9] = [
        Self::Authenticated,
        Self::ValidUserWrongPassword,
        Self::ValidUserNoPasswordSet,
        Self::ValidUserMfaRequired,
        Self::ValidUserAuthWindowExceeded,
        Self::InvalidUser,
        Self::AccountLocked,
        Self::UnknownError,
        Self::TransportFailure,
    ];

    /// Stable identifier used in storage.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authenticated => "authenticated",
            Self::ValidUserWrongPassword => "valid_user_wrong_password",
            Self::ValidUserNoPasswordSet => "valid_user_no_password_set",
            Self::ValidUserMfaRequired => "valid_user_mfa_required",
            Self::ValidUserAuthWindowExceeded => "valid_user_auth_window_exceeded",
            Self::InvalidUser => "invalid_user",
            Self::AccountLocked => "account_locked",
            Self::UnknownError => "unknown_error",
            Self::TransportFailure => "transport_failure",
        }
    }

    /// Human-readable name.
    #[must_use]
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Authenticated => "valid credentials",
            Self::ValidUserWrongPassword => "valid user, wrong password",
            Self::ValidUserNoPasswordSet => "valid user without a password",
            Self::ValidUserMfaRequired => "valid credentials, MFA required",
            Self::ValidUserAuthWindowExceeded => {
                "valid user, pass-through authentication time exceeded"
            }
            Self::InvalidUser => "invalid user",
            Self::AccountLocked => "account locked",
            Self::UnknownError => "unknown error",
            Self::TransportFailure => "transport failure",
        }
    }

    /// Whether outcomes of this kind produce a finding.
    #[must_use]
    pub fn is_reportable(&self) -> bool {
        matches!(
            self,
            Self::Authenticated
                | Self::ValidUserWrongPassword
                | Self::ValidUserNoPasswordSet
                | Self::ValidUserMfaRequired
                | Self::ValidUserAuthWindowExceeded
        )
    }

    /// Whether outcomes of this kind prove the tested password correct.
    #[must_use]
    pub fn confirms_password(&self) -> bool {
        matches!(self, Self::Authenticated | Self::ValidUserMfaRequired)
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutcomeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown outcome kind '{s}'"))
    }
}

/// Per-kind outcome tally for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts(BTreeMap<OutcomeKind, u64>);

impl OutcomeCounts {
    /// Count one outcome of `kind`.
    pub fn record(&mut self, kind: OutcomeKind) {
        *self.0.entry(kind).or_insert(0) += 1;
    }

    /// Number of outcomes of `kind`.
    #[must_use]
    pub fn get(&self, kind: OutcomeKind) -> u64 {
        self.0.get(&kind).copied().unwrap_or(0)
    }

    /// Number of outcomes of any kind.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }
}

/// A reportable fact about one candidate, handed to a result sink.
#[derive(Debug, Clone)]
pub struct Finding {
    /// Target the candidate was tested against
    pub target: Target,
    /// Username that was tested
    pub username: String,
    /// Password, kept only when the outcome confirmed it
    pub password: Option<Password>,
    /// Outcome that made this candidate reportable
    pub outcome: Outcome,
    /// When the outcome was observed
    pub recorded_at: DateTime<Utc>,
}

impl Finding {
    /// Build the finding for `outcome`, or `None` when it is not reportable.
    ///
    /// The password is carried only for outcomes that confirm it.
    #[must_use]
    pub fn from_outcome(
        target: &Target,
        candidate: &Candidate,
        outcome: &Outcome,
        recorded_at: DateTime<Utc>,
    ) -> Option<Self> {
        if !outcome.is_reportable() {
            return None;
        }

        let password = if outcome.confirms_password() {
            candidate.password.clone()
        } else {
            None
        };

        Some(Self {
            target: target.clone(),
            username: candidate.username.clone(),
            password,
            outcome: outcome.clone(),
            recorded_at,
        })
    }

    /// Kind of the underlying outcome.
    #[must_use]
    pub fn kind(&self) -> OutcomeKind {
        self.outcome.kind()
    }

    /// SSO token, present for fully authenticated findings.
    #[must_use]
    pub fn sso_token(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Authenticated { sso_token } => Some(sso_token),
            _ => None,
        }
    }
}

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Every candidate was attempted or deliberately skipped
    Completed,
    /// Stopped after too many consecutive account lockouts
    AbortedLockout,
    /// Stopped after too many consecutive transport failures
    AbortedTransportErrors,
    /// Stopped by an external cancellation signal
    Cancelled,
}

impl RunStatus {
    /// Whether the run was stopped by policy.
    #[must_use]
    pub fn is_policy_abort(&self) -> bool {
        matches!(self, Self::AbortedLockout | Self::AbortedTransportErrors)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "Completed"),
            Self::AbortedLockout => write!(f, "AbortedLockout"),
            Self::AbortedTransportErrors => write!(f, "AbortedTransportErrors"),
            Self::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Completed" => Ok(Self::Completed),
            "AbortedLockout" => Ok(Self::AbortedLockout),
            "AbortedTransportErrors" => Ok(Self::AbortedTransportErrors),
            "Cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown run status '{other}'")),
        }
    }
}

/// Result of one scan run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Identifier of the run
    pub run_id: uuid::Uuid,
    /// Why the run ended
    pub reason: RunStatus,
    /// Candidates for which a request was issued
    pub attempted: u64,
    /// Candidates skipped because their username was already resolved
    pub skipped: u64,
    /// Findings accepted by the result sink
    pub findings: u64,
    /// Findings the result sink failed to record
    pub sink_errors: u64,
    /// Outcome tally
    pub outcome_counts: OutcomeCounts,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run ended
    pub finished_at: DateTime<Utc>,
}
