//! Credsweep Scanner - Credential verification engine.
//!
//! This crate tests (username, password) candidates against the Azure AD
//! Seamless SSO autologon endpoint. It generates candidates, builds and
//! sends WS-Trust challenges, classifies each response into an
//! [`Outcome`](credsweep_core::Outcome), and forwards reportable outcomes to
//! a result sink while applying the lockout-avoidance policy.
//!
//! # Features
//!
//! - Username-major candidate generation with skip-ahead for resolved users
//! - Total outcome classification over the provider's error-code table
//! - Run aborts on consecutive lockouts or transport failures
//! - Optional per-username concurrency with cancellable pacing
//! - Pluggable challenge builders, transports and result sinks
//!
//! # Example
//!
//! ```rust,ignore
//! use credsweep_scanner::{
//!     AzureSsoChallengeBuilder, CandidateGenerator, HttpTransport, MemorySink, ScanCoordinator,
//! };
//! use std::sync::Arc;
//!
//! let coordinator = ScanCoordinator::new(
//!     Arc::new(AzureSsoChallengeBuilder::new()),
//!     Arc::new(HttpTransport::new(&config.transport)?),
//!     Arc::new(MemorySink::new()),
//! )
//! .with_policy(config.policy.clone());
//!
//! let candidates = CandidateGenerator::new(&usernames, &passwords);
//! let summary = coordinator.run(&target, &candidates).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod candidates;
pub mod challenge;
pub mod classifier;
pub mod coordinator;
#[allow(missing_docs)]
pub mod error;
#[allow(missing_docs)]
pub mod response;
pub mod sink;
pub mod transport;

// Re-export commonly used types
pub use candidates::{CandidateGenerator, Candidates};
pub use challenge::{AzureSsoChallengeBuilder, Challenge, ChallengeBuilder};
pub use classifier::{classify, classify_raw, ERROR_CODE_TABLE, UNPARSEABLE_RESPONSE};
pub use coordinator::ScanCoordinator;
pub use error::{Result, ScanError, SinkError, TransportError, TransportErrorKind};
pub use response::{AuthResponse, RawResponse};
pub use sink::{DatabaseSink, FanoutSink, MemorySink, ResultSink};
pub use transport::{HttpTransport, Transport};
