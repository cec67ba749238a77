//! Credsweep Core - Foundation crate for the credsweep credential scanner.
//!
//! This crate provides the shared data model, error handling and
//! configuration management that the scanner, storage and CLI crates
//! depend on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration and run validation
//! - [`types`] - Targets, candidates, outcomes, findings and run summaries
//!
//! # Example
//!
//! ```rust
//! use credsweep_core::{CredentialSource, RunConfiguration, ScanPolicy, Target};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RunConfiguration {
//!     target: Target::for_domain("contoso.com"),
//!     usernames: CredentialSource::List(vec!["alice".into(), "bob".into()]),
//!     passwords: CredentialSource::Literal("Winter2024".into()),
//!     policy: ScanPolicy::default(),
//! };
//! config.validate()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{
    AppConfig, CredentialSource, RunConfiguration, ScanPolicy, StorageConfig, TargetConfig,
    TransportConfig,
};
pub use error::{ConfigError, ConfigResult, CoreError, Result};
pub use types::{
    Candidate, Finding, Outcome, OutcomeCounts, OutcomeKind, Password, RunStatus, RunSummary,
    Target,
};
