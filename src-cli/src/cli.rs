use crate::lists::read_list;
use anyhow::Result;
use clap::Parser;
use credsweep_core::{AppConfig, CredentialSource};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "credsweep",
    version,
    about = "Verify credentials against the Azure AD Seamless SSO autologon endpoint",
    long_about = None
)]
pub struct Cli {
    /// Target Azure AD tenant domain
    #[arg(short = 'd', long)]
    pub domain: Option<String>,

    /// Autologon endpoint host (a full `http://` origin is accepted for lab endpoints)
    #[arg(long)]
    pub host: Option<String>,

    /// Base path of the WS-Trust endpoint
    #[arg(long)]
    pub base_path: Option<String>,

    /// Single username to test
    #[arg(short = 'u', long, conflicts_with_all = ["user_file", "recheck_valid"])]
    pub username: Option<String>,

    /// File with one username per line
    #[arg(short = 'U', long, value_name = "PATH", conflicts_with = "recheck_valid")]
    pub user_file: Option<PathBuf>,

    /// Single password to test
    #[arg(short = 'p', long, conflicts_with_all = ["pass_file", "recheck_valid"])]
    pub password: Option<String>,

    /// File with one password per line
    #[arg(short = 'P', long, value_name = "PATH", conflicts_with = "recheck_valid")]
    pub pass_file: Option<PathBuf>,

    /// Pause between requests, in milliseconds
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// Consecutive account lockouts that abort the run
    #[arg(long)]
    pub max_lockouts: Option<u32>,

    /// Consecutive transport failures that abort the run
    #[arg(long)]
    pub max_transport_failures: Option<u32>,

    /// Keep testing passwords for a username after its status is known
    #[arg(long)]
    pub no_skip: bool,

    /// Usernames tested in parallel
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Request timeout, in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// SQLite database for findings
    #[arg(long, value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// Do not persist confirmed passwords in the database
    #[arg(long)]
    pub no_store_passwords: bool,

    /// Re-confirm usernames already stored as valid for the domain, without a password
    #[arg(long)]
    pub recheck_valid: bool,

    /// Configuration file (defaults to the platform config directory)
    #[arg(short = 'c', long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Layer command-line flags over the loaded configuration.
    pub fn apply_to(&self, config: &mut AppConfig) {
        if let Some(domain) = &self.domain {
            config.target.domain.clone_from(domain);
        }
        if let Some(host) = &self.host {
            config.target.host.clone_from(host);
        }
        if let Some(base_path) = &self.base_path {
            config.target.base_path.clone_from(base_path);
        }
        if let Some(delay) = self.delay_ms {
            config.policy.request_delay_ms = delay;
        }
        if let Some(max) = self.max_lockouts {
            config.policy.max_consecutive_lockouts = max;
        }
        if let Some(max) = self.max_transport_failures {
            config.policy.max_consecutive_transport_failures = max;
        }
        if self.no_skip {
            config.policy.skip_resolved_users = false;
        }
        if let Some(concurrency) = self.concurrency {
            config.policy.max_concurrent_users = concurrency;
        }
        if let Some(timeout) = self.timeout_secs {
            config.transport.timeout_secs = timeout;
        }
        if let Some(db) = &self.db {
            config.storage.database_path = Some(db.clone());
        }
        if self.no_store_passwords {
            config.storage.record_passwords = false;
        }
    }

    pub fn username_source(&self) -> Result<CredentialSource> {
        source(self.username.as_ref(), self.user_file.as_ref())
    }

    pub fn password_source(&self) -> Result<CredentialSource> {
        source(self.password.as_ref(), self.pass_file.as_ref())
    }
}

fn source(literal: Option<&String>, file: Option<&PathBuf>) -> Result<CredentialSource> {
    match (literal, file) {
        (Some(value), _) => Ok(CredentialSource::Literal(value.clone())),
        (None, Some(path)) => Ok(CredentialSource::List(read_list(path)?)),
        (None, None) => Ok(CredentialSource::default()),
    }
}
