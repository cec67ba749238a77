//! `credsweep` - verify Azure AD credentials through the Seamless SSO
//! autologon endpoint.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

mod cli;
mod lists;
mod scan;

use clap::Parser;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cli::Cli;

/// Initialize tracing with environment filter.
fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,credsweep=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    info!("Starting credsweep v{}", env!("CARGO_PKG_VERSION"));

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping before the next request");
            interrupt.cancel();
        }
    });

    match scan::execute(&cli, cancel).await {
        Ok(report) => {
            print!("{}", report.text);
            ExitCode::from(scan::exit_code(report.summary.reason))
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
