//! One scan, from configuration to printed report.

use crate::cli::Cli;
use anyhow::{Context, Result};
use credsweep_core::{
    AppConfig, CredentialSource, Finding, OutcomeKind, Password, RunConfiguration, RunStatus,
    RunSummary,
};
use credsweep_db::{findings, runs, Database};
use credsweep_scanner::{
    AzureSsoChallengeBuilder, CandidateGenerator, DatabaseSink, FanoutSink, HttpTransport,
    MemorySink, ScanCoordinator,
};
use std::fmt::Write as _;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Exit status for a finished run.
#[must_use]
pub fn exit_code(reason: RunStatus) -> u8 {
    if reason.is_policy_abort() {
        2
    } else if reason == RunStatus::Cancelled {
        130
    } else {
        0
    }
}

/// A finished run and its printable report.
#[derive(Debug)]
pub struct ScanReport {
    pub summary: RunSummary,
    pub text: String,
}

/// Load configuration, run the scan and render the report.
pub async fn execute(cli: &Cli, cancel: CancellationToken) -> Result<ScanReport> {
    let mut config =
        AppConfig::load_with_env(cli.config.as_deref()).context("failed to load configuration")?;
    cli.apply_to(&mut config);

    let db = match &config.storage.database_path {
        Some(path) => Some(
            Database::open_and_migrate(path)
                .await
                .with_context(|| format!("failed to open database {}", path.display()))?,
        ),
        None => None,
    };

    let target = config.target.to_target();
    let (usernames, passwords) = if cli.recheck_valid {
        let db = db
            .as_ref()
            .context("--recheck-valid needs a findings database (--db or storage.database_path)")?;
        let known = findings::list_valid_usernames(db.pool(), &target.domain).await?;
        tracing::info!(
            "Re-checking {} known valid user(s) for {}",
            known.len(),
            target.domain
        );
        (CredentialSource::List(known), CredentialSource::default())
    } else {
        (cli.username_source()?, cli.password_source()?)
    };

    let run = RunConfiguration {
        target,
        usernames,
        passwords,
        policy: config.policy.clone(),
    };
    run.validate().context("invalid run configuration")?;

    let candidates = if cli.recheck_valid {
        CandidateGenerator::existence_checks(&run.usernames)
    } else {
        CandidateGenerator::new(&run.usernames, &run.passwords)
    };
    if candidates.is_empty() {
        tracing::warn!("No candidates to test: both a username and a password source are needed");
    }

    let run_id = Uuid::new_v4();
    let memory = Arc::new(MemorySink::new());
    let mut sink = FanoutSink::default().with(memory.clone());
    if let Some(db) = &db {
        runs::create_run(db.pool(), run_id, &run.target).await?;
        sink = sink.with(Arc::new(DatabaseSink::new(
            db.clone(),
            run_id,
            config.storage.record_passwords,
        )));
    }

    let coordinator = ScanCoordinator::new(
        Arc::new(AzureSsoChallengeBuilder::new()),
        Arc::new(HttpTransport::new(&config.transport)?),
        Arc::new(sink),
    )
    .with_policy(run.policy.clone())
    .with_cancellation(cancel);

    let summary = coordinator
        .run_with_id(run_id, &run.target, &candidates)
        .await?;

    let mut text = render_report(&summary, &memory.findings().await);
    if let Some(db) = db {
        runs::finish_run(db.pool(), &summary).await?;
        if cli.recheck_valid {
            let stored = findings::list_confirmed_credentials(db.pool(), &run.target.domain).await?;
            text.push_str(&render_stored_credentials(&run.target.domain, &stored));
        }
        db.close().await;
    }

    Ok(ScanReport { summary, text })
}

/// Human-readable report of a run and its findings.
#[must_use]
pub fn render_report(summary: &RunSummary, findings: &[Finding]) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Run {}: {}", summary.run_id, summary.reason);
    let _ = writeln!(
        out,
        "  attempted: {}  skipped: {}  findings: {}  sink errors: {}",
        summary.attempted, summary.skipped, summary.findings, summary.sink_errors
    );
    for kind in OutcomeKind::ALL {
        let count = summary.outcome_counts.get(kind);
        if count > 0 {
            let _ = writeln!(out, "  {}: {}", kind.display_name(), count);
        }
    }

    let (confirmed, valid): (Vec<&Finding>, Vec<&Finding>) =
        findings.iter().partition(|f| f.kind().confirms_password());

    if !confirmed.is_empty() {
        let _ = writeln!(out, "Confirmed credentials:");
        for finding in confirmed {
            let password = finding.password.as_ref().map_or("", |p| p.expose());
            let _ = writeln!(
                out,
                "  {}\\{}:{} ({})",
                finding.target.domain,
                finding.username,
                password,
                finding.kind().display_name()
            );
        }
    }

    if !valid.is_empty() {
        let _ = writeln!(out, "Valid users:");
        for finding in valid {
            let _ = writeln!(
                out,
                "  {}\\{} ({})",
                finding.target.domain,
                finding.username,
                finding.kind().display_name()
            );
        }
    }

    out
}

/// Credentials confirmed for `domain` by earlier runs.
#[must_use]
pub fn render_stored_credentials(domain: &str, stored: &[(String, Option<Password>)]) -> String {
    let mut out = String::new();
    if stored.is_empty() {
        return out;
    }

    let _ = writeln!(out, "Stored credentials:");
    for (username, password) in stored {
        let _ = match password {
            Some(password) => writeln!(out, "  {domain}\\{username}:{}", password.expose()),
            None => writeln!(out, "  {domain}\\{username} (password not stored)"),
        };
    }

    out
}
