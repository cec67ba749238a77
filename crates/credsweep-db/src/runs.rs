//! Scan run records.

use crate::error::{DatabaseError, Result};
use chrono::{DateTime, Utc};
use credsweep_core::{RunStatus, RunSummary, Target};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

const IN_PROGRESS: &str = "InProgress";

/// A stored scan run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRun {
    /// Run identifier
    pub id: String,
    /// Tenant domain scanned
    pub domain: String,
    /// Endpoint host scanned
    pub host: String,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run ended (if finished)
    pub finished_at: Option<DateTime<Utc>>,
    /// Terminal status, `None` while the run is in progress
    pub status: Option<RunStatus>,
    /// Candidates attempted
    pub attempted: u64,
    /// Candidates skipped
    pub skipped: u64,
    /// Findings recorded
    pub findings: u64,
    /// Findings that failed to record
    pub sink_errors: u64,
}

/// Create a run record in the in-progress state.
pub async fn create_run(pool: &SqlitePool, run_id: Uuid, target: &Target) -> Result<ScanRun> {
    let id = run_id.to_string();
    let started_at = Utc::now();

    sqlx::query(
        "INSERT INTO scan_runs (id, domain, host, started_at, status)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&target.domain)
    .bind(&target.host)
    .bind(started_at.to_rfc3339())
    .bind(IN_PROGRESS)
    .execute(pool)
    .await?;

    Ok(ScanRun {
        id,
        domain: target.domain.clone(),
        host: target.host.clone(),
        started_at,
        finished_at: None,
        status: None,
        attempted: 0,
        skipped: 0,
        findings: 0,
        sink_errors: 0,
    })
}

/// Store the terminal summary of a run.
pub async fn finish_run(pool: &SqlitePool, summary: &RunSummary) -> Result<()> {
    let result = sqlx::query(
        "UPDATE scan_runs
         SET finished_at = ?, status = ?, attempted = ?, skipped = ?, findings = ?, sink_errors = ?
         WHERE id = ?",
    )
    .bind(summary.finished_at.to_rfc3339())
    .bind(summary.reason.to_string())
    .bind(to_i64(summary.attempted))
    .bind(to_i64(summary.skipped))
    .bind(to_i64(summary.findings))
    .bind(to_i64(summary.sink_errors))
    .bind(summary.run_id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound(format!(
            "Scan run '{}' not found",
            summary.run_id
        )));
    }

    Ok(())
}

/// Fetch a run by id.
pub async fn get_run(pool: &SqlitePool, run_id: &str) -> Result<Option<ScanRun>> {
    let row = sqlx::query(
        "SELECT id, domain, host, started_at, finished_at, status, attempted, skipped, findings, sink_errors
         FROM scan_runs WHERE id = ?",
    )
    .bind(run_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let status: String = row.try_get("status")?;
    let status = if status == IN_PROGRESS {
        None
    } else {
        Some(status.parse::<RunStatus>().map_err(DatabaseError::Decode)?)
    };

    let finished_at: Option<String> = row.try_get("finished_at")?;

    Ok(Some(ScanRun {
        id: row.try_get("id")?,
        domain: row.try_get("domain")?,
        host: row.try_get("host")?,
        started_at: parse_timestamp(&row.try_get::<String, _>("started_at")?)?,
        finished_at: finished_at.as_deref().map(parse_timestamp).transpose()?,
        status,
        attempted: to_u64(row.try_get("attempted")?),
        skipped: to_u64(row.try_get("skipped")?),
        findings: to_u64(row.try_get("findings")?),
        sink_errors: to_u64(row.try_get("sink_errors")?),
    }))
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Decode(format!("invalid timestamp '{value}': {e}")))
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}
