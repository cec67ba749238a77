//! Findings operations.
//!
//! Each row is one reportable outcome observed during a run. Findings are
//! append-only: re-delivering the same finding inserts a second row rather
//! than failing.

use crate::error::{DatabaseError, Result};
use crate::runs::parse_timestamp;
use chrono::{DateTime, Utc};
use credsweep_core::{Finding, OutcomeKind, Password};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// A finding as stored in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredFinding {
    /// Row identifier
    pub id: String,
    /// Run that produced the finding
    pub run_id: String,
    /// Tenant domain
    pub domain: String,
    /// Endpoint host
    pub host: String,
    /// Username tested
    pub username: String,
    /// Confirmed password, if recorded
    pub password: Option<String>,
    /// Outcome kind
    pub outcome: OutcomeKind,
    /// SSO token for authenticated findings
    pub sso_token: Option<String>,
    /// When the outcome was observed
    pub recorded_at: DateTime<Utc>,
}

/// Insert a finding for `run_id`.
///
/// When `record_password` is false the password column is left empty even
/// if the finding carries one.
pub async fn insert_finding(
    pool: &SqlitePool,
    run_id: Uuid,
    finding: &Finding,
    record_password: bool,
) -> Result<StoredFinding> {
    let id = Uuid::new_v4().to_string();
    let password = if record_password {
        finding.password.as_ref().map(|p| p.expose().to_string())
    } else {
        None
    };
    let sso_token = finding.sso_token().map(ToString::to_string);
    let outcome = finding.kind();

    sqlx::query(
        "INSERT INTO findings (id, run_id, domain, host, username, password, outcome, sso_token, recorded_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(run_id.to_string())
    .bind(&finding.target.domain)
    .bind(&finding.target.host)
    .bind(&finding.username)
    .bind(password.as_deref())
    .bind(outcome.as_str())
    .bind(sso_token.as_deref())
    .bind(finding.recorded_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(StoredFinding {
        id,
        run_id: run_id.to_string(),
        domain: finding.target.domain.clone(),
        host: finding.target.host.clone(),
        username: finding.username.clone(),
        password,
        outcome,
        sso_token,
        recorded_at: finding.recorded_at,
    })
}

/// All findings of a run, oldest first.
pub async fn list_findings_for_run(pool: &SqlitePool, run_id: &str) -> Result<Vec<StoredFinding>> {
    let rows = sqlx::query(
        "SELECT id, run_id, domain, host, username, password, outcome, sso_token, recorded_at
         FROM findings WHERE run_id = ? ORDER BY recorded_at, rowid",
    )
    .bind(run_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| -> Result<StoredFinding> {
            let outcome: String = row.try_get("outcome")?;
            let recorded_at: String = row.try_get("recorded_at")?;
            Ok(StoredFinding {
                id: row.try_get("id")?,
                run_id: row.try_get("run_id")?,
                domain: row.try_get("domain")?,
                host: row.try_get("host")?,
                username: row.try_get("username")?,
                password: row.try_get("password")?,
                outcome: outcome.parse::<OutcomeKind>().map_err(DatabaseError::Decode)?,
                sso_token: row.try_get("sso_token")?,
                recorded_at: parse_timestamp(&recorded_at)?,
            })
        })
        .collect()
}

/// Distinct usernames known to exist in `domain`, across all runs.
pub async fn list_valid_usernames(pool: &SqlitePool, domain: &str) -> Result<Vec<String>> {
    let usernames = sqlx::query_scalar::<_, String>(
        "SELECT DISTINCT username FROM findings WHERE domain = ? ORDER BY username",
    )
    .bind(domain)
    .fetch_all(pool)
    .await?;

    Ok(usernames)
}

/// Confirmed credentials for `domain`, across all runs.
pub async fn list_confirmed_credentials(
    pool: &SqlitePool,
    domain: &str,
) -> Result<Vec<(String, Option<Password>)>> {
    let rows = sqlx::query_as::<_, (String, Option<String>)>(
        "SELECT DISTINCT username, password FROM findings
         WHERE domain = ? AND outcome IN (?, ?)
         ORDER BY username, password",
    )
    .bind(domain)
    .bind(OutcomeKind::Authenticated.as_str())
    .bind(OutcomeKind::ValidUserMfaRequired.as_str())
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(username, password)| (username, password.map(Password::new)))
        .collect())
}
