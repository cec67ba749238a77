//! Result sinks record findings as a run produces them.
//!
//! Findings are append-only. A sink may see the same finding twice and must
//! accept it.

use crate::error::SinkError;
use async_trait::async_trait;
use credsweep_core::Finding;
use credsweep_db::{findings, Database};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Records one finding at a time.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Record `finding`.
    async fn record(&self, finding: &Finding) -> Result<(), SinkError>;
}

/// Keeps findings in memory, in arrival order.
#[derive(Debug, Default)]
pub struct MemorySink {
    findings: Mutex<Vec<Finding>>,
}

impl MemorySink {
    /// Empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub async fn findings(&self) -> Vec<Finding> {
        self.findings.lock().await.clone()
    }

    /// Number of findings recorded so far.
    pub async fn len(&self) -> usize {
        self.findings.lock().await.len()
    }

    /// Whether nothing has been recorded.
    pub async fn is_empty(&self) -> bool {
        self.findings.lock().await.is_empty()
    }
}

#[async_trait]
impl ResultSink for MemorySink {
    async fn record(&self, finding: &Finding) -> Result<(), SinkError> {
        self.findings.lock().await.push(finding.clone());
        Ok(())
    }
}

/// Persists findings of one run to the `findings` table.
///
/// The run row must exist before the first finding arrives.
#[derive(Debug, Clone)]
pub struct DatabaseSink {
    db: Database,
    run_id: Uuid,
    record_passwords: bool,
}

impl DatabaseSink {
    /// Sink for `run_id`. With `record_passwords` off, confirmed passwords
    /// are dropped before the row is written.
    #[must_use]
    pub fn new(db: Database, run_id: Uuid, record_passwords: bool) -> Self {
        Self {
            db,
            run_id,
            record_passwords,
        }
    }
}

#[async_trait]
impl ResultSink for DatabaseSink {
    async fn record(&self, finding: &Finding) -> Result<(), SinkError> {
        let stored =
            findings::insert_finding(self.db.pool(), self.run_id, finding, self.record_passwords)
                .await?;
        tracing::debug!(
            "Stored finding {} ({}) for {}",
            stored.id,
            stored.outcome,
            stored.username
        );
        Ok(())
    }
}

/// Forwards each finding to every inner sink.
///
/// All sinks are tried even when one fails; the first failure is returned.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn ResultSink>>,
}

impl FanoutSink {
    /// Fan out to `sinks`, in order.
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn ResultSink>>) -> Self {
        Self { sinks }
    }

    /// Append another sink.
    #[must_use]
    pub fn with(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl std::fmt::Debug for FanoutSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutSink")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

#[async_trait]
impl ResultSink for FanoutSink {
    async fn record(&self, finding: &Finding) -> Result<(), SinkError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.record(finding).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
