//! Scan coordinator.
//!
//! Drives candidates through challenge construction, delivery and
//! classification, forwards reportable outcomes to the result sink, and
//! applies the lockout policy between requests.
//!
//! Candidates are grouped into per-username batches. Passwords for one
//! username are always tried in order by a single worker; up to
//! `max_concurrent_users` usernames may be in flight at once. Run-wide
//! counters live in a [`ScanState`] behind a mutex that is never held across
//! an await point.

use crate::challenge::ChallengeBuilder;
use crate::classifier::classify_raw;
use crate::error::{Result, SinkError};
use crate::sink::ResultSink;
use crate::transport::Transport;
use chrono::Utc;
use credsweep_core::{
    Candidate, Finding, Outcome, OutcomeCounts, RunStatus, RunSummary, ScanPolicy, Target,
};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashSet;
use std::iter::Peekable;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Orchestrates one or more runs against a target.
pub struct ScanCoordinator {
    challenge_builder: Arc<dyn ChallengeBuilder>,
    transport: Arc<dyn Transport>,
    sink: Arc<dyn ResultSink>,
    policy: ScanPolicy,
    cancel: CancellationToken,
}

impl ScanCoordinator {
    /// Create a coordinator with the default policy.
    #[must_use]
    pub fn new(
        challenge_builder: Arc<dyn ChallengeBuilder>,
        transport: Arc<dyn Transport>,
        sink: Arc<dyn ResultSink>,
    ) -> Self {
        Self {
            challenge_builder,
            transport,
            sink,
            policy: ScanPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the run policy.
    #[must_use]
    pub fn with_policy(mut self, policy: ScanPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Observe `token` for external cancellation.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that cancels every run of this coordinator.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Active policy.
    #[must_use]
    pub fn policy(&self) -> &ScanPolicy {
        &self.policy
    }

    /// Run `candidates` against `target` under a fresh run id.
    pub async fn run<I>(&self, target: &Target, candidates: I) -> Result<RunSummary>
    where
        I: IntoIterator<Item = Candidate>,
    {
        self.run_with_id(Uuid::new_v4(), target, candidates).await
    }

    /// Run `candidates` against `target`.
    ///
    /// Policy aborts and cancellation are reported through
    /// [`RunSummary::reason`]. `Err` is returned only for an invalid
    /// configuration, checked before any request is sent, or for a sink
    /// failure when the policy makes those fatal.
    pub async fn run_with_id<I>(
        &self,
        run_id: Uuid,
        target: &Target,
        candidates: I,
    ) -> Result<RunSummary>
    where
        I: IntoIterator<Item = Candidate>,
    {
        Target::validate_domain(&target.domain)?;
        self.policy.validate()?;

        let started_at = Utc::now();
        let max_workers = self.policy.max_concurrent_users;
        let ctx = RunContext {
            target,
            state: Mutex::new(ScanState::default()),
            stop: self.cancel.child_token(),
        };

        tracing::info!(
            "Starting run {} against {} ({} user(s) at a time, {}ms between requests)",
            run_id,
            target,
            max_workers,
            self.policy.request_delay_ms
        );

        let mut batches = UserBatches::new(candidates.into_iter());
        let mut workers = FuturesUnordered::new();

        loop {
            if ctx.stop.is_cancelled() {
                if !batches.is_exhausted() {
                    ctx.state().interrupted = true;
                }
                break;
            }
            let Some(batch) = batches.next() else {
                break;
            };
            ctx.state().position += batch.len() as u64;

            workers.push(self.process_user(&ctx, batch));

            // Respect concurrency limit
            while workers.len() >= max_workers {
                workers.next().await;
            }
        }

        while workers.next().await.is_some() {}
        drop(workers);

        let state = ctx
            .state
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(e) = state.sink_failure {
            tracing::error!("Run {} stopped on sink failure: {}", run_id, e);
            return Err(e.into());
        }

        let reason = match state.abort {
            Some(abort) => abort,
            None if state.interrupted => RunStatus::Cancelled,
            None => RunStatus::Completed,
        };

        let summary = RunSummary {
            run_id,
            reason,
            attempted: state.attempted,
            skipped: state.skipped,
            findings: state.findings,
            sink_errors: state.sink_errors,
            outcome_counts: state.outcome_counts,
            started_at,
            finished_at: Utc::now(),
        };

        tracing::info!(
            "Run {} finished: {} ({} consumed, {} attempted, {} skipped, {} findings)",
            run_id,
            summary.reason,
            state.position,
            summary.attempted,
            summary.skipped,
            summary.findings
        );

        Ok(summary)
    }

    /// Try every password of one username, in order.
    async fn process_user(&self, ctx: &RunContext<'_>, batch: Vec<Candidate>) {
        let total = batch.len();

        for (index, candidate) in batch.iter().enumerate() {
            if ctx.stop.is_cancelled() {
                ctx.state().interrupted = true;
                return;
            }

            if self.policy.skip_resolved_users {
                let remaining = (total - index) as u64;
                let mut state = ctx.state();
                if state.resolved_users.contains(&candidate.username) {
                    state.skipped += remaining;
                    drop(state);
                    tracing::debug!(
                        "Skipping {} remaining candidate(s) for resolved user {}",
                        remaining,
                        candidate.username
                    );
                    return;
                }
            }

            if !self.pace(ctx).await {
                ctx.state().interrupted = true;
                return;
            }

            let outcome = self.attempt(ctx.target, candidate).await;
            ctx.state().attempted += 1;
            log_outcome(ctx.target, &candidate.username, &outcome);

            if let Some(finding) =
                Finding::from_outcome(ctx.target, candidate, &outcome, Utc::now())
            {
                self.deliver(ctx, &finding).await;
            }

            let mut state = ctx.state();
            if let Some(abort) = state.observe(&outcome, &self.policy) {
                drop(state);
                tracing::warn!(
                    "Aborting run: {} consecutive {} outcomes",
                    match abort {
                        RunStatus::AbortedLockout => self.policy.max_consecutive_lockouts,
                        _ => self.policy.max_consecutive_transport_failures,
                    },
                    outcome.kind()
                );
                ctx.stop.cancel();
                state = ctx.state();
            }
            if self.policy.skip_resolved_users && outcome.resolves_user() {
                state.resolved_users.insert(candidate.username.clone());
            }
        }
    }

    /// Wait out the inter-request delay. Returns `false` if the run was
    /// stopped before the next request may go out.
    async fn pace(&self, ctx: &RunContext<'_>) -> bool {
        let first = !std::mem::replace(&mut ctx.state().dispatched_any, true);
        let delay = self.policy.request_delay();

        if !first && !delay.is_zero() {
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = ctx.stop.cancelled() => {}
            }
        }

        !ctx.stop.is_cancelled()
    }

    /// Send one candidate and classify what comes back.
    async fn attempt(&self, target: &Target, candidate: &Candidate) -> Outcome {
        let challenge =
            self.challenge_builder
                .build(target, &candidate.username, candidate.password.as_ref());

        tracing::debug!(
            "Testing {} (request {})",
            target.qualified_username(&candidate.username),
            challenge.correlation_id
        );

        match self.transport.send(&challenge).await {
            Ok(response) => classify_raw(&response),
            Err(e) => Outcome::TransportFailure {
                cause: e.to_string(),
            },
        }
    }

    /// Hand a finding to the sink and account for the result.
    async fn deliver(&self, ctx: &RunContext<'_>, finding: &Finding) {
        match self.sink.record(finding).await {
            Ok(()) => ctx.state().findings += 1,
            Err(e) => {
                tracing::error!(
                    "Failed to record {} finding for {}: {}",
                    finding.kind(),
                    finding.username,
                    e
                );
                let mut state = ctx.state();
                state.sink_errors += 1;
                if self.policy.fail_on_sink_error {
                    state.sink_failure.get_or_insert(e);
                    drop(state);
                    ctx.stop.cancel();
                }
            }
        }
    }
}

impl std::fmt::Debug for ScanCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanCoordinator")
            .field("policy", &self.policy)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Per-run state shared by the feeder and the per-user workers.
struct RunContext<'a> {
    target: &'a Target,
    state: Mutex<ScanState>,
    /// Cancelled on external cancellation, policy abort or fatal sink error.
    stop: CancellationToken,
}

impl RunContext<'_> {
    fn state(&self) -> MutexGuard<'_, ScanState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Mutable state of one run.
#[derive(Debug, Default)]
pub(crate) struct ScanState {
    /// Candidates pulled from the source so far
    position: u64,
    attempted: u64,
    skipped: u64,
    findings: u64,
    sink_errors: u64,
    lockout_streak: u32,
    transport_streak: u32,
    abort: Option<RunStatus>,
    /// Work was left undone because the run was stopped
    interrupted: bool,
    dispatched_any: bool,
    resolved_users: HashSet<String>,
    outcome_counts: OutcomeCounts,
    sink_failure: Option<SinkError>,
}

impl ScanState {
    /// Fold one outcome into the streak counters.
    ///
    /// Returns the abort reason if this outcome crossed a threshold and no
    /// abort had been decided yet.
    pub(crate) fn observe(&mut self, outcome: &Outcome, policy: &ScanPolicy) -> Option<RunStatus> {
        self.outcome_counts.record(outcome.kind());

        match outcome {
            Outcome::AccountLocked => {
                self.lockout_streak += 1;
                self.transport_streak = 0;
            }
            Outcome::TransportFailure { .. } => {
                self.transport_streak += 1;
                self.lockout_streak = 0;
            }
            _ => {
                self.lockout_streak = 0;
                self.transport_streak = 0;
            }
        }

        if self.abort.is_some() {
            return None;
        }

        if self.lockout_streak >= policy.max_consecutive_lockouts {
            self.abort = Some(RunStatus::AbortedLockout);
        } else if self.transport_streak >= policy.max_consecutive_transport_failures {
            self.abort = Some(RunStatus::AbortedTransportErrors);
        }
        self.abort
    }
}

/// Groups consecutive candidates that share a username.
struct UserBatches<I: Iterator<Item = Candidate>> {
    inner: Peekable<I>,
}

impl<I: Iterator<Item = Candidate>> UserBatches<I> {
    fn new(inner: I) -> Self {
        Self {
            inner: inner.peekable(),
        }
    }

    fn is_exhausted(&mut self) -> bool {
        self.inner.peek().is_none()
    }
}

impl<I: Iterator<Item = Candidate>> Iterator for UserBatches<I> {
    type Item = Vec<Candidate>;

    fn next(&mut self) -> Option<Vec<Candidate>> {
        let first = self.inner.next()?;
        let username = first.username.clone();
        let mut batch = vec![first];
        while let Some(candidate) = self.inner.next_if(|next| next.username == username) {
            batch.push(candidate);
        }
        Some(batch)
    }
}

fn log_outcome(target: &Target, username: &str, outcome: &Outcome) {
    let domain = &target.domain;
    match outcome {
        Outcome::Authenticated { .. } => {
            tracing::info!("Login {}\\{} is valid, desktop SSO token issued", domain, username);
        }
        Outcome::ValidUserWrongPassword => {
            tracing::info!("{}\\{} is valid but the password is incorrect", domain, username);
        }
        Outcome::ValidUserNoPasswordSet => {
            tracing::info!(
                "{}\\{} is valid but the user does not have a password in Azure AD",
                domain,
                username
            );
        }
        Outcome::ValidUserMfaRequired => {
            tracing::info!(
                "Login {}\\{} is valid, but MFA is required to connect to this resource",
                domain,
                username
            );
        }
        Outcome::ValidUserAuthWindowExceeded => {
            tracing::info!(
                "{}\\{} is valid but the maximum pass-through authentication time was exceeded",
                domain,
                username
            );
        }
        Outcome::InvalidUser => {
            tracing::info!("{}\\{} is not a valid user", domain, username);
        }
        Outcome::AccountLocked => {
            tracing::warn!(
                "Account {}\\{} is locked, consider waiting before scanning further",
                domain,
                username
            );
        }
        Outcome::UnknownError { raw } => {
            tracing::warn!(
                "Received unknown response for {}\\{}: {}",
                domain,
                username,
                raw
            );
        }
        Outcome::TransportFailure { cause } => {
            tracing::warn!("Request for {}\\{} failed: {}", domain, username, cause);
        }
    }
}
