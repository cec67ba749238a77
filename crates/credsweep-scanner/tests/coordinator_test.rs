use async_trait::async_trait;
use credsweep_core::{Finding, OutcomeKind, Password, RunStatus, ScanPolicy, Target};
use credsweep_scanner::{
    CandidateGenerator, Challenge, ChallengeBuilder, MemorySink, RawResponse, ResultSink,
    ScanCoordinator, ScanError, SinkError, Transport, TransportError, TransportErrorKind,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

type Reply = Result<RawResponse, TransportError>;

/// Encodes the candidate as `username:password` so the transport can see it.
struct PlainChallengeBuilder;

impl ChallengeBuilder for PlainChallengeBuilder {
    fn build(&self, target: &Target, username: &str, password: Option<&Password>) -> Challenge {
        Challenge {
            url: target.endpoint_url(),
            payload: format!("{}:{}", username, password.map_or("", Password::expose)),
            correlation_id: Uuid::new_v4(),
        }
    }
}

/// Answers each candidate from a script and records the order of calls.
///
/// With a latency set, every request waits on the timer before answering,
/// so several workers can have a request outstanding at once.
struct ScriptedTransport {
    script: Box<dyn Fn(&str, &str) -> Reply + Send + Sync>,
    calls: Mutex<Vec<(String, String)>>,
    latency: Duration,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    fn new(script: impl Fn(&str, &str) -> Reply + Send + Sync + 'static) -> Arc<Self> {
        Self::with_latency(Duration::ZERO, script)
    }

    fn with_latency(
        latency: Duration,
        script: impl Fn(&str, &str) -> Reply + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
            latency,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, challenge: &Challenge) -> Result<RawResponse, TransportError> {
        let (username, password) = challenge
            .payload
            .split_once(':')
            .expect("payload from PlainChallengeBuilder");
        self.calls
            .lock()
            .expect("calls lock")
            .push((username.to_string(), password.to_string()));

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        (self.script)(username, password)
    }
}

struct FailingSink;

#[async_trait]
impl ResultSink for FailingSink {
    async fn record(&self, _finding: &Finding) -> Result<(), SinkError> {
        Err(SinkError::Rejected("storage offline".to_string()))
    }
}

fn fault(code: &str) -> Reply {
    Ok(RawResponse::new(
        400,
        format!(
            "<S:Envelope><S:Body><S:Fault><S:Detail><psf:error><psf:internalerror>\
             <psf:text>{code}: provider message</psf:text>\
             </psf:internalerror></psf:error></S:Detail></S:Fault></S:Body></S:Envelope>"
        ),
    ))
}

fn token(value: &str) -> Reply {
    Ok(RawResponse::new(
        200,
        format!("<S:Envelope><S:Body><DesktopSsoToken>{value}</DesktopSsoToken></S:Body></S:Envelope>"),
    ))
}

fn timeout() -> Reply {
    Err(TransportError::new(
        TransportErrorKind::Timeout,
        "operation timed out",
    ))
}

fn no_delay() -> ScanPolicy {
    ScanPolicy {
        request_delay_ms: 0,
        ..ScanPolicy::default()
    }
}

fn coordinator(
    transport: Arc<ScriptedTransport>,
    sink: Arc<dyn ResultSink>,
    policy: ScanPolicy,
) -> ScanCoordinator {
    ScanCoordinator::new(Arc::new(PlainChallengeBuilder), transport, sink).with_policy(policy)
}

fn call(username: &str, password: &str) -> (String, String) {
    (username.to_string(), password.to_string())
}

fn users(count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("user{i}")).collect()
}

#[tokio::test]
async fn test_contoso_findings() {
    let target = Target::for_domain("contoso.com");
    let transport = ScriptedTransport::new(|username, _| match username {
        "alice" => fault("AADSTS50126"),
        "bob" => token("sso-token-for-bob"),
        other => panic!("unexpected user {other}"),
    });
    let sink = Arc::new(MemorySink::new());
    let candidates = CandidateGenerator::from_lists(["alice", "bob"], ["Winter2024"]);

    let summary = coordinator(transport.clone(), sink.clone(), no_delay())
        .run(&target, &candidates)
        .await
        .expect("run");

    assert_eq!(summary.reason, RunStatus::Completed);
    assert_eq!(summary.attempted, 2);
    assert_eq!(summary.findings, 2);

    let findings = sink.findings().await;
    assert_eq!(findings.len(), 2);

    let alice = findings.iter().find(|f| f.username == "alice").expect("alice");
    assert_eq!(alice.kind(), OutcomeKind::ValidUserWrongPassword);
    assert!(alice.password.is_none());
    assert_eq!(alice.target, target);

    let bob = findings.iter().find(|f| f.username == "bob").expect("bob");
    assert_eq!(bob.kind(), OutcomeKind::Authenticated);
    assert_eq!(bob.password.as_ref().map(Password::expose), Some("Winter2024"));
    assert_eq!(bob.sso_token(), Some("sso-token-for-bob"));
}

#[tokio::test]
async fn test_consecutive_lockouts_abort_run() {
    let transport = ScriptedTransport::new(|_, _| fault("AADSTS50053"));
    let sink = Arc::new(MemorySink::new());
    let candidates = CandidateGenerator::from_lists(users(5), ["p1"]);

    let summary = coordinator(transport.clone(), sink.clone(), no_delay())
        .run(&Target::for_domain("contoso.com"), &candidates)
        .await
        .expect("run");

    assert_eq!(summary.reason, RunStatus::AbortedLockout);
    assert_eq!(summary.attempted, 3);
    assert_eq!(summary.outcome_counts.get(OutcomeKind::AccountLocked), 3);
    assert_eq!(transport.calls().len(), 3);
    assert!(sink.is_empty().await);
}

#[tokio::test]
async fn test_consecutive_transport_failures_abort_run() {
    let transport = ScriptedTransport::new(|_, _| timeout());
    let policy = ScanPolicy {
        max_consecutive_transport_failures: 2,
        ..no_delay()
    };
    let candidates = CandidateGenerator::from_lists(users(4), ["p1"]);

    let summary = coordinator(transport.clone(), Arc::new(MemorySink::new()), policy)
        .run(&Target::for_domain("contoso.com"), &candidates)
        .await
        .expect("transport failures are outcomes, not errors");

    assert_eq!(summary.reason, RunStatus::AbortedTransportErrors);
    assert_eq!(summary.attempted, 2);
    assert_eq!(summary.outcome_counts.get(OutcomeKind::TransportFailure), 2);
}

#[tokio::test]
async fn test_interleaved_outcomes_reset_streaks() {
    let transport = ScriptedTransport::new(|username, _| match username {
        "user3" => fault("AADSTS50126"),
        "user6" => timeout(),
        _ => fault("AADSTS50053"),
    });
    let policy = ScanPolicy {
        max_consecutive_lockouts: 3,
        max_consecutive_transport_failures: 2,
        ..no_delay()
    };
    let candidates = CandidateGenerator::from_lists(users(7), ["p1"]);

    let summary = coordinator(transport.clone(), Arc::new(MemorySink::new()), policy)
        .run(&Target::for_domain("contoso.com"), &candidates)
        .await
        .expect("run");

    assert_eq!(summary.reason, RunStatus::Completed);
    assert_eq!(summary.attempted, 7);
    assert_eq!(summary.findings, 1);
}

#[tokio::test]
async fn test_skip_ahead_after_invalid_user() {
    let transport = ScriptedTransport::new(|username, _| match username {
        "alice" => fault("AADSTS50034"),
        _ => fault("AADSTS50126"),
    });
    let candidates = CandidateGenerator::from_lists(["alice", "bob"], ["p1", "p2"]);

    let summary = coordinator(transport.clone(), Arc::new(MemorySink::new()), no_delay())
        .run(&Target::for_domain("contoso.com"), &candidates)
        .await
        .expect("run");

    assert_eq!(
        transport.calls(),
        vec![call("alice", "p1"), call("bob", "p1"), call("bob", "p2")]
    );
    assert_eq!(summary.reason, RunStatus::Completed);
    assert_eq!(summary.attempted, 3);
    assert_eq!(summary.skipped, 1);
}

#[tokio::test]
async fn test_skip_ahead_after_confirmed_password() {
    let transport = ScriptedTransport::new(|username, password| match (username, password) {
        ("alice", "p1") => token("alice-token"),
        ("carol", "p1") => fault("AADSTS50076"),
        _ => fault("AADSTS50126"),
    });
    let sink = Arc::new(MemorySink::new());
    let candidates = CandidateGenerator::from_lists(["alice", "carol"], ["p1", "p2", "p3"]);

    let summary = coordinator(transport.clone(), sink.clone(), no_delay())
        .run(&Target::for_domain("contoso.com"), &candidates)
        .await
        .expect("run");

    assert_eq!(transport.calls(), vec![call("alice", "p1"), call("carol", "p1")]);
    assert_eq!(summary.skipped, 4);

    let findings = sink.findings().await;
    assert_eq!(findings.len(), 2);
    assert!(findings
        .iter()
        .all(|f| f.password.as_ref().map(Password::expose) == Some("p1")));
    assert_eq!(findings[1].kind(), OutcomeKind::ValidUserMfaRequired);
}

#[tokio::test]
async fn test_skip_ahead_disabled() {
    let transport = ScriptedTransport::new(|username, _| match username {
        "alice" => fault("AADSTS50034"),
        _ => fault("AADSTS50126"),
    });
    let policy = ScanPolicy {
        skip_resolved_users: false,
        ..no_delay()
    };
    let candidates = CandidateGenerator::from_lists(["alice", "bob"], ["p1", "p2"]);

    let summary = coordinator(transport.clone(), Arc::new(MemorySink::new()), policy)
        .run(&Target::for_domain("contoso.com"), &candidates)
        .await
        .expect("run");

    assert_eq!(
        transport.calls(),
        vec![
            call("alice", "p1"),
            call("alice", "p2"),
            call("bob", "p1"),
            call("bob", "p2"),
        ]
    );
    assert_eq!(summary.skipped, 0);
}

#[tokio::test]
async fn test_zero_candidates_never_touch_transport() {
    let transport = ScriptedTransport::new(|_, _| panic!("transport must not be called"));
    let empty: [&str; 0] = [];
    let candidates = CandidateGenerator::from_lists(empty, ["p1"]);

    let summary = coordinator(transport.clone(), Arc::new(MemorySink::new()), no_delay())
        .run(&Target::for_domain("contoso.com"), &candidates)
        .await
        .expect("run");

    assert_eq!(summary.reason, RunStatus::Completed);
    assert_eq!(summary.attempted, 0);
    assert_eq!(summary.findings, 0);
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn test_unparseable_response_is_unknown_error() {
    let transport =
        ScriptedTransport::new(|_, _| Ok(RawResponse::new(502, "<html>Bad Gateway</html>")));
    let sink = Arc::new(MemorySink::new());
    let candidates = CandidateGenerator::from_lists(["alice"], ["p1"]);

    let summary = coordinator(transport, sink.clone(), no_delay())
        .run(&Target::for_domain("contoso.com"), &candidates)
        .await
        .expect("run");

    assert_eq!(summary.reason, RunStatus::Completed);
    assert_eq!(summary.outcome_counts.get(OutcomeKind::UnknownError), 1);
    assert!(sink.is_empty().await);
}

#[tokio::test]
async fn test_existence_checks_send_absent_password() {
    let transport = ScriptedTransport::new(|_, _| fault("AADSTS50126"));
    let sink = Arc::new(MemorySink::new());
    let candidates = CandidateGenerator::existence_checks(&credsweep_core::CredentialSource::List(
        vec!["alice".to_string()],
    ));

    coordinator(transport.clone(), sink.clone(), no_delay())
        .run(&Target::for_domain("contoso.com"), &candidates)
        .await
        .expect("run");

    assert_eq!(transport.calls(), vec![call("alice", "")]);
    assert_eq!(sink.len().await, 1);
}

#[tokio::test]
async fn test_blank_domain_fails_before_any_request() {
    let transport = ScriptedTransport::new(|_, _| panic!("transport must not be called"));
    let candidates = CandidateGenerator::from_lists(["alice"], ["p1"]);

    let result = coordinator(transport.clone(), Arc::new(MemorySink::new()), no_delay())
        .run(&Target::for_domain("  "), &candidates)
        .await;

    assert!(matches!(result, Err(ScanError::Config(_))));
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn test_pre_cancelled_run() {
    let transport = ScriptedTransport::new(|_, _| fault("AADSTS50126"));
    let token = CancellationToken::new();
    token.cancel();
    let candidates = CandidateGenerator::from_lists(["alice", "bob"], ["p1"]);

    let summary = coordinator(transport.clone(), Arc::new(MemorySink::new()), no_delay())
        .with_cancellation(token)
        .run(&Target::for_domain("contoso.com"), &candidates)
        .await
        .expect("run");

    assert_eq!(summary.reason, RunStatus::Cancelled);
    assert_eq!(summary.attempted, 0);
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn test_cancellation_cuts_delay_short() {
    let transport = ScriptedTransport::new(|_, _| fault("AADSTS50126"));
    let policy = ScanPolicy {
        request_delay_ms: 60_000,
        ..ScanPolicy::default()
    };
    let coordinator = coordinator(transport.clone(), Arc::new(MemorySink::new()), policy);
    let token = coordinator.cancellation_token();
    let candidates = CandidateGenerator::from_lists(["alice"], ["p1", "p2", "p3"]);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    let summary = tokio::time::timeout(
        Duration::from_secs(5),
        coordinator.run(&Target::for_domain("contoso.com"), &candidates),
    )
    .await
    .expect("cancellation should interrupt the delay")
    .expect("run");

    assert_eq!(summary.reason, RunStatus::Cancelled);
    assert_eq!(transport.calls(), vec![call("alice", "p1")]);
}

#[tokio::test(start_paused = true)]
async fn test_requests_are_paced() {
    let transport = ScriptedTransport::new(|_, _| fault("AADSTS50126"));
    let policy = ScanPolicy {
        request_delay_ms: 1000,
        ..ScanPolicy::default()
    };
    let candidates = CandidateGenerator::from_lists(["alice"], ["p1", "p2", "p3"]);

    let started = tokio::time::Instant::now();
    let summary = coordinator(transport, Arc::new(MemorySink::new()), policy)
        .run(&Target::for_domain("contoso.com"), &candidates)
        .await
        .expect("run");
    let elapsed = started.elapsed();

    assert_eq!(summary.attempted, 3);
    assert!(elapsed >= Duration::from_secs(2), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "elapsed {elapsed:?}");
}

#[tokio::test]
async fn test_sink_errors_are_counted_not_fatal() {
    let transport = ScriptedTransport::new(|username, _| match username {
        "alice" => fault("AADSTS50126"),
        _ => token("bob-token"),
    });
    let candidates = CandidateGenerator::from_lists(["alice", "bob"], ["Winter2024"]);

    let summary = coordinator(transport.clone(), Arc::new(FailingSink), no_delay())
        .run(&Target::for_domain("contoso.com"), &candidates)
        .await
        .expect("sink errors do not fail the run");

    assert_eq!(summary.reason, RunStatus::Completed);
    assert_eq!(summary.findings, 0);
    assert_eq!(summary.sink_errors, 2);
    assert_eq!(transport.calls().len(), 2);
}

#[tokio::test]
async fn test_sink_errors_fatal_when_configured() {
    let transport = ScriptedTransport::new(|_, _| fault("AADSTS50126"));
    let policy = ScanPolicy {
        fail_on_sink_error: true,
        ..no_delay()
    };
    let candidates = CandidateGenerator::from_lists(["alice", "bob", "carol"], ["p1"]);

    let result = coordinator(transport.clone(), Arc::new(FailingSink), policy)
        .run(&Target::for_domain("contoso.com"), &candidates)
        .await;

    assert!(matches!(result, Err(ScanError::Sink(SinkError::Rejected(_)))));
    assert_eq!(transport.calls(), vec![call("alice", "p1")]);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_users_keep_password_order() {
    let transport =
        ScriptedTransport::with_latency(Duration::from_millis(10), |_, _| fault("AADSTS50126"));
    let policy = ScanPolicy {
        max_concurrent_users: 3,
        ..no_delay()
    };
    let usernames = users(4);
    let candidates = CandidateGenerator::from_lists(&usernames, ["p1", "p2", "p3"]);

    let summary = coordinator(transport.clone(), Arc::new(MemorySink::new()), policy)
        .run(&Target::for_domain("contoso.com"), &candidates)
        .await
        .expect("run");

    assert_eq!(summary.reason, RunStatus::Completed);
    assert_eq!(summary.attempted, 12);
    assert_eq!(summary.findings, 12);
    assert_eq!(transport.peak_in_flight(), 3);

    let calls = transport.calls();
    for username in &usernames {
        let passwords: Vec<&str> = calls
            .iter()
            .filter(|(u, _)| u == username)
            .map(|(_, p)| p.as_str())
            .collect();
        assert_eq!(passwords, vec!["p1", "p2", "p3"], "order for {username}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_lockout_abort_stops_new_requests() {
    let transport =
        ScriptedTransport::with_latency(Duration::from_millis(10), |_, _| fault("AADSTS50053"));
    let policy = ScanPolicy {
        max_concurrent_users: 3,
        max_consecutive_lockouts: 3,
        skip_resolved_users: false,
        ..no_delay()
    };
    let usernames = users(6);
    let candidates = CandidateGenerator::from_lists(&usernames, ["p1", "p2"]);

    let summary = coordinator(transport.clone(), Arc::new(MemorySink::new()), policy)
        .run(&Target::for_domain("contoso.com"), &candidates)
        .await
        .expect("run");

    assert_eq!(summary.reason, RunStatus::AbortedLockout);
    assert_eq!(summary.findings, 0);
    assert_eq!(transport.peak_in_flight(), 3);

    // The third lockout can only land while at most two other requests are
    // outstanding; nothing is sent after it.
    let calls = transport.calls();
    assert!(calls.len() >= 3 && calls.len() <= 5, "calls {calls:?}");
    assert_eq!(summary.attempted, calls.len() as u64);
    assert_eq!(
        summary.outcome_counts.get(OutcomeKind::AccountLocked),
        summary.attempted
    );

    let mut first_round = calls[..3].to_vec();
    first_round.sort();
    assert_eq!(
        first_round,
        vec![call("user1", "p1"), call("user2", "p1"), call("user3", "p1")]
    );
    assert!(
        calls.iter().all(|(u, _)| !["user4", "user5", "user6"].contains(&u.as_str())),
        "calls {calls:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_skip_ahead_counts() {
    let transport = ScriptedTransport::with_latency(Duration::from_millis(10), |_, password| {
        match password {
            "p1" => fault("AADSTS50034"),
            other => panic!("resolved user retried with {other}"),
        }
    });
    let policy = ScanPolicy {
        max_concurrent_users: 2,
        ..no_delay()
    };
    let usernames = users(4);
    let candidates = CandidateGenerator::from_lists(&usernames, ["p1", "p2"]);

    let summary = coordinator(transport.clone(), Arc::new(MemorySink::new()), policy)
        .run(&Target::for_domain("contoso.com"), &candidates)
        .await
        .expect("run");

    assert_eq!(summary.reason, RunStatus::Completed);
    assert_eq!(summary.attempted, 4);
    assert_eq!(summary.skipped, 4);
    assert_eq!(summary.outcome_counts.get(OutcomeKind::InvalidUser), 4);
    assert_eq!(transport.peak_in_flight(), 2);

    let mut calls = transport.calls();
    calls.sort();
    assert_eq!(
        calls,
        usernames.iter().map(|u| call(u, "p1")).collect::<Vec<_>>()
    );
}
