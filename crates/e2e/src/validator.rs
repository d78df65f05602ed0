//! Polling validator - GET an endpoint until it answers 200, then check
//! the body.

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::backoff::{PollState, RetryState};
use crate::error::{E2eError, E2eResult};
use crate::request::{Headers, ProbeRequest};
use crate::target::Target;
use crate::transport::{
    ProbeResponse, ReqwestTransport, Sleeper, TokioSleeper, Transport,
};

/// Upper bound on polling when the caller does not pick one
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(5 * 60);

/// Body served by the hello-world examples
pub const HELLO_WORLD_BODY: &str = "Hello, World!\n";

/// Summary of a check that passed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollReport {
    pub url: String,
    pub attempts: u32,
    pub retries: u32,
    pub delays: Vec<Duration>,
    pub status: StatusCode,
    pub elapsed: Duration,
}

/// Retrying HTTP check used inside runtime validations
#[derive(Debug, Clone, Default)]
pub struct PollingValidator<T = ReqwestTransport, S = TokioSleeper> {
    transport: T,
    sleeper: S,
}

impl PollingValidator {
    /// Validator over a real reqwest client and tokio sleeps
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T: Transport, S: Sleeper> PollingValidator<T, S> {
    pub fn with_parts(transport: T, sleeper: S) -> Self {
        Self { transport, sleeper }
    }

    /// Poll `output` until it answers 200 or `max_wait` runs out, then
    /// run `check` once on the body.
    pub async fn validate<F>(
        &self,
        output: &Value,
        headers: &Headers,
        max_wait: Duration,
        check: F,
    ) -> E2eResult<PollReport>
    where
        F: FnOnce(&str) -> bool,
    {
        let target = Target::from_output(output)?;
        self.validate_target(&target, headers, max_wait, check).await
    }

    /// Same as [`validate`](Self::validate) for an already resolved target
    pub async fn validate_target<F>(
        &self,
        target: &Target,
        headers: &Headers,
        max_wait: Duration,
        check: F,
    ) -> E2eResult<PollReport>
    where
        F: FnOnce(&str) -> bool,
    {
        let request = ProbeRequest::get(target, headers).map_err(|e| {
            debug!(url = %target, state = ?PollState::Failed, "Could not build request");
            e
        })?;
        let url = target.to_string();

        let start = Instant::now();
        let mut state = RetryState::new(max_wait);

        let response = loop {
            let attempt = state.begin_attempt();
            debug!(url = %url, state = ?attempt, "Sending request");

            let result = self.transport.send(&request).await;
            let succeeded = matches!(&result, Ok(resp) if resp.status() == StatusCode::OK);
            let elapsed = start.elapsed();

            match state.after_attempt(succeeded, elapsed) {
                PollState::Backoff { retry, delay } => {
                    match &result {
                        Ok(resp) => warn!("Http status: {}", resp.status()),
                        Err(e) => warn!("Http error: {}", e),
                    }
                    // Drop any error-page response before sleeping
                    drop(result);

                    info!(
                        "  Retry: {}, elapsed wait: {:?}, max wait {:?}, next attempt in {:?}",
                        retry, elapsed, max_wait, delay
                    );
                    self.sleeper.sleep(delay).await;
                }
                PollState::TimedOut => {
                    warn!(
                        "Timeout after {:?}. Unable to http.get {} successfully.",
                        max_wait, url
                    );
                    break result;
                }
                _ => break result,
            }
        };

        let response = match response {
            Ok(resp) if resp.status() == StatusCode::OK => resp,
            Ok(resp) => {
                return Err(E2eError::Timeout {
                    url,
                    status: resp.status(),
                    attempts: state.attempts(),
                    waited_secs: start.elapsed().as_secs(),
                })
            }
            Err(source) => {
                return Err(E2eError::Transport {
                    url,
                    attempts: state.attempts(),
                    source,
                })
            }
        };

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|reason| E2eError::BodyRead {
                url: url.clone(),
                reason,
            })?;

        if !check(&body) {
            return Err(E2eError::PredicateRejected { url });
        }

        Ok(PollReport {
            url,
            attempts: state.attempts(),
            retries: state.retries(),
            delays: state.delays().to_vec(),
            status,
            elapsed: start.elapsed(),
        })
    }

    /// Assertion-style check with the default five minute wait
    pub async fn assert_http_result<F>(
        &self,
        output: &Value,
        headers: Option<&Headers>,
        check: F,
    ) -> bool
    where
        F: FnOnce(&str) -> bool,
    {
        self.assert_http_result_with_retry(output, headers, DEFAULT_MAX_WAIT, check)
            .await
    }

    /// Assertion-style check: logs the failure and returns `false` instead
    /// of an error.
    pub async fn assert_http_result_with_retry<F>(
        &self,
        output: &Value,
        headers: Option<&Headers>,
        max_wait: Duration,
        check: F,
    ) -> bool
    where
        F: FnOnce(&str) -> bool,
    {
        let empty = Headers::new();
        match self
            .validate(output, headers.unwrap_or(&empty), max_wait, check)
            .await
        {
            Ok(report) => {
                info!(
                    "✓ {} ({} attempt(s), {:?})",
                    report.url, report.attempts, report.elapsed
                );
                true
            }
            Err(e) => {
                error!("✗ {}", e);
                false
            }
        }
    }

    /// The endpoint must serve exactly `Hello, World!\n`
    pub async fn assert_http_hello_world(&self, output: &Value) -> bool {
        self.assert_http_result(output, None, |body| body == HELLO_WORLD_BODY)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct MockResponse {
        status: StatusCode,
        body: Result<String, String>,
    }

    #[async_trait]
    impl ProbeResponse for MockResponse {
        fn status(&self) -> StatusCode {
            self.status
        }

        async fn text(self) -> Result<String, String> {
            self.body
        }
    }

    type Scripted = Result<(StatusCode, Result<String, String>), TransportError>;

    /// Plays back scripted results, repeating the last one forever
    #[derive(Clone, Default)]
    struct MockTransport {
        script: Arc<Mutex<VecDeque<Scripted>>>,
        calls: Arc<AtomicUsize>,
        seen: Arc<Mutex<Vec<ProbeRequest>>>,
    }

    impl MockTransport {
        fn new(script: Vec<Scripted>) -> Self {
            Self {
                script: Arc::new(Mutex::new(script.into())),
                ..Default::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        type Response = MockResponse;

        async fn send(&self, request: &ProbeRequest) -> Result<MockResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(request.clone());

            let next = {
                let mut script = self.script.lock().unwrap();
                if script.len() > 1 {
                    script.pop_front().unwrap()
                } else {
                    script.front().cloned().unwrap()
                }
            };
            next.map(|(status, body)| MockResponse { status, body })
        }
    }

    fn ok(body: &str) -> Scripted {
        Ok((StatusCode::OK, Ok(body.to_string())))
    }

    fn status(code: u16) -> Scripted {
        Ok((
            StatusCode::from_u16(code).unwrap(),
            Ok(format!("error page {}", code)),
        ))
    }

    fn refused() -> Scripted {
        Err(TransportError::Connect("connection refused".to_string()))
    }

    /// Records delays without waiting
    #[derive(Clone, Default)]
    struct RecordingSleeper {
        delays: Arc<Mutex<Vec<Duration>>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.delays.lock().unwrap().push(duration);
        }
    }

    const LONG: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn test_non_string_target_makes_no_calls() {
        let transport = MockTransport::new(vec![ok("hi")]);
        let validator = PollingValidator::with_parts(transport.clone(), RecordingSleeper::default());

        let err = validator
            .validate(&json!(1234), &Headers::new(), LONG, |_| true)
            .await
            .unwrap_err();

        assert!(matches!(err, E2eError::TargetNotString(_)));
        assert_eq!(transport.calls(), 0);

        let passed = validator
            .assert_http_result(&json!({"ip": "10.0.0.1"}), None, |_| true)
            .await;
        assert!(!passed);
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_header_makes_no_calls() {
        let transport = MockTransport::new(vec![ok("hi")]);
        let validator = PollingValidator::with_parts(transport.clone(), RecordingSleeper::default());

        let headers = Headers::new().with("X-Bad", "line\nbreak");
        let err = validator
            .validate(&json!("example.com"), &headers, LONG, |_| true)
            .await
            .unwrap_err();

        assert!(matches!(err, E2eError::InvalidRequest { .. }));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_succeeds_on_nth_attempt_with_nth_body() {
        let transport = MockTransport::new(vec![
            refused(),
            status(502),
            status(404),
            ok("fourth body"),
        ]);
        let sleeper = RecordingSleeper::default();
        let validator = PollingValidator::with_parts(transport.clone(), sleeper.clone());

        let mut seen_body = String::new();
        let report = validator
            .validate(&json!("example.com"), &Headers::new(), LONG, |body| {
                seen_body = body.to_string();
                true
            })
            .await
            .unwrap();

        assert_eq!(seen_body, "fourth body");
        assert_eq!(report.attempts, 4);
        assert_eq!(report.retries, 3);
        assert_eq!(report.status, StatusCode::OK);
        assert_eq!(transport.calls(), 4);
    }

    #[tokio::test]
    async fn test_delay_sequence() {
        let mut script: Vec<Scripted> = (0..6).map(|_| status(503)).collect();
        script.push(ok("up"));
        let transport = MockTransport::new(script);
        let sleeper = RecordingSleeper::default();
        let validator = PollingValidator::with_parts(transport, sleeper.clone());

        let report = validator
            .validate(&json!("example.com"), &Headers::new(), LONG, |_| true)
            .await
            .unwrap();

        let secs: Vec<u64> = sleeper
            .delays
            .lock()
            .unwrap()
            .iter()
            .map(|d| d.as_secs())
            .collect();
        assert_eq!(secs, vec![10, 20, 30, 30, 30, 30]);
        assert_eq!(report.delays.len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_status_times_out() {
        let transport = MockTransport::new(vec![status(500)]);
        let validator = PollingValidator::with_parts(transport.clone(), TokioSleeper);
        let max_wait = Duration::from_secs(95);

        let start = Instant::now();
        let mut checked = false;
        let err = validator
            .validate(&json!("example.com"), &Headers::new(), max_wait, |_| {
                checked = true;
                true
            })
            .await
            .unwrap_err();
        let waited = start.elapsed();

        match err {
            E2eError::Timeout { status, .. } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR)
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(!checked, "check must not run against an error page");
        assert!(waited >= max_wait);
        assert!(waited <= max_wait + crate::request::ATTEMPT_TIMEOUT);
        // 0s, 10s, 30s, 60s, 90s, 95s
        assert_eq!(transport.calls(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_transport_error_surfaces() {
        let transport = MockTransport::new(vec![refused()]);
        let validator = PollingValidator::with_parts(transport, TokioSleeper);

        let err = validator
            .validate(
                &json!("example.com"),
                &Headers::new(),
                Duration::from_secs(25),
                |_| true,
            )
            .await
            .unwrap_err();

        match err {
            E2eError::Transport { source, attempts, .. } => {
                assert!(matches!(source, TransportError::Connect(_)));
                assert_eq!(attempts, 3);
            }
            other => panic!("expected transport error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_body_read_failure() {
        let transport = MockTransport::new(vec![Ok((
            StatusCode::OK,
            Err("stream reset".to_string()),
        ))]);
        let validator = PollingValidator::with_parts(transport, RecordingSleeper::default());

        let err = validator
            .validate(&json!("example.com"), &Headers::new(), LONG, |_| true)
            .await
            .unwrap_err();
        assert!(matches!(err, E2eError::BodyRead { .. }));
    }

    #[tokio::test]
    async fn test_predicate_rejection() {
        let transport = MockTransport::new(vec![ok("Goodbye\n")]);
        let validator = PollingValidator::with_parts(transport.clone(), RecordingSleeper::default());

        let err = validator
            .validate(&json!("example.com"), &Headers::new(), LONG, |b| {
                b == HELLO_WORLD_BODY
            })
            .await
            .unwrap_err();
        assert!(matches!(err, E2eError::PredicateRejected { .. }));
        assert!(!validator.assert_http_hello_world(&json!("example.com")).await);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_host_header_reaches_transport_as_authority() {
        let transport = MockTransport::new(vec![ok("echo")]);
        let validator = PollingValidator::with_parts(transport.clone(), RecordingSleeper::default());
        let headers = Headers::new().with("HOST", "apps.example.com");

        assert!(
            validator
                .assert_http_result(&json!("1.2.3.4/echoserver"), Some(&headers), |b| !b.is_empty())
                .await
        );

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].authority().as_deref(), Some("apps.example.com"));
        assert!(seen[0].headers.get("host").is_none());
        assert_eq!(seen[0].url.as_str(), "http://1.2.3.4/echoserver");
    }
}
