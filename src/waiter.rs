//! Polling state machine: repeatedly executes a command until an acceptor
//! declares success or failure, or the attempt budget runs out.

use std::time::Duration;

use crate::catalog::{Acceptor, MatcherKind, WaitState, WaiterSpec};
use crate::command::Command;
use crate::error::{Result, SdkError};
use crate::executor::Executor;
use crate::result::ServiceResult;

/// A waiter bound to one spec and one executor.
pub struct Waiter<'a> {
    executor: &'a Executor,
    spec: WaiterSpec,
    name: String,
}

/// Internal verdict of one poll.
enum PollVerdict {
    Success(ServiceResult),
    Failure(SdkError),
    Retry,
}

impl<'a> Waiter<'a> {
    pub(crate) fn new(executor: &'a Executor, name: impl Into<String>, spec: WaiterSpec) -> Self {
        Self {
            executor,
            spec,
            name: name.into(),
        }
    }

    /// Polls `command` until a terminal state.
    ///
    /// Returns the matching result on success, the failure-state error on
    /// failure, and `Timeout` once attempts exceed the budget. Sleeps the
    /// configured interval between polls, never after the final one.
    /// Reserved `waiter.interval` / `waiter.max_attempts` parameters on
    /// the command override both the spec and the client configuration.
    pub async fn wait(&self, command: &mut Command) -> Result<ServiceResult> {
        if command.operation_name() != self.spec.operation {
            return Err(SdkError::Config(format!(
                "waiter {} polls {} but was given a {} command",
                self.name,
                self.spec.operation,
                command.operation_name()
            )));
        }

        let interval = command
            .waiter_override("interval")
            .or(self.executor.config().waiter_interval)
            .unwrap_or(self.spec.interval);
        let max_attempts = command
            .waiter_override("max_attempts")
            .map(|n| n as u32)
            .or(self.executor.config().waiter_max_attempts)
            .unwrap_or(self.spec.max_attempts)
            .max(1);

        for attempt in 1..=max_attempts {
            let verdict = match self.executor.execute(command).await {
                Ok(result) => self.evaluate_result(&result).map(|state| match state {
                    WaitState::Success => PollVerdict::Success(result),
                    WaitState::Failure => PollVerdict::Failure(self.failure_error(result.status())),
                    WaitState::Retry => PollVerdict::Retry,
                }),
                // Errors (transport included) are just another poll shape:
                // matched by status/error acceptors or retried by default.
                Err(err) => self.evaluate_error(&err).map(|state| match state {
                    // A success acceptor matched on an error poll yields an
                    // empty result that keeps the poll's HTTP status.
                    WaitState::Success => PollVerdict::Success(
                        ServiceResult::empty_with_status(err.http_status().unwrap_or_default()),
                    ),
                    WaitState::Failure => PollVerdict::Failure(err),
                    WaitState::Retry => PollVerdict::Retry,
                }),
            };

            match verdict.unwrap_or(PollVerdict::Retry) {
                PollVerdict::Success(result) => {
                    tracing::debug!(waiter = %self.name, attempt, "waiter reached success state");
                    return Ok(result);
                }
                PollVerdict::Failure(err) => {
                    tracing::debug!(waiter = %self.name, attempt, "waiter reached failure state");
                    return Err(err);
                }
                PollVerdict::Retry => {
                    tracing::debug!(waiter = %self.name, attempt, "waiter still polling");
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(Duration::from_secs(interval)).await;
            }
        }

        Err(SdkError::Timeout {
            operation: self.spec.operation.clone(),
            attempts: max_attempts,
        })
    }

    /// First acceptor matching the successful result wins, in declared order.
    fn evaluate_result(&self, result: &ServiceResult) -> Option<WaitState> {
        self.spec
            .acceptors
            .iter()
            .find(|acceptor| matches_result(acceptor, result))
            .map(|acceptor| acceptor.state)
    }

    /// First acceptor matching the failed poll wins, in declared order.
    fn evaluate_error(&self, err: &SdkError) -> Option<WaitState> {
        self.spec
            .acceptors
            .iter()
            .find(|acceptor| matches_error(acceptor, err))
            .map(|acceptor| acceptor.state)
    }

    fn failure_error(&self, status: u16) -> SdkError {
        SdkError::Service {
            kind: "WaiterStateFailure".to_string(),
            http_status: status,
            code: "WaiterStateFailure".to_string(),
            message: format!(
                "waiter {} matched a failure acceptor while polling {}",
                self.name, self.spec.operation
            ),
            request_id: None,
        }
    }
}

fn matches_result(acceptor: &Acceptor, result: &ServiceResult) -> bool {
    match acceptor.matcher {
        MatcherKind::Path => match &acceptor.argument {
            Some(path) => result.get_path(path) == Some(&acceptor.expected),
            None => false,
        },
        MatcherKind::Status => acceptor.expected.as_u64() == Some(result.status() as u64),
        MatcherKind::Error => false,
    }
}

fn matches_error(acceptor: &Acceptor, err: &SdkError) -> bool {
    match acceptor.matcher {
        MatcherKind::Path => false,
        MatcherKind::Status => match err.http_status() {
            Some(status) => acceptor.expected.as_u64() == Some(status as u64),
            None => false,
        },
        MatcherKind::Error => match err.error_code() {
            Some(code) => acceptor.expected.as_str() == Some(code),
            None => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::sample_registry;
    use crate::config::ClientConfig;
    use crate::credential::{Credentials, StaticProvider};
    use crate::transport::{HttpRequestSpec, HttpResponse, Transport};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<HttpResponse>>>,
        sends: AtomicUsize,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<HttpResponse>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                sends: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, _endpoint: &str, _request: &HttpRequestSpec) -> Result<HttpResponse> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .expect("script lock poisoned")
                .pop_front()
                .unwrap_or_else(|| Err(SdkError::Transport("script exhausted".into())))
        }
    }

    fn response(status: u16, body: &str) -> Result<HttpResponse> {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".into(), "application/json".into());
        Ok(HttpResponse {
            status,
            headers,
            body: body.as_bytes().to_vec(),
        })
    }

    fn executor(transport: Arc<ScriptedTransport>) -> Executor {
        Executor::new(
            transport,
            Arc::new(StaticProvider::new(Credentials::new("id", "secret"))),
            ClientConfig::new("https://storage.example.com")
                .with_retry_max_attempts(1)
                .with_retry_base_delay(Duration::from_millis(1)),
            "storage",
        )
    }

    fn bucket_waiter<'a>(executor: &'a Executor) -> Waiter<'a> {
        let registry = sample_registry();
        let spec = registry.waiter("BucketExists").unwrap().clone();
        Waiter::new(executor, "BucketExists", spec)
    }

    fn head_bucket(interval: u64, max_attempts: u64) -> Command {
        let registry = sample_registry();
        let mut command = Command::new(registry.lookup("HeadBucket").unwrap(), []).unwrap();
        command.set("BucketName", json!("b")).unwrap();
        command.set("waiter.interval", json!(interval)).unwrap();
        command
            .set("waiter.max_attempts", json!(max_attempts))
            .unwrap();
        command
    }

    #[tokio::test]
    async fn success_on_first_matching_poll() {
        let transport = ScriptedTransport::new(vec![response(200, "{}")]);
        let executor = executor(Arc::clone(&transport));
        let waiter = bucket_waiter(&executor);
        let mut command = head_bucket(0, 5);

        assert!(waiter.wait(&mut command).await.is_ok());
        assert_eq!(transport.sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_through_error_polls_until_success() {
        let not_found = r#"{"Code": "NoSuchBucket", "Message": "not yet"}"#;
        let transport = ScriptedTransport::new(vec![
            response(404, not_found),
            response(404, not_found),
            response(200, "{}"),
        ]);
        let executor = executor(Arc::clone(&transport));
        let waiter = bucket_waiter(&executor);
        let mut command = head_bucket(0, 5);

        assert!(waiter.wait(&mut command).await.is_ok());
        assert_eq!(transport.sends.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failure_acceptor_is_terminal() {
        let transport = ScriptedTransport::new(vec![response(
            403,
            r#"{"Code": "AccessDenied", "Message": "no"}"#,
        )]);
        let executor = executor(Arc::clone(&transport));
        let waiter = bucket_waiter(&executor);
        let mut command = head_bucket(0, 5);

        match waiter.wait(&mut command).await {
            Err(SdkError::Service { kind, .. }) => assert_eq!(kind, "AccessDenied"),
            other => panic!("expected Service, got: {:?}", other),
        }
        assert_eq!(transport.sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn times_out_after_attempt_budget() {
        let not_found = r#"{"Code": "NoSuchBucket", "Message": "not yet"}"#;
        let transport = ScriptedTransport::new(vec![
            response(404, not_found),
            response(404, not_found),
            response(404, not_found),
            response(200, "{}"),
        ]);
        let executor = executor(Arc::clone(&transport));
        let waiter = bucket_waiter(&executor);
        let mut command = head_bucket(0, 3);

        match waiter.wait(&mut command).await {
            Err(SdkError::Timeout {
                operation,
                attempts,
            }) => {
                assert_eq!(operation, "HeadBucket");
                assert_eq!(attempts, 3);
            }
            other => panic!("expected Timeout, got: {:?}", other),
        }
        assert_eq!(transport.sends.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn no_sleep_after_final_attempt() {
        let not_found = r#"{"Code": "NoSuchBucket", "Message": "not yet"}"#;
        let transport = ScriptedTransport::new(vec![response(404, not_found)]);
        let executor = executor(Arc::clone(&transport));
        let waiter = bucket_waiter(&executor);
        // One attempt with a long interval: finishing fast proves the
        // waiter skipped the final sleep.
        let mut command = head_bucket(30, 1);

        let started = Instant::now();
        assert!(matches!(
            waiter.wait(&mut command).await,
            Err(SdkError::Timeout { .. })
        ));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn path_acceptor_matches_result_value() {
        let registry = sample_registry();
        let spec = WaiterSpec {
            operation: "HeadBucket".into(),
            interval: 0,
            max_attempts: 5,
            acceptors: vec![Acceptor {
                matcher: MatcherKind::Path,
                argument: Some("Status".into()),
                expected: json!("ready"),
                state: WaitState::Success,
            }],
        };
        let transport = ScriptedTransport::new(vec![
            response(200, r#"{"Status": "creating"}"#),
            response(200, r#"{"Status": "ready"}"#),
        ]);
        let executor = executor(Arc::clone(&transport));
        let waiter = Waiter::new(&executor, "StatusReady", spec);
        let mut command = Command::new(registry.lookup("HeadBucket").unwrap(), []).unwrap();
        command.set("BucketName", json!("b")).unwrap();
        command.set("waiter.interval", json!(0)).unwrap();

        let result = waiter.wait(&mut command).await.unwrap();
        assert_eq!(result.get("Status"), Some(&json!("ready")));
        assert_eq!(transport.sends.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn success_on_error_poll_keeps_poll_status() {
        let registry = sample_registry();
        // Waits for the bucket to be gone: a 404 poll is the success state.
        let spec = WaiterSpec {
            operation: "HeadBucket".into(),
            interval: 0,
            max_attempts: 3,
            acceptors: vec![Acceptor {
                matcher: MatcherKind::Status,
                argument: None,
                expected: json!(404),
                state: WaitState::Success,
            }],
        };
        let transport = ScriptedTransport::new(vec![response(
            404,
            r#"{"Code": "NoSuchBucket", "Message": "gone"}"#,
        )]);
        let executor = executor(Arc::clone(&transport));
        let waiter = Waiter::new(&executor, "BucketGone", spec);
        let mut command = Command::new(registry.lookup("HeadBucket").unwrap(), []).unwrap();
        command.set("BucketName", json!("b")).unwrap();

        let result = waiter.wait(&mut command).await.unwrap();
        assert_eq!(result.status(), 404);
        assert!(result.keys().is_empty());
    }

    #[tokio::test]
    async fn wrong_operation_rejected() {
        let transport = ScriptedTransport::new(vec![]);
        let executor = executor(transport);
        let waiter = bucket_waiter(&executor);
        let registry = sample_registry();
        let mut command = Command::new(registry.lookup("GetItem").unwrap(), []).unwrap();

        assert!(matches!(
            waiter.wait(&mut command).await,
            Err(SdkError::Config(_))
        ));
    }
}
