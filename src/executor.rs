//! Dispatches commands through the transport with signing and retry.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};

use crate::command::{Command, CommandState};
use crate::config::ClientConfig;
use crate::credential::CredentialProvider;
use crate::error::{Result, SdkError};
use crate::mapper::map_service_error;
use crate::result::ServiceResult;
use crate::sign::sign;
use crate::transport::Transport;

/// Executes one or many commands against a single service endpoint.
///
/// Shares the transport and credential provider across concurrent
/// executions; holds no per-command mutable state of its own.
pub struct Executor {
    transport: Arc<dyn Transport>,
    provider: Arc<dyn CredentialProvider>,
    config: ClientConfig,
    service: String,
}

impl Executor {
    pub fn new(
        transport: Arc<dyn Transport>,
        provider: Arc<dyn CredentialProvider>,
        config: ClientConfig,
        service: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            provider,
            config,
            service: service.into(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Executes one command to completion, retrying transient failures.
    ///
    /// The command's parameters are never mutated; only its state advances
    /// to `Executed` or `Failed`.
    pub async fn execute(&self, command: &mut Command) -> Result<ServiceResult> {
        command.set_state(CommandState::Executing);
        let outcome = self.run_with_retries(command).await;
        command.set_state(match outcome {
            Ok(_) => CommandState::Executed,
            Err(_) => CommandState::Failed,
        });
        outcome
    }

    /// Executes many commands concurrently with bounded parallelism.
    ///
    /// Results come back keyed by input position. A failing command never
    /// cancels its siblings; dropping the returned future cancels commands
    /// that have not started yet while in-flight requests run to their
    /// transport timeout.
    pub async fn execute_all(
        &self,
        commands: &mut [Command],
    ) -> Vec<Result<ServiceResult>> {
        let total = commands.len();
        let mut outcomes: Vec<Option<Result<ServiceResult>>> =
            (0..total).map(|_| None).collect();

        let mut in_flight = stream::iter(
            commands
                .iter_mut()
                .enumerate()
                .map(|(index, command)| async move { (index, self.execute(command).await) }),
        )
        .buffer_unordered(self.config.max_concurrent_requests.max(1));

        while let Some((index, outcome)) = in_flight.next().await {
            outcomes[index] = Some(outcome);
        }
        drop(in_flight);

        outcomes
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    Err(SdkError::Config(
                        "batch execution produced no outcome for a command".into(),
                    ))
                })
            })
            .collect()
    }

    async fn run_with_retries(&self, command: &Command) -> Result<ServiceResult> {
        let max_attempts = self.config.retry_max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.attempt(command).await {
                Ok(result) => {
                    tracing::debug!(
                        operation = command.operation_name(),
                        attempt,
                        "operation succeeded"
                    );
                    return Ok(result);
                }
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let delay = backoff_delay(
                        self.config.retry_base_delay,
                        self.config.retry_max_delay,
                        attempt,
                    );
                    tracing::warn!(
                        operation = command.operation_name(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    tracing::debug!(
                        operation = command.operation_name(),
                        attempt,
                        error = %err,
                        "operation failed"
                    );
                    return Err(err);
                }
            }
        }
    }

    /// One signed request/response cycle.
    ///
    /// Credentials are re-resolved here, per attempt, so refreshed
    /// temporary credentials are picked up between retries.
    async fn attempt(&self, command: &Command) -> Result<ServiceResult> {
        let credentials = self.provider.resolve()?;
        if credentials.is_expired() {
            return Err(SdkError::Credential(
                "resolved credentials are expired".into(),
            ));
        }

        let mut request = command.to_request()?;
        if let Some(host) = endpoint_host(&self.config.endpoint) {
            request.set_header("host", host);
        }
        sign(
            &mut request,
            &credentials,
            &self.service,
            &self.config.region,
            chrono::Utc::now(),
        )?;

        let response = self.transport.send(&self.config.endpoint, &request).await?;
        if response.is_success() {
            ServiceResult::from_response(&response, &command.descriptor().result)
        } else {
            Err(map_service_error(&response, &command.descriptor().errors))
        }
    }
}

impl Command {
    /// Hands this command to `executor` singly and awaits the result.
    pub async fn execute(&mut self, executor: &Executor) -> Result<ServiceResult> {
        executor.execute(self).await
    }
}

/// Exponential backoff: `base * 2^(attempt-1)`, capped at `max_delay`.
fn backoff_delay(base: Duration, max_delay: Duration, completed_attempts: u32) -> Duration {
    let factor = 2u32.saturating_pow(completed_attempts.saturating_sub(1));
    base.saturating_mul(factor).min(max_delay)
}

/// Host portion of an endpoint URL, for the signed `host` header.
fn endpoint_host(endpoint: &str) -> Option<&str> {
    let rest = endpoint.split_once("://").map(|(_, r)| r).unwrap_or(endpoint);
    let host = rest.split('/').next().unwrap_or("");
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}
