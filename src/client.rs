//! Service client: composes the registry, executor, waiters, and paginators.

use std::sync::Arc;

use serde_json::Value;

use crate::catalog::Registry;
use crate::command::Command;
use crate::config::ClientConfig;
use crate::credential::{ChainProvider, CredentialProvider};
use crate::error::{Result, SdkError};
use crate::executor::Executor;
use crate::paginator::Paginator;
use crate::result::ServiceResult;
use crate::transport::{ReqwestTransport, Transport};
use crate::waiter::Waiter;

/// A client for one service, built from its operation catalog.
///
/// The registry is immutable and shared; the executor holds the transport
/// and credential provider. Cloning commands out of the client is cheap —
/// they share the catalog's descriptors by `Arc`.
pub struct Client {
    registry: Arc<Registry>,
    executor: Executor,
}

impl Client {
    /// Builds a client from a JSON catalog document with the default
    /// reqwest transport.
    pub fn from_catalog(
        catalog_json: &str,
        provider: Arc<dyn CredentialProvider>,
        config: ClientConfig,
    ) -> Result<Self> {
        let transport = Arc::new(ReqwestTransport::new(config.timeout, config.connect_timeout)?);
        Self::with_transport(Registry::from_json(catalog_json)?, transport, provider, config)
    }

    /// Builds a client from a catalog using the default credential chain
    /// (environment variables, then the profile file).
    pub fn from_env(catalog_json: &str, config: ClientConfig) -> Result<Self> {
        Self::from_catalog(catalog_json, Arc::new(ChainProvider::default_chain()), config)
    }

    /// Builds a client over an explicit transport. The seam used by tests
    /// and by embedders bringing their own HTTP stack.
    pub fn with_transport(
        registry: Registry,
        transport: Arc<dyn Transport>,
        provider: Arc<dyn CredentialProvider>,
        config: ClientConfig,
    ) -> Result<Self> {
        if config.endpoint.is_empty() {
            return Err(SdkError::Config(
                "client configuration needs a service endpoint".into(),
            ));
        }
        let registry = Arc::new(registry);
        let executor = Executor::new(transport, provider, config, registry.service().to_string());
        Ok(Self { registry, executor })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &ClientConfig {
        self.executor.config()
    }

    /// Creates a command for a named operation with initial parameters.
    pub fn get_command(
        &self,
        operation: &str,
        params: impl IntoIterator<Item = (String, Value)>,
    ) -> Result<Command> {
        Command::new(self.registry.lookup(operation)?, params)
    }

    /// Executes one command to completion.
    pub async fn execute(&self, command: &mut Command) -> Result<ServiceResult> {
        self.executor.execute(command).await
    }

    /// Executes many commands concurrently; results keyed by input position.
    pub async fn execute_all(&self, commands: &mut [Command]) -> Vec<Result<ServiceResult>> {
        self.executor.execute_all(commands).await
    }

    /// Polls `command` under the named waiter until a terminal state.
    pub async fn wait(&self, waiter_name: &str, command: &mut Command) -> Result<ServiceResult> {
        let spec = self.registry.waiter(waiter_name)?.clone();
        Waiter::new(&self.executor, waiter_name, spec)
            .wait(command)
            .await
    }

    /// Wraps `command` in a paginator for its declared pagination rule.
    pub fn paginate(&self, command: Command) -> Result<Paginator<'_>> {
        let rule = self
            .registry
            .pagination(command.operation_name())
            .cloned()
            .ok_or_else(|| {
                SdkError::Config(format!(
                    "operation {} is not paginatable",
                    command.operation_name()
                ))
            })?;
        Ok(Paginator::new(&self.executor, rule, command))
    }
}
