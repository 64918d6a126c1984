//! DispatcherClient - main entry point for the SDK

use std::sync::Arc;

use dispatch_stream::{
    DispatcherTransport, DurableEvent, DurableEventListenerConditions, DurableListener,
    RegisterDurableEventRequest, RunId, RunListener, WaitOptions,
};

use crate::config::ClientConfig;
use crate::error::Result;
use crate::run::WorkflowRunRef;

/// Client for awaiting workflow runs and durable events.
///
/// Both listeners are pooled: every run or durable wait issued through one
/// client shares a single stream per listener, opened on first use.
///
/// # Example
///
/// ```rust,ignore
/// use dispatch_sdk::{ClientConfig, DispatcherClient, WaitOptions};
///
/// let client = DispatcherClient::new(transport, ClientConfig::load()?)?;
///
/// let output = client.run("wf-123").result(WaitOptions::default()).await?;
/// println!("fetch step returned {:?}", output.step("fetch"));
///
/// client.shutdown().await?;
/// ```
pub struct DispatcherClient {
    config: ClientConfig,
    run_listener: Arc<RunListener>,
    durable_listener: DurableListener,
}

impl DispatcherClient {
    /// Create a client over `transport`.
    ///
    /// Fails when the listener overrides in `config` are invalid. No stream is
    /// opened until the first wait.
    pub fn new(transport: Arc<dyn DispatcherTransport>, config: ClientConfig) -> Result<Self> {
        let run_listener = RunListener::with_config(transport.clone(), config.run_listener_config()?)?;
        let durable_listener =
            DurableListener::with_config(transport, config.durable_listener_config()?)?;

        Ok(Self {
            config,
            run_listener: Arc::new(run_listener),
            durable_listener,
        })
    }

    /// Create a client configured from the config file and environment.
    pub fn from_env(transport: Arc<dyn DispatcherTransport>) -> Result<Self> {
        Self::new(transport, ClientConfig::load()?)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Reference to a workflow run, for awaiting its result.
    pub fn run(&self, run_id: impl Into<RunId>) -> WorkflowRunRef {
        WorkflowRunRef::new(run_id.into(), self.run_listener.clone())
    }

    /// Register wait conditions for `task_id`/`signal_key` and wait for the
    /// durable event that satisfies them.
    ///
    /// User event keys in `conditions` are prefixed with the configured
    /// namespace.
    pub async fn wait_for_durable_event(
        &self,
        task_id: impl Into<String>,
        signal_key: impl Into<String>,
        mut conditions: DurableEventListenerConditions,
        options: WaitOptions,
    ) -> Result<DurableEvent> {
        for condition in &mut conditions.user_event_conditions {
            condition.user_event_key = self.config.apply_namespace(&condition.user_event_key);
        }

        let request = RegisterDurableEventRequest {
            task_id: task_id.into(),
            signal_key: signal_key.into(),
            conditions,
        };

        Ok(self.durable_listener.wait_for(request, options).await?)
    }

    pub fn run_listener(&self) -> &RunListener {
        &self.run_listener
    }

    pub fn durable_listener(&self) -> &DurableListener {
        &self.durable_listener
    }

    /// Shut both listeners down, rejecting every outstanding wait.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::debug!("Shutting down dispatcher client");
        let runs = self.run_listener.shutdown().await;
        let durable = self.durable_listener.shutdown().await;
        runs?;
        durable?;
        Ok(())
    }
}
