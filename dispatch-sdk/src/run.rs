//! Handles for awaiting workflow run results.

use std::collections::BTreeMap;
use std::sync::Arc;

use dispatch_stream::{
    RunId, RunListener, RunWaiter, WaitOptions, WorkflowRunEvent, WorkflowRunEventType,
};
use serde::de::DeserializeOwned;

use crate::error::{Result, SdkError};

/// Outputs of a finished run, keyed by step readable id.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutput {
    run_id: RunId,
    steps: BTreeMap<String, serde_json::Value>,
}

impl RunOutput {
    /// Interpret a terminal run event.
    ///
    /// A run only succeeds when it finished and no step reported an error.
    pub fn from_event(event: WorkflowRunEvent) -> Result<Self> {
        let mut errors: Vec<String> = event.errors().into_iter().map(str::to_string).collect();

        if event.event_type != WorkflowRunEventType::Finished && errors.is_empty() {
            errors.push(format!("run ended with status {:?}", event.event_type));
        }

        if !errors.is_empty() {
            return Err(SdkError::RunFailed {
                run_id: event.workflow_run_id,
                errors,
            });
        }

        let steps = event
            .results
            .into_iter()
            .filter_map(|result| result.output.map(|output| (result.step_readable_id, output)))
            .collect();

        Ok(Self {
            run_id: event.workflow_run_id,
            steps,
        })
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Output of one step.
    pub fn step(&self, readable_id: &str) -> Option<&serde_json::Value> {
        self.steps.get(readable_id)
    }

    pub fn steps(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.steps
    }

    /// Decode the whole output map into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let value = serde_json::to_value(&self.steps)?;
        Ok(serde_json::from_value(value)?)
    }

    pub fn into_steps(self) -> BTreeMap<String, serde_json::Value> {
        self.steps
    }
}

/// Reference to a workflow run on the dispatcher.
#[derive(Clone)]
pub struct WorkflowRunRef {
    run_id: RunId,
    listener: Arc<RunListener>,
}

impl WorkflowRunRef {
    pub(crate) fn new(run_id: RunId, listener: Arc<RunListener>) -> Self {
        Self { run_id, listener }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Register interest now and await the terminal event later.
    pub fn subscribe(&self) -> Result<RunWaiter> {
        Ok(self.listener.subscribe(self.run_id.clone())?)
    }

    /// Wait for the run to end and collect its step outputs.
    pub async fn result(&self, options: WaitOptions) -> Result<RunOutput> {
        tracing::debug!("Waiting for workflow run {}", self.run_id);
        let event = self.listener.get(self.run_id.clone(), options).await?;
        RunOutput::from_event(event)
    }

    /// Wait for the run to end and decode its output map into `T`.
    pub async fn result_as<T: DeserializeOwned>(&self, options: WaitOptions) -> Result<T> {
        self.result(options).await?.decode()
    }
}

impl std::fmt::Debug for WorkflowRunRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowRunRef")
            .field("run_id", &self.run_id)
            .finish()
    }
}
