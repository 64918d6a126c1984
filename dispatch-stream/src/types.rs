//! Core types for the dispatch-stream crate.
//!
//! These mirror the dispatcher's streaming contracts without committing to a
//! wire encoding; a transport converts them to and from its own messages.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a workflow run on the dispatcher.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    /// Create a new run ID from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the run ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RunId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for RunId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Routing key for durable events.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct DurableKey {
    /// The task waiting on the signal
    pub task_id: String,
    /// The signal the task is waiting on
    pub signal_key: String,
}

impl DurableKey {
    /// Create a new durable key.
    pub fn new(task_id: impl Into<String>, signal_key: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            signal_key: signal_key.into(),
        }
    }
}

impl<T: Into<String>, S: Into<String>> From<(T, S)> for DurableKey {
    fn from((task_id, signal_key): (T, S)) -> Self {
        Self::new(task_id, signal_key)
    }
}

impl fmt::Display for DurableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.task_id, self.signal_key)
    }
}

/// Unique identifier for one waiter within a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Create a new SubscriberId with the given value
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Kind of workflow-run event emitted by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowRunEventType {
    /// The run was picked up
    Started,
    /// Every step of the run completed
    Finished,
    /// At least one step failed
    Failed,
    /// The run was cancelled
    Cancelled,
    /// The run exceeded its timeout
    TimedOut,
}

impl WorkflowRunEventType {
    /// Whether no further events will follow for the run.
    pub fn is_terminal(self) -> bool {
        match self {
            WorkflowRunEventType::Started => false,
            WorkflowRunEventType::Finished
            | WorkflowRunEventType::Failed
            | WorkflowRunEventType::Cancelled
            | WorkflowRunEventType::TimedOut => true,
        }
    }
}

/// Result of one step within a workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRunResult {
    pub step_run_id: String,
    pub step_readable_id: String,
    pub job_run_id: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub output: Option<serde_json::Value>,
}

/// Inbound event on the workflow-run stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRunEvent {
    pub workflow_run_id: RunId,
    pub event_type: WorkflowRunEventType,
    pub event_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub results: Vec<StepRunResult>,
    /// Set by the dispatcher when it wants the client to drop the stream
    #[serde(default)]
    pub hangup: bool,
}

impl WorkflowRunEvent {
    /// Create an event with no step results.
    pub fn new(workflow_run_id: impl Into<RunId>, event_type: WorkflowRunEventType) -> Self {
        Self {
            workflow_run_id: workflow_run_id.into(),
            event_type,
            event_timestamp: Utc::now(),
            results: Vec::new(),
            hangup: false,
        }
    }

    /// Attach a step result.
    pub fn with_result(mut self, result: StepRunResult) -> Self {
        self.results.push(result);
        self
    }

    /// Errors reported by any step of the run.
    pub fn errors(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter_map(|r| r.error.as_deref())
            .collect()
    }
}

/// Outbound interest on the workflow-run stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeToWorkflowRunsRequest {
    pub workflow_run_id: RunId,
}

/// Outbound interest on the durable-event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenForDurableEventRequest {
    pub task_id: String,
    pub signal_key: String,
}

/// Inbound event on the durable-event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurableEvent {
    pub task_id: String,
    pub signal_key: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl DurableEvent {
    /// Routing key of this event.
    pub fn key(&self) -> DurableKey {
        DurableKey::new(self.task_id.clone(), self.signal_key.clone())
    }
}

/// What the dispatcher does when a match condition is satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    #[default]
    Create,
    Queue,
    Cancel,
    Skip,
}

/// Fields shared by every match condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BaseMatchCondition {
    pub readable_data_key: String,
    pub action: Action,
    /// Conditions sharing a group are OR-ed; groups are AND-ed
    pub or_group_id: String,
    #[serde(default)]
    pub expression: Option<String>,
}

/// Satisfied once the given duration has elapsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SleepMatchCondition {
    pub base: BaseMatchCondition,
    /// Duration string understood by the dispatcher, e.g. `"10s"`
    pub sleep_for: String,
}

/// Satisfied when a user event with the given key is pushed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEventMatchCondition {
    pub base: BaseMatchCondition,
    pub user_event_key: String,
}

/// Server-side wait conditions for a durable event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DurableEventListenerConditions {
    #[serde(default)]
    pub sleep_conditions: Vec<SleepMatchCondition>,
    #[serde(default)]
    pub user_event_conditions: Vec<UserEventMatchCondition>,
}

impl DurableEventListenerConditions {
    pub fn is_empty(&self) -> bool {
        self.sleep_conditions.is_empty() && self.user_event_conditions.is_empty()
    }
}

/// Unary registration establishing wait conditions before listening.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterDurableEventRequest {
    pub task_id: String,
    pub signal_key: String,
    pub conditions: DurableEventListenerConditions,
}

impl RegisterDurableEventRequest {
    pub fn new(
        key: DurableKey,
        sleep_conditions: Vec<SleepMatchCondition>,
        user_event_conditions: Vec<UserEventMatchCondition>,
    ) -> Self {
        Self {
            task_id: key.task_id,
            signal_key: key.signal_key,
            conditions: DurableEventListenerConditions {
                sleep_conditions,
                user_event_conditions,
            },
        }
    }

    /// Routing key the registration applies to.
    pub fn key(&self) -> DurableKey {
        DurableKey::new(self.task_id.clone(), self.signal_key.clone())
    }
}

/// Acknowledgement of a durable event registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RegisterDurableEventResponse {}

/// Observable state of a listener's connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No stream is open and none is wanted
    Idle,
    /// A stream for this generation is being opened
    Connecting { generation: u64 },
    /// A stream for this generation is open
    Connected { generation: u64 },
    /// Waiting before the given reconnection attempt
    Backoff { attempt: u32, delay: Duration },
    /// Reconnection attempts ran out; the listener is unusable
    Exhausted,
    /// The listener was shut down
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(WorkflowRunEventType::Started, false)]
    #[case(WorkflowRunEventType::Finished, true)]
    #[case(WorkflowRunEventType::Failed, true)]
    #[case(WorkflowRunEventType::Cancelled, true)]
    #[case(WorkflowRunEventType::TimedOut, true)]
    fn test_terminal_event_types(#[case] kind: WorkflowRunEventType, #[case] terminal: bool) {
        assert_eq!(kind.is_terminal(), terminal);
    }

    #[test]
    fn test_key_display() {
        assert_eq!(RunId::new("wf-123").to_string(), "wf-123");
        assert_eq!(DurableKey::new("t1", "k1").to_string(), "t1/k1");
        assert_eq!(SubscriberId::new(3).to_string(), "sub-3");
    }

    #[test]
    fn test_event_errors() {
        let event = WorkflowRunEvent::new("wf-1", WorkflowRunEventType::Failed)
            .with_result(StepRunResult {
                step_run_id: "s1".to_string(),
                step_readable_id: "fetch".to_string(),
                job_run_id: "j1".to_string(),
                error: None,
                output: Some(serde_json::json!({"ok": true})),
            })
            .with_result(StepRunResult {
                step_run_id: "s2".to_string(),
                step_readable_id: "store".to_string(),
                job_run_id: "j1".to_string(),
                error: Some("disk full".to_string()),
                output: None,
            });

        assert_eq!(event.errors(), vec!["disk full"]);
    }

    #[test]
    fn test_event_deserializes_from_dispatcher_json() {
        let json = r#"{
            "workflow_run_id": "wf-9",
            "event_type": "FINISHED",
            "event_timestamp": "2024-05-01T12:00:00Z",
            "results": [{
                "step_run_id": "s1",
                "step_readable_id": "only",
                "job_run_id": "j1",
                "output": {"value": 42}
            }]
        }"#;

        let event: WorkflowRunEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.workflow_run_id, RunId::new("wf-9"));
        assert_eq!(event.event_type, WorkflowRunEventType::Finished);
        assert!(!event.hangup);
        assert!(event.errors().is_empty());
    }

    #[test]
    fn test_registration_key() {
        let request = RegisterDurableEventRequest::new(DurableKey::new("t1", "k1"), vec![], vec![]);
        assert_eq!(request.key(), DurableKey::new("t1", "k1"));
        assert!(request.conditions.is_empty());
    }
}
