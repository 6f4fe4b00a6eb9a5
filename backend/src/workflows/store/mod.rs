// Workflow Stores - Definition and execution persistence seams

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relay_shared::{ActionLogEntry, FollowUpStatus, RunStatus, ScheduledFollowUp, WorkflowExecution};
use serde_json::Value;
use uuid::Uuid;

use super::definition::{ValidatedWorkflow, Workflow, WorkflowFilter};
use super::triggers::TriggerType;
use crate::error::WorkflowResult;

pub mod postgres;

pub use postgres::{PgExecutionStore, PgFollowUpStore, PgWorkflowStore};

/// Owner-scoped access to workflow definitions
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Insert the workflow and all its children atomically.
    async fn create_workflow(&self, owner_id: Uuid, workflow: ValidatedWorkflow) -> WorkflowResult<Workflow>;

    /// Replace the workflow's fields and children atomically.
    async fn replace_workflow(
        &self,
        owner_id: Uuid,
        workflow_id: Uuid,
        workflow: ValidatedWorkflow,
    ) -> WorkflowResult<Workflow>;

    async fn set_active(&self, owner_id: Uuid, workflow_id: Uuid, is_active: bool) -> WorkflowResult<Workflow>;

    async fn delete_workflow(&self, owner_id: Uuid, workflow_id: Uuid) -> WorkflowResult<()>;

    async fn get_workflow(&self, owner_id: Uuid, workflow_id: Uuid) -> WorkflowResult<Workflow>;

    async fn list_workflows(&self, owner_id: Uuid, filter: &WorkflowFilter) -> WorkflowResult<Vec<Workflow>>;

    /// Active workflows with at least one trigger of `trigger_type`.
    async fn active_workflows_for_trigger(
        &self,
        owner_id: Uuid,
        trigger_type: TriggerType,
    ) -> WorkflowResult<Vec<Workflow>>;
}

#[derive(Debug, Clone)]
pub struct NewExecution {
    pub owner_id: Uuid,
    pub workflow_id: Uuid,
    pub workflow_name: String,
    pub trigger_event_id: Option<String>,
    pub trigger_type: TriggerType,
    pub trigger_payload: Value,
    pub actions_total: i32,
}

#[derive(Debug, Clone)]
pub struct NewActionLog {
    pub execution_id: Uuid,
    pub action_id: Uuid,
    pub position: i32,
    pub action_type: String,
    pub action_config: Value,
}

/// Run and action-log bookkeeping. Completing a row that is already
/// terminal is refused.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn create_execution(&self, execution: NewExecution) -> WorkflowResult<WorkflowExecution>;

    async fn update_execution_progress(&self, execution_id: Uuid, actions_executed: i32) -> WorkflowResult<()>;

    async fn complete_execution(
        &self,
        execution_id: Uuid,
        status: RunStatus,
        error_message: Option<String>,
    ) -> WorkflowResult<WorkflowExecution>;

    async fn create_action_log(&self, log: NewActionLog) -> WorkflowResult<ActionLogEntry>;

    async fn complete_action_log(
        &self,
        log_id: Uuid,
        status: RunStatus,
        result: Option<Value>,
        error_message: Option<String>,
    ) -> WorkflowResult<ActionLogEntry>;

    async fn get_execution(&self, owner_id: Uuid, execution_id: Uuid) -> WorkflowResult<WorkflowExecution>;

    /// Logs in dispatch order.
    async fn list_action_logs(&self, execution_id: Uuid) -> WorkflowResult<Vec<ActionLogEntry>>;

    /// Newest first.
    async fn list_executions(
        &self,
        owner_id: Uuid,
        workflow_id: Option<Uuid>,
        limit: i64,
    ) -> WorkflowResult<Vec<WorkflowExecution>>;
}

#[derive(Debug, Clone)]
pub struct NewFollowUp {
    pub owner_id: Uuid,
    pub workflow_id: Uuid,
    pub original_email_id: String,
    pub contact_id: Option<Uuid>,
    pub days_after_original: i32,
    pub scheduled_for: DateTime<Utc>,
}

/// Queue of no-reply checks. Only pending rows are ever updated.
#[async_trait]
pub trait FollowUpStore: Send + Sync {
    async fn schedule_followup(&self, followup: NewFollowUp) -> WorkflowResult<ScheduledFollowUp>;

    /// Cancel every pending check for `original_email_id`; returns how many.
    async fn cancel_pending_followups(
        &self,
        owner_id: Uuid,
        original_email_id: &str,
        reason: &str,
    ) -> WorkflowResult<u64>;

    /// Pending checks due at `now`, oldest first.
    async fn due_followups(
        &self,
        owner_id: Uuid,
        now: DateTime<Utc>,
        limit: i64,
    ) -> WorkflowResult<Vec<ScheduledFollowUp>>;

    /// Owners with at least one pending check due at `now`.
    async fn owners_with_due_followups(&self, now: DateTime<Utc>) -> WorkflowResult<Vec<Uuid>>;

    async fn complete_followup(
        &self,
        followup_id: Uuid,
        status: FollowUpStatus,
        execution_id: Option<Uuid>,
        result: Value,
    ) -> WorkflowResult<ScheduledFollowUp>;

    /// All checks for one sent email, oldest first.
    async fn list_followups(&self, owner_id: Uuid, original_email_id: &str) -> WorkflowResult<Vec<ScheduledFollowUp>>;
}
