use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relay_shared::{ActionLogEntry, FollowUpStatus, RunStatus, ScheduledFollowUp, WorkflowExecution};
use serde_json::Value;
use sqlx::{FromRow, PgConnection, PgPool};
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

use super::{ExecutionStore, FollowUpStore, NewActionLog, NewExecution, NewFollowUp, WorkflowStore};
use crate::error::{WorkflowError, WorkflowResult};
use crate::workflows::actions::{sort_actions, Action};
use crate::workflows::conditions::{Condition, ConditionOperator};
use crate::workflows::definition::{Trigger, ValidatedWorkflow, Workflow, WorkflowFilter};
use crate::workflows::triggers::{TriggerSpec, TriggerType};

#[derive(Debug, FromRow)]
struct WorkflowRow {
    id: Uuid,
    owner_id: Uuid,
    name: String,
    description: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct TriggerRow {
    id: Uuid,
    workflow_id: Uuid,
    trigger_type: String,
    trigger_config: Value,
    created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct ConditionRow {
    id: Uuid,
    workflow_id: Uuid,
    condition_type: String,
    operator: String,
    value: Value,
}

#[derive(Debug, FromRow)]
struct ActionRow {
    id: Uuid,
    workflow_id: Uuid,
    action_type: String,
    action_config: Value,
    execution_order: i32,
    position: i32,
    created_at: DateTime<Utc>,
}

fn operator_name(operator: ConditionOperator) -> String {
    serde_json::to_value(operator)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string())
}

fn workflow_not_found(workflow_id: Uuid) -> WorkflowError {
    WorkflowError::not_found(format!("Workflow {}", workflow_id))
}

/// [`WorkflowStore`] backed by the `workflows` tables
#[derive(Clone)]
pub struct PgWorkflowStore {
    pool: PgPool,
}

impl PgWorkflowStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_children(conn: &mut PgConnection, workflow: &Workflow) -> WorkflowResult<()> {
        for (position, trigger) in workflow.triggers.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO workflow_triggers (id, workflow_id, position, trigger_type, trigger_config, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(trigger.id)
            .bind(workflow.id)
            .bind(position as i32)
            .bind(trigger.spec.trigger_type().as_str())
            .bind(trigger.spec.config_value())
            .bind(trigger.created_at)
            .execute(&mut *conn)
            .await?;
        }

        for (position, condition) in workflow.conditions.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO workflow_conditions (id, workflow_id, position, condition_type, operator, value, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(condition.id)
            .bind(workflow.id)
            .bind(position as i32)
            .bind(&condition.condition_type)
            .bind(operator_name(condition.operator))
            .bind(&condition.value)
            .bind(workflow.updated_at)
            .execute(&mut *conn)
            .await?;
        }

        for action in &workflow.actions {
            sqlx::query(
                r#"
                INSERT INTO workflow_actions (
                    id, workflow_id, action_type, action_config, execution_order, position, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(action.id)
            .bind(workflow.id)
            .bind(&action.action_type)
            .bind(&action.action_config)
            .bind(action.execution_order)
            .bind(action.position)
            .bind(action.created_at)
            .execute(&mut *conn)
            .await?;
        }

        Ok(())
    }

    /// Attach children to workflow rows, keeping the row order.
    async fn hydrate(&self, rows: Vec<WorkflowRow>) -> WorkflowResult<Vec<Workflow>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();

        let trigger_rows = sqlx::query_as::<_, TriggerRow>(
            r#"
            SELECT id, workflow_id, trigger_type, trigger_config, created_at
            FROM workflow_triggers
            WHERE workflow_id = ANY($1)
            ORDER BY workflow_id, position
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let condition_rows = sqlx::query_as::<_, ConditionRow>(
            r#"
            SELECT id, workflow_id, condition_type, operator, value
            FROM workflow_conditions
            WHERE workflow_id = ANY($1)
            ORDER BY workflow_id, position
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let action_rows = sqlx::query_as::<_, ActionRow>(
            r#"
            SELECT id, workflow_id, action_type, action_config, execution_order, position, created_at
            FROM workflow_actions
            WHERE workflow_id = ANY($1)
            ORDER BY workflow_id, execution_order, created_at, position
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut triggers: HashMap<Uuid, Vec<Trigger>> = HashMap::new();
        for row in trigger_rows {
            match TriggerSpec::parse(&row.trigger_type, &row.trigger_config) {
                Ok(spec) => triggers.entry(row.workflow_id).or_default().push(Trigger {
                    id: row.id,
                    workflow_id: row.workflow_id,
                    spec,
                    created_at: row.created_at,
                }),
                Err(e) => warn!("Ignoring trigger {} of workflow {}: {}", row.id, row.workflow_id, e),
            }
        }

        let mut conditions: HashMap<Uuid, Vec<Condition>> = HashMap::new();
        for row in condition_rows {
            let operator = serde_json::from_value(Value::String(row.operator))
                .unwrap_or(ConditionOperator::Unknown);
            conditions.entry(row.workflow_id).or_default().push(Condition {
                id: row.id,
                condition_type: row.condition_type,
                operator,
                value: row.value,
            });
        }

        let mut actions: HashMap<Uuid, Vec<Action>> = HashMap::new();
        for row in action_rows {
            actions.entry(row.workflow_id).or_default().push(Action {
                id: row.id,
                workflow_id: row.workflow_id,
                action_type: row.action_type,
                action_config: row.action_config,
                execution_order: row.execution_order,
                position: row.position,
                created_at: row.created_at,
            });
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let mut workflow_actions = actions.remove(&row.id).unwrap_or_default();
                sort_actions(&mut workflow_actions);
                Workflow {
                    id: row.id,
                    owner_id: row.owner_id,
                    name: row.name,
                    description: row.description,
                    is_active: row.is_active,
                    triggers: triggers.remove(&row.id).unwrap_or_default(),
                    conditions: conditions.remove(&row.id).unwrap_or_default(),
                    actions: workflow_actions,
                    created_at: row.created_at,
                    updated_at: row.updated_at,
                }
            })
            .collect())
    }

    async fn query_workflows(
        &self,
        owner_id: Uuid,
        is_active: Option<bool>,
        trigger_type: Option<TriggerType>,
    ) -> WorkflowResult<Vec<Workflow>> {
        let rows = sqlx::query_as::<_, WorkflowRow>(
            r#"
            SELECT w.id, w.owner_id, w.name, w.description, w.is_active, w.created_at, w.updated_at
            FROM workflows w
            WHERE w.owner_id = $1
              AND ($2::boolean IS NULL OR w.is_active = $2)
              AND ($3::text IS NULL OR EXISTS (
                    SELECT 1 FROM workflow_triggers t
                    WHERE t.workflow_id = w.id AND t.trigger_type = $3
              ))
            ORDER BY w.created_at DESC, w.id
            "#,
        )
        .bind(owner_id)
        .bind(is_active)
        .bind(trigger_type.map(|t| t.as_str()))
        .fetch_all(&self.pool)
        .await?;

        self.hydrate(rows).await
    }
}

#[async_trait]
impl WorkflowStore for PgWorkflowStore {
    async fn create_workflow(&self, owner_id: Uuid, workflow: ValidatedWorkflow) -> WorkflowResult<Workflow> {
        let now = Utc::now();
        let workflow = workflow.into_workflow(Uuid::new_v4(), owner_id, now, now);

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO workflows (id, owner_id, name, description, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(workflow.id)
        .bind(owner_id)
        .bind(&workflow.name)
        .bind(&workflow.description)
        .bind(workflow.is_active)
        .bind(workflow.created_at)
        .bind(workflow.updated_at)
        .execute(&mut *tx)
        .await?;

        Self::insert_children(&mut *tx, &workflow).await?;
        tx.commit().await?;

        info!("Created workflow {} ({}) for owner {}", workflow.id, workflow.name, owner_id);
        Ok(workflow)
    }

    async fn replace_workflow(
        &self,
        owner_id: Uuid,
        workflow_id: Uuid,
        workflow: ValidatedWorkflow,
    ) -> WorkflowResult<Workflow> {
        let mut tx = self.pool.begin().await?;

        let created_at: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT created_at FROM workflows WHERE id = $1 AND owner_id = $2 FOR UPDATE",
        )
        .bind(workflow_id)
        .bind(owner_id)
        .fetch_optional(&mut *tx)
        .await?;
        let created_at = created_at.ok_or_else(|| workflow_not_found(workflow_id))?;

        let workflow = workflow.into_workflow(workflow_id, owner_id, created_at, Utc::now());

        sqlx::query(
            r#"
            UPDATE workflows
            SET name = $2, description = $3, is_active = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(workflow_id)
        .bind(&workflow.name)
        .bind(&workflow.description)
        .bind(workflow.is_active)
        .bind(workflow.updated_at)
        .execute(&mut *tx)
        .await?;

        for table in ["workflow_triggers", "workflow_conditions", "workflow_actions"] {
            sqlx::query(&format!("DELETE FROM {} WHERE workflow_id = $1", table))
                .bind(workflow_id)
                .execute(&mut *tx)
                .await?;
        }

        Self::insert_children(&mut *tx, &workflow).await?;
        tx.commit().await?;

        info!("Replaced workflow {} for owner {}", workflow_id, owner_id);
        Ok(workflow)
    }

    async fn set_active(&self, owner_id: Uuid, workflow_id: Uuid, is_active: bool) -> WorkflowResult<Workflow> {
        let result = sqlx::query(
            "UPDATE workflows SET is_active = $3, updated_at = NOW() WHERE id = $1 AND owner_id = $2",
        )
        .bind(workflow_id)
        .bind(owner_id)
        .bind(is_active)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(workflow_not_found(workflow_id));
        }
        self.get_workflow(owner_id, workflow_id).await
    }

    async fn delete_workflow(&self, owner_id: Uuid, workflow_id: Uuid) -> WorkflowResult<()> {
        let result = sqlx::query("DELETE FROM workflows WHERE id = $1 AND owner_id = $2")
            .bind(workflow_id)
            .bind(owner_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(workflow_not_found(workflow_id));
        }
        info!("Deleted workflow {} for owner {}", workflow_id, owner_id);
        Ok(())
    }

    async fn get_workflow(&self, owner_id: Uuid, workflow_id: Uuid) -> WorkflowResult<Workflow> {
        let row = sqlx::query_as::<_, WorkflowRow>(
            r#"
            SELECT id, owner_id, name, description, is_active, created_at, updated_at
            FROM workflows
            WHERE id = $1 AND owner_id = $2
            "#,
        )
        .bind(workflow_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| workflow_not_found(workflow_id))?;

        self.hydrate(vec![row])
            .await?
            .pop()
            .ok_or_else(|| workflow_not_found(workflow_id))
    }

    async fn list_workflows(&self, owner_id: Uuid, filter: &WorkflowFilter) -> WorkflowResult<Vec<Workflow>> {
        self.query_workflows(owner_id, filter.is_active, filter.trigger_type)
            .await
    }

    async fn active_workflows_for_trigger(
        &self,
        owner_id: Uuid,
        trigger_type: TriggerType,
    ) -> WorkflowResult<Vec<Workflow>> {
        self.query_workflows(owner_id, Some(true), Some(trigger_type))
            .await
    }
}

const EXECUTION_COLUMNS: &str = "id, owner_id, workflow_id, workflow_name, trigger_event_id, trigger_type, \
     trigger_payload, status, actions_total, actions_executed, error_message, started_at, completed_at";

const ACTION_LOG_COLUMNS: &str = "id, execution_id, action_id, position, action_type, action_config, \
     status, result, error_message, started_at, completed_at";

/// [`ExecutionStore`] backed by `workflow_executions` / `workflow_action_logs`
#[derive(Clone)]
pub struct PgExecutionStore {
    pool: PgPool,
}

impl PgExecutionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Explain why a guarded update touched no row.
    async fn execution_not_running(&self, execution_id: Uuid) -> WorkflowError {
        let status: Result<Option<RunStatus>, sqlx::Error> =
            sqlx::query_scalar("SELECT status FROM workflow_executions WHERE id = $1")
                .bind(execution_id)
                .fetch_optional(&self.pool)
                .await;

        match status {
            Ok(Some(_)) => WorkflowError::AlreadyTerminal(execution_id),
            Ok(None) => WorkflowError::not_found(format!("Execution {}", execution_id)),
            Err(e) => e.into(),
        }
    }

    async fn action_log_not_running(&self, log_id: Uuid) -> WorkflowError {
        let status: Result<Option<RunStatus>, sqlx::Error> =
            sqlx::query_scalar("SELECT status FROM workflow_action_logs WHERE id = $1")
                .bind(log_id)
                .fetch_optional(&self.pool)
                .await;

        match status {
            Ok(Some(_)) => WorkflowError::ActionLogTerminal(log_id),
            Ok(None) => WorkflowError::not_found(format!("Action log {}", log_id)),
            Err(e) => e.into(),
        }
    }
}

fn require_terminal(status: RunStatus) -> WorkflowResult<()> {
    if status.is_terminal() {
        Ok(())
    } else {
        Err(WorkflowError::Storage(format!(
            "Cannot complete into non-terminal status {}",
            status
        )))
    }
}

#[async_trait]
impl ExecutionStore for PgExecutionStore {
    async fn create_execution(&self, execution: NewExecution) -> WorkflowResult<WorkflowExecution> {
        let row = sqlx::query_as::<_, WorkflowExecution>(&format!(
            r#"
            INSERT INTO workflow_executions (
                id, owner_id, workflow_id, workflow_name, trigger_event_id, trigger_type,
                trigger_payload, status, actions_total, actions_executed, started_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'running', $8, 0, NOW())
            RETURNING {}
            "#,
            EXECUTION_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(execution.owner_id)
        .bind(execution.workflow_id)
        .bind(&execution.workflow_name)
        .bind(&execution.trigger_event_id)
        .bind(execution.trigger_type.as_str())
        .bind(&execution.trigger_payload)
        .bind(execution.actions_total)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn update_execution_progress(&self, execution_id: Uuid, actions_executed: i32) -> WorkflowResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_executions
            SET actions_executed = $2
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(execution_id)
        .bind(actions_executed)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.execution_not_running(execution_id).await);
        }
        Ok(())
    }

    async fn complete_execution(
        &self,
        execution_id: Uuid,
        status: RunStatus,
        error_message: Option<String>,
    ) -> WorkflowResult<WorkflowExecution> {
        require_terminal(status)?;

        let row = sqlx::query_as::<_, WorkflowExecution>(&format!(
            r#"
            UPDATE workflow_executions
            SET status = $2, error_message = $3, completed_at = NOW()
            WHERE id = $1 AND status = 'running'
            RETURNING {}
            "#,
            EXECUTION_COLUMNS
        ))
        .bind(execution_id)
        .bind(status)
        .bind(error_message)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(row),
            None => Err(self.execution_not_running(execution_id).await),
        }
    }

    async fn create_action_log(&self, log: NewActionLog) -> WorkflowResult<ActionLogEntry> {
        let row = sqlx::query_as::<_, ActionLogEntry>(&format!(
            r#"
            INSERT INTO workflow_action_logs (
                id, execution_id, action_id, position, action_type, action_config, status, started_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, 'running', NOW())
            RETURNING {}
            "#,
            ACTION_LOG_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(log.execution_id)
        .bind(log.action_id)
        .bind(log.position)
        .bind(&log.action_type)
        .bind(&log.action_config)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn complete_action_log(
        &self,
        log_id: Uuid,
        status: RunStatus,
        result: Option<Value>,
        error_message: Option<String>,
    ) -> WorkflowResult<ActionLogEntry> {
        require_terminal(status)?;

        let row = sqlx::query_as::<_, ActionLogEntry>(&format!(
            r#"
            UPDATE workflow_action_logs
            SET status = $2, result = $3, error_message = $4, completed_at = NOW()
            WHERE id = $1 AND status = 'running'
            RETURNING {}
            "#,
            ACTION_LOG_COLUMNS
        ))
        .bind(log_id)
        .bind(status)
        .bind(result)
        .bind(error_message)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(row),
            None => Err(self.action_log_not_running(log_id).await),
        }
    }

    async fn get_execution(&self, owner_id: Uuid, execution_id: Uuid) -> WorkflowResult<WorkflowExecution> {
        sqlx::query_as::<_, WorkflowExecution>(&format!(
            "SELECT {} FROM workflow_executions WHERE id = $1 AND owner_id = $2",
            EXECUTION_COLUMNS
        ))
        .bind(execution_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| WorkflowError::not_found(format!("Execution {}", execution_id)))
    }

    async fn list_action_logs(&self, execution_id: Uuid) -> WorkflowResult<Vec<ActionLogEntry>> {
        let rows = sqlx::query_as::<_, ActionLogEntry>(&format!(
            "SELECT {} FROM workflow_action_logs WHERE execution_id = $1 ORDER BY position, started_at",
            ACTION_LOG_COLUMNS
        ))
        .bind(execution_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn list_executions(
        &self,
        owner_id: Uuid,
        workflow_id: Option<Uuid>,
        limit: i64,
    ) -> WorkflowResult<Vec<WorkflowExecution>> {
        let rows = sqlx::query_as::<_, WorkflowExecution>(&format!(
            r#"
            SELECT {} FROM workflow_executions
            WHERE owner_id = $1 AND ($2::uuid IS NULL OR workflow_id = $2)
            ORDER BY started_at DESC
            LIMIT $3
            "#,
            EXECUTION_COLUMNS
        ))
        .bind(owner_id)
        .bind(workflow_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

const FOLLOWUP_COLUMNS: &str = "id, owner_id, workflow_id, original_email_id, contact_id, \
    days_after_original, scheduled_for, status, execution_id, result, created_at, completed_at";

#[derive(Clone)]
pub struct PgFollowUpStore {
    pool: PgPool,
}

impl PgFollowUpStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FollowUpStore for PgFollowUpStore {
    async fn schedule_followup(&self, followup: NewFollowUp) -> WorkflowResult<ScheduledFollowUp> {
        let row = sqlx::query_as::<_, ScheduledFollowUp>(&format!(
            r#"
            INSERT INTO workflow_followups (
                id, owner_id, workflow_id, original_email_id, contact_id,
                days_after_original, scheduled_for, status, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', NOW())
            RETURNING {}
            "#,
            FOLLOWUP_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(followup.owner_id)
        .bind(followup.workflow_id)
        .bind(&followup.original_email_id)
        .bind(followup.contact_id)
        .bind(followup.days_after_original)
        .bind(followup.scheduled_for)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn cancel_pending_followups(
        &self,
        owner_id: Uuid,
        original_email_id: &str,
        reason: &str,
    ) -> WorkflowResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_followups
            SET status = 'cancelled', result = $3, completed_at = NOW()
            WHERE owner_id = $1 AND original_email_id = $2 AND status = 'pending'
            "#,
        )
        .bind(owner_id)
        .bind(original_email_id)
        .bind(serde_json::json!({ "reason": reason }))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn due_followups(
        &self,
        owner_id: Uuid,
        now: DateTime<Utc>,
        limit: i64,
    ) -> WorkflowResult<Vec<ScheduledFollowUp>> {
        let rows = sqlx::query_as::<_, ScheduledFollowUp>(&format!(
            r#"
            SELECT {} FROM workflow_followups
            WHERE owner_id = $1 AND status = 'pending' AND scheduled_for <= $2
            ORDER BY scheduled_for, created_at
            LIMIT $3
            "#,
            FOLLOWUP_COLUMNS
        ))
        .bind(owner_id)
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn owners_with_due_followups(&self, now: DateTime<Utc>) -> WorkflowResult<Vec<Uuid>> {
        let owners = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT DISTINCT owner_id FROM workflow_followups
            WHERE status = 'pending' AND scheduled_for <= $1
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(owners)
    }

    async fn complete_followup(
        &self,
        followup_id: Uuid,
        status: FollowUpStatus,
        execution_id: Option<Uuid>,
        result: Value,
    ) -> WorkflowResult<ScheduledFollowUp> {
        if status == FollowUpStatus::Pending {
            return Err(WorkflowError::Storage(
                "Cannot settle a follow-up back into pending".to_string(),
            ));
        }

        let row = sqlx::query_as::<_, ScheduledFollowUp>(&format!(
            r#"
            UPDATE workflow_followups
            SET status = $2, execution_id = $3, result = $4, completed_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING {}
            "#,
            FOLLOWUP_COLUMNS
        ))
        .bind(followup_id)
        .bind(status)
        .bind(execution_id)
        .bind(result)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(WorkflowError::FollowUpSettled(followup_id))
    }

    async fn list_followups(&self, owner_id: Uuid, original_email_id: &str) -> WorkflowResult<Vec<ScheduledFollowUp>> {
        let rows = sqlx::query_as::<_, ScheduledFollowUp>(&format!(
            r#"
            SELECT {} FROM workflow_followups
            WHERE owner_id = $1 AND original_email_id = $2
            ORDER BY created_at
            "#,
            FOLLOWUP_COLUMNS
        ))
        .bind(owner_id)
        .bind(original_email_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
