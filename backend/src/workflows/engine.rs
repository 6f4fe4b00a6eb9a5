// Workflow Engine - Event entry point, manual runs and definition management

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::conditions::{check_all, evaluate_all, ConditionCheck};
use super::context::EventContext;
use super::definition::{Workflow, WorkflowFilter, WorkflowInput};
use super::dispatcher::{ActionDispatcher, ActionRegistry};
use super::executor::{ExecutionReport, WorkflowExecutor};
use super::handlers::standard_handlers;
use super::store::{
    ExecutionStore, FollowUpStore, NewFollowUp, PgExecutionStore, PgFollowUpStore, PgWorkflowStore, WorkflowStore,
};
use super::triggers::{EventSource, TriggerEvent, TriggerType};
use crate::config::EngineConfig;
use crate::error::{WorkflowError, WorkflowResult};
use crate::services::{ContactDirectory, EmailTransport, PgContactDirectory};
use relay_shared::{FollowUpStatus, ScheduledFollowUp, WorkflowExecution};

/// Due follow-ups handled per owner in one pass.
const FOLLOW_UP_BATCH: i64 = 100;

/// What one event did across the owner's workflows
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventOutcome {
    pub event_id: Uuid,
    /// Workflows whose triggers matched
    pub matched: usize,
    /// Matched workflows whose conditions did not hold
    pub skipped: usize,
    pub executions: Vec<Uuid>,
    /// Workflow id and error for runs that failed or could not start
    pub failures: Vec<(Uuid, String)>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManualRunOptions {
    /// Gate the run on the workflow's conditions; engine default when unset
    pub evaluate_conditions: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualRunOutcome {
    pub workflow_id: Uuid,
    pub trigger_type: TriggerType,
    pub conditions: Vec<ConditionCheck>,
    pub conditions_passed: bool,
    /// Absent when enforced conditions stopped the run
    pub report: Option<ExecutionReport>,
}

/// What one pass over an owner's due follow-ups did
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FollowUpOutcome {
    pub due: usize,
    pub executions: Vec<Uuid>,
    /// Follow-ups dropped because their workflow is gone, paused or gated out
    pub cancelled: usize,
    /// Follow-up id and error for checks whose run could not be recorded
    pub failures: Vec<(Uuid, String)>,
}

pub struct WorkflowEngine {
    workflows: Arc<dyn WorkflowStore>,
    executions: Arc<dyn ExecutionStore>,
    followups: Arc<dyn FollowUpStore>,
    contacts: Arc<dyn ContactDirectory>,
    executor: WorkflowExecutor,
    config: EngineConfig,
}

impl WorkflowEngine {
    pub fn new(
        workflows: Arc<dyn WorkflowStore>,
        executions: Arc<dyn ExecutionStore>,
        followups: Arc<dyn FollowUpStore>,
        contacts: Arc<dyn ContactDirectory>,
        registry: ActionRegistry,
        config: EngineConfig,
    ) -> Self {
        let dispatcher = ActionDispatcher::new(registry, &config);
        Self {
            executor: WorkflowExecutor::new(executions.clone(), dispatcher),
            workflows,
            executions,
            followups,
            contacts,
            config,
        }
    }

    /// Engine over Postgres with the standard handler set.
    pub fn with_postgres(
        pool: PgPool,
        email: Arc<dyn EmailTransport>,
        config: EngineConfig,
    ) -> WorkflowResult<Self> {
        let contacts: Arc<dyn ContactDirectory> = Arc::new(PgContactDirectory::new(pool.clone()));
        let registry = standard_handlers(contacts.clone(), email, &config)?.build()?;

        Ok(Self::new(
            Arc::new(PgWorkflowStore::new(pool.clone())),
            Arc::new(PgExecutionStore::new(pool.clone())),
            Arc::new(PgFollowUpStore::new(pool)),
            contacts,
            registry,
            config,
        ))
    }

    // ===== Event processing =====

    /// Run every matching workflow for `event`, then update follow-ups and
    /// engagement. Failures are logged and summarized, never returned.
    pub async fn process_event(&self, event: TriggerEvent) -> EventOutcome {
        debug!(
            "Processing {} event {} for owner {}",
            event.trigger_type, event.event_id, event.owner_id
        );

        let outcome = self.run_matching(&event).await;
        self.track_followups(&event).await;
        self.track_engagement(&event).await;

        info!(
            "Event {} matched {} workflows, ran {}, skipped {}",
            event.event_id,
            outcome.matched,
            outcome.executions.len(),
            outcome.skipped
        );

        outcome
    }

    async fn run_matching(&self, event: &TriggerEvent) -> EventOutcome {
        let mut outcome = EventOutcome {
            event_id: event.event_id,
            ..Default::default()
        };

        let candidates = match self
            .workflows
            .active_workflows_for_trigger(event.owner_id, event.trigger_type)
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                error!("Failed to load workflows for event {}: {}", event.event_id, e);
                return outcome;
            }
        };

        let context = self.build_context(event).await;

        for workflow in candidates.iter().filter(|w| w.matches(event)) {
            outcome.matched += 1;

            if !evaluate_all(&workflow.conditions, &context) {
                debug!("Conditions not met for workflow {}", workflow.id);
                outcome.skipped += 1;
                continue;
            }

            match self.executor.run(workflow, event, context.clone()).await {
                Ok(report) => {
                    if !report.succeeded() {
                        outcome.failures.push((
                            workflow.id,
                            report.execution.error_message.clone().unwrap_or_default(),
                        ));
                    }
                    outcome.executions.push(report.execution.id);
                }
                Err(e) => {
                    error!("Workflow {} failed for event {}: {}", workflow.id, event.event_id, e);
                    outcome.failures.push((workflow.id, e.to_string()));
                }
            }
        }

        outcome
    }

    /// Run one workflow now on caller-supplied data, bypassing trigger
    /// matching. Conditions are always reported; they gate the run only
    /// when enforced.
    pub async fn execute_manually(
        &self,
        owner_id: Uuid,
        workflow_id: Uuid,
        test_data: Value,
        options: ManualRunOptions,
    ) -> WorkflowResult<ManualRunOutcome> {
        let workflow = self.workflows.get_workflow(owner_id, workflow_id).await?;
        let trigger_type = workflow
            .primary_trigger_type()
            .ok_or_else(|| WorkflowError::definition("Workflow has no triggers"))?;

        let event = TriggerEvent::new(owner_id, trigger_type, test_data, EventSource::Manual);
        let context = self.build_context(&event).await;

        let conditions = check_all(&workflow.conditions, &context);
        let conditions_passed = conditions.iter().all(|c| c.passed);
        let enforce = options
            .evaluate_conditions
            .unwrap_or(self.config.manual_runs_evaluate_conditions);

        if enforce && !conditions_passed {
            info!("Manual run of workflow {} stopped by its conditions", workflow_id);
            return Ok(ManualRunOutcome {
                workflow_id,
                trigger_type,
                conditions,
                conditions_passed,
                report: None,
            });
        }

        let report = self.executor.run(&workflow, &event, context).await?;

        Ok(ManualRunOutcome {
            workflow_id,
            trigger_type,
            conditions,
            conditions_passed,
            report: Some(report),
        })
    }

    async fn build_context(&self, event: &TriggerEvent) -> EventContext {
        let mut context = EventContext::from_payload(&event.payload);

        if let Some(contact_id) = context.contact_id() {
            match self.contacts.find_contact(event.owner_id, contact_id).await {
                Ok(Some(contact)) => context.enrich_with_contact(&contact, Utc::now()),
                Ok(None) => debug!("Contact {} not found for event {}", contact_id, event.event_id),
                Err(e) => warn!("Could not load contact {}: {}", contact_id, e),
            }
        }

        context
    }

    /// Opens and clicks engage the contact; sends and receipts touch it.
    async fn track_engagement(&self, event: &TriggerEvent) {
        if !self.config.engagement_tracking {
            return;
        }
        let Some(contact_id) = EventContext::from_payload(&event.payload).contact_id() else {
            return;
        };

        let result = match event.trigger_type {
            TriggerType::EmailOpened | TriggerType::EmailClicked => self
                .contacts
                .mark_engaged(event.owner_id, contact_id)
                .await
                .map(|_| ()),
            TriggerType::EmailReceived | TriggerType::EmailSent => {
                self.contacts
                    .touch_last_contacted(event.owner_id, contact_id)
                    .await
            }
            TriggerType::EmailReplied | TriggerType::ContactCreated | TriggerType::NoReplyAfterDays => Ok(()),
        };

        if let Err(e) = result {
            warn!(
                "Engagement tracking failed for contact {} on event {}: {}",
                contact_id, event.event_id, e
            );
        }
    }

    // ===== Follow-ups =====

    /// Sends queue a no-reply check per no-reply workflow; replies cancel
    /// the checks pending on the original email.
    async fn track_followups(&self, event: &TriggerEvent) {
        let result = match event.trigger_type {
            TriggerType::EmailSent => self.schedule_followups(event).await,
            TriggerType::EmailReplied => match event.payload_str("original_email_id") {
                Some(email_id) => self
                    .followups
                    .cancel_pending_followups(event.owner_id, &email_id, "Reply received")
                    .await
                    .map(|cancelled| {
                        if cancelled > 0 {
                            info!("Cancelled {} follow-ups for email {}", cancelled, email_id);
                        }
                    }),
                None => Ok(()),
            },
            _ => Ok(()),
        };

        if let Err(e) = result {
            warn!("Follow-up tracking failed for event {}: {}", event.event_id, e);
        }
    }

    async fn schedule_followups(&self, event: &TriggerEvent) -> WorkflowResult<()> {
        let Some(email_id) = event.payload_str("email_id") else {
            debug!("Sent event {} has no email_id, no follow-ups queued", event.event_id);
            return Ok(());
        };
        let contact_id = EventContext::from_payload(&event.payload).contact_id();

        let workflows = self
            .workflows
            .active_workflows_for_trigger(event.owner_id, TriggerType::NoReplyAfterDays)
            .await?;

        for workflow in &workflows {
            let Some(days) = workflow.triggers.iter().find_map(|t| t.spec.follow_up_days()) else {
                continue;
            };
            let scheduled_for = ChronoDuration::try_days(i64::from(days))
                .and_then(|delay| event.timestamp.checked_add_signed(delay));
            let (Some(scheduled_for), Ok(days_after_original)) = (scheduled_for, i32::try_from(days)) else {
                warn!("Workflow {} waits {} days for a reply, out of range", workflow.id, days);
                continue;
            };

            let followup = self
                .followups
                .schedule_followup(NewFollowUp {
                    owner_id: event.owner_id,
                    workflow_id: workflow.id,
                    original_email_id: email_id.clone(),
                    contact_id,
                    days_after_original,
                    scheduled_for,
                })
                .await?;
            debug!(
                "Queued follow-up {} for workflow {} at {}",
                followup.id, workflow.id, followup.scheduled_for
            );
        }

        Ok(())
    }

    /// Run the owner's no-reply checks that are due at `now`. Each check
    /// runs only its own workflow, and ends executed, cancelled or failed.
    pub async fn process_due_followups(&self, owner_id: Uuid, now: DateTime<Utc>) -> WorkflowResult<FollowUpOutcome> {
        let due = self.followups.due_followups(owner_id, now, FOLLOW_UP_BATCH).await?;
        let mut outcome = FollowUpOutcome {
            due: due.len(),
            ..Default::default()
        };

        for followup in &due {
            let (status, execution_id, result) = self.run_followup(followup).await;
            match status {
                FollowUpStatus::Executed => outcome.executions.extend(execution_id),
                FollowUpStatus::Cancelled => outcome.cancelled += 1,
                _ => outcome.failures.push((
                    followup.id,
                    result["error"].as_str().unwrap_or_default().to_string(),
                )),
            }

            if let Err(e) = self
                .followups
                .complete_followup(followup.id, status, execution_id, result)
                .await
            {
                warn!("Could not settle follow-up {}: {}", followup.id, e);
            }
        }

        if outcome.due > 0 {
            info!(
                "Follow-ups for owner {}: {} due, {} ran, {} cancelled, {} failed",
                owner_id,
                outcome.due,
                outcome.executions.len(),
                outcome.cancelled,
                outcome.failures.len()
            );
        }
        Ok(outcome)
    }

    /// [`Self::process_due_followups`] for every owner with due checks.
    pub async fn process_all_due_followups(&self, now: DateTime<Utc>) -> WorkflowResult<FollowUpOutcome> {
        let mut total = FollowUpOutcome::default();
        for owner_id in self.followups.owners_with_due_followups(now).await? {
            let outcome = self.process_due_followups(owner_id, now).await?;
            total.due += outcome.due;
            total.executions.extend(outcome.executions);
            total.cancelled += outcome.cancelled;
            total.failures.extend(outcome.failures);
        }
        Ok(total)
    }

    async fn run_followup(&self, followup: &ScheduledFollowUp) -> (FollowUpStatus, Option<Uuid>, Value) {
        let cancelled = |reason: &str| (FollowUpStatus::Cancelled, None, json!({ "reason": reason }));

        let workflow = match self.workflows.get_workflow(followup.owner_id, followup.workflow_id).await {
            Ok(workflow) => workflow,
            Err(WorkflowError::NotFound(_)) => return cancelled("Workflow deleted"),
            Err(e) => return (FollowUpStatus::Failed, None, json!({ "error": e.to_string() })),
        };
        if !workflow.is_active || !workflow.has_trigger_type(TriggerType::NoReplyAfterDays) {
            return cancelled("Workflow no longer waits for replies");
        }

        let event = TriggerEvent::no_reply(followup);
        let context = self.build_context(&event).await;
        if !evaluate_all(&workflow.conditions, &context) {
            debug!("Conditions not met for follow-up {}", followup.id);
            return cancelled("Conditions not met");
        }

        match self.executor.run(&workflow, &event, context).await {
            Ok(report) => (
                FollowUpStatus::Executed,
                Some(report.execution.id),
                json!({ "execution_status": report.execution.status }),
            ),
            Err(e) => {
                error!("Follow-up {} failed: {}", followup.id, e);
                (FollowUpStatus::Failed, None, json!({ "error": e.to_string() }))
            }
        }
    }

    /// Every check queued for one sent email.
    pub async fn followups_for_email(&self, owner_id: Uuid, email_id: &str) -> WorkflowResult<Vec<ScheduledFollowUp>> {
        self.followups.list_followups(owner_id, email_id).await
    }

    // ===== Definition management =====

    pub async fn create_workflow(&self, owner_id: Uuid, input: WorkflowInput) -> WorkflowResult<Workflow> {
        let validated = input.validate(self.config.max_wait)?;
        self.workflows.create_workflow(owner_id, validated).await
    }

    pub async fn update_workflow(
        &self,
        owner_id: Uuid,
        workflow_id: Uuid,
        input: WorkflowInput,
    ) -> WorkflowResult<Workflow> {
        let validated = input.validate(self.config.max_wait)?;
        self.workflows
            .replace_workflow(owner_id, workflow_id, validated)
            .await
    }

    pub async fn set_active(&self, owner_id: Uuid, workflow_id: Uuid, is_active: bool) -> WorkflowResult<Workflow> {
        self.workflows.set_active(owner_id, workflow_id, is_active).await
    }

    pub async fn delete_workflow(&self, owner_id: Uuid, workflow_id: Uuid) -> WorkflowResult<()> {
        self.workflows.delete_workflow(owner_id, workflow_id).await
    }

    pub async fn get_workflow(&self, owner_id: Uuid, workflow_id: Uuid) -> WorkflowResult<Workflow> {
        self.workflows.get_workflow(owner_id, workflow_id).await
    }

    pub async fn list_workflows(&self, owner_id: Uuid, filter: &WorkflowFilter) -> WorkflowResult<Vec<Workflow>> {
        self.workflows.list_workflows(owner_id, filter).await
    }

    /// Newest first, capped at `limit` (1..=200).
    pub async fn execution_history(
        &self,
        owner_id: Uuid,
        workflow_id: Option<Uuid>,
        limit: i64,
    ) -> WorkflowResult<Vec<WorkflowExecution>> {
        self.executions
            .list_executions(owner_id, workflow_id, limit.clamp(1, 200))
            .await
    }

    pub async fn execution_detail(&self, owner_id: Uuid, execution_id: Uuid) -> WorkflowResult<ExecutionReport> {
        let execution = self.executions.get_execution(owner_id, execution_id).await?;
        let action_logs = self.executions.list_action_logs(execution_id).await?;
        Ok(ExecutionReport {
            execution,
            action_logs,
        })
    }
}
