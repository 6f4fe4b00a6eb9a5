// Workflow Executor - Drives one run from execution row to terminal status

use relay_shared::{ActionLogEntry, RunStatus, WorkflowExecution};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::context::EventContext;
use super::definition::Workflow;
use super::dispatcher::{ActionDispatcher, RunContext};
use super::store::{ExecutionStore, NewActionLog, NewExecution};
use super::triggers::TriggerEvent;
use crate::error::{WorkflowError, WorkflowResult};

/// A finished run with its action logs in dispatch order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub execution: WorkflowExecution,
    pub action_logs: Vec<ActionLogEntry>,
}

impl ExecutionReport {
    pub fn succeeded(&self) -> bool {
        self.execution.status == RunStatus::Completed
    }

    pub fn failed_actions(&self) -> impl Iterator<Item = &ActionLogEntry> {
        self.action_logs
            .iter()
            .filter(|log| log.status == RunStatus::Failed)
    }
}

pub struct WorkflowExecutor {
    executions: Arc<dyn ExecutionStore>,
    dispatcher: ActionDispatcher,
}

impl WorkflowExecutor {
    pub fn new(executions: Arc<dyn ExecutionStore>, dispatcher: ActionDispatcher) -> Self {
        Self {
            executions,
            dispatcher,
        }
    }

    /// Run every action of `workflow` in order for `event`.
    ///
    /// A failing action is logged and the run moves on. A storage fault
    /// stops the run: the open action log and the execution are marked
    /// failed where possible, and the error is returned only if even that
    /// bookkeeping failed.
    pub async fn run(
        &self,
        workflow: &Workflow,
        event: &TriggerEvent,
        context: EventContext,
    ) -> WorkflowResult<ExecutionReport> {
        let execution = self
            .executions
            .create_execution(NewExecution {
                owner_id: workflow.owner_id,
                workflow_id: workflow.id,
                workflow_name: workflow.name.clone(),
                trigger_event_id: Some(event.reference_id()),
                trigger_type: event.trigger_type,
                trigger_payload: event.payload.clone(),
                actions_total: workflow.actions.len() as i32,
            })
            .await?;

        info!(
            "Starting execution {} of workflow {} ({}) for {} event {}",
            execution.id, workflow.id, workflow.name, event.trigger_type, event.event_id
        );

        let mut run = RunContext {
            owner_id: workflow.owner_id,
            workflow_id: workflow.id,
            execution_id: execution.id,
            trigger_type: event.trigger_type,
            payload: event.payload.clone(),
            context,
            outputs: Vec::with_capacity(workflow.actions.len()),
        };
        let mut progress = RunProgress::default();

        let completed = match self
            .run_actions(workflow, &execution, &mut run, &mut progress)
            .await
        {
            Ok(()) => {
                let failed = progress.logs.iter().filter(|l| l.status == RunStatus::Failed).count();
                info!(
                    "Execution {} completed: {} actions, {} failed",
                    execution.id,
                    progress.logs.len(),
                    failed
                );
                self.executions
                    .complete_execution(execution.id, RunStatus::Completed, None)
                    .await
            }
            Err(fault) => Err(fault),
        };

        let finished = match completed {
            Ok(finished) => finished,
            Err(fault) => {
                error!("Execution {} aborted: {}", execution.id, fault);
                self.abort(execution.id, &mut progress, &fault).await?
            }
        };

        Ok(ExecutionReport {
            execution: finished,
            action_logs: progress.logs,
        })
    }

    async fn run_actions(
        &self,
        workflow: &Workflow,
        execution: &WorkflowExecution,
        run: &mut RunContext,
        progress: &mut RunProgress,
    ) -> WorkflowResult<()> {
        for (position, action) in workflow.actions.iter().enumerate() {
            let log = self
                .executions
                .create_action_log(NewActionLog {
                    execution_id: execution.id,
                    action_id: action.id,
                    position: position as i32,
                    action_type: action.action_type.clone(),
                    action_config: action.action_config.clone(),
                })
                .await?;
            progress.open_log = Some(log.id);

            let result = self.dispatcher.dispatch(action, run).await;

            let log = self
                .executions
                .complete_action_log(log.id, result.status, result.log_result(), result.error.clone())
                .await?;
            progress.open_log = None;
            progress.logs.push(log);

            run.outputs.push(result.output.unwrap_or(Value::Null));
            progress.executed += 1;
            self.executions
                .update_execution_progress(execution.id, progress.executed)
                .await?;
        }

        Ok(())
    }

    /// Best-effort failure bookkeeping after a fault.
    async fn abort(
        &self,
        execution_id: Uuid,
        progress: &mut RunProgress,
        fault: &WorkflowError,
    ) -> WorkflowResult<WorkflowExecution> {
        let message = fault.to_string();

        if let Some(log_id) = progress.open_log.take() {
            match self
                .executions
                .complete_action_log(log_id, RunStatus::Failed, None, Some(message.clone()))
                .await
            {
                Ok(log) => progress.logs.push(log),
                Err(e) => warn!("Could not close action log {}: {}", log_id, e),
            }
        }

        self.executions
            .complete_execution(execution_id, RunStatus::Failed, Some(message))
            .await
            .map_err(|e| {
                error!("Could not mark execution {} failed: {}", execution_id, e);
                e
            })
    }
}

#[derive(Default)]
struct RunProgress {
    logs: Vec<ActionLogEntry>,
    open_log: Option<Uuid>,
    executed: i32,
}
