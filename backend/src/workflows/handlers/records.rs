use async_trait::async_trait;
use chrono::{Duration, Utc};
use relay_shared::NewTask;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use super::{mismatch, ActionHandler};
use crate::error::{WorkflowError, WorkflowResult};
use crate::services::ContactDirectory;
use crate::workflows::actions::{ActionKind, ActionType};
use crate::workflows::dispatcher::RunContext;

pub struct CreateTaskHandler {
    contacts: Arc<dyn ContactDirectory>,
}

impl CreateTaskHandler {
    pub fn new(contacts: Arc<dyn ContactDirectory>) -> Self {
        Self { contacts }
    }
}

#[async_trait]
impl ActionHandler for CreateTaskHandler {
    fn action_type(&self) -> ActionType {
        ActionType::CreateTask
    }

    async fn execute(&self, action: &ActionKind, run: &RunContext) -> WorkflowResult<Value> {
        let ActionKind::CreateTask(config) = action else {
            return Err(mismatch(self.action_type(), action));
        };

        let due_at = Duration::try_days(config.due_in_days)
            .and_then(|offset| Utc::now().checked_add_signed(offset))
            .ok_or_else(|| {
                WorkflowError::action(format!("Due date {} days out is out of range", config.due_in_days))
            })?;
        let task_id = self
            .contacts
            .create_task(NewTask {
                owner_id: run.owner_id,
                contact_id: run.contact_id(),
                title: config.title.clone(),
                description: config.description.clone(),
                priority: config.priority,
                due_at,
                source_execution_id: Some(run.execution_id),
            })
            .await?;

        info!("Workflow {} created task {}", run.workflow_id, task_id);

        Ok(json!({
            "task_id": task_id,
            "title": config.title,
            "priority": config.priority.as_str(),
            "due_at": due_at,
        }))
    }
}

pub struct SendNotificationHandler {
    contacts: Arc<dyn ContactDirectory>,
}

impl SendNotificationHandler {
    pub fn new(contacts: Arc<dyn ContactDirectory>) -> Self {
        Self { contacts }
    }
}

#[async_trait]
impl ActionHandler for SendNotificationHandler {
    fn action_type(&self) -> ActionType {
        ActionType::SendNotification
    }

    async fn execute(&self, action: &ActionKind, run: &RunContext) -> WorkflowResult<Value> {
        let ActionKind::SendNotification(config) = action else {
            return Err(mismatch(self.action_type(), action));
        };

        let user_id = config.user_id.unwrap_or(run.owner_id);
        let notification_id = self
            .contacts
            .create_notification(run.owner_id, user_id, &config.message, run.execution_id)
            .await?;

        Ok(json!({
            "notification_id": notification_id,
            "user_id": user_id,
            "message": config.message,
        }))
    }
}
