// Workflow Actions - Actions that can be executed by workflows

use chrono::{DateTime, Utc};
use relay_shared::{ContactField, RunStatus, TaskPriority};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{ValidationBuilder, WorkflowError};

/// Types of actions that workflows can execute
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    // Outreach
    SendEmail,
    SendNotification,

    // CRM records
    CreateTask,
    AddTag,
    RemoveTag,
    UpdateContactField,
    UpdateLeadStage,
    MarkAsEngaged,

    // Control flow
    Wait,

    // Integration
    Webhook,
}

impl ActionType {
    pub const ALL: [ActionType; 10] = [
        ActionType::SendEmail,
        ActionType::SendNotification,
        ActionType::CreateTask,
        ActionType::AddTag,
        ActionType::RemoveTag,
        ActionType::UpdateContactField,
        ActionType::UpdateLeadStage,
        ActionType::MarkAsEngaged,
        ActionType::Wait,
        ActionType::Webhook,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SendEmail => "send_email",
            Self::SendNotification => "send_notification",
            Self::CreateTask => "create_task",
            Self::AddTag => "add_tag",
            Self::RemoveTag => "remove_tag",
            Self::UpdateContactField => "update_contact_field",
            Self::UpdateLeadStage => "update_lead_stage",
            Self::MarkAsEngaged => "mark_as_engaged",
            Self::Wait => "wait",
            Self::Webhook => "webhook",
        }
    }
}

impl FromStr for ActionType {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| WorkflowError::definition(format!("Unknown action type: {}", s)))
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SendEmailConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<Uuid>,
    /// Recipient override; defaults to the contact, then the event's sender
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// Furthest a task due date may be set, in days.
pub const MAX_DUE_IN_DAYS: i64 = 3650;

fn default_due_in_days() -> i64 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateTaskConfig {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_due_in_days")]
    pub due_in_days: i64,
    #[serde(default)]
    pub priority: TaskPriority,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TagConfig {
    pub tag: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpdateContactFieldConfig {
    pub field: ContactField,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpdateLeadStageConfig {
    pub stage: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MarkAsEngagedConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SendNotificationConfig {
    /// Recipient; the workflow owner when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WaitConfig {
    pub seconds: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
    Put,
    Patch,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

/// An action type with its typed config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action_type", content = "action_config", rename_all = "snake_case")]
pub enum ActionKind {
    SendEmail(SendEmailConfig),
    SendNotification(SendNotificationConfig),
    CreateTask(CreateTaskConfig),
    AddTag(TagConfig),
    RemoveTag(TagConfig),
    UpdateContactField(UpdateContactFieldConfig),
    UpdateLeadStage(UpdateLeadStageConfig),
    MarkAsEngaged(MarkAsEngagedConfig),
    Wait(WaitConfig),
    Webhook(WebhookConfig),
}

impl ActionKind {
    /// Parse the stored `action_type` / `action_config` pair.
    pub fn parse(action_type: &str, action_config: &Value) -> Result<Self, WorkflowError> {
        let action_type = ActionType::from_str(action_type)?;
        let config = if action_config.is_null() {
            Value::Object(Default::default())
        } else {
            action_config.clone()
        };

        serde_json::from_value(serde_json::json!({
            "action_type": action_type.as_str(),
            "action_config": config,
        }))
        .map_err(|e| {
            WorkflowError::definition(format!("Invalid {} config: {}", action_type, e))
        })
    }

    pub fn action_type(&self) -> ActionType {
        match self {
            Self::SendEmail(_) => ActionType::SendEmail,
            Self::SendNotification(_) => ActionType::SendNotification,
            Self::CreateTask(_) => ActionType::CreateTask,
            Self::AddTag(_) => ActionType::AddTag,
            Self::RemoveTag(_) => ActionType::RemoveTag,
            Self::UpdateContactField(_) => ActionType::UpdateContactField,
            Self::UpdateLeadStage(_) => ActionType::UpdateLeadStage,
            Self::MarkAsEngaged(_) => ActionType::MarkAsEngaged,
            Self::Wait(_) => ActionType::Wait,
            Self::Webhook(_) => ActionType::Webhook,
        }
    }

    /// The config half, as persisted in `action_config`.
    pub fn config_value(&self) -> Value {
        serde_json::to_value(self)
            .ok()
            .and_then(|mut v| v.get_mut("action_config").map(Value::take))
            .unwrap_or_else(|| Value::Object(Default::default()))
    }

    /// Extra time the dispatcher allows beyond its base timeout.
    pub fn planned_delay(&self) -> Duration {
        match self {
            Self::Wait(c) => Duration::from_secs(c.seconds),
            _ => Duration::ZERO,
        }
    }

    /// Save-time checks beyond what the config types enforce.
    pub fn validate_into(&self, field: &str, max_wait: Duration, errors: &mut ValidationBuilder) {
        match self {
            Self::SendEmail(c) => {
                let inline = c.subject.as_deref().is_some_and(|s| !s.trim().is_empty())
                    && c.body.as_deref().is_some_and(|b| !b.trim().is_empty());
                if c.template_id.is_none() && !inline {
                    errors.push(field, "send_email needs a template_id or a subject and body");
                }
            }
            Self::CreateTask(c) => {
                if c.title.trim().is_empty() {
                    errors.push(field, "Task title is required");
                }
                if !(0..=MAX_DUE_IN_DAYS).contains(&c.due_in_days) {
                    errors.push(
                        field,
                        format!("due_in_days must be between 0 and {}", MAX_DUE_IN_DAYS),
                    );
                }
            }
            Self::AddTag(c) | Self::RemoveTag(c) => {
                if c.tag.trim().is_empty() {
                    errors.push(field, "Tag is required");
                }
            }
            Self::UpdateLeadStage(c) => {
                if c.stage.trim().is_empty() {
                    errors.push(field, "Stage is required");
                }
            }
            Self::SendNotification(c) => {
                if c.message.trim().is_empty() {
                    errors.push(field, "Notification message is required");
                }
            }
            Self::Wait(c) => {
                if c.seconds == 0 || Duration::from_secs(c.seconds) > max_wait {
                    errors.push(
                        field,
                        format!("Wait must be between 1 and {} seconds", max_wait.as_secs()),
                    );
                }
            }
            Self::Webhook(c) => match url::Url::parse(&c.url) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {}
                Ok(_) => errors.push(field, "Webhook URL must use http or https"),
                Err(_) => errors.push(field, "Webhook URL is invalid"),
            },
            Self::UpdateContactField(_) | Self::MarkAsEngaged(_) => {}
        }
    }

    // ===== Builders =====

    pub fn send_template(template_id: Uuid) -> Self {
        Self::SendEmail(SendEmailConfig {
            template_id: Some(template_id),
            ..Default::default()
        })
    }

    pub fn send_email(subject: &str, body: &str) -> Self {
        Self::SendEmail(SendEmailConfig {
            subject: Some(subject.to_string()),
            body: Some(body.to_string()),
            ..Default::default()
        })
    }

    pub fn create_task(title: &str, due_in_days: i64, priority: TaskPriority) -> Self {
        Self::CreateTask(CreateTaskConfig {
            title: title.to_string(),
            description: None,
            due_in_days,
            priority,
        })
    }

    pub fn add_tag(tag: &str) -> Self {
        Self::AddTag(TagConfig { tag: tag.to_string() })
    }

    pub fn remove_tag(tag: &str) -> Self {
        Self::RemoveTag(TagConfig { tag: tag.to_string() })
    }

    pub fn update_lead_stage(stage: &str) -> Self {
        Self::UpdateLeadStage(UpdateLeadStageConfig {
            stage: stage.to_string(),
            reason: None,
        })
    }

    pub fn notify(message: &str) -> Self {
        Self::SendNotification(SendNotificationConfig {
            user_id: None,
            message: message.to_string(),
        })
    }

    pub fn wait(seconds: u64) -> Self {
        Self::Wait(WaitConfig { seconds })
    }

    pub fn webhook(url: &str, payload: Value) -> Self {
        Self::Webhook(WebhookConfig {
            url: url.to_string(),
            method: HttpMethod::Post,
            headers: BTreeMap::new(),
            payload: Some(payload),
        })
    }
}

/// A stored action row. Type and config stay raw until dispatch so that
/// rows this build cannot parse still load and fail visibly when run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Action {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub action_type: String,
    pub action_config: Value,
    pub execution_order: i32,
    /// Insertion position within the definition; final tie-breaker
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

impl Action {
    pub fn kind(&self) -> Result<ActionKind, WorkflowError> {
        ActionKind::parse(&self.action_type, &self.action_config)
    }
}

/// Stable dispatch order: `execution_order`, then `created_at`, then position.
pub fn sort_actions(actions: &mut [Action]) {
    actions.sort_by_key(|a| (a.execution_order, a.created_at, a.position));
}

/// Result of executing an action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub status: RunStatus,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub error_code: Option<String>,
    pub duration_ms: i64,
}

impl ActionResult {
    pub fn success(output: Value) -> Self {
        Self {
            status: RunStatus::Completed,
            output: Some(output),
            error: None,
            error_code: None,
            duration_ms: 0,
        }
    }

    pub fn failure(error: &WorkflowError) -> Self {
        Self {
            status: RunStatus::Failed,
            output: None,
            error: Some(error.to_string()),
            error_code: Some(error.error_code().to_string()),
            duration_ms: 0,
        }
    }

    pub fn with_duration(mut self, duration_ms: i64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// What the action log stores in `result`.
    pub fn log_result(&self) -> Option<Value> {
        match (&self.output, &self.error_code) {
            (Some(output), _) => Some(output.clone()),
            (None, Some(code)) => Some(serde_json::json!({
                "error_code": code,
                "duration_ms": self.duration_ms,
            })),
            (None, None) => None,
        }
    }
}
