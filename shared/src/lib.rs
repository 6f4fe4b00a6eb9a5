use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a workflow run and of each action attempt inside it.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "workflow_run_status", rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }

    /// Only `running` may move, and only into a terminal state.
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        matches!(self, Self::Running) && next.is_terminal()
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One persisted run of a workflow.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowExecution {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub workflow_id: Uuid,
    pub workflow_name: String,
    pub trigger_event_id: Option<String>,
    pub trigger_type: String,
    pub trigger_payload: serde_json::Value,
    pub status: RunStatus,
    pub actions_total: i32,
    pub actions_executed: i32,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// One attempted action inside an execution. `action_config` is the
/// snapshot taken at dispatch time, not the live definition.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionLogEntry {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub action_id: Uuid,
    pub position: i32,
    pub action_type: String,
    pub action_config: serde_json::Value,
    pub status: RunStatus,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// CRM contact as seen by the automation engine.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Contact {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company: Option<String>,
    pub lead_stage: String,
    pub tags: Vec<String>,
    pub engagement_score: i32,
    pub last_contacted_at: Option<DateTime<Utc>>,
}

impl Contact {
    pub fn display_name(&self) -> String {
        let name = format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or_default(),
            self.last_name.as_deref().unwrap_or_default()
        );
        let name = name.trim();
        if name.is_empty() {
            "there".to_string()
        } else {
            name.to_string()
        }
    }
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailTemplate {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub subject: String,
    pub body_html: String,
    pub body_text: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

/// Contact columns a workflow may overwrite.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContactField {
    FirstName,
    LastName,
    Company,
    JobTitle,
    Phone,
    Website,
    LeadSource,
    Notes,
}

impl ContactField {
    pub fn column(&self) -> &'static str {
        match self {
            Self::FirstName => "first_name",
            Self::LastName => "last_name",
            Self::Company => "company",
            Self::JobTitle => "job_title",
            Self::Phone => "phone",
            Self::Website => "website",
            Self::LeadSource => "lead_source",
            Self::Notes => "notes",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub owner_id: Uuid,
    pub contact_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub priority: TaskPriority,
    pub due_at: DateTime<Utc>,
    pub source_execution_id: Option<Uuid>,
}

/// Lifecycle of a scheduled no-reply check.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "workflow_followup_status", rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FollowUpStatus {
    Pending,
    Executed,
    Cancelled,
    Failed,
}

impl FollowUpStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Executed => "executed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    /// Only `pending` may move, and never back to `pending`.
    pub fn can_transition_to(&self, next: FollowUpStatus) -> bool {
        matches!(self, Self::Pending) && !matches!(next, Self::Pending)
    }
}

impl std::fmt::Display for FollowUpStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pending or settled "no reply after N days" check for one sent email
/// and one workflow.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduledFollowUp {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub workflow_id: Uuid,
    pub original_email_id: String,
    pub contact_id: Option<Uuid>,
    pub days_after_original: i32,
    pub scheduled_for: DateTime<Utc>,
    pub status: FollowUpStatus,
    pub execution_id: Option<Uuid>,
    pub result: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}
