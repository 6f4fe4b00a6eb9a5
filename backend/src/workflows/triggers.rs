// Workflow Triggers - Event types that can start a workflow run

use chrono::{DateTime, Utc};
use relay_shared::ScheduledFollowUp;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{ValidationBuilder, WorkflowError};

/// Types of events that can trigger workflows
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    // Email activity
    EmailReceived,
    EmailSent,
    EmailOpened,
    EmailClicked,
    EmailReplied,

    // Contact lifecycle
    ContactCreated,

    // Scheduled
    NoReplyAfterDays,
}

impl TriggerType {
    pub const ALL: [TriggerType; 7] = [
        TriggerType::EmailReceived,
        TriggerType::EmailSent,
        TriggerType::EmailOpened,
        TriggerType::EmailClicked,
        TriggerType::EmailReplied,
        TriggerType::ContactCreated,
        TriggerType::NoReplyAfterDays,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmailReceived => "email_received",
            Self::EmailSent => "email_sent",
            Self::EmailOpened => "email_opened",
            Self::EmailClicked => "email_clicked",
            Self::EmailReplied => "email_replied",
            Self::ContactCreated => "contact_created",
            Self::NoReplyAfterDays => "no_reply_after_days",
        }
    }
}

impl FromStr for TriggerType {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| WorkflowError::definition(format!("Unknown trigger type: {}", s)))
    }
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filter shared by the plain email triggers
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EmailTriggerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integration: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EmailClickedConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_url_contains: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EmailReceivedConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_domain: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ContactCreatedConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Longest no-reply delay a trigger may declare.
pub const MAX_FOLLOW_UP_DAYS: u32 = 365;

fn default_follow_up_days() -> u32 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct NoReplyConfig {
    #[serde(default = "default_follow_up_days")]
    pub days: u32,
}

impl Default for NoReplyConfig {
    fn default() -> Self {
        Self {
            days: default_follow_up_days(),
        }
    }
}

/// A trigger type together with its typed filter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "trigger_type", content = "trigger_config", rename_all = "snake_case")]
pub enum TriggerSpec {
    EmailReceived(EmailReceivedConfig),
    EmailSent(EmailTriggerConfig),
    EmailOpened(EmailTriggerConfig),
    EmailClicked(EmailClickedConfig),
    EmailReplied(EmailTriggerConfig),
    ContactCreated(ContactCreatedConfig),
    NoReplyAfterDays(NoReplyConfig),
}

impl TriggerSpec {
    /// Build from the stored `trigger_type` / `trigger_config` columns.
    pub fn parse(trigger_type: &str, trigger_config: &Value) -> Result<Self, WorkflowError> {
        let trigger_type = TriggerType::from_str(trigger_type)?;
        let config = if trigger_config.is_null() {
            Value::Object(Default::default())
        } else {
            trigger_config.clone()
        };

        serde_json::from_value(serde_json::json!({
            "trigger_type": trigger_type.as_str(),
            "trigger_config": config,
        }))
        .map_err(|e| {
            WorkflowError::definition(format!("Invalid {} trigger config: {}", trigger_type, e))
        })
    }

    pub fn trigger_type(&self) -> TriggerType {
        match self {
            Self::EmailReceived(_) => TriggerType::EmailReceived,
            Self::EmailSent(_) => TriggerType::EmailSent,
            Self::EmailOpened(_) => TriggerType::EmailOpened,
            Self::EmailClicked(_) => TriggerType::EmailClicked,
            Self::EmailReplied(_) => TriggerType::EmailReplied,
            Self::ContactCreated(_) => TriggerType::ContactCreated,
            Self::NoReplyAfterDays(_) => TriggerType::NoReplyAfterDays,
        }
    }

    /// Save-time checks beyond what the config types enforce.
    pub fn validate_into(&self, field: &str, errors: &mut ValidationBuilder) {
        if let Self::NoReplyAfterDays(c) = self {
            if c.days == 0 || c.days > MAX_FOLLOW_UP_DAYS {
                errors.push(
                    field,
                    format!("days must be between 1 and {}", MAX_FOLLOW_UP_DAYS),
                );
            }
        }
    }

    /// Days to wait for a reply, for no-reply triggers.
    pub fn follow_up_days(&self) -> Option<u32> {
        match self {
            Self::NoReplyAfterDays(c) => Some(c.days),
            _ => None,
        }
    }

    /// The config half, as persisted in `trigger_config`.
    pub fn config_value(&self) -> Value {
        let value = match self {
            Self::EmailReceived(c) => serde_json::to_value(c),
            Self::EmailSent(c) | Self::EmailOpened(c) | Self::EmailReplied(c) => {
                serde_json::to_value(c)
            }
            Self::EmailClicked(c) => serde_json::to_value(c),
            Self::ContactCreated(c) => serde_json::to_value(c),
            Self::NoReplyAfterDays(c) => serde_json::to_value(c),
        };
        value.unwrap_or_else(|_| Value::Object(Default::default()))
    }

    /// Whether this trigger fires for `event`. Every configured filter must
    /// match; unset filters match anything.
    pub fn matches(&self, event: &TriggerEvent) -> bool {
        if self.trigger_type() != event.trigger_type {
            return false;
        }

        match self {
            Self::EmailSent(c) | Self::EmailOpened(c) | Self::EmailReplied(c) => {
                filter_equals(&c.integration, event.payload_str("integration"))
            }
            Self::EmailClicked(c) => {
                filter_equals(&c.integration, event.payload_str("integration"))
                    && filter_contains(&c.link_url_contains, event.payload_str("link_url"))
            }
            Self::EmailReceived(c) => {
                filter_equals(&c.integration, event.payload_str("integration"))
                    && filter_domain(&c.from_domain, event.sender_address())
            }
            Self::ContactCreated(c) => filter_equals(&c.source, event.payload_str("source")),
            Self::NoReplyAfterDays(c) => event
                .payload_str("days_since")
                .and_then(|d| d.parse::<u32>().ok())
                .is_none_or(|d| d == c.days),
        }
    }
}

fn filter_equals(filter: &Option<String>, actual: Option<String>) -> bool {
    match filter {
        None => true,
        Some(expected) => actual.is_some_and(|a| a == *expected),
    }
}

fn filter_contains(filter: &Option<String>, actual: Option<String>) -> bool {
    match filter {
        None => true,
        Some(fragment) => {
            actual.is_some_and(|a| a.to_lowercase().contains(&fragment.to_lowercase()))
        }
    }
}

fn filter_domain(filter: &Option<String>, sender: Option<String>) -> bool {
    match filter {
        None => true,
        Some(domain) => sender
            .and_then(|s| s.rsplit_once('@').map(|(_, d)| d.to_lowercase()))
            .is_some_and(|d| d == domain.trim_start_matches('@').to_lowercase()),
    }
}

/// Source of the trigger event
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    #[default]
    System,
    User(Uuid),
    EmailSync,
    Tracking,
    Scheduler,
    Manual,
}

/// A domain event that may start workflow runs for its owner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEvent {
    #[serde(default = "Uuid::new_v4", alias = "id")]
    pub event_id: Uuid,
    pub owner_id: Uuid,
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub source: EventSource,
    #[serde(default = "Utc::now", alias = "occurred_at")]
    pub timestamp: DateTime<Utc>,
}

impl TriggerEvent {
    pub fn new(owner_id: Uuid, trigger_type: TriggerType, payload: Value, source: EventSource) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            owner_id,
            trigger_type,
            payload,
            source,
            timestamp: Utc::now(),
        }
    }

    /// Create an email opened event
    pub fn email_opened(
        owner_id: Uuid,
        email_id: i64,
        contact_id: Option<Uuid>,
        integration: Option<&str>,
    ) -> Self {
        Self::new(
            owner_id,
            TriggerType::EmailOpened,
            serde_json::json!({
                "email_id": email_id,
                "contact_id": contact_id,
                "integration": integration,
            }),
            EventSource::Tracking,
        )
    }

    /// Create an email link clicked event
    pub fn email_clicked(
        owner_id: Uuid,
        email_id: i64,
        contact_id: Option<Uuid>,
        link_url: &str,
    ) -> Self {
        Self::new(
            owner_id,
            TriggerType::EmailClicked,
            serde_json::json!({
                "email_id": email_id,
                "contact_id": contact_id,
                "link_url": link_url,
            }),
            EventSource::Tracking,
        )
    }

    /// Create an email received event
    pub fn email_received(
        owner_id: Uuid,
        email_id: i64,
        from_email: &str,
        subject: &str,
        contact_id: Option<Uuid>,
    ) -> Self {
        Self::new(
            owner_id,
            TriggerType::EmailReceived,
            serde_json::json!({
                "email_id": email_id,
                "contact_id": contact_id,
                "email_data": {
                    "from_email": from_email,
                    "subject": subject,
                },
            }),
            EventSource::EmailSync,
        )
    }

    /// Create an email sent event
    pub fn email_sent(owner_id: Uuid, email_id: i64, to_email: &str, contact_id: Option<Uuid>) -> Self {
        Self::new(
            owner_id,
            TriggerType::EmailSent,
            serde_json::json!({
                "email_id": email_id,
                "contact_id": contact_id,
                "email_data": {
                    "to_emails": [to_email],
                },
            }),
            EventSource::System,
        )
    }

    /// Create a reply received event
    pub fn email_replied(
        owner_id: Uuid,
        original_email_id: i64,
        reply_email_id: i64,
        contact_id: Option<Uuid>,
    ) -> Self {
        Self::new(
            owner_id,
            TriggerType::EmailReplied,
            serde_json::json!({
                "original_email_id": original_email_id,
                "reply_email_id": reply_email_id,
                "contact_id": contact_id,
            }),
            EventSource::EmailSync,
        )
    }

    /// Create a contact created event
    pub fn contact_created(owner_id: Uuid, contact_id: Uuid, source: &str) -> Self {
        Self::new(
            owner_id,
            TriggerType::ContactCreated,
            serde_json::json!({
                "contact_id": contact_id,
                "source": source,
            }),
            EventSource::System,
        )
    }

    /// Create the event for a due no-reply check
    pub fn no_reply(followup: &ScheduledFollowUp) -> Self {
        let mut event = Self::new(
            followup.owner_id,
            TriggerType::NoReplyAfterDays,
            serde_json::json!({
                "email_id": followup.original_email_id,
                "contact_id": followup.contact_id,
                "days_since": followup.days_after_original,
                "followup_id": followup.id,
            }),
            EventSource::Scheduler,
        );
        event.timestamp = followup.scheduled_for;
        event
    }

    /// Payload field as a string, numbers included.
    pub fn payload_str(&self, key: &str) -> Option<String> {
        match self.payload.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    fn sender_address(&self) -> Option<String> {
        self.payload_str("from_email").or_else(|| {
            self.payload
                .get("email_data")
                .and_then(|d| d.get("from_email"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
    }

    /// Identifier of the domain object behind this event, used as the
    /// execution's `trigger_event_id`.
    pub fn reference_id(&self) -> String {
        ["email_id", "original_email_id", "contact_id"]
            .iter()
            .find_map(|key| self.payload_str(key))
            .unwrap_or_else(|| self.event_id.to_string())
    }
}
