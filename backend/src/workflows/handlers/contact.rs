use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use super::{mismatch, ActionHandler};
use crate::error::WorkflowResult;
use crate::services::ContactDirectory;
use crate::workflows::actions::{ActionKind, ActionType};
use crate::workflows::dispatcher::RunContext;

/// Handles every action that mutates the event's contact.
pub struct ContactActionHandler {
    action_type: ActionType,
    contacts: Arc<dyn ContactDirectory>,
}

impl ContactActionHandler {
    pub const HANDLES: [ActionType; 5] = [
        ActionType::AddTag,
        ActionType::RemoveTag,
        ActionType::UpdateContactField,
        ActionType::UpdateLeadStage,
        ActionType::MarkAsEngaged,
    ];

    pub fn new(action_type: ActionType, contacts: Arc<dyn ContactDirectory>) -> Self {
        Self {
            action_type,
            contacts,
        }
    }
}

#[async_trait]
impl ActionHandler for ContactActionHandler {
    fn action_type(&self) -> ActionType {
        self.action_type
    }

    async fn execute(&self, action: &ActionKind, run: &RunContext) -> WorkflowResult<Value> {
        if action.action_type() != self.action_type {
            return Err(mismatch(self.action_type, action));
        }
        let contact_id = run.require_contact()?;

        match action {
            ActionKind::AddTag(c) => {
                let tags = self.contacts.add_tag(run.owner_id, contact_id, &c.tag).await?;
                info!("Tagged contact {} with '{}'", contact_id, c.tag);
                Ok(json!({ "contact_id": contact_id, "tag": c.tag, "tags": tags }))
            }
            ActionKind::RemoveTag(c) => {
                let tags = self.contacts.remove_tag(run.owner_id, contact_id, &c.tag).await?;
                Ok(json!({ "contact_id": contact_id, "tag": c.tag, "tags": tags }))
            }
            ActionKind::UpdateContactField(c) => {
                self.contacts
                    .update_field(run.owner_id, contact_id, c.field, &c.value)
                    .await?;
                Ok(json!({ "contact_id": contact_id, "field": c.field.column(), "value": c.value }))
            }
            ActionKind::UpdateLeadStage(c) => {
                self.contacts
                    .set_lead_stage(run.owner_id, contact_id, &c.stage)
                    .await?;
                info!("Moved contact {} to stage '{}'", contact_id, c.stage);
                Ok(json!({ "contact_id": contact_id, "lead_stage": c.stage, "reason": c.reason }))
            }
            ActionKind::MarkAsEngaged(c) => {
                let contact = self.contacts.mark_engaged(run.owner_id, contact_id).await?;
                Ok(json!({
                    "contact_id": contact_id,
                    "lead_stage": contact.lead_stage,
                    "engagement_score": contact.engagement_score,
                    "reason": c.reason,
                }))
            }
            other => Err(mismatch(self.action_type, other)),
        }
    }
}
