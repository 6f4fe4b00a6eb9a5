use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{mismatch, ActionHandler};
use crate::error::{WorkflowError, WorkflowResult};
use crate::services::email::text_to_html;
use crate::services::{ContactDirectory, EmailTransport, OutboundEmail};
use crate::workflows::actions::{ActionKind, ActionType, SendEmailConfig};
use crate::workflows::context::replace_template_vars;
use crate::workflows::dispatcher::RunContext;

/// Sends a stored template or an inline message to the event's contact.
pub struct SendEmailHandler {
    contacts: Arc<dyn ContactDirectory>,
    transport: Arc<dyn EmailTransport>,
}

impl SendEmailHandler {
    pub fn new(contacts: Arc<dyn ContactDirectory>, transport: Arc<dyn EmailTransport>) -> Self {
        Self {
            contacts,
            transport,
        }
    }

    /// Subject, HTML body and optional text body.
    async fn content(
        &self,
        config: &SendEmailConfig,
        run: &RunContext,
    ) -> WorkflowResult<(String, String, Option<String>)> {
        let Some(template_id) = config.template_id else {
            let subject = config.subject.clone().unwrap_or_default();
            let body = config.body.clone().unwrap_or_default();
            if subject.trim().is_empty() || body.trim().is_empty() {
                return Err(WorkflowError::definition(
                    "send_email needs a template_id or a subject and body",
                ));
            }
            return Ok((subject, text_to_html(&body), Some(body)));
        };

        let template = self
            .contacts
            .find_template(run.owner_id, template_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found(format!("Email template {}", template_id)))?;
        if !template.is_active {
            return Err(WorkflowError::action(format!(
                "Email template {} is inactive",
                template_id
            )));
        }

        let lookup = |path: &str| run.lookup(path);
        let subject = config
            .subject
            .clone()
            .unwrap_or_else(|| replace_template_vars(&template.subject, &lookup));
        let html = replace_template_vars(&template.body_html, &lookup);
        let text = template
            .body_text
            .as_deref()
            .map(|t| replace_template_vars(t, &lookup));

        Ok((subject, html, text))
    }
}

#[async_trait]
impl ActionHandler for SendEmailHandler {
    fn action_type(&self) -> ActionType {
        ActionType::SendEmail
    }

    async fn execute(&self, action: &ActionKind, run: &RunContext) -> WorkflowResult<Value> {
        let ActionKind::SendEmail(config) = action else {
            return Err(mismatch(self.action_type(), action));
        };

        let contact = match run.contact_id() {
            Some(id) => self.contacts.find_contact(run.owner_id, id).await?,
            None => None,
        };

        let to_email = config
            .to
            .clone()
            .filter(|to| !to.trim().is_empty())
            .or_else(|| contact.as_ref().and_then(|c| c.email.clone()))
            .or_else(|| {
                ["email_data.from_email", "from_email"]
                    .iter()
                    .find_map(|key| run.context.get(key).and_then(Value::as_str))
                    .map(str::to_string)
            })
            .ok_or_else(|| WorkflowError::action("No recipient for send_email"))?;

        let (subject, html_body, text_body) = self.content(config, run).await?;

        self.transport
            .send(&OutboundEmail {
                to_email: to_email.clone(),
                to_name: contact.as_ref().map(|c| c.display_name()),
                subject: subject.clone(),
                html_body,
                text_body,
            })
            .await?;

        if let Some(contact) = &contact {
            self.contacts
                .touch_last_contacted(run.owner_id, contact.id)
                .await?;
        }

        Ok(json!({
            "to": to_email,
            "subject": subject,
            "template_id": config.template_id,
        }))
    }
}
