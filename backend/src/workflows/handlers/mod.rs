// Action Handlers - One handler per action type

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::actions::{ActionKind, ActionType};
use super::dispatcher::{ActionRegistry, ActionRegistryBuilder, RunContext};
use crate::config::EngineConfig;
use crate::error::{WorkflowError, WorkflowResult};
use crate::services::{ContactDirectory, EmailTransport};

pub mod contact;
pub mod control;
pub mod email;
pub mod records;
pub mod webhook;

pub use contact::ContactActionHandler;
pub use control::WaitHandler;
pub use email::SendEmailHandler;
pub use records::{CreateTaskHandler, SendNotificationHandler};
pub use webhook::WebhookHandler;

#[async_trait]
pub trait ActionHandler: Send + Sync {
    fn action_type(&self) -> ActionType;

    /// Perform the side effect; the returned value becomes the action's output.
    async fn execute(&self, action: &ActionKind, run: &RunContext) -> WorkflowResult<Value>;
}

/// Raised when the dispatcher hands a handler a config of another type.
pub(crate) fn mismatch(expected: ActionType, action: &ActionKind) -> WorkflowError {
    WorkflowError::definition(format!(
        "{} handler cannot run a {} action",
        expected,
        action.action_type()
    ))
}

/// The production handler set, left open so callers can override entries.
pub fn standard_handlers(
    contacts: Arc<dyn ContactDirectory>,
    email: Arc<dyn EmailTransport>,
    config: &EngineConfig,
) -> WorkflowResult<ActionRegistryBuilder> {
    let mut builder = ActionRegistry::builder()
        .register(SendEmailHandler::new(contacts.clone(), email))
        .register(CreateTaskHandler::new(contacts.clone()))
        .register(SendNotificationHandler::new(contacts.clone()))
        .register(WaitHandler)
        .register(WebhookHandler::new(config.webhook_timeout)?);

    for action_type in ContactActionHandler::HANDLES {
        builder = builder.register(ContactActionHandler::new(action_type, contacts.clone()));
    }

    Ok(builder)
}
