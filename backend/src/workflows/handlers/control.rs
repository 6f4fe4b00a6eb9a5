use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use super::{mismatch, ActionHandler};
use crate::error::WorkflowResult;
use crate::workflows::actions::{ActionKind, ActionType};
use crate::workflows::dispatcher::RunContext;

/// Pauses the run in place; the dispatcher widens its timeout to match.
pub struct WaitHandler;

#[async_trait]
impl ActionHandler for WaitHandler {
    fn action_type(&self) -> ActionType {
        ActionType::Wait
    }

    async fn execute(&self, action: &ActionKind, _run: &RunContext) -> WorkflowResult<Value> {
        let ActionKind::Wait(config) = action else {
            return Err(mismatch(self.action_type(), action));
        };

        tokio::time::sleep(Duration::from_secs(config.seconds)).await;
        Ok(json!({ "waited_seconds": config.seconds }))
    }
}
