// Action Dispatcher - Runs one stored action through the handler registry

use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use super::actions::{Action, ActionKind, ActionResult, ActionType};
use super::context::{get_nested_value, render_templates, EventContext};
use super::handlers::ActionHandler;
use super::triggers::TriggerType;
use crate::config::EngineConfig;
use crate::error::{WorkflowError, WorkflowResult};

/// Everything a handler may read about the run it belongs to
#[derive(Debug, Clone)]
pub struct RunContext {
    pub owner_id: Uuid,
    pub workflow_id: Uuid,
    pub execution_id: Uuid,
    pub trigger_type: TriggerType,
    pub payload: Value,
    pub context: EventContext,
    /// Outputs of the actions already dispatched, by position
    pub outputs: Vec<Value>,
}

impl RunContext {
    /// Resolve a template path: `actions.<n>.<field>` reads prior outputs,
    /// anything else the payload, then the enriched context.
    pub fn lookup(&self, path: &str) -> Option<Value> {
        if let Some(rest) = path.strip_prefix("actions.") {
            let (index, field) = match rest.split_once('.') {
                Some((index, field)) => (index, Some(field)),
                None => (rest, None),
            };
            let output = self.outputs.get(index.parse::<usize>().ok()?)?;
            return match field {
                Some(field) => get_nested_value(output, field),
                None => Some(output.clone()),
            };
        }

        get_nested_value(&self.payload, path).or_else(|| self.context.get(path).cloned())
    }

    pub fn contact_id(&self) -> Option<Uuid> {
        self.context.contact_id()
    }

    pub fn require_contact(&self) -> WorkflowResult<Uuid> {
        self.contact_id()
            .ok_or_else(|| WorkflowError::action("Event payload has no contact_id"))
    }
}

/// Handlers keyed by action type. Always complete once built.
#[derive(Clone)]
pub struct ActionRegistry {
    handlers: HashMap<ActionType, Arc<dyn ActionHandler>>,
}

impl ActionRegistry {
    pub fn builder() -> ActionRegistryBuilder {
        ActionRegistryBuilder::default()
    }

    pub fn get(&self, action_type: ActionType) -> Option<&Arc<dyn ActionHandler>> {
        self.handlers.get(&action_type)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[derive(Default)]
pub struct ActionRegistryBuilder {
    handlers: HashMap<ActionType, Arc<dyn ActionHandler>>,
}

impl ActionRegistryBuilder {
    /// Register a handler, replacing any earlier one for the same type.
    pub fn register<H: ActionHandler + 'static>(self, handler: H) -> Self {
        self.register_arc(Arc::new(handler))
    }

    pub fn register_arc(mut self, handler: Arc<dyn ActionHandler>) -> Self {
        self.handlers.insert(handler.action_type(), handler);
        self
    }

    /// Fails if any action type is left without a handler.
    pub fn build(self) -> WorkflowResult<ActionRegistry> {
        let missing: Vec<&str> = ActionType::ALL
            .iter()
            .filter(|t| !self.handlers.contains_key(t))
            .map(|t| t.as_str())
            .collect();

        if !missing.is_empty() {
            return Err(WorkflowError::Configuration(format!(
                "No handler registered for: {}",
                missing.join(", ")
            )));
        }

        Ok(ActionRegistry {
            handlers: self.handlers,
        })
    }
}

pub struct ActionDispatcher {
    registry: ActionRegistry,
    timeout: Duration,
    max_wait: Duration,
}

impl ActionDispatcher {
    pub fn new(registry: ActionRegistry, config: &EngineConfig) -> Self {
        Self {
            registry,
            timeout: config.action_timeout,
            max_wait: config.max_wait,
        }
    }

    /// Run one action. Every failure, including a definition this build
    /// cannot parse, comes back as a failed result.
    pub async fn dispatch(&self, action: &Action, run: &RunContext) -> ActionResult {
        let started = Instant::now();
        let outcome = self.try_dispatch(action, run).await;
        let duration_ms = started.elapsed().as_millis() as i64;

        match outcome {
            Ok(output) => {
                debug!(
                    "Action {} ({}) completed in {}ms",
                    action.id, action.action_type, duration_ms
                );
                ActionResult::success(output).with_duration(duration_ms)
            }
            Err(e) => {
                warn!(
                    "Action {} ({}) failed for execution {}: {}",
                    action.id, action.action_type, run.execution_id, e
                );
                ActionResult::failure(&e).with_duration(duration_ms)
            }
        }
    }

    async fn try_dispatch(&self, action: &Action, run: &RunContext) -> WorkflowResult<Value> {
        let action_type = ActionType::from_str(&action.action_type)?;
        let config = render_templates(&action.action_config, &|path| run.lookup(path));
        let kind = ActionKind::parse(action_type.as_str(), &config)?;

        let handler = self.registry.get(action_type).ok_or_else(|| {
            WorkflowError::Configuration(format!("No handler registered for {}", action_type))
        })?;

        // Stored rows skip save-time validation, so the wait bound is rechecked here.
        let delay = kind.planned_delay();
        if delay > self.max_wait {
            return Err(WorkflowError::definition(format!(
                "{} of {}s exceeds the {}s limit",
                action_type,
                delay.as_secs(),
                self.max_wait.as_secs()
            )));
        }
        let bound = self
            .timeout
            .checked_add(delay)
            .ok_or_else(|| WorkflowError::definition("Action timeout is out of range"))?;
        match tokio::time::timeout(bound, handler.execute(&kind, run)).await {
            Ok(result) => result,
            Err(_) => Err(WorkflowError::Timeout(bound)),
        }
    }
}
