// Workflow Automation Engine
//
// Event-driven automation for the Relay CRM. Triggers match incoming
// events, conditions gate a run, and actions execute in order with every
// run and action attempt recorded.

pub mod actions;
pub mod conditions;
pub mod context;
pub mod definition;
pub mod dispatcher;
pub mod engine;
pub mod executor;
pub mod handlers;
pub mod store;
pub mod triggers;

pub use actions::{Action, ActionKind, ActionResult, ActionType};
pub use conditions::{Condition, ConditionCheck, ConditionOperator};
pub use context::EventContext;
pub use definition::{Workflow, WorkflowFilter, WorkflowInput};
pub use dispatcher::{ActionDispatcher, ActionRegistry, RunContext};
pub use engine::{EventOutcome, FollowUpOutcome, ManualRunOptions, ManualRunOutcome, WorkflowEngine};
pub use executor::{ExecutionReport, WorkflowExecutor};
pub use handlers::ActionHandler;
pub use store::{ExecutionStore, FollowUpStore, WorkflowStore};
pub use triggers::{EventSource, TriggerEvent, TriggerSpec, TriggerType};
