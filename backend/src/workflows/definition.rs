// Workflow Definitions - Persisted workflows and the input used to save them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

use super::actions::{sort_actions, Action, ActionKind};
use super::conditions::{Condition, ConditionOperator};
use super::triggers::{TriggerEvent, TriggerSpec, TriggerType};
use crate::error::{ValidationBuilder, WorkflowResult};

pub const MAX_NAME_LENGTH: usize = 255;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trigger {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub spec: TriggerSpec,
    pub created_at: DateTime<Utc>,
}

/// A workflow with its triggers, conditions and ordered actions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Workflow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub triggers: Vec<Trigger>,
    pub conditions: Vec<Condition>,
    /// Always held in dispatch order
    pub actions: Vec<Action>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    /// Active and at least one trigger matches.
    pub fn matches(&self, event: &TriggerEvent) -> bool {
        self.is_active
            && self.owner_id == event.owner_id
            && self.triggers.iter().any(|t| t.spec.matches(event))
    }

    pub fn has_trigger_type(&self, trigger_type: TriggerType) -> bool {
        self.triggers
            .iter()
            .any(|t| t.spec.trigger_type() == trigger_type)
    }

    /// Type used for manual runs.
    pub fn primary_trigger_type(&self) -> Option<TriggerType> {
        self.triggers.first().map(|t| t.spec.trigger_type())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerInput {
    pub trigger_type: String,
    #[serde(default)]
    pub trigger_config: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionInput {
    pub condition_type: String,
    pub operator: String,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionInput {
    pub action_type: String,
    #[serde(default)]
    pub action_config: Value,
    /// Defaults to the action's index in the input
    #[serde(default)]
    pub execution_order: Option<i32>,
}

impl From<ActionKind> for ActionInput {
    fn from(kind: ActionKind) -> Self {
        Self {
            action_type: kind.action_type().as_str().to_string(),
            action_config: kind.config_value(),
            execution_order: None,
        }
    }
}

impl From<TriggerSpec> for TriggerInput {
    fn from(spec: TriggerSpec) -> Self {
        Self {
            trigger_type: spec.trigger_type().as_str().to_string(),
            trigger_config: spec.config_value(),
        }
    }
}

impl From<Condition> for ConditionInput {
    fn from(condition: Condition) -> Self {
        let operator = serde_json::to_value(condition.operator)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        Self {
            condition_type: condition.condition_type,
            operator,
            value: condition.value,
        }
    }
}

/// Body of a create or full-replace request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub triggers: Vec<TriggerInput>,
    #[serde(default)]
    pub conditions: Vec<ConditionInput>,
    pub actions: Vec<ActionInput>,
}

fn default_active() -> bool {
    true
}

impl WorkflowInput {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: None,
            is_active: true,
            triggers: Vec::new(),
            conditions: Vec::new(),
            actions: Vec::new(),
        }
    }

    pub fn trigger(mut self, spec: TriggerSpec) -> Self {
        self.triggers.push(spec.into());
        self
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition.into());
        self
    }

    pub fn action(mut self, kind: ActionKind) -> Self {
        self.actions.push(kind.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Check every field and parse the typed parts. All problems are
    /// reported together, keyed by field path.
    pub fn validate(&self, max_wait: Duration) -> WorkflowResult<ValidatedWorkflow> {
        let mut errors = ValidationBuilder::new();

        let name = self.name.trim();
        if name.is_empty() {
            errors.push("name", "Name is required");
        } else if name.chars().count() > MAX_NAME_LENGTH {
            errors.push("name", format!("Name must be {} characters or less", MAX_NAME_LENGTH));
        }

        if self.triggers.is_empty() {
            errors.push("triggers", "At least one trigger is required");
        }
        let mut triggers = Vec::with_capacity(self.triggers.len());
        for (i, input) in self.triggers.iter().enumerate() {
            let field = format!("triggers[{}]", i);
            match TriggerSpec::parse(&input.trigger_type, &input.trigger_config) {
                Ok(spec) => {
                    spec.validate_into(&field, &mut errors);
                    triggers.push(spec);
                }
                Err(e) => errors.push(&field, e.to_string()),
            }
        }

        let mut conditions = Vec::with_capacity(self.conditions.len());
        for (i, input) in self.conditions.iter().enumerate() {
            let field = format!("conditions[{}]", i);
            let operator: ConditionOperator =
                serde_json::from_value(Value::String(input.operator.clone()))
                    .unwrap_or(ConditionOperator::Unknown);
            let condition = Condition::new(&input.condition_type, operator, input.value.clone());
            condition.validate_into(&field, &mut errors);
            conditions.push(condition);
        }

        if self.actions.is_empty() {
            errors.push("actions", "At least one action is required");
        }
        let mut actions = Vec::with_capacity(self.actions.len());
        for (i, input) in self.actions.iter().enumerate() {
            let field = format!("actions[{}]", i);
            match ActionKind::parse(&input.action_type, &input.action_config) {
                Ok(kind) => {
                    kind.validate_into(&field, max_wait, &mut errors);
                    actions.push(ValidatedAction {
                        execution_order: input.execution_order.unwrap_or(i as i32),
                        kind,
                    });
                }
                Err(e) => errors.push(&field, e.to_string()),
            }
        }

        errors.finish()?;

        Ok(ValidatedWorkflow {
            name: name.to_string(),
            description: self.description.clone().filter(|d| !d.trim().is_empty()),
            is_active: self.is_active,
            triggers,
            conditions,
            actions,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedAction {
    pub kind: ActionKind,
    pub execution_order: i32,
}

/// A definition that passed save-time validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedWorkflow {
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub triggers: Vec<TriggerSpec>,
    pub conditions: Vec<Condition>,
    pub actions: Vec<ValidatedAction>,
}

impl ValidatedWorkflow {
    /// Materialize with fresh child ids, as a store would persist it.
    pub fn into_workflow(
        self,
        id: Uuid,
        owner_id: Uuid,
        created_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Workflow {
        let triggers = self
            .triggers
            .into_iter()
            .map(|spec| Trigger {
                id: Uuid::new_v4(),
                workflow_id: id,
                spec,
                created_at: now,
            })
            .collect();

        let mut actions: Vec<Action> = self
            .actions
            .into_iter()
            .enumerate()
            .map(|(position, action)| Action {
                id: Uuid::new_v4(),
                workflow_id: id,
                action_type: action.kind.action_type().as_str().to_string(),
                action_config: action.kind.config_value(),
                execution_order: action.execution_order,
                position: position as i32,
                created_at: now,
            })
            .collect();
        sort_actions(&mut actions);

        Workflow {
            id,
            owner_id,
            name: self.name,
            description: self.description,
            is_active: self.is_active,
            triggers,
            conditions: self.conditions,
            actions,
            created_at,
            updated_at: now,
        }
    }
}

/// Filter for listing an owner's workflows
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowFilter {
    pub is_active: Option<bool>,
    pub trigger_type: Option<TriggerType>,
}

impl WorkflowFilter {
    pub fn accepts(&self, workflow: &Workflow) -> bool {
        self.is_active.is_none_or(|active| workflow.is_active == active)
            && self
                .trigger_type
                .is_none_or(|t| workflow.has_trigger_type(t))
    }
}
