//! Error handling for the Relay workflow engine
//!
//! Every fallible engine operation returns [`WorkflowError`]. Failures of a
//! single action never travel up as errors: the dispatcher folds them into a
//! failed action log and the run continues.

use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    // Resource errors
    #[error("{0} not found")]
    NotFound(String),
    #[error("Execution {0} is already in a terminal state")]
    AlreadyTerminal(Uuid),
    #[error("Action log {0} is already in a terminal state")]
    ActionLogTerminal(Uuid),
    #[error("Follow-up {0} is no longer pending")]
    FollowUpSettled(Uuid),

    // Definition errors
    #[error("Validation failed")]
    Validation { details: HashMap<String, Vec<String>> },
    #[error("Invalid workflow definition: {0}")]
    Definition(String),
    #[error("Configuration error: {0}")]
    Configuration(String),

    // Action errors
    #[error("{0}")]
    Action(String),
    #[error("Action timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("External service error ({service}): {message}")]
    ExternalService { service: String, message: String },

    // Storage errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl WorkflowError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    pub fn definition(message: impl Into<String>) -> Self {
        Self::Definition(message.into())
    }

    pub fn action(message: impl Into<String>) -> Self {
        Self::Action(message.into())
    }

    pub fn external(service: impl Into<String>, message: impl ToString) -> Self {
        Self::ExternalService {
            service: service.into(),
            message: message.to_string(),
        }
    }

    /// Stable code recorded alongside failed action logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::AlreadyTerminal(_) | Self::ActionLogTerminal(_) | Self::FollowUpSettled(_) => {
                "ALREADY_TERMINAL"
            }
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Definition(_) => "DEFINITION_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Action(_) => "ACTION_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::ExternalService { .. } => "EXTERNAL_SERVICE_ERROR",
            Self::Database(_) | Self::Migration(_) => "DATABASE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// Errors caused by the stored definition rather than the environment.
    pub fn is_definition_error(&self) -> bool {
        matches!(self, Self::Definition(_) | Self::Validation { .. })
    }

    pub fn validation_details(&self) -> Option<&HashMap<String, Vec<String>>> {
        match self {
            Self::Validation { details } => Some(details),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for WorkflowError {
    fn from(err: reqwest::Error) -> Self {
        Self::external("http", err)
    }
}

impl From<lettre::error::Error> for WorkflowError {
    fn from(err: lettre::error::Error) -> Self {
        Self::external("smtp", err)
    }
}

impl From<lettre::transport::smtp::Error> for WorkflowError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        Self::external("smtp", err)
    }
}

impl From<lettre::address::AddressError> for WorkflowError {
    fn from(err: lettre::address::AddressError) -> Self {
        Self::Action(format!("Invalid email address: {}", err))
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Helper to create a single-field validation error
pub fn validation_error(field: &str, message: &str) -> WorkflowError {
    let mut details = HashMap::new();
    details.insert(field.to_string(), vec![message.to_string()]);
    WorkflowError::Validation { details }
}

/// Collects field-level validation errors
pub struct ValidationBuilder {
    details: HashMap<String, Vec<String>>,
}

impl ValidationBuilder {
    pub fn new() -> Self {
        Self {
            details: HashMap::new(),
        }
    }

    pub fn error(mut self, field: &str, message: &str) -> Self {
        self.push(field, message);
        self
    }

    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.details
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn build(self) -> Option<WorkflowError> {
        if self.details.is_empty() {
            None
        } else {
            Some(WorkflowError::Validation {
                details: self.details,
            })
        }
    }

    pub fn finish(self) -> WorkflowResult<()> {
        match self.build() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.details.is_empty()
    }
}

impl Default for ValidationBuilder {
    fn default() -> Self {
        Self::new()
    }
}
