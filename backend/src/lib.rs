pub mod config;
pub mod database;
pub mod error;
pub mod services;
pub mod workflows;

pub use error::{WorkflowError, WorkflowResult};
