use std::sync::{Arc, Once};
use std::time::Duration;
use uuid::Uuid;

use super::memory::{
    MemoryContacts, MemoryExecutionStore, MemoryFollowUpStore, MemoryWorkflowStore, RecordingTransport,
};
use crate::config::EngineConfig;
use crate::workflows::dispatcher::ActionRegistryBuilder;
use crate::workflows::engine::WorkflowEngine;
use crate::workflows::handlers::standard_handlers;

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("relay_backend=debug")
            .with_test_writer()
            .try_init();
    });
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        action_timeout: Duration::from_secs(2),
        webhook_timeout: Duration::from_secs(2),
        max_wait: Duration::from_secs(5),
        engagement_tracking: true,
        manual_runs_evaluate_conditions: false,
        followup_interval: Duration::from_secs(60),
    }
}

/// An engine over in-memory stores, with handles on every store.
pub struct TestEngine {
    pub engine: WorkflowEngine,
    pub owner_id: Uuid,
    pub workflows: Arc<MemoryWorkflowStore>,
    pub executions: Arc<MemoryExecutionStore>,
    pub followups: Arc<MemoryFollowUpStore>,
    pub contacts: Arc<MemoryContacts>,
    pub mail: Arc<RecordingTransport>,
}

impl TestEngine {
    pub fn new() -> Self {
        Self::build(test_config(), |handlers| handlers)
    }

    /// `customize` may override standard handlers before the registry is built.
    pub fn build(
        config: EngineConfig,
        customize: impl FnOnce(ActionRegistryBuilder) -> ActionRegistryBuilder,
    ) -> Self {
        init_test_logging();

        let workflows = Arc::new(MemoryWorkflowStore::default());
        let executions = Arc::new(MemoryExecutionStore::default());
        let followups = Arc::new(MemoryFollowUpStore::default());
        let contacts = Arc::new(MemoryContacts::default());
        let mail = Arc::new(RecordingTransport::default());

        let registry = customize(
            standard_handlers(contacts.clone(), mail.clone(), &config)
                .expect("Failed to build standard handlers"),
        )
        .build()
        .expect("Registry incomplete");

        let engine = WorkflowEngine::new(
            workflows.clone(),
            executions.clone(),
            followups.clone(),
            contacts.clone(),
            registry,
            config,
        );

        Self {
            engine,
            owner_id: Uuid::new_v4(),
            workflows,
            executions,
            followups,
            contacts,
            mail,
        }
    }
}

