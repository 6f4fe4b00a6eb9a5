use async_trait::async_trait;
use relay_shared::{RunStatus, TaskPriority};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{WorkflowError, WorkflowResult};
use crate::tests::fixtures::{raw_workflow, row, ContactFixture};
use crate::tests::helpers::{test_config, TestEngine};
use crate::workflows::actions::{ActionKind, ActionType};
use crate::workflows::conditions::{presets, Condition};
use crate::workflows::definition::{Workflow, WorkflowInput};
use crate::workflows::dispatcher::RunContext;
use crate::workflows::engine::ManualRunOptions;
use crate::workflows::handlers::ActionHandler;
use crate::workflows::triggers::{
    EmailClickedConfig, EmailTriggerConfig, EventSource, TriggerEvent, TriggerSpec, TriggerType,
};

/// Stands in for a CRM that rejects every tag write.
struct BrokenTagHandler;

#[async_trait]
impl ActionHandler for BrokenTagHandler {
    fn action_type(&self) -> ActionType {
        ActionType::AddTag
    }

    async fn execute(&self, _action: &ActionKind, _run: &RunContext) -> WorkflowResult<Value> {
        Err(WorkflowError::action("tag service unavailable"))
    }
}

fn opened_on(integration: &str) -> TriggerSpec {
    TriggerSpec::EmailOpened(EmailTriggerConfig {
        integration: Some(integration.to_string()),
    })
}

fn opened_any() -> TriggerSpec {
    TriggerSpec::EmailOpened(EmailTriggerConfig::default())
}

impl TestEngine {
    async fn create(&self, input: WorkflowInput) -> Workflow {
        self.engine.create_workflow(self.owner_id, input).await.unwrap()
    }

    fn seed_contact(&self) -> relay_shared::Contact {
        let contact = ContactFixture::owned_by(self.owner_id).build();
        self.contacts.insert_contact(contact.clone());
        contact
    }

    fn opened(&self, contact_id: Uuid, integration: &str) -> TriggerEvent {
        TriggerEvent::email_opened(self.owner_id, 42, Some(contact_id), Some(integration))
    }
}

#[tokio::test]
async fn test_matching_event_runs_actions_in_order() {
    let t = TestEngine::new();
    let contact = t.seed_contact();
    let workflow = t
        .create(
            WorkflowInput::new("Opened on I1")
                .trigger(opened_on("I1"))
                .action(ActionKind::add_tag("engaged-lead"))
                .action(ActionKind::create_task("Follow up", 2, TaskPriority::High)),
        )
        .await;

    let outcome = t.engine.process_event(t.opened(contact.id, "I1")).await;

    assert_eq!(outcome.matched, 1);
    assert_eq!(outcome.executions.len(), 1);
    assert!(outcome.failures.is_empty());

    let report = t
        .engine
        .execution_detail(t.owner_id, outcome.executions[0])
        .await
        .unwrap();
    assert_eq!(report.execution.workflow_id, workflow.id);
    assert_eq!(report.execution.status, RunStatus::Completed);
    assert_eq!(report.execution.actions_total, 2);
    assert_eq!(report.execution.actions_executed, 2);
    assert_eq!(report.execution.trigger_type, "email_opened");

    let types: Vec<&str> = report.action_logs.iter().map(|l| l.action_type.as_str()).collect();
    assert_eq!(types, vec!["add_tag", "create_task"]);
    assert!(report.action_logs.iter().all(|l| l.status == RunStatus::Completed));

    assert!(t.contacts.contact(contact.id).unwrap().tags.contains(&"engaged-lead".to_string()));
    assert_eq!(t.contacts.tasks()[0].title, "Follow up");
}

#[tokio::test]
async fn test_integration_filter_excludes_other_sources() {
    let t = TestEngine::new();
    let contact = t.seed_contact();
    t.create(
        WorkflowInput::new("Opened on I1")
            .trigger(opened_on("I1"))
            .action(ActionKind::add_tag("i1")),
    )
    .await;

    let outcome = t.engine.process_event(t.opened(contact.id, "I2")).await;

    assert_eq!(outcome.matched, 0);
    assert!(t.executions.executions().is_empty());
}

#[tokio::test]
async fn test_failed_action_does_not_stop_the_run() {
    let t = TestEngine::build(test_config(), |handlers| handlers.register(BrokenTagHandler));
    let contact = t.seed_contact();
    t.create(
        WorkflowInput::new("Tag then task")
            .trigger(opened_any())
            .action(ActionKind::add_tag("engaged-lead"))
            .action(ActionKind::create_task("Follow up", 1, TaskPriority::Medium)),
    )
    .await;

    let outcome = t.engine.process_event(t.opened(contact.id, "I1")).await;
    let report = t
        .engine
        .execution_detail(t.owner_id, outcome.executions[0])
        .await
        .unwrap();

    assert_eq!(report.execution.status, RunStatus::Completed);
    assert_eq!(report.execution.actions_executed, 2);
    assert_eq!(report.action_logs[0].status, RunStatus::Failed);
    assert_eq!(
        report.action_logs[0].error_message.as_deref(),
        Some("tag service unavailable")
    );
    assert_eq!(report.action_logs[0].result.as_ref().unwrap()["error_code"], "ACTION_ERROR");
    assert_eq!(report.action_logs[1].status, RunStatus::Completed);
    assert_eq!(t.contacts.tasks().len(), 1);
}

#[tokio::test]
async fn test_condition_on_missing_field_prevents_execution() {
    let t = TestEngine::new();
    t.create(
        WorkflowInput::new("Pricing clicks")
            .trigger(TriggerSpec::EmailClicked(EmailClickedConfig::default()))
            .condition(Condition::contains("link_url", "/pricing"))
            .action(ActionKind::notify("Someone looked at pricing")),
    )
    .await;

    let event = TriggerEvent::new(
        t.owner_id,
        TriggerType::EmailClicked,
        json!({"email_id": 7}),
        EventSource::Tracking,
    );
    let outcome = t.engine.process_event(event).await;

    assert_eq!(outcome.matched, 1);
    assert_eq!(outcome.skipped, 1);
    assert!(outcome.executions.is_empty());
    assert!(t.executions.executions().is_empty());

    let clicked = TriggerEvent::email_clicked(t.owner_id, 7, None, "https://acme.io/pricing");
    let outcome = t.engine.process_event(clicked).await;
    assert_eq!(outcome.executions.len(), 1);
    assert_eq!(t.contacts.notifications().len(), 1);
}

#[tokio::test]
async fn test_unknown_stored_action_fails_alone_on_manual_run() {
    let t = TestEngine::new();
    let contact = t.seed_contact();
    let legacy = raw_workflow(
        t.owner_id,
        opened_any(),
        vec![
            ("launch_rocket", json!({"target": "moon"})),
            row(&ActionKind::add_tag("survivor")),
        ],
    );
    t.workflows.insert_raw(legacy.clone());

    let outcome = t
        .engine
        .execute_manually(
            t.owner_id,
            legacy.id,
            json!({"contact_id": contact.id}),
            ManualRunOptions::default(),
        )
        .await
        .unwrap();

    let report = outcome.report.unwrap();
    assert_eq!(report.execution.status, RunStatus::Completed);
    assert_eq!(report.execution.actions_executed, 2);

    let first = &report.action_logs[0];
    assert_eq!(first.status, RunStatus::Failed);
    assert_eq!(first.action_type, "launch_rocket");
    assert_eq!(first.result.as_ref().unwrap()["error_code"], "DEFINITION_ERROR");
    assert_eq!(report.action_logs[1].status, RunStatus::Completed);
    assert_eq!(t.contacts.contact(contact.id).unwrap().tags, vec!["survivor"]);
}

#[tokio::test]
async fn test_out_of_range_stored_configs_fail_alone_and_run_finishes() {
    let t = TestEngine::new();
    let contact = t.seed_contact();
    let legacy = raw_workflow(
        t.owner_id,
        opened_any(),
        vec![
            ("wait", json!({"seconds": u64::MAX})),
            ("create_task", json!({"title": "Someday", "due_in_days": 100_000_000})),
            row(&ActionKind::add_tag("still-here")),
        ],
    );
    t.workflows.insert_raw(legacy.clone());

    let outcome = t
        .engine
        .process_event(TriggerEvent::email_opened(t.owner_id, 7, Some(contact.id), None))
        .await;
    assert_eq!(outcome.executions.len(), 1);
    assert!(outcome.failures.is_empty());

    let report = t
        .engine
        .execution_detail(t.owner_id, outcome.executions[0])
        .await
        .unwrap();
    assert_eq!(report.execution.status, RunStatus::Completed);
    assert_eq!(report.execution.actions_executed, 3);

    let statuses: Vec<RunStatus> = report.action_logs.iter().map(|l| l.status).collect();
    assert_eq!(statuses, vec![RunStatus::Failed, RunStatus::Failed, RunStatus::Completed]);
    assert_eq!(report.action_logs[0].result.as_ref().unwrap()["error_code"], "DEFINITION_ERROR");
    assert_eq!(report.action_logs[1].result.as_ref().unwrap()["error_code"], "ACTION_ERROR");
    assert!(report.action_logs.iter().all(|l| l.completed_at.is_some()));
    assert!(t.contacts.tasks().is_empty());
}

#[tokio::test]
async fn test_actions_follow_execution_order_not_input_order() {
    let t = TestEngine::new();
    let contact = t.seed_contact();
    let mut input = WorkflowInput::new("Reordered")
        .trigger(opened_any())
        .action(ActionKind::notify("third"))
        .action(ActionKind::add_tag("first"))
        .action(ActionKind::update_lead_stage("qualified"));
    input.actions[0].execution_order = Some(30);
    input.actions[1].execution_order = Some(10);
    input.actions[2].execution_order = Some(20);
    t.create(input).await;

    t.engine.process_event(t.opened(contact.id, "I1")).await;

    let opened: Vec<String> = t
        .executions
        .journal()
        .into_iter()
        .filter(|e| e.starts_with("create_action_log"))
        .collect();
    assert_eq!(
        opened,
        vec![
            "create_action_log:0:add_tag",
            "create_action_log:1:update_lead_stage",
            "create_action_log:2:send_notification",
        ]
    );
}

#[tokio::test]
async fn test_action_log_keeps_config_snapshot_after_edit() {
    let t = TestEngine::new();
    let contact = t.seed_contact();
    let workflow = t
        .create(
            WorkflowInput::new("Tagger")
                .trigger(opened_any())
                .action(ActionKind::add_tag("v1")),
        )
        .await;

    let first = t.engine.process_event(t.opened(contact.id, "I1")).await;

    t.engine
        .update_workflow(
            t.owner_id,
            workflow.id,
            WorkflowInput::new("Tagger")
                .trigger(opened_any())
                .action(ActionKind::add_tag("v2")),
        )
        .await
        .unwrap();
    t.engine.delete_workflow(t.owner_id, workflow.id).await.unwrap();

    let report = t
        .engine
        .execution_detail(t.owner_id, first.executions[0])
        .await
        .unwrap();
    assert_eq!(report.action_logs[0].action_config, json!({"tag": "v1"}));
    assert_eq!(report.execution.workflow_name, "Tagger");

    let history = t.engine.execution_history(t.owner_id, Some(workflow.id), 50).await.unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn test_templates_render_into_logged_config() {
    let t = TestEngine::new();
    let contact = t.seed_contact();
    t.create(
        WorkflowInput::new("Task per reply")
            .trigger(TriggerSpec::parse("email_received", &json!({})).unwrap())
            .action(ActionKind::create_task("Reply to {{email_subject}}", 1, TaskPriority::High)),
    )
    .await;

    let event = TriggerEvent::email_received(t.owner_id, 9, "jo@acme.io", "Renewal", Some(contact.id));
    let outcome = t.engine.process_event(event).await;
    let report = t
        .engine
        .execution_detail(t.owner_id, outcome.executions[0])
        .await
        .unwrap();

    // The log keeps the stored definition; the handler saw the rendered one
    assert_eq!(report.action_logs[0].action_config["title"], "Reply to {{email_subject}}");
    assert_eq!(t.contacts.tasks()[0].title, "Reply to Renewal");
    assert_eq!(report.execution.trigger_event_id.as_deref(), Some("9"));
}

#[tokio::test]
async fn test_events_are_owner_scoped() {
    let t = TestEngine::new();
    let contact = t.seed_contact();
    let workflow = t
        .create(
            WorkflowInput::new("Mine")
                .trigger(opened_any())
                .action(ActionKind::add_tag("mine")),
        )
        .await;

    let stranger = Uuid::new_v4();
    let outcome = t
        .engine
        .process_event(TriggerEvent::email_opened(stranger, 1, Some(contact.id), None))
        .await;
    assert_eq!(outcome.matched, 0);

    let err = t.engine.get_workflow(stranger, workflow.id).await.unwrap_err();
    assert_eq!(err.error_code(), "NOT_FOUND");
    let err = t
        .engine
        .execute_manually(stranger, workflow.id, json!({}), ManualRunOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "NOT_FOUND");
}

#[tokio::test]
async fn test_inactive_workflows_are_skipped_but_run_manually() {
    let t = TestEngine::new();
    let contact = t.seed_contact();
    let workflow = t
        .create(
            WorkflowInput::new("Paused")
                .trigger(opened_any())
                .action(ActionKind::add_tag("paused"))
                .inactive(),
        )
        .await;

    let outcome = t.engine.process_event(t.opened(contact.id, "I1")).await;
    assert_eq!(outcome.matched, 0);

    let manual = t
        .engine
        .execute_manually(
            t.owner_id,
            workflow.id,
            json!({"contact_id": contact.id}),
            ManualRunOptions::default(),
        )
        .await
        .unwrap();
    assert!(manual.report.unwrap().succeeded());
    assert_eq!(manual.trigger_type, TriggerType::EmailOpened);

    t.engine.set_active(t.owner_id, workflow.id, true).await.unwrap();
    let outcome = t.engine.process_event(t.opened(contact.id, "I1")).await;
    assert_eq!(outcome.executions.len(), 1);
}

#[tokio::test]
async fn test_manual_run_reports_conditions_and_enforces_on_request() {
    let t = TestEngine::new();
    let contact = t.seed_contact();
    let workflow = t
        .create(
            WorkflowInput::new("Qualified only")
                .trigger(opened_any())
                .condition(presets::lead_stage("qualified"))
                .action(ActionKind::add_tag("hot")),
        )
        .await;
    let data = json!({"contact_id": contact.id});

    let bypassed = t
        .engine
        .execute_manually(t.owner_id, workflow.id, data.clone(), ManualRunOptions::default())
        .await
        .unwrap();
    assert!(!bypassed.conditions_passed);
    assert!(!bypassed.conditions[0].passed);
    assert!(bypassed.report.is_some());

    let enforced = t
        .engine
        .execute_manually(
            t.owner_id,
            workflow.id,
            data,
            ManualRunOptions {
                evaluate_conditions: Some(true),
            },
        )
        .await
        .unwrap();
    assert!(enforced.report.is_none());
    assert_eq!(t.executions.executions().len(), 1);
}

#[tokio::test]
async fn test_conditions_see_contact_before_engagement_update() {
    let t = TestEngine::new();
    let contact = t.seed_contact();
    t.create(
        WorkflowInput::new("New leads who open")
            .trigger(opened_any())
            .condition(presets::lead_stage("new"))
            .action(ActionKind::notify("A new lead opened {{contact_name}}")),
    )
    .await;

    let outcome = t.engine.process_event(t.opened(contact.id, "I1")).await;
    assert_eq!(outcome.executions.len(), 1);

    let after = t.contacts.contact(contact.id).unwrap();
    assert_eq!(after.lead_stage, "engaged");
    assert_eq!(after.engagement_score, contact.engagement_score + 10);
    assert_eq!(
        t.contacts.notifications()[0].message,
        format!("A new lead opened {}", contact.display_name())
    );

    // The second open finds an engaged lead
    let outcome = t.engine.process_event(t.opened(contact.id, "I1")).await;
    assert_eq!(outcome.skipped, 1);
}

#[tokio::test]
async fn test_received_mail_touches_contact_and_quiet_condition() {
    let t = TestEngine::new();
    let contact = ContactFixture::owned_by(t.owner_id)
        .last_contacted_days_ago(10)
        .build();
    t.contacts.insert_contact(contact.clone());
    t.create(
        WorkflowInput::new("Long silence")
            .trigger(TriggerSpec::parse("email_received", &json!({})).unwrap())
            .condition(presets::quiet_for_days(7))
            .action(ActionKind::add_tag("revived")),
    )
    .await;

    let event = TriggerEvent::email_received(t.owner_id, 3, "jo@acme.io", "Back again", Some(contact.id));
    let outcome = t.engine.process_event(event).await;

    assert_eq!(outcome.executions.len(), 1);
    assert_eq!(t.contacts.touched(), vec![contact.id]);

    // Now recently contacted, so the same mail no longer qualifies
    let event = TriggerEvent::email_received(t.owner_id, 4, "jo@acme.io", "Again", Some(contact.id));
    assert_eq!(t.engine.process_event(event).await.skipped, 1);
}

#[tokio::test]
async fn test_workflows_for_one_event_run_independently() {
    let t = TestEngine::build(test_config(), |handlers| handlers.register(BrokenTagHandler));
    let contact = t.seed_contact();
    t.create(
        WorkflowInput::new("Broken tagger")
            .trigger(opened_any())
            .action(ActionKind::add_tag("x")),
    )
    .await;
    t.create(
        WorkflowInput::new("Task maker")
            .trigger(opened_any())
            .action(ActionKind::create_task("Call", 1, TaskPriority::Low)),
    )
    .await;
    t.create(
        WorkflowInput::new("Clicks only")
            .trigger(TriggerSpec::EmailClicked(EmailClickedConfig::default()))
            .action(ActionKind::add_tag("clicked")),
    )
    .await;

    let outcome = t.engine.process_event(t.opened(contact.id, "I1")).await;

    assert_eq!(outcome.matched, 2);
    assert_eq!(outcome.executions.len(), 2);
    assert!(outcome.failures.is_empty());
    assert_eq!(t.contacts.tasks().len(), 1);
    assert!(
        t.executions
            .executions()
            .iter()
            .all(|e| e.status == RunStatus::Completed)
    );
}

#[tokio::test]
async fn test_execution_history_is_newest_first_and_limited() {
    let t = TestEngine::new();
    let contact = t.seed_contact();
    let workflow = t
        .create(
            WorkflowInput::new("Counter")
                .trigger(opened_any())
                .action(ActionKind::add_tag("seen")),
        )
        .await;

    for _ in 0..3 {
        t.engine.process_event(t.opened(contact.id, "I1")).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let all = t.engine.execution_history(t.owner_id, Some(workflow.id), 50).await.unwrap();
    assert_eq!(all.len(), 3);
    assert!(all.windows(2).all(|w| w[0].started_at >= w[1].started_at));

    let capped = t.engine.execution_history(t.owner_id, None, 2).await.unwrap();
    assert_eq!(capped.len(), 2);
    assert_eq!(capped[0].id, all[0].id);

    let empty = t.engine.execution_history(Uuid::new_v4(), None, 0).await.unwrap();
    assert!(empty.is_empty());
}
