use relay_shared::{ContactField, RunStatus};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::tests::fixtures::{raw_action, template_for, ContactFixture};
use crate::tests::helpers::{init_test_logging, test_config};
use crate::tests::memory::{MemoryContacts, RecordingTransport};
use crate::workflows::actions::{ActionKind, ActionResult, MAX_DUE_IN_DAYS};
use crate::workflows::context::EventContext;
use crate::workflows::dispatcher::{ActionDispatcher, RunContext};
use crate::workflows::handlers::standard_handlers;
use crate::workflows::triggers::TriggerType;

struct Handlers {
    dispatcher: ActionDispatcher,
    contacts: Arc<MemoryContacts>,
    mail: Arc<RecordingTransport>,
}

impl Handlers {
    fn new() -> Self {
        init_test_logging();
        let contacts = Arc::new(MemoryContacts::default());
        let mail = Arc::new(RecordingTransport::default());
        let registry = standard_handlers(contacts.clone(), mail.clone(), &test_config())
            .unwrap()
            .build()
            .unwrap();

        Self {
            dispatcher: ActionDispatcher::new(registry, &test_config()),
            contacts,
            mail,
        }
    }

    async fn run(&self, kind: ActionKind, run: &RunContext) -> ActionResult {
        let action = raw_action(run.workflow_id, 0, kind.action_type().as_str(), kind.config_value());
        self.dispatcher.dispatch(&action, run).await
    }
}

fn run_for(owner_id: Uuid, payload: Value) -> RunContext {
    RunContext {
        owner_id,
        workflow_id: Uuid::new_v4(),
        execution_id: Uuid::new_v4(),
        trigger_type: TriggerType::EmailReceived,
        context: EventContext::from_payload(&payload),
        payload,
        outputs: Vec::new(),
    }
}

#[tokio::test]
async fn test_contact_action_without_contact_fails() {
    let h = Handlers::new();
    let result = h.run(ActionKind::add_tag("vip"), &run_for(Uuid::new_v4(), json!({}))).await;

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.error_code.as_deref(), Some("ACTION_ERROR"));
    assert!(result.error.unwrap().contains("contact_id"));
}

#[tokio::test]
async fn test_contact_of_another_owner_is_not_found() {
    let h = Handlers::new();
    let contact = ContactFixture::default().build();
    h.contacts.insert_contact(contact.clone());

    let result = h
        .run(
            ActionKind::add_tag("vip"),
            &run_for(Uuid::new_v4(), json!({"contact_id": contact.id})),
        )
        .await;

    assert_eq!(result.error_code.as_deref(), Some("NOT_FOUND"));
    assert!(h.contacts.contact(contact.id).unwrap().tags.is_empty());
}

#[tokio::test]
async fn test_tags_and_fields() {
    let h = Handlers::new();
    let contact = ContactFixture::default().build();
    h.contacts.insert_contact(contact.clone());
    let run = run_for(contact.owner_id, json!({"contact_id": contact.id}));

    let added = h.run(ActionKind::add_tag("vip"), &run).await;
    assert!(added.is_success());
    assert_eq!(added.output.unwrap()["tags"], json!(["vip"]));

    // Adding twice keeps one copy
    h.run(ActionKind::add_tag("vip"), &run).await;
    assert_eq!(h.contacts.contact(contact.id).unwrap().tags, vec!["vip"]);

    let removed = h.run(ActionKind::remove_tag("vip"), &run).await;
    assert_eq!(removed.output.unwrap()["tags"], json!([]));

    let field = ActionKind::parse("update_contact_field", &json!({"field": "company", "value": "Initech"})).unwrap();
    assert!(h.run(field, &run).await.is_success());
    assert_eq!(h.contacts.fields(), vec![(contact.id, ContactField::Company, "Initech".to_string())]);
    assert_eq!(h.contacts.contact(contact.id).unwrap().company.as_deref(), Some("Initech"));
}

#[tokio::test]
async fn test_mark_as_engaged_promotes_early_stages_only() {
    let h = Handlers::new();
    let fresh = ContactFixture::default().build();
    let mut customer = ContactFixture::owned_by(fresh.owner_id).build();
    customer.lead_stage = "customer".to_string();
    h.contacts.insert_contact(fresh.clone());
    h.contacts.insert_contact(customer.clone());

    let engaged = ActionKind::parse("mark_as_engaged", &json!({})).unwrap();

    let result = h
        .run(engaged.clone(), &run_for(fresh.owner_id, json!({"contact_id": fresh.id})))
        .await;
    let output = result.output.unwrap();
    assert_eq!(output["lead_stage"], "engaged");
    assert_eq!(output["engagement_score"], fresh.engagement_score + 10);

    h.run(engaged, &run_for(customer.owner_id, json!({"contact_id": customer.id})))
        .await;
    let customer_after = h.contacts.contact(customer.id).unwrap();
    assert_eq!(customer_after.lead_stage, "customer");
    assert_eq!(customer_after.engagement_score, customer.engagement_score + 10);
}

#[tokio::test]
async fn test_inline_email_goes_to_event_sender_without_contact() {
    let h = Handlers::new();
    let run = run_for(
        Uuid::new_v4(),
        json!({"email_data": {"from_email": "jo@acme.io", "subject": "Pricing"}}),
    );

    let result = h
        .run(ActionKind::send_email("Re: {{email_subject}}", "Thanks!\nWe will be in touch."), &run)
        .await;

    assert!(result.is_success(), "{:?}", result.error);
    let sent = h.mail.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to_email, "jo@acme.io");
    assert_eq!(sent[0].subject, "Re: Pricing");
    assert!(sent[0].html_body.contains("Thanks!<br>We will be in touch."));
    assert_eq!(sent[0].text_body.as_deref(), Some("Thanks!\nWe will be in touch."));
}

#[tokio::test]
async fn test_template_email_renders_contact_fields_and_touches_contact() {
    let h = Handlers::new();
    let contact = ContactFixture::default().build();
    h.contacts.insert_contact(contact.clone());
    let template = template_for(contact.owner_id, "Hello {{contact_name}}", "<p>Hi {{contact_name}} at {{company}}</p>");
    h.contacts.insert_template(template.clone());

    let mut run = run_for(contact.owner_id, json!({"contact_id": contact.id}));
    run.context.enrich_with_contact(&contact, chrono::Utc::now());

    let result = h.run(ActionKind::send_template(template.id), &run).await;
    assert!(result.is_success(), "{:?}", result.error);

    let sent = h.mail.sent();
    assert_eq!(sent[0].to_email, contact.email.clone().unwrap());
    assert_eq!(sent[0].subject, format!("Hello {}", contact.display_name()));
    assert_eq!(
        sent[0].html_body,
        format!("<p>Hi {} at {}</p>", contact.display_name(), contact.company.clone().unwrap())
    );
    assert_eq!(h.contacts.touched(), vec![contact.id]);
}

#[tokio::test]
async fn test_inactive_template_and_missing_recipient_fail() {
    let h = Handlers::new();
    let owner_id = Uuid::new_v4();
    let mut template = template_for(owner_id, "Hi", "<p>Hi</p>");
    template.is_active = false;
    h.contacts.insert_template(template.clone());

    let inactive = h
        .run(
            ActionKind::send_template(template.id),
            &run_for(owner_id, json!({"from_email": "jo@acme.io"})),
        )
        .await;
    assert_eq!(inactive.error_code.as_deref(), Some("ACTION_ERROR"));
    assert!(inactive.error.unwrap().contains("inactive"));

    let nobody = h.run(ActionKind::send_email("Hi", "Body"), &run_for(owner_id, json!({}))).await;
    assert_eq!(nobody.error_code.as_deref(), Some("ACTION_ERROR"));
    assert!(h.mail.sent().is_empty());
}

#[tokio::test]
async fn test_task_and_notification_records() {
    let h = Handlers::new();
    let contact = ContactFixture::default().build();
    let run = run_for(contact.owner_id, json!({"contact_id": contact.id}));

    let task = ActionKind::parse("create_task", &json!({"title": "Call back", "priority": "urgent"})).unwrap();
    let result = h.run(task, &run).await;
    assert!(result.is_success());
    assert_eq!(result.output.unwrap()["priority"], "urgent");

    let tasks = h.contacts.tasks();
    assert_eq!(tasks[0].contact_id, Some(contact.id));
    assert_eq!(tasks[0].source_execution_id, Some(run.execution_id));
    let due_in = tasks[0].due_at - chrono::Utc::now();
    assert!(due_in > chrono::Duration::hours(23) && due_in <= chrono::Duration::days(1));

    let teammate = Uuid::new_v4();
    let notify = ActionKind::parse("send_notification", &json!({"user_id": teammate, "message": "Hot lead"})).unwrap();
    assert!(h.run(notify, &run).await.is_success());
    let notifications = h.contacts.notifications();
    assert_eq!(notifications[0].user_id, teammate);
    assert_eq!(notifications[0].execution_id, run.execution_id);
}

#[tokio::test]
async fn test_far_off_due_date_fails_without_creating_task() {
    let h = Handlers::new();
    let contact = ContactFixture::default().build();
    let run = run_for(contact.owner_id, json!({"contact_id": contact.id}));

    // Written by an older build that had no upper bound
    let action = raw_action(
        run.workflow_id,
        0,
        "create_task",
        json!({"title": "Someday", "due_in_days": 100_000_000}),
    );
    let result = h.dispatcher.dispatch(&action, &run).await;

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.error_code.as_deref(), Some("ACTION_ERROR"));
    assert!(result.error.unwrap().contains("out of range"));
    assert!(h.contacts.tasks().is_empty());

    let last_day = raw_action(
        run.workflow_id,
        1,
        "create_task",
        json!({"title": "Renewal", "due_in_days": MAX_DUE_IN_DAYS}),
    );
    assert!(h.dispatcher.dispatch(&last_day, &run).await.is_success());
}

#[tokio::test]
async fn test_wait_pauses_within_widened_timeout() {
    let h = Handlers::new();
    let short_timeout = {
        let registry = standard_handlers(h.contacts.clone(), h.mail.clone(), &test_config())
            .unwrap()
            .build()
            .unwrap();
        ActionDispatcher::new(
            registry,
            &EngineConfig {
                action_timeout: Duration::from_millis(200),
                ..test_config()
            },
        )
    };

    let run = run_for(Uuid::new_v4(), json!({}));
    let kind = ActionKind::wait(1);
    let action = raw_action(run.workflow_id, 0, "wait", kind.config_value());

    let result = short_timeout.dispatch(&action, &run).await;
    assert!(result.is_success(), "{:?}", result.error);
    assert_eq!(result.output.unwrap()["waited_seconds"], 1);
    assert!(result.duration_ms >= 1000);
}
