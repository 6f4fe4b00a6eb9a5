use chrono::{Duration, Utc};
use relay_shared::{FollowUpStatus, RunStatus};
use serde_json::json;
use uuid::Uuid;

use crate::tests::fixtures::ContactFixture;
use crate::tests::helpers::TestEngine;
use crate::workflows::actions::ActionKind;
use crate::workflows::conditions::presets;
use crate::workflows::definition::{Workflow, WorkflowInput};
use crate::workflows::triggers::{EmailTriggerConfig, NoReplyConfig, TriggerEvent, TriggerSpec};

fn no_reply(days: u32) -> TriggerSpec {
    TriggerSpec::NoReplyAfterDays(NoReplyConfig { days })
}

impl TestEngine {
    async fn nudge_workflow(&self, name: &str, days: u32) -> Workflow {
        self.engine
            .create_workflow(
                self.owner_id,
                WorkflowInput::new(name)
                    .trigger(no_reply(days))
                    .action(ActionKind::add_tag("needs-nudge"))
                    .action(ActionKind::create_task("Nudge {{contact_name}}", 0, Default::default())),
            )
            .await
            .unwrap()
    }

    fn contact(&self) -> relay_shared::Contact {
        let contact = ContactFixture::owned_by(self.owner_id).build();
        self.contacts.insert_contact(contact.clone());
        contact
    }
}

#[tokio::test]
async fn test_sent_email_queues_check_and_reply_cancels_it() {
    let t = TestEngine::new();
    let contact = t.contact();
    let workflow = t.nudge_workflow("Nudge after 3 days", 3).await;
    t.engine
        .create_workflow(
            t.owner_id,
            WorkflowInput::new("Opens")
                .trigger(TriggerSpec::EmailOpened(EmailTriggerConfig::default()))
                .action(ActionKind::add_tag("opened")),
        )
        .await
        .unwrap();

    let sent = TriggerEvent::email_sent(t.owner_id, 55, &contact.email.clone().unwrap(), Some(contact.id));
    let sent_at = sent.timestamp;
    t.engine.process_event(sent).await;

    let queued = t.engine.followups_for_email(t.owner_id, "55").await.unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].workflow_id, workflow.id);
    assert_eq!(queued[0].contact_id, Some(contact.id));
    assert_eq!(queued[0].status, FollowUpStatus::Pending);
    assert_eq!(queued[0].scheduled_for, sent_at + Duration::days(3));

    t.engine
        .process_event(TriggerEvent::email_replied(t.owner_id, 55, 56, Some(contact.id)))
        .await;

    let settled = t.engine.followups_for_email(t.owner_id, "55").await.unwrap();
    assert_eq!(settled[0].status, FollowUpStatus::Cancelled);
    assert_eq!(settled[0].result, Some(json!({"reason": "Reply received"})));

    let outcome = t
        .engine
        .process_due_followups(t.owner_id, Utc::now() + Duration::days(4))
        .await
        .unwrap();
    assert_eq!(outcome.due, 0);
    assert!(t.executions.executions().is_empty());
}

#[tokio::test]
async fn test_due_check_runs_its_own_workflow_once() {
    let t = TestEngine::new();
    let contact = t.contact();
    let three_days = t.nudge_workflow("Nudge after 3 days", 3).await;
    let week = t.nudge_workflow("Nudge after a week", 7).await;

    t.engine
        .process_event(TriggerEvent::email_sent(t.owner_id, 77, "jo@acme.io", Some(contact.id)))
        .await;
    assert_eq!(t.followups.all().len(), 2);

    let early = t
        .engine
        .process_due_followups(t.owner_id, Utc::now() + Duration::days(1))
        .await
        .unwrap();
    assert_eq!(early.due, 0);

    let outcome = t
        .engine
        .process_due_followups(t.owner_id, Utc::now() + Duration::days(3) + Duration::minutes(1))
        .await
        .unwrap();
    assert_eq!(outcome.due, 1);
    assert_eq!(outcome.executions.len(), 1);
    assert!(outcome.failures.is_empty());

    let report = t
        .engine
        .execution_detail(t.owner_id, outcome.executions[0])
        .await
        .unwrap();
    assert_eq!(report.execution.workflow_id, three_days.id);
    assert_eq!(report.execution.status, RunStatus::Completed);
    assert_eq!(report.execution.trigger_type, "no_reply_after_days");
    assert_eq!(report.execution.trigger_event_id.as_deref(), Some("77"));
    assert_eq!(t.contacts.contact(contact.id).unwrap().tags, vec!["needs-nudge"]);
    assert_eq!(t.contacts.tasks()[0].title, format!("Nudge {}", contact.display_name()));

    let followups = t.engine.followups_for_email(t.owner_id, "77").await.unwrap();
    let executed = followups.iter().find(|f| f.workflow_id == three_days.id).unwrap();
    assert_eq!(executed.status, FollowUpStatus::Executed);
    assert_eq!(executed.execution_id, Some(report.execution.id));
    let waiting = followups.iter().find(|f| f.workflow_id == week.id).unwrap();
    assert_eq!(waiting.status, FollowUpStatus::Pending);

    let again = t
        .engine
        .process_due_followups(t.owner_id, Utc::now() + Duration::days(3) + Duration::minutes(1))
        .await
        .unwrap();
    assert_eq!(again.due, 0);
    assert_eq!(t.executions.executions().len(), 1);
}

#[tokio::test]
async fn test_checks_for_paused_deleted_or_gated_workflows_are_cancelled() {
    let t = TestEngine::new();
    let contact = t.contact();
    let paused = t.nudge_workflow("Paused", 2).await;
    let deleted = t.nudge_workflow("Deleted", 2).await;
    t.engine
        .create_workflow(
            t.owner_id,
            WorkflowInput::new("Customers only")
                .trigger(no_reply(2))
                .condition(presets::lead_stage("customer"))
                .action(ActionKind::add_tag("needs-nudge")),
        )
        .await
        .unwrap();

    t.engine
        .process_event(TriggerEvent::email_sent(t.owner_id, 9, "jo@acme.io", Some(contact.id)))
        .await;
    assert_eq!(t.followups.all().len(), 3);

    t.engine.set_active(t.owner_id, paused.id, false).await.unwrap();
    t.engine.delete_workflow(t.owner_id, deleted.id).await.unwrap();

    let outcome = t
        .engine
        .process_all_due_followups(Utc::now() + Duration::days(2) + Duration::minutes(1))
        .await
        .unwrap();

    assert_eq!(outcome.due, 3);
    assert_eq!(outcome.cancelled, 3);
    assert!(outcome.executions.is_empty());
    assert!(t.executions.executions().is_empty());
    assert!(t.contacts.contact(contact.id).unwrap().tags.is_empty());

    let reasons: Vec<String> = t
        .followups
        .all()
        .iter()
        .map(|f| f.result.as_ref().unwrap()["reason"].as_str().unwrap().to_string())
        .collect();
    assert!(reasons.contains(&"Workflow deleted".to_string()));
    assert!(reasons.contains(&"Conditions not met".to_string()));
    assert!(reasons.contains(&"Workflow no longer waits for replies".to_string()));
}

#[tokio::test]
async fn test_sent_event_without_email_id_queues_nothing() {
    let t = TestEngine::new();
    t.nudge_workflow("Nudge", 3).await;

    let mut sent = TriggerEvent::email_sent(t.owner_id, 1, "jo@acme.io", None);
    sent.payload = json!({"email_data": {"to_emails": ["jo@acme.io"]}});
    t.engine.process_event(sent).await;

    assert!(t.followups.all().is_empty());
    assert!(
        t.engine
            .followups_for_email(Uuid::new_v4(), "1")
            .await
            .unwrap()
            .is_empty()
    );
}
