//! Access to the CRM tables workflow actions touch.
//!
//! The engine does not own these tables; it only reads and updates the
//! columns below, always scoped by `owner_id`.

use async_trait::async_trait;
use relay_shared::{Contact, ContactField, EmailTemplate, NewTask};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{WorkflowError, WorkflowResult};

/// Stage a contact moves to when it first shows engagement
pub const ENGAGED_STAGE: &str = "engaged";
/// Stages that are promoted to [`ENGAGED_STAGE`]
pub const PRE_ENGAGEMENT_STAGES: [&str; 2] = ["new", "contacted"];
pub const ENGAGEMENT_SCORE_STEP: i32 = 10;

#[async_trait]
pub trait ContactDirectory: Send + Sync {
    async fn find_contact(&self, owner_id: Uuid, contact_id: Uuid) -> WorkflowResult<Option<Contact>>;

    /// Returns the contact's tags after the change.
    async fn add_tag(&self, owner_id: Uuid, contact_id: Uuid, tag: &str) -> WorkflowResult<Vec<String>>;

    async fn remove_tag(&self, owner_id: Uuid, contact_id: Uuid, tag: &str) -> WorkflowResult<Vec<String>>;

    async fn update_field(
        &self,
        owner_id: Uuid,
        contact_id: Uuid,
        field: ContactField,
        value: &str,
    ) -> WorkflowResult<()>;

    async fn set_lead_stage(&self, owner_id: Uuid, contact_id: Uuid, stage: &str) -> WorkflowResult<()>;

    /// Promote an early-stage lead to engaged and bump its score.
    async fn mark_engaged(&self, owner_id: Uuid, contact_id: Uuid) -> WorkflowResult<Contact>;

    async fn touch_last_contacted(&self, owner_id: Uuid, contact_id: Uuid) -> WorkflowResult<()>;

    async fn create_task(&self, task: NewTask) -> WorkflowResult<Uuid>;

    async fn create_notification(
        &self,
        owner_id: Uuid,
        user_id: Uuid,
        message: &str,
        execution_id: Uuid,
    ) -> WorkflowResult<Uuid>;

    async fn find_template(&self, owner_id: Uuid, template_id: Uuid) -> WorkflowResult<Option<EmailTemplate>>;
}

fn contact_not_found(contact_id: Uuid) -> WorkflowError {
    WorkflowError::not_found(format!("Contact {}", contact_id))
}

/// [`ContactDirectory`] over the CRM's Postgres tables
#[derive(Clone)]
pub struct PgContactDirectory {
    pool: PgPool,
}

impl PgContactDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const CONTACT_COLUMNS: &str = "id, owner_id, email, first_name, last_name, company, lead_stage, \
     COALESCE(tags, ARRAY[]::text[]) AS tags, engagement_score, last_contacted_at";

#[async_trait]
impl ContactDirectory for PgContactDirectory {
    async fn find_contact(&self, owner_id: Uuid, contact_id: Uuid) -> WorkflowResult<Option<Contact>> {
        let contact = sqlx::query_as::<_, Contact>(&format!(
            "SELECT {} FROM contacts WHERE id = $1 AND owner_id = $2",
            CONTACT_COLUMNS
        ))
        .bind(contact_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(contact)
    }

    async fn add_tag(&self, owner_id: Uuid, contact_id: Uuid, tag: &str) -> WorkflowResult<Vec<String>> {
        let tags: Option<Vec<String>> = sqlx::query_scalar(
            r#"
            UPDATE contacts
            SET tags = CASE
                    WHEN $3 = ANY(COALESCE(tags, ARRAY[]::text[])) THEN tags
                    ELSE array_append(COALESCE(tags, ARRAY[]::text[]), $3)
                END,
                updated_at = NOW()
            WHERE id = $1 AND owner_id = $2
            RETURNING tags
            "#,
        )
        .bind(contact_id)
        .bind(owner_id)
        .bind(tag)
        .fetch_optional(&self.pool)
        .await?;

        tags.ok_or_else(|| contact_not_found(contact_id))
    }

    async fn remove_tag(&self, owner_id: Uuid, contact_id: Uuid, tag: &str) -> WorkflowResult<Vec<String>> {
        let tags: Option<Vec<String>> = sqlx::query_scalar(
            r#"
            UPDATE contacts
            SET tags = array_remove(COALESCE(tags, ARRAY[]::text[]), $3), updated_at = NOW()
            WHERE id = $1 AND owner_id = $2
            RETURNING tags
            "#,
        )
        .bind(contact_id)
        .bind(owner_id)
        .bind(tag)
        .fetch_optional(&self.pool)
        .await?;

        tags.ok_or_else(|| contact_not_found(contact_id))
    }

    async fn update_field(
        &self,
        owner_id: Uuid,
        contact_id: Uuid,
        field: ContactField,
        value: &str,
    ) -> WorkflowResult<()> {
        // Column names come from the closed ContactField set only.
        let sql = format!(
            "UPDATE contacts SET {} = $3, updated_at = NOW() WHERE id = $1 AND owner_id = $2",
            field.column()
        );
        let result = sqlx::query(&sql)
            .bind(contact_id)
            .bind(owner_id)
            .bind(value)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(contact_not_found(contact_id));
        }
        Ok(())
    }

    async fn set_lead_stage(&self, owner_id: Uuid, contact_id: Uuid, stage: &str) -> WorkflowResult<()> {
        let result = sqlx::query(
            "UPDATE contacts SET lead_stage = $3, updated_at = NOW() WHERE id = $1 AND owner_id = $2",
        )
        .bind(contact_id)
        .bind(owner_id)
        .bind(stage)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(contact_not_found(contact_id));
        }
        Ok(())
    }

    async fn mark_engaged(&self, owner_id: Uuid, contact_id: Uuid) -> WorkflowResult<Contact> {
        let contact = sqlx::query_as::<_, Contact>(&format!(
            r#"
            UPDATE contacts
            SET lead_stage = CASE WHEN lead_stage = ANY($3) THEN $4 ELSE lead_stage END,
                engagement_score = COALESCE(engagement_score, 0) + $5,
                updated_at = NOW()
            WHERE id = $1 AND owner_id = $2
            RETURNING {}
            "#,
            CONTACT_COLUMNS
        ))
        .bind(contact_id)
        .bind(owner_id)
        .bind(&PRE_ENGAGEMENT_STAGES[..])
        .bind(ENGAGED_STAGE)
        .bind(ENGAGEMENT_SCORE_STEP)
        .fetch_optional(&self.pool)
        .await?;

        contact.ok_or_else(|| contact_not_found(contact_id))
    }

    async fn touch_last_contacted(&self, owner_id: Uuid, contact_id: Uuid) -> WorkflowResult<()> {
        sqlx::query(
            "UPDATE contacts SET last_contacted_at = NOW(), updated_at = NOW() WHERE id = $1 AND owner_id = $2",
        )
        .bind(contact_id)
        .bind(owner_id)
        .execute(&self.pool)
        .await?;

        debug!("Touched last_contacted_at for contact {}", contact_id);
        Ok(())
    }

    async fn create_task(&self, task: NewTask) -> WorkflowResult<Uuid> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO tasks (
                id, owner_id, contact_id, title, description, priority,
                due_date, status, source_execution_id, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', $8, NOW())
            "#,
        )
        .bind(id)
        .bind(task.owner_id)
        .bind(task.contact_id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.priority.as_str())
        .bind(task.due_at)
        .bind(task.source_execution_id)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn create_notification(
        &self,
        owner_id: Uuid,
        user_id: Uuid,
        message: &str,
        execution_id: Uuid,
    ) -> WorkflowResult<Uuid> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO notifications (id, owner_id, user_id, kind, message, source_execution_id, is_read, created_at)
            VALUES ($1, $2, $3, 'workflow', $4, $5, false, NOW())
            "#,
        )
        .bind(id)
        .bind(owner_id)
        .bind(user_id)
        .bind(message)
        .bind(execution_id)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn find_template(&self, owner_id: Uuid, template_id: Uuid) -> WorkflowResult<Option<EmailTemplate>> {
        let template = sqlx::query_as::<_, EmailTemplate>(
            r#"
            SELECT id, owner_id, name, subject, body_html, body_text, is_active
            FROM email_templates
            WHERE id = $1 AND owner_id = $2
            "#,
        )
        .bind(template_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(template)
    }
}
