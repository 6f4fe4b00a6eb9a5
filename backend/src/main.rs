use chrono::Utc;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use relay_backend::config::Config;
use relay_backend::database;
use relay_backend::services::EmailService;
use relay_backend::workflows::{TriggerEvent, WorkflowEngine};

/// Reads one JSON event per stdin line and runs the matching workflows,
/// sweeping due no-reply checks in the background.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let db_pool = database::create_pool(&config.database_url).await?;

    database::migrate(&db_pool).await?;
    if !database::health_check(&db_pool).await {
        anyhow::bail!("Database health check failed");
    }

    if !config.smtp.is_configured() {
        warn!("SMTP credentials not set; send_email actions will fail");
    }
    let email = Arc::new(EmailService::new(&config.smtp)?);
    let engine = Arc::new(WorkflowEngine::with_postgres(db_pool, email, config.engine.clone())?);

    let sweeper = engine.clone();
    let interval = config.engine.followup_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = sweeper.process_all_due_followups(Utc::now()).await {
                error!("Follow-up sweep failed: {}", e);
            }
        }
    });

    info!(
        "Workflow worker ready, reading events from stdin; follow-ups every {}s",
        interval.as_secs()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let event: TriggerEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                error!("Skipping malformed event: {}", e);
                continue;
            }
        };

        let outcome = engine.process_event(event).await;
        for (workflow_id, message) in &outcome.failures {
            warn!("Workflow {} failed: {}", workflow_id, message);
        }
    }

    info!("Event stream closed, shutting down");
    Ok(())
}
