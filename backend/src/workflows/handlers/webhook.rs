use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::info;

use super::{mismatch, ActionHandler};
use crate::error::{WorkflowError, WorkflowResult};
use crate::workflows::actions::{ActionKind, ActionType, HttpMethod};
use crate::workflows::dispatcher::RunContext;

/// Longest response body kept in the action output
const MAX_RESPONSE_CHARS: usize = 2000;

pub struct WebhookHandler {
    client: reqwest::Client,
}

impl WebhookHandler {
    pub fn new(timeout: Duration) -> WorkflowResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("relay-workflows/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

/// Body sent when the action config has no explicit payload
fn default_payload(run: &RunContext) -> Value {
    json!({
        "workflow_id": run.workflow_id,
        "execution_id": run.execution_id,
        "trigger_type": run.trigger_type,
        "payload": run.payload,
    })
}

#[async_trait]
impl ActionHandler for WebhookHandler {
    fn action_type(&self) -> ActionType {
        ActionType::Webhook
    }

    async fn execute(&self, action: &ActionKind, run: &RunContext) -> WorkflowResult<Value> {
        let ActionKind::Webhook(config) = action else {
            return Err(mismatch(self.action_type(), action));
        };

        let mut request = match config.method {
            HttpMethod::Get => self.client.get(&config.url),
            HttpMethod::Post => self.client.post(&config.url),
            HttpMethod::Put => self.client.put(&config.url),
            HttpMethod::Patch => self.client.patch(&config.url),
            HttpMethod::Delete => self.client.delete(&config.url),
        };
        for (name, value) in &config.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if config.method != HttpMethod::Get {
            let body = config.payload.clone().unwrap_or_else(|| default_payload(run));
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(WorkflowError::external(
                "webhook",
                format!("{} returned HTTP {}", config.url, status.as_u16()),
            ));
        }

        info!("Webhook {} answered {}", config.url, status.as_u16());

        let body = serde_json::from_str::<Value>(&text)
            .unwrap_or_else(|_| Value::String(text.chars().take(MAX_RESPONSE_CHARS).collect()));

        Ok(json!({
            "url": config.url,
            "status_code": status.as_u16(),
            "response": body,
        }))
    }
}
