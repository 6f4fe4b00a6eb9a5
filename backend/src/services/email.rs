use crate::config::SmtpConfig;
use crate::error::WorkflowResult;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::{authentication::Credentials, PoolConfig},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

/// A rendered message ready for delivery
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutboundEmail {
    pub to_email: String,
    pub to_name: Option<String>,
    pub subject: String,
    pub html_body: String,
    pub text_body: Option<String>,
}

/// Delivery seam used by the `send_email` action.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> WorkflowResult<()>;
}

#[derive(Debug, Clone)]
pub struct EmailService {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_email: String,
    from_name: String,
}

impl EmailService {
    pub fn new(smtp_config: &SmtpConfig) -> WorkflowResult<Self> {
        let creds = Credentials::new(
            smtp_config.username.clone(),
            smtp_config.password.clone(),
        );

        let builder = if smtp_config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp_config.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp_config.host)
        };

        let transport = builder
            .port(smtp_config.port)
            .credentials(creds)
            .pool_config(PoolConfig::new().max_size(10))
            .timeout(Some(Duration::from_secs(10)))
            .build();

        Ok(EmailService {
            transport,
            from_email: smtp_config.from_email.clone(),
            from_name: smtp_config.from_name.clone(),
        })
    }

    fn build_message(&self, email: &OutboundEmail) -> WorkflowResult<Message> {
        let from = format!("{} <{}>", self.from_name, self.from_email).parse::<Mailbox>()?;

        let to = match &email.to_name {
            Some(name) => format!("{} <{}>", name, email.to_email).parse::<Mailbox>()?,
            None => email.to_email.parse::<Mailbox>()?,
        };

        let builder = Message::builder().from(from).to(to).subject(&email.subject);

        let message = match &email.text_body {
            Some(text) => builder.multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(email.html_body.clone()),
                    ),
            )?,
            None => builder
                .header(ContentType::TEXT_HTML)
                .body(email.html_body.clone())?,
        };

        Ok(message)
    }
}

#[async_trait]
impl EmailTransport for EmailService {
    async fn send(&self, email: &OutboundEmail) -> WorkflowResult<()> {
        let message = self.build_message(email)?;

        match self.transport.send(message).await {
            Ok(_) => {
                info!("Email sent successfully to {}", email.to_email);
                Ok(())
            }
            Err(e) => {
                error!("Failed to send email to {}: {}", email.to_email, e);
                Err(e.into())
            }
        }
    }
}

/// Wrap a plain-text body in the minimal HTML the templates use.
pub fn text_to_html(body: &str) -> String {
    let escaped = body
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");
    format!(
        "<html><body style=\"font-family: Arial, sans-serif;\">{}</body></html>",
        escaped.replace('\n', "<br>")
    )
}
