//! Webhook notification dispatcher.
//!
//! Each configured channel maps to a URL that receives a JSON POST per
//! notification. Channels without a URL are recorded in the log only, so a
//! playbook naming `email` still succeeds on a host that has no email hook.
//! The first failing channel fails the whole dispatch; because the engine
//! retries transient failures, delivery is at-least-once per channel.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::Serialize;

use playbook_core::playbook::capability::{
    CapabilityError, DispatchReceipt, NotificationDispatcher, NotificationMessage,
};
use playbook_types::config::NotificationConfig;

use crate::transport::{classify_send_error, classify_status};

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    channel: &'a str,
    workflow_id: &'a str,
    step_id: &'a str,
    subject: &'a str,
    body: &'a str,
    /// Slack-compatible summary line.
    text: String,
}

#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    webhooks: HashMap<String, String>,
}

impl WebhookNotifier {
    pub fn new(config: &NotificationConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            webhooks: config.webhooks.clone(),
        })
    }

    pub fn has_webhook(&self, channel: &str) -> bool {
        self.webhooks.contains_key(channel)
    }

    async fn post(
        &self,
        url: &str,
        channel: &str,
        message: &NotificationMessage,
    ) -> Result<(), CapabilityError> {
        let payload = WebhookPayload {
            channel,
            workflow_id: &message.workflow_id,
            step_id: &message.step_id,
            subject: &message.subject,
            body: &message.body,
            text: summary_line(message),
        };

        let response = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| classify_send_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }
        Ok(())
    }

    async fn deliver(
        &self,
        message: &NotificationMessage,
    ) -> Result<DispatchReceipt, CapabilityError> {
        let mut recipients = Vec::with_capacity(message.channels.len());

        for channel in &message.channels {
            match self.webhooks.get(channel) {
                Some(url) => {
                    self.post(url, channel, message).await.map_err(|e| match e {
                        CapabilityError::Transient(msg) => {
                            CapabilityError::Transient(format!("channel {channel}: {msg}"))
                        }
                        CapabilityError::Failed(msg) => {
                            CapabilityError::Failed(format!("channel {channel}: {msg}"))
                        }
                    })?;
                    tracing::debug!(channel = %channel, step_id = %message.step_id, "webhook delivered");
                }
                None => {
                    tracing::info!(
                        channel = %channel,
                        workflow_id = %message.workflow_id,
                        step_id = %message.step_id,
                        subject = %message.subject,
                        "no webhook configured for channel, notification logged"
                    );
                }
            }
            recipients.push(channel.clone());
        }

        Ok(DispatchReceipt { recipients })
    }
}

impl NotificationDispatcher for WebhookNotifier {
    fn dispatch<'a>(
        &'a self,
        message: &'a NotificationMessage,
    ) -> BoxFuture<'a, Result<DispatchReceipt, CapabilityError>> {
        Box::pin(self.deliver(message))
    }
}

fn summary_line(message: &NotificationMessage) -> String {
    if message.body.is_empty() || message.body == message.subject {
        format!("[{}] {}", message.workflow_id, message.subject)
    } else {
        format!(
            "[{}] {}: {}",
            message.workflow_id, message.subject, message.body
        )
    }
}
