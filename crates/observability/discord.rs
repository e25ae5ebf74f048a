use std::time::Duration;

use anyhow::{Result, anyhow};
use chrono::SecondsFormat;
use reqwest::Client;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::warn;
use url::Url;

use super::alert_layer::Alert;

const CONTENT_LIMIT: usize = 2000;
const QUEUE_CAPACITY: usize = 256;

pub(crate) struct DiscordSink {
    client: Client,
    webhook_url: Url,
}

impl DiscordSink {
    pub(crate) fn new(webhook_url: Url) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(3)).build()?;
        Ok(Self {
            client,
            webhook_url,
        })
    }

    /// Starts the delivery task and returns the queue feeding it.
    pub(crate) fn spawn(self) -> mpsc::Sender<Alert> {
        let (tx, mut rx) = mpsc::channel::<Alert>(QUEUE_CAPACITY);

        tokio::spawn(async move {
            while let Some(alert) = rx.recv().await {
                if let Err(err) = self.deliver(&alert).await {
                    // Below ERROR, so this never loops back into the alert queue.
                    warn!(error = %err, "observability: discord delivery failed");
                }
            }
        });

        tx
    }

    async fn deliver(&self, alert: &Alert) -> Result<()> {
        let response = self
            .client
            .post(self.webhook_url.clone())
            .json(&json!({ "content": render(alert) }))
            .send()
            .await
            // reqwest errors carry the URL, which holds the webhook token.
            .map_err(|err| anyhow!("discord request failed (timeout={})", err.is_timeout()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("discord responded with {status}"));
        }
        Ok(())
    }
}

pub(crate) fn render(alert: &Alert) -> String {
    let mut lines = vec![format!(
        "**{}** `{}` `{}` `{}`",
        alert.identity.service, alert.identity.stage, alert.identity.component, alert.level
    )];

    let mut origin = format!(
        "`{}` `{}`",
        alert.at.to_rfc3339_opts(SecondsFormat::Secs, true),
        alert.target
    );
    if let Some(location) = &alert.location {
        origin.push_str(&format!(" `{location}`"));
    }
    lines.push(origin);

    if !alert.message.trim().is_empty() {
        lines.push(format!("> {}", alert.message.trim()));
    }
    if !alert.span_path.is_empty() {
        lines.push(format!("spans: `{}`", alert.span_path.join(" > ")));
    }
    lines.extend(
        alert
            .fields
            .iter()
            .map(|(key, value)| format!("- `{key}` = `{value}`")),
    );

    truncate(lines.join("\n"))
}

fn truncate(content: String) -> String {
    const SUFFIX: &str = "\n[truncated]";

    if content.chars().count() <= CONTENT_LIMIT {
        return content;
    }
    let keep = CONTENT_LIMIT - SUFFIX.chars().count();
    let mut truncated: String = content.chars().take(keep).collect();
    truncated.push_str(SUFFIX);
    truncated
}
