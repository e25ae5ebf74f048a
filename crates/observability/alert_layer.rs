use std::collections::BTreeMap;
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;

use super::config::ServiceIdentity;

const REDACTED: &str = "[REDACTED]";
const SENSITIVE_FIELD_MARKERS: [&str; 6] = [
    "secret",
    "signature",
    "token",
    "authorization",
    "webhook",
    "password",
];

/// An event that crossed the alert threshold.
#[derive(Debug, Clone)]
pub(crate) struct Alert {
    pub(crate) level: Level,
    pub(crate) at: DateTime<Utc>,
    pub(crate) identity: ServiceIdentity,
    pub(crate) target: String,
    pub(crate) location: Option<String>,
    pub(crate) message: String,
    pub(crate) fields: BTreeMap<String, String>,
    pub(crate) span_path: Vec<String>,
}

/// Forwards alerts into a bounded queue. The tracing call site never waits on
/// the sink, and a full queue drops the alert.
pub(crate) struct AlertLayer {
    identity: ServiceIdentity,
    min_level: Level,
    queue: mpsc::Sender<Alert>,
}

impl AlertLayer {
    pub(crate) fn new(identity: ServiceIdentity, min_level: Level, queue: mpsc::Sender<Alert>) -> Self {
        Self {
            identity,
            min_level,
            queue,
        }
    }
}

impl<S> Layer<S> for AlertLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        // `Level` orders more verbose levels as greater.
        if *metadata.level() > self.min_level {
            return;
        }

        let mut fields = RedactingVisitor::default();
        event.record(&mut fields);
        let message = fields.values.remove("message").unwrap_or_default();

        let span_path = ctx
            .event_span(event)
            .map(|span| {
                span.scope()
                    .from_root()
                    .map(|s| s.metadata().name().to_string())
                    .collect()
            })
            .unwrap_or_default();

        let alert = Alert {
            level: *metadata.level(),
            at: Utc::now(),
            identity: self.identity.clone(),
            target: metadata.target().to_string(),
            location: metadata
                .file()
                .zip(metadata.line())
                .map(|(file, line)| format!("{file}:{line}")),
            message,
            fields: fields.values,
            span_path,
        };

        // Logging from here would re-enter this layer, so a dropped alert is silent.
        let _ = self.queue.try_send(alert);
    }
}

#[derive(Default)]
struct RedactingVisitor {
    values: BTreeMap<String, String>,
}

impl RedactingVisitor {
    fn insert(&mut self, field: &Field, value: String) {
        let value = if is_sensitive(field.name()) {
            REDACTED.to_string()
        } else {
            value
        };
        self.values.insert(field.name().to_string(), value);
    }
}

impl Visit for RedactingVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
        self.insert(field, format!("{value:?}"));
    }
}

pub(crate) fn is_sensitive(field_name: &str) -> bool {
    let name = field_name.to_ascii_lowercase();
    SENSITIVE_FIELD_MARKERS
        .iter()
        .any(|marker| name.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    fn identity() -> ServiceIdentity {
        ServiceIdentity {
            service: "fieldops".to_string(),
            stage: "test".to_string(),
            component: "backend".to_string(),
        }
    }

    #[test]
    fn sensitive_names_are_matched_case_insensitively() {
        assert!(is_sensitive("stripe_signature"));
        assert!(is_sensitive("WEBHOOK_SECRET"));
        assert!(is_sensitive("Authorization"));
        assert!(!is_sensitive("proposal_id"));
    }

    #[test]
    fn forwards_errors_and_redacts_fields() {
        let (tx, mut rx) = mpsc::channel(4);
        let subscriber =
            tracing_subscriber::registry().with(AlertLayer::new(identity(), Level::ERROR, tx));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(proposal_id = "p-1", "not an alert");
            tracing::error!(
                proposal_id = "p-1",
                stripe_signature = "t=1,v1=abc",
                "payment_webhook: apply failed"
            );
        });

        let alert = rx.try_recv().unwrap();
        assert_eq!(alert.level, Level::ERROR);
        assert_eq!(alert.message, "payment_webhook: apply failed");
        assert_eq!(alert.fields.get("proposal_id").map(String::as_str), Some("p-1"));
        assert_eq!(
            alert.fields.get("stripe_signature").map(String::as_str),
            Some(REDACTED)
        );
        assert!(rx.try_recv().is_err());
    }
}
