use std::env;

use tracing::Level;
use url::Url;

/// Identifies which deployment an alert came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ServiceIdentity {
    pub(crate) service: String,
    pub(crate) stage: String,
    pub(crate) component: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AlertSinkConfig {
    pub(crate) webhook_url: Url,
    pub(crate) min_level: Level,
}

#[derive(Debug, Clone)]
pub(crate) struct ObservabilityConfig {
    pub(crate) identity: ServiceIdentity,
    pub(crate) alerts: Option<AlertSinkConfig>,
    /// Reported once the subscriber is installed.
    pub(crate) warnings: Vec<String>,
}

impl ObservabilityConfig {
    pub(crate) fn from_env(component: &str) -> Self {
        Self::from_lookup(component, |key| env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(component: &str, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let component = component.trim().to_string();

        let identity = ServiceIdentity {
            service: read("SERVICE_NAME").unwrap_or_else(|| component.clone()),
            stage: read("STAGE").unwrap_or_else(|| "local".to_string()),
            component,
        };

        let mut warnings = Vec::new();
        let alerts = alert_sink(&read, &mut warnings);

        Self {
            identity,
            alerts,
            warnings,
        }
    }
}

fn alert_sink<F>(read: &F, warnings: &mut Vec<String>) -> Option<AlertSinkConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let enabled = match read("DISCORD_NOTIFY_ENABLED") {
        Some(raw) => parse_bool(&raw).unwrap_or_else(|| {
            warnings.push(format!(
                "DISCORD_NOTIFY_ENABLED has unrecognised value {raw:?}; treating as enabled"
            ));
            true
        }),
        None => true,
    };
    if !enabled {
        return None;
    }

    let raw_url = read("DISCORD_WEBHOOK_URL")?;
    let webhook_url = match Url::parse(&raw_url) {
        Ok(url) => url,
        Err(err) => {
            // The URL embeds the webhook token, so only the parse error is reported.
            warnings.push(format!("DISCORD_WEBHOOK_URL is invalid ({err}); alerts disabled"));
            return None;
        }
    };

    let min_level = match read("DISCORD_NOTIFY_MIN_LEVEL") {
        None => Level::ERROR,
        Some(raw) => parse_level(&raw).unwrap_or_else(|| {
            warnings.push(format!(
                "DISCORD_NOTIFY_MIN_LEVEL has unrecognised value {raw:?}; using error"
            ));
            Level::ERROR
        }),
    };

    Some(AlertSinkConfig {
        webhook_url,
        min_level,
    })
}

fn parse_level(raw: &str) -> Option<Level> {
    match raw.to_ascii_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
