mod alert_layer;
mod config;
mod discord;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use alert_layer::AlertLayer;
use config::ObservabilityConfig;
use discord::DiscordSink;

/// Installs the global subscriber: env-filtered console output in local time,
/// plus Discord alerts when `DISCORD_WEBHOOK_URL` is configured. Must be called
/// from inside a tokio runtime.
pub fn init_observability(component: &str) -> Result<()> {
    let config = ObservabilityConfig::from_env(component);

    let alert_layer = match &config.alerts {
        Some(alerts) => {
            let queue = DiscordSink::new(alerts.webhook_url.clone())?.spawn();
            Some(
                AlertLayer::new(config.identity.clone(), alerts.min_level, queue)
                    .with_filter(LevelFilter::from_level(alerts.min_level)),
            )
        }
        None => None,
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_timer(ChronoLocal::rfc_3339()))
        .with(alert_layer)
        .try_init()?;

    for warning in &config.warnings {
        warn!(component = %config.identity.component, "observability: {warning}");
    }

    info!(
        service = %config.identity.service,
        stage = %config.identity.stage,
        component = %config.identity.component,
        alerts_enabled = config.alerts.is_some(),
        "observability: initialised"
    );

    Ok(())
}
