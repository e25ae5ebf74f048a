use std::str::FromStr;

use anyhow::{Context, Result};
use fieldops::payments::stripe_client::DEFAULT_WEBHOOK_TOLERANCE_SECS;

use super::config_model::{BackendServer, Database, DotEnvyConfig, Stripe, Supabase};

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();
    from_lookup(|key| std::env::var(key).ok())
}

pub fn from_lookup<F>(lookup: F) -> Result<DotEnvyConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let env = Env(lookup);

    let backend_server = BackendServer {
        port: env.parsed("SERVER_PORT_BACKEND")?,
        body_limit: env.parsed("SERVER_BODY_LIMIT")?,
        timeout: env.parsed("SERVER_TIMEOUT")?,
    };

    let database = Database {
        url: env.required("DATABASE_URL")?,
        max_connections: env.parsed_or("DATABASE_MAX_CONNECTIONS", 10)?,
    };

    let supabase = Supabase {
        jwt_secret: env.required("SUPABASE_JWT_SECRET")?,
    };

    let stripe = Stripe {
        secret_key: env.required("STRIPE_SECRET_KEY")?,
        webhook_secret: env.required("STRIPE_WEBHOOK_SECRET")?,
        success_url: env.required("STRIPE_SUCCESS_URL")?,
        cancel_url: env.required("STRIPE_CANCEL_URL")?,
        currency: env
            .optional("STRIPE_CURRENCY")
            .unwrap_or_else(|| "usd".to_string())
            .to_ascii_lowercase(),
        webhook_tolerance_secs: env
            .parsed_or("STRIPE_WEBHOOK_TOLERANCE_SECS", DEFAULT_WEBHOOK_TOLERANCE_SECS)?,
    };

    Ok(DotEnvyConfig {
        backend_server,
        database,
        supabase,
        stripe,
    })
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, key: &str) -> Result<String> {
        self.optional(key)
            .with_context(|| format!("{key} is missing"))
    }

    fn parsed<T>(&self, key: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        self.required(key)?
            .parse()
            .with_context(|| format!("{key} is invalid"))
    }

    fn parsed_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match self.optional(key) {
            Some(raw) => raw.parse().with_context(|| format!("{key} is invalid")),
            None => Ok(default),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_vars() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("SERVER_PORT_BACKEND", "8080"),
            ("SERVER_BODY_LIMIT", "10"),
            ("SERVER_TIMEOUT", "30"),
            ("DATABASE_URL", "postgres://localhost/fieldops"),
            ("SUPABASE_JWT_SECRET", "jwt-secret"),
            ("STRIPE_SECRET_KEY", "sk_test_1"),
            ("STRIPE_WEBHOOK_SECRET", "whsec_1"),
            ("STRIPE_SUCCESS_URL", "https://app.example.com/paid"),
            ("STRIPE_CANCEL_URL", "https://app.example.com/cancel"),
        ])
    }

    fn load_from(vars: &HashMap<&'static str, &'static str>) -> Result<DotEnvyConfig> {
        from_lookup(|key| vars.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn applies_defaults_for_optional_values() {
        let config = load_from(&base_vars()).unwrap();
        assert_eq!(config.backend_server.port, 8080);
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.stripe.currency, "usd");
        assert_eq!(config.stripe.webhook_tolerance_secs, 300);
    }

    #[test]
    fn missing_required_value_names_the_key() {
        let mut vars = base_vars();
        vars.remove("STRIPE_WEBHOOK_SECRET");
        let err = load_from(&vars).unwrap_err();
        assert!(err.to_string().contains("STRIPE_WEBHOOK_SECRET"));
    }

    #[test]
    fn unparseable_value_is_an_error() {
        let mut vars = base_vars();
        vars.insert("SERVER_PORT_BACKEND", "eighty");
        let err = load_from(&vars).unwrap_err();
        assert!(err.to_string().contains("SERVER_PORT_BACKEND is invalid"));
    }
}
