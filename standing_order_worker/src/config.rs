use std::time::Duration;

use log::*;
use market_common::helpers::parse_boolean_flag;

const DEFAULT_SOW_DATABASE_URL: &str = "sqlite://data/standing_orders.db";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_EVENT_BUFFER_SIZE: usize = 25;

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// If true, line items are never capped to the stock on hand.
    pub allow_backorders: bool,
    /// How often the `watch` command looks for order cycles with orders waiting to be placed.
    pub poll_interval: Duration,
    /// The channel capacity of each mail hook.
    pub event_buffer_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_SOW_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            allow_backorders: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
        }
    }
}

impl WorkerConfig {
    pub fn from_env_or_default() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from whatever `lookup` returns for each `SOW_*` variable. Missing or invalid values
    /// fall back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where F: Fn(&str) -> Option<String> {
        let database_url = lookup("SOW_DATABASE_URL").unwrap_or_else(|| {
            info!("🪛️ SOW_DATABASE_URL is not set. Using the default, {DEFAULT_SOW_DATABASE_URL}.");
            DEFAULT_SOW_DATABASE_URL.to_string()
        });
        let max_connections = parse_or_default(&lookup, "SOW_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS);
        let allow_backorders = parse_boolean_flag(lookup("SOW_ALLOW_BACKORDERS"), false);
        let poll_interval =
            Duration::from_secs(parse_or_default(&lookup, "SOW_POLL_INTERVAL", DEFAULT_POLL_INTERVAL.as_secs()));
        let event_buffer_size = parse_or_default(&lookup, "SOW_EVENT_BUFFER_SIZE", DEFAULT_EVENT_BUFFER_SIZE);
        Self { database_url, max_connections, allow_backorders, poll_interval, event_buffer_size }
    }
}

fn parse_or_default<F, T>(lookup: &F, name: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + std::fmt::Display + PartialOrd + Default,
    T::Err: std::fmt::Display,
{
    let Some(s) = lookup(name) else {
        debug!("🪛️ {name} is not set. Using the default value of {default}.");
        return default;
    };
    match s.trim().parse::<T>() {
        Ok(v) if v > T::default() => v,
        Ok(v) => {
            warn!("🪛️ {name} must be greater than zero, but was {v}. Using the default, {default}, instead.");
            default
        },
        Err(e) => {
            error!("🪛️ {s} is not a valid value for {name}. {e} Using the default, {default}, instead.");
            default
        },
    }
}
