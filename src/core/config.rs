use std::{collections::HashMap, time::Duration};

use secrecy::SecretString;
use serde::Deserialize;
use serde_with::{DisplayFromStr, serde_as};

pub const ENV_PREFIX: &str = "PINGBOT";
pub const ENV_SEPARATOR: &str = "__";
pub const CONFIG_FILE: &str = "pingbot";

#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ServiceKind {
    Dummy {
        #[serde_as(as = "Option<DisplayFromStr>")]
        interval_ms: Option<u64>,
        body: Option<String>,
    },
    Xmpp {
        jid: String,
        password: SecretString,
        room: String,
        #[serde(default)]
        room_password: Option<SecretString>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MiddlewareKind {
    Commands {},
    Greeter {},
    Logger {},
    #[serde(other)]
    Unknown,
}

/// Identity and routing domains shared by the command router and the greeter.
/// Built once at startup and never reloaded.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StaticConfiguration {
    #[serde(rename = "nickname")]
    pub own_nickname: String,
    pub broadcast_service_domain: String,
    pub direct_message_domain: String,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub bot: StaticConfiguration,
    pub services: HashMap<String, ServiceCfg>, // key = service name
    #[serde(default)]
    pub middlewares: HashMap<String, MiddlewareCfg>, // key = middleware name
    #[serde(default)]
    pub reconnection: ReconnectionConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceCfg {
    #[serde(flatten)]
    pub kind: ServiceKind,
    #[serde(default, deserialize_with = "deserialize_middleware_list")]
    pub middleware: Option<Vec<String>>, // List of middleware names
}

fn deserialize_middleware_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrVec {
        String(String),
        Vec(Vec<String>),
    }

    let value: Option<StringOrVec> = Option::deserialize(deserializer)?;

    match value {
        None => Ok(None),
        Some(StringOrVec::Vec(vec)) => Ok(Some(vec)),
        Some(StringOrVec::String(s)) => {
            // Environment variables carry lists as comma-separated strings
            let items: Vec<String> = s
                .split(',')
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect();
            Ok(Some(items))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MiddlewareCfg {
    #[serde(flatten)]
    pub kind: MiddlewareKind,
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectionConfig {
    #[serde(default = "default_initial_delay", with = "humantime_serde")]
    pub initial_delay: Duration,
    #[serde(default = "default_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,
    #[serde(default = "default_multiplier")]
    #[serde_as(as = "DisplayFromStr")]
    pub multiplier: f64,
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(300)
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for ReconnectionConfig {
    fn default() -> Self {
        Self {
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            multiplier: default_multiplier(),
        }
    }
}

#[derive(Debug)]
pub struct ExponentialBackoff {
    config: ReconnectionConfig,
    current: Duration,
}

impl ExponentialBackoff {
    pub fn new(config: ReconnectionConfig) -> Self {
        let current = config.initial_delay;
        Self { config, current }
    }

    /// Returns the delay to wait now and advances to the next one, capped at `max_delay`.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current.min(self.config.max_delay);
        let next = self.current.mul_f64(self.config.multiplier.max(1.0));
        self.current = next.min(self.config.max_delay);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.config.initial_delay;
    }
}

pub fn load_from_env() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok(); // Load from .env file first
    let cfg = config::Config::builder()
        .add_source(config::File::with_name(CONFIG_FILE).required(false))
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator(ENV_SEPARATOR))
        .build()?;
    Ok(cfg.try_deserialize()?)
}
