/*!
 * Leet o'Clock bot config file
 */

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::leet::reactions::Emojis;

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub auth: AuthConfig,
    #[serde(default)]
    pub db_config: DbConfig,
    #[serde(default)]
    pub leet_config: LeetConfig,
    pub tracing_config: Option<TracingConfig>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AuthConfig {
    /// Authentication token for the discord bot
    pub token: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct DbConfig {
    /// SQLite database file, created on first start
    pub database_path: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self { database_path: "leetoclock.sqlite".to_owned() }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", default)]
pub struct LeetConfig {
    pub target_hour: u32,
    pub target_minute: u32,

    /// Channels the "Leet o'Clock scheduled" notice goes to
    pub announcement_channels: Vec<u64>,

    /// Target one minute after startup and poll every second
    pub debug: bool,

    /// Extra announcement channel used while debugging
    pub debug_channel: Option<u64>,

    pub emojis: Emojis,
}

impl Default for LeetConfig {
    fn default() -> Self {
        Self {
            target_hour: 13,
            target_minute: 37,
            announcement_channels: Vec::new(),
            debug: false,
            debug_channel: None,
            emojis: Emojis::default(),
        }
    }
}

impl LeetConfig {
    /// `LEETOCLOCK_DEBUG` (any non-empty value) turns debug on, `LEETOCLOCK_DEBUG_CHANNEL` sets
    /// the debug channel.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), String> {
        if var("LEETOCLOCK_DEBUG").is_some_and(|v| !v.is_empty()) {
            self.debug = true;
        }
        if let Some(channel) = var("LEETOCLOCK_DEBUG_CHANNEL").filter(|v| !v.is_empty()) {
            let channel = channel
                .parse::<u64>()
                .map_err(|e| format!("LEETOCLOCK_DEBUG_CHANNEL={channel:?}: {e}"))?;
            self.debug_channel = Some(channel);
        }
        Ok(())
    }

    pub fn channels(&self) -> Vec<u64> {
        self.announcement_channels
            .iter()
            .copied()
            .chain(self.debug_channel)
            .filter(|id| *id != 0)
            .unique()
            .collect()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct TracingConfig {
    /// Jaeger agent endpoint, as `host:port`
    pub jaeger: Option<String>,
}

pub fn load_config(path: &str) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config: Config = toml::from_str(&std::fs::read_to_string(path)?)?;
    config.leet_config.apply_env(|name| std::env::var(name).ok())?;
    Ok(config)
}
