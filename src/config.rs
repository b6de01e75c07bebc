use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use log::LevelFilter;
use serde::Deserialize;
use std::str::FromStr;

use crate::crypto_race::RaceSettings;

pub const ENV_PREFIX: &str = "CRYPTO_RACE";

/// Layered settings: built-in defaults, then an optional file, then
/// `CRYPTO_RACE__SECTION__KEY` environment variables.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Settings {
    pub log_level: String,
    pub server: ServerSettings,
    pub race: RaceConfig,
    pub quotes: QuoteSettings,
}
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub db: Option<String>,
    pub test: bool,
}
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RaceConfig {
    pub duration_sec: u32,
    pub tick_interval_ms: u64,
    pub max_quote_failures: u32,
}
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct QuoteSettings {
    pub price_url: String,
    pub assets_url: String,
    pub timeout_sec: u64,
}

impl Settings {
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("log_level", "debug")?
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8081)?
            .set_default("server.test", false)?
            .set_default("race.duration_sec", 60)?
            .set_default("race.tick_interval_ms", 1000)?
            .set_default("race.max_quote_failures", 3)?
            .set_default(
                "quotes.price_url",
                "https://min-api.cryptocompare.com/data/price",
            )?
            .set_default(
                "quotes.assets_url",
                "https://api.coingecko.com/api/v3/coins/markets",
            )?
            .set_default("quotes.timeout_sec", 5)?;
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }
        builder
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .context("couldn't load configuration")?
            .try_deserialize()
            .context("invalid configuration")
    }
    pub fn log_level(&self) -> LevelFilter {
        LevelFilter::from_str(&self.log_level).unwrap_or(LevelFilter::Debug)
    }
    pub fn race_settings(&self) -> RaceSettings {
        RaceSettings {
            duration_sec: self.race.duration_sec,
            tick_interval: Duration::from_millis(self.race.tick_interval_ms),
            max_quote_failures: self.race.max_quote_failures,
        }
    }
    pub fn quote_timeout(&self) -> Duration {
        Duration::from_secs(self.quotes.timeout_sec)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.server.port, 8081);
        assert_eq!(settings.server.db, None);
        assert!(!settings.server.test);
        assert_eq!(settings.race.duration_sec, 60);
        assert_eq!(settings.quote_timeout(), Duration::from_secs(5));
        assert_eq!(settings.log_level(), LevelFilter::Debug);
        let race = settings.race_settings();
        assert_eq!(race.tick_interval, Duration::from_secs(1));
        assert_eq!(race.max_quote_failures, 3);
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "log_level = \"warn\"\n\
            [server]\nport = 9000\ndb = \"sqlite://race.db\"\n\
            [race]\nduration_sec = 30"
        )
        .unwrap();
        let settings = Settings::load(file.path().to_str()).unwrap();
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.server.db.as_deref(), Some("sqlite://race.db"));
        assert_eq!(settings.race.duration_sec, 30);
        assert_eq!(settings.race.tick_interval_ms, 1000);
        assert_eq!(settings.log_level(), LevelFilter::Warn);
    }
}
