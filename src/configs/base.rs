use serde::{Deserialize, Serialize};

use crate::{common::types::AnyResult, configs::*};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
    #[serde(default)]
    pub tts: TtsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub loopback: LoopbackConfig,
}

impl Config {
    pub fn load() -> AnyResult<Self> {
        let config_path = if std::path::Path::new("config.toml").exists() {
            "config.toml"
        } else if std::path::Path::new("config.default.toml").exists() {
            "config.default.toml"
        } else {
            return Err("config.toml or config.default.toml not found".into());
        };

        crate::log_println!("Loading configuration from: {}", config_path);

        let config_str = std::fs::read_to_string(config_path)?;
        if config_str.trim().is_empty() {
            return Err(format!("{} is empty", config_path).into());
        }

        Self::from_toml(&config_str)
    }

    pub fn from_toml(source: &str) -> AnyResult<Self> {
        let config: Config = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AnyResult<()> {
        if self.voice.inactivity_timeout_secs == 0 {
            return Err("voice.inactivity_timeout_secs must be greater than zero".into());
        }
        if self.voice.scan_interval_secs == 0 {
            return Err("voice.scan_interval_secs must be greater than zero".into());
        }
        if self.bot.command_prefix.is_empty() {
            return Err("bot.command_prefix must not be empty".into());
        }
        if self.voice.scan_interval_secs >= self.voice.inactivity_timeout_secs {
            crate::log_println!(
                "Warning: voice.scan_interval_secs ({}) is not smaller than voice.inactivity_timeout_secs ({}); idle connections may linger up to {}s",
                self.voice.scan_interval_secs,
                self.voice.inactivity_timeout_secs,
                self.voice.scan_interval_secs + self.voice.inactivity_timeout_secs
            );
        }
        Ok(())
    }
}
