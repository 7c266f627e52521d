use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing and wording of the voice-session lifecycle.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct VoiceConfig {
    /// Idle time after which a connection is reaped.
    #[serde(default = "default_inactivity_timeout_secs")]
    pub inactivity_timeout_secs: u64,
    /// How often the reaper scans the session registry.
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,
    /// Spoken right before leaving a channel.
    #[serde(default = "default_farewell_text")]
    pub farewell_text: String,
}

impl VoiceConfig {
    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout_secs: default_inactivity_timeout_secs(),
            scan_interval_secs: default_scan_interval_secs(),
            farewell_text: default_farewell_text(),
        }
    }
}

fn default_inactivity_timeout_secs() -> u64 {
    60
}

fn default_scan_interval_secs() -> u64 {
    30
}

fn default_farewell_text() -> String {
    "Bye".to_string()
}
