use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TtsConfig {
    /// IETF language tag understood by the translate endpoint (`en`, `fr`, ...).
    #[serde(default = "default_lang")]
    pub lang: String,
    /// Top-level domain of the endpoint; changes the accent for some languages.
    #[serde(default = "default_tld")]
    pub tld: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_text_length")]
    pub max_text_length: usize,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            lang: default_lang(),
            tld: default_tld(),
            timeout_ms: default_timeout_ms(),
            max_text_length: default_max_text_length(),
        }
    }
}

fn default_lang() -> String {
    "en".to_string()
}

fn default_tld() -> String {
    "com".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_max_text_length() -> usize {
    500
}
