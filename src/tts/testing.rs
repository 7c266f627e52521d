use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use super::SpeechSynthesizer;

/// Synthesizer that answers from memory and remembers what it was asked.
#[derive(Default)]
pub(crate) struct ScriptedSynthesizer {
    failing: Mutex<HashSet<String>>,
    delays: Mutex<HashMap<String, Duration>>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedSynthesizer {
    /// Makes every request for `text` fail.
    pub fn fail_on(&self, text: &str) {
        self.failing.lock().insert(text.to_string());
    }

    /// Makes every request for `text` take `delay` before answering.
    pub fn delay_on(&self, text: &str, delay: Duration) {
        self.delays.lock().insert(text.to_string(), delay);
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for ScriptedSynthesizer {
    async fn synthesize(&self, text: &str) -> Option<Bytes> {
        self.requests.lock().push(text.to_string());
        let delay = self.delays.lock().get(text).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().contains(text) {
            return None;
        }
        Some(Bytes::from(format!("audio:{}", text)))
    }
}
