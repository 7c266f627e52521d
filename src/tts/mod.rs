use async_trait::async_trait;
use bytes::Bytes;

pub mod google;
#[cfg(test)]
pub(crate) mod testing;

pub use google::GoogleTranslateTts;

/// Turns text into an encoded audio clip.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Returns the audio for `text`, or `None` when synthesis failed.
    ///
    /// Callers treat an empty buffer the same as `None`.
    async fn synthesize(&self, text: &str) -> Option<Bytes>;
}
