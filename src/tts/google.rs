use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tracing::{debug, error, warn};

use super::SpeechSynthesizer;
use crate::{common::types::AnyResult, configs::TtsConfig};

/// The translate endpoint refuses queries longer than this.
const MAX_CHUNK_CHARS: usize = 100;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Speech synthesis through the Google Translate TTS endpoint.
///
/// Long text is split into chunks the endpoint accepts and the returned MP3
/// segments are concatenated, which players decode as one stream.
pub struct GoogleTranslateTts {
    config: TtsConfig,
    http_client: reqwest::Client,
}

impl GoogleTranslateTts {
    pub fn new(config: TtsConfig) -> AnyResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            config,
            http_client,
        })
    }

    fn endpoint(&self) -> String {
        format!("https://translate.google.{}/translate_tts", self.config.tld)
    }

    fn chunk_url(&self, chunk: &str, idx: usize, total: usize) -> String {
        format!(
            "{}?ie=UTF-8&q={}&tl={}&client=tw-ob&ttsspeed=1&total={}&idx={}&textlen={}",
            self.endpoint(),
            urlencoding::encode(chunk),
            urlencoding::encode(&self.config.lang),
            total,
            idx,
            chunk.chars().count()
        )
    }

    async fn fetch_chunk(&self, chunk: &str, idx: usize, total: usize) -> Result<Bytes, String> {
        let url = self.chunk_url(chunk, idx, total);
        let response = self
            .http_client
            .get(&url)
            .header(
                "Referer",
                format!("https://translate.google.{}/", self.config.tld),
            )
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("TTS endpoint returned status {}", status));
        }

        response
            .bytes()
            .await
            .map_err(|e| format!("Failed reading response: {}", e))
    }
}

#[async_trait]
impl SpeechSynthesizer for GoogleTranslateTts {
    async fn synthesize(&self, text: &str) -> Option<Bytes> {
        let text = text.trim();
        if text.is_empty() {
            warn!("Refusing to synthesize empty text");
            return None;
        }
        if text.chars().count() > self.config.max_text_length {
            warn!(
                "Text too long for TTS ({} chars, max {})",
                text.chars().count(),
                self.config.max_text_length
            );
            return None;
        }

        let chunks = split_text(text, MAX_CHUNK_CHARS);
        if chunks.is_empty() {
            return None;
        }
        debug!("Synthesizing {} chunk(s) in '{}'", chunks.len(), self.config.lang);

        let mut audio = BytesMut::new();
        for (idx, chunk) in chunks.iter().enumerate() {
            match self.fetch_chunk(chunk, idx, chunks.len()).await {
                Ok(bytes) => audio.extend_from_slice(&bytes),
                Err(e) => {
                    error!("TTS chunk {}/{} failed: {}", idx + 1, chunks.len(), e);
                    return None;
                }
            }
        }

        if audio.is_empty() {
            error!("TTS endpoint returned no audio");
            return None;
        }
        Some(audio.freeze())
    }
}

fn is_break(c: char) -> bool {
    matches!(c, '.' | ',' | '!' | '?' | ';' | ':' | '\n' | '…' | '¡' | '¿' | '。' | '、')
}

/// Splits `text` at punctuation, packs the pieces into chunks of at most
/// `max_chars` characters and hard-splits words that are longer than that.
pub(crate) fn split_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut pieces: Vec<String> = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        current.push(c);
        if is_break(c) {
            pieces.push(std::mem::take(&mut current));
        }
    }
    pieces.push(current);

    let mut words: Vec<String> = Vec::new();
    for piece in pieces {
        let trimmed = piece.split_whitespace().collect::<Vec<_>>().join(" ");
        let has_content = trimmed.chars().any(|c| !is_break(c));
        if !has_content {
            continue;
        }
        if trimmed.chars().count() <= max_chars {
            words.push(trimmed);
            continue;
        }
        for word in trimmed.split(' ') {
            let chars: Vec<char> = word.chars().collect();
            for part in chars.chunks(max_chars) {
                words.push(part.iter().collect());
            }
        }
    }

    let mut chunks: Vec<String> = Vec::new();
    let mut chunk = String::new();
    for word in words {
        let needed = if chunk.is_empty() {
            word.chars().count()
        } else {
            chunk.chars().count() + 1 + word.chars().count()
        };
        if needed > max_chars && !chunk.is_empty() {
            chunks.push(std::mem::take(&mut chunk));
        }
        if !chunk.is_empty() {
            chunk.push(' ');
        }
        chunk.push_str(&word);
    }
    if !chunk.is_empty() {
        chunks.push(chunk);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_one_chunk() {
        assert_eq!(split_text("Bye", 100), vec!["Bye".to_string()]);
    }

    #[test]
    fn test_chunks_respect_limit() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(8);
        let chunks = split_text(&text, 100);

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 100));
        let rejoined = chunks.join(" ");
        assert_eq!(rejoined.matches("fox").count(), 8);
    }

    #[test]
    fn test_long_word_is_hard_split() {
        let word = "a".repeat(250);
        let chunks = split_text(&word, 100);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].len(), 50);
    }

    #[test]
    fn test_punctuation_only_is_empty() {
        assert!(split_text(" ... !! ", 100).is_empty());
    }

    #[test]
    fn test_chunk_url_encodes_query() {
        let tts = GoogleTranslateTts::new(TtsConfig::default()).unwrap();
        let url = tts.chunk_url("hello world", 0, 1);
        assert!(url.starts_with("https://translate.google.com/translate_tts?"));
        assert!(url.contains("q=hello%20world"));
        assert!(url.contains("tl=en"));
        assert!(url.contains("textlen=11"));
    }

    #[tokio::test]
    async fn test_rejects_text_over_limit() {
        let config = TtsConfig {
            max_text_length: 5,
            ..TtsConfig::default()
        };
        let tts = GoogleTranslateTts::new(config).unwrap();
        assert!(tts.synthesize("far too long").await.is_none());
        assert!(tts.synthesize("   ").await.is_none());
    }
}
