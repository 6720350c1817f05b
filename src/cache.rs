use crate::codec::AudioBuffer;
use crate::error::Result;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// Synthesized pronunciations keyed by word, so replaying a word skips
/// the remote call. Entries live until `clear`.
#[derive(Debug, Default, Clone)]
pub struct SpeechCache {
    entries: HashMap<String, Arc<AudioBuffer>>,
}

impl SpeechCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(word: &str) -> String {
        word.trim().to_lowercase()
    }

    pub fn get(&self, word: &str) -> Option<Arc<AudioBuffer>> {
        self.entries.get(&Self::key(word)).cloned()
    }

    pub fn contains(&self, word: &str) -> bool {
        self.entries.contains_key(&Self::key(word))
    }

    pub fn insert(&mut self, word: &str, buffer: AudioBuffer) -> Arc<AudioBuffer> {
        let buffer = Arc::new(buffer);
        self.entries.insert(Self::key(word), buffer.clone());
        buffer
    }

    /// Cached buffer for `word`, synthesizing and storing it on a miss.
    pub async fn get_or_synthesize<F, Fut>(
        &mut self,
        word: &str,
        synthesize: F,
    ) -> Result<Arc<AudioBuffer>>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<AudioBuffer>>,
    {
        if let Some(hit) = self.get(word) {
            debug!("[SpeechCache] Hit for {:?}.", word);
            return Ok(hit);
        }
        let buffer = synthesize(word.to_string()).await?;
        Ok(self.insert(word, buffer))
    }

    /// Warms the cache for `words` one by one. Failures are logged and
    /// skipped. Returns how many new entries were added.
    pub async fn prefetch<I, S, F, Fut>(&mut self, words: I, mut synthesize: F) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<AudioBuffer>>,
    {
        let mut added = 0;
        for word in words {
            let word = word.as_ref();
            if word.trim().is_empty() || self.contains(word) {
                continue;
            }
            match synthesize(word.to_string()).await {
                Ok(buffer) => {
                    self.insert(word, buffer);
                    added += 1;
                }
                Err(e) => warn!("[SpeechCache] Prefetch of {:?} failed: {}", word, e),
            }
        }
        added
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
