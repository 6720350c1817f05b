use std::collections::VecDeque;

/// Entries kept for display; older ones fall off the front.
pub const TRANSCRIPT_WINDOW: usize = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    Learner,
    Tutor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
}

/// Bounded, insertion-ordered display cache of transcript fragments.
#[derive(Debug, Clone)]
pub struct TranscriptWindow {
    entries: VecDeque<TranscriptEntry>,
    capacity: usize,
}

impl Default for TranscriptWindow {
    fn default() -> Self {
        Self::with_capacity(TRANSCRIPT_WINDOW)
    }
}

impl TranscriptWindow {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, speaker: Speaker, text: impl Into<String>) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(TranscriptEntry {
            speaker,
            text: text.into(),
        });
    }

    pub fn entries(&self) -> impl Iterator<Item = &TranscriptEntry> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<TranscriptEntry> {
        self.entries.iter().cloned().collect()
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_most_recent_eleven_in_order() {
        let mut window = TranscriptWindow::default();
        for i in 0..15 {
            let speaker = if i % 2 == 0 { Speaker::Learner } else { Speaker::Tutor };
            window.push(speaker, format!("line {}", i));
        }

        let texts: Vec<String> = window.entries().map(|e| e.text.clone()).collect();
        let expected: Vec<String> = (4..15).map(|i| format!("line {}", i)).collect();
        assert_eq!(window.len(), TRANSCRIPT_WINDOW);
        assert_eq!(texts, expected);
        assert_eq!(window.to_vec()[0].speaker, Speaker::Learner);
    }

    #[test]
    fn under_capacity_keeps_everything() {
        let mut window = TranscriptWindow::default();
        window.push(Speaker::Tutor, "How was your day?");
        window.push(Speaker::Learner, "Pretty good");
        assert_eq!(window.len(), 2);
        window.clear();
        assert!(window.is_empty());
    }
}
