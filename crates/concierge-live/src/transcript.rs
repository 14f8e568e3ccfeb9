//! Reconciles interim and final speech-to-text fragments into one user
//! utterance per turn.
//!
//! The engine emits input transcription as a stream of interim guesses,
//! some of which revise the previous guess and some of which start a new
//! segment, punctuated by `finished` events. The accumulator keeps the
//! finalized segments in order plus the interim text still in flight.

use crate::TranscriptFragment;

#[derive(Debug, Default, Clone)]
pub struct TranscriptAccumulator {
    interim: String,
    buffer: Vec<String>,
}

impl TranscriptAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one fragment into the turn.
    pub fn update(&mut self, fragment: &TranscriptFragment) {
        if fragment.finished {
            if !fragment.text.is_empty() {
                self.buffer.push(fragment.text.clone());
            } else if !self.interim.is_empty() {
                // An empty final promotes whatever interim text we had.
                self.buffer.push(std::mem::take(&mut self.interim));
            }
            self.interim.clear();
            return;
        }

        if !self.interim.is_empty() && !fragment.text.contains(self.interim.as_str()) {
            // Disjoint segment: keep both rather than letting the new one
            // replace what was already heard.
            self.interim.push(' ');
            self.interim.push_str(&fragment.text);
        } else {
            self.interim = fragment.text.clone();
        }
    }

    /// Combined text of the turn. Leaves the accumulator empty.
    pub fn flush(&mut self) -> String {
        if self.buffer.is_empty() && !self.interim.is_empty() {
            self.buffer.push(std::mem::take(&mut self.interim));
        }
        let text = self.buffer.join(" ").trim().to_string();
        self.buffer.clear();
        self.interim.clear();
        text
    }

    pub fn interim(&self) -> &str {
        &self.interim
    }

    pub fn finalized(&self) -> &[String] {
        &self.buffer
    }

    pub fn is_empty(&self) -> bool {
        self.interim.is_empty() && self.buffer.is_empty()
    }
}
