// Timestamps are seconds from the start of the recording (f64), as found in the
// conversation records.
use serde::{Deserialize, Serialize};

/// Speaker label of a two-party conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Speaker {
    A,
    B,
}

impl Speaker {
    /// CSS class used for this speaker's chat bubbles.
    pub fn bubble_class(self) -> &'static str {
        match self {
            Speaker::A => "yours",
            Speaker::B => "mine",
        }
    }
}

/// One recorded speech segment of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub conv_id: String,
    /// Globally unique, increasing within a conversation.
    pub utter_id: u64,
    pub start: f64,
    pub stop: f64,
    pub speaker: Speaker,
    /// Raw transcript including filler and annotation markers.
    pub text: String,
    pub clean_text: String,
}
