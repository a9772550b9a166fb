use serde::{Deserialize, Serialize};

use crate::model::utterance::{Speaker, Utterance};

/// A maximal run of consecutive utterances by the same speaker.
///
/// Per-utterance fields are kept as parallel vectors in original order, so
/// `utter_id[i]`, `text[i]` etc. all describe the i-th member utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerTurn {
    pub conv_id: Vec<String>,
    pub utter_id: Vec<u64>,
    pub start: Vec<f64>,
    pub stop: Vec<f64>,
    pub speaker: Vec<Speaker>,
    pub text: Vec<String>,
    pub clean_text: Vec<String>,
    /// Zero-based position of this turn in the conversation's turn sequence.
    pub turn_id: usize,
}

impl SpeakerTurn {
    /// Start a new turn seeded with its first utterance.
    pub fn new(turn_id: usize, first: &Utterance) -> Self {
        let mut turn = SpeakerTurn {
            conv_id: Vec::new(),
            utter_id: Vec::new(),
            start: Vec::new(),
            stop: Vec::new(),
            speaker: Vec::new(),
            text: Vec::new(),
            clean_text: Vec::new(),
            turn_id,
        };
        turn.push_utterance(first);
        turn
    }

    /// Append an utterance to every parallel field.
    pub fn push_utterance(&mut self, utter: &Utterance) {
        self.conv_id.push(utter.conv_id.clone());
        self.utter_id.push(utter.utter_id);
        self.start.push(utter.start);
        self.stop.push(utter.stop);
        self.speaker.push(utter.speaker);
        self.text.push(utter.text.clone());
        self.clean_text.push(utter.clean_text.clone());
    }

    /// Speaker of the turn (all members share it).
    pub fn speaker(&self) -> Speaker {
        self.speaker[0]
    }

    pub fn len(&self) -> usize {
        self.utter_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utter_id.is_empty()
    }

    pub fn contains(&self, utter_id: u64) -> bool {
        self.utter_id.contains(&utter_id)
    }

    /// Rebuild the member utterances in order.
    pub fn utterances(&self) -> impl Iterator<Item = Utterance> + '_ {
        (0..self.len()).map(move |i| Utterance {
            conv_id: self.conv_id[i].clone(),
            utter_id: self.utter_id[i],
            start: self.start[i],
            stop: self.stop[i],
            speaker: self.speaker[i],
            text: self.text[i].clone(),
            clean_text: self.clean_text[i].clone(),
        })
    }
}
