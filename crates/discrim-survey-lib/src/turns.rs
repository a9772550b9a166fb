//! Speaker-turn segmentation.
//!
//! A conversation is a flat list of utterances; the survey shows it as chat
//! bubbles grouped by speaker. `make_speaker_turns` performs that grouping and
//! `locate_turn` finds the turn holding a given utterance.

use crate::error::{Result, SurveyError};
use crate::model::speaker_turn::SpeakerTurn;
use crate::model::utterance::Utterance;

/// Group utterances into maximal same-speaker runs.
///
/// Turns partition the input exactly and keep its order; `turn_id` is the
/// position in the returned vector.
///
/// # Errors
///
/// `SurveyError::EmptyInput` when `utterances` is empty.
pub fn make_speaker_turns(utterances: &[Utterance]) -> Result<Vec<SpeakerTurn>> {
    let (first, rest) = utterances.split_first().ok_or(SurveyError::EmptyInput)?;

    let mut turns: Vec<SpeakerTurn> = Vec::new();
    let mut current = SpeakerTurn::new(0, first);
    for utter in rest {
        if utter.speaker == current.speaker() {
            current.push_utterance(utter);
        } else {
            let next_id = current.turn_id + 1;
            turns.push(current);
            current = SpeakerTurn::new(next_id, utter);
        }
    }
    turns.push(current);

    log::debug!(
        "segmented {} utterances into {} speaker turns",
        utterances.len(),
        turns.len()
    );
    Ok(turns)
}

/// Find the turn containing `utter_id`.
///
/// # Errors
///
/// `SurveyError::NotFound` when no turn holds the id.
pub fn locate_turn(turns: &[SpeakerTurn], utter_id: u64) -> Result<&SpeakerTurn> {
    turns
        .iter()
        .find(|turn| turn.contains(utter_id))
        .ok_or(SurveyError::NotFound { utter_id })
}
