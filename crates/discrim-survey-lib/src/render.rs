//! Chat-bubble rendering of a conversation context window.
//!
//! The rendered markup is dropped into the survey question text. Each speaker
//! turn becomes a bubble column, each utterance a message; the utterance under
//! test and the one before it are emphasised so participants know which line
//! the audio belongs to.

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::Result;
use crate::model::speaker_turn::SpeakerTurn;
use crate::turns::locate_turn;

/// Filler (`%`), capitalisation (`^`) and partial-word (`~`) markers.
static TRANSCRIPT_MARKERS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[%^~]").expect("valid regex"));
static REPEATED_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r" +").expect("valid regex"));

const CHAT_OPEN: &str = r#"<div class="chat">"#;
const DIV_CLOSE: &str = "</div>";

/// Clean a raw transcript for display.
///
/// Strips filler and capitalisation markers and collapses repeated spaces.
/// Unintelligible speech `( )`, events `{ }` / `[ ]` and punctuation stay.
pub fn clean_transcript(text: &str) -> String {
    let stripped = TRANSCRIPT_MARKERS.replace_all(text, "");
    REPEATED_SPACES
        .replace_all(&stripped, " ")
        .trim()
        .to_string()
}

/// Render the turns around `target_utter_id`.
///
/// The slice covers `before` turns of lookback and `after` turns of lookahead
/// plus one extra turn on each side, clamped to the conversation. The turn
/// holding `target_utter_id - 1` is emphasised in full unless `individual` is
/// set. Only the first utterance of the target turn is shown (emphasised),
/// followed by the rest of that turn when `after > 0`.
///
/// # Errors
///
/// `SurveyError::NotFound` when the target id is not in any turn.
pub fn render_context_window(
    turns: &[SpeakerTurn],
    target_utter_id: u64,
    before: usize,
    after: usize,
    individual: bool,
) -> Result<String> {
    let target_turn = locate_turn(turns, target_utter_id)?.turn_id;
    let lo = target_turn.saturating_sub(before.saturating_add(1));
    let hi = target_turn
        .saturating_add(after)
        .saturating_add(1)
        .min(turns.len());
    Ok(render_turns(
        turns,
        lo..hi,
        target_utter_id,
        after > 0,
        individual,
    ))
}

/// Render the context leading up to the target turn, excluding it.
///
/// Uses the same lookback (`before` plus one padding turn) as
/// [`render_context_window`].
pub fn render_preceding_context(
    turns: &[SpeakerTurn],
    target_utter_id: u64,
    before: usize,
) -> Result<String> {
    let target_turn = locate_turn(turns, target_utter_id)?.turn_id;
    let lo = target_turn.saturating_sub(before.saturating_add(1));
    Ok(render_turns(
        turns,
        lo..target_turn,
        target_utter_id,
        false,
        false,
    ))
}

fn render_turns(
    turns: &[SpeakerTurn],
    range: Range<usize>,
    target_utter_id: u64,
    show_rest_of_target_turn: bool,
    individual: bool,
) -> String {
    let preceding_id = target_utter_id.checked_sub(1);

    let mut out = String::from(CHAT_OPEN);
    for turn in &turns[range] {
        out.push_str(&format!(
            r#"<div class="{} messages">"#,
            turn.speaker().bubble_class()
        ));

        if preceding_id.is_some_and(|id| turn.contains(id)) {
            push_bubbles(&mut out, &turn.text, !individual);
        } else if turn.contains(target_utter_id) {
            push_bubbles(&mut out, &turn.text[..1], true);
            if show_rest_of_target_turn && turn.len() > 1 {
                push_bubbles(&mut out, &turn.text[1..], false);
            }
        } else {
            push_bubbles(&mut out, &turn.text, false);
        }

        out.push_str(DIV_CLOSE);
    }
    out.push_str(DIV_CLOSE);
    out
}

/// One bubble group: a message per text, the last one tagged `last`.
fn push_bubbles(out: &mut String, texts: &[String], bold: bool) {
    let (open, close) = if bold { ("<b>", "</b>") } else { ("", "") };
    for (i, text) in texts.iter().enumerate() {
        let class = if i + 1 == texts.len() {
            "message last"
        } else {
            "message"
        };
        out.push_str(&format!(
            r#"<div class="{}">{}{}{}</div>"#,
            class,
            open,
            clean_transcript(text),
            close
        ));
    }
}
