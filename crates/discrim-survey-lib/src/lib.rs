//! Library entry point for discrimination-turn survey generation.
//!
//! The crate turns conversation transcripts, audio URLs and a balanced
//! condition assignment into qsf survey documents:
//!
//! - [`turns`] groups utterances into speaker turns;
//! - [`render`] renders a context window of turns as chat-bubble markup;
//! - [`assign`] distributes context conditions over anonymous participants;
//! - [`qsf`] patches the survey platform's template per participant.
//!
//! This file re-exports the core types and provides JSON helpers to read
//! conversations and URL maps and to persist assignment tables and surveys.
//
// Public modules
pub mod assign;
pub mod config;
pub mod error;
pub mod experiment;
pub mod model;
pub mod qsf;
pub mod render;
pub mod template;
pub mod turns;

// Re-export primary types for ergonomic use.
pub use assign::{assign_surveys, balanced_partition, AssignmentTable, Condition, WindowShape};
pub use config::{SurveyConfig, SurveyLayout};
pub use error::SurveyError;
pub use experiment::{AudioUrls, ExperimentId};
pub use model::{
    speaker_turn::SpeakerTurn,
    utterance::{Speaker, Utterance},
};
pub use render::{clean_transcript, render_context_window, render_preceding_context};
pub use turns::{locate_turn, make_speaker_turns};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = BufReader::new(
        File::open(path).with_context(|| format!("opening {}", path.display()))?,
    );
    serde_json::from_reader(file).with_context(|| format!("parsing {}", path.display()))
}

/// Serialize `value` to `path` as JSON with four-space indentation, creating
/// parent directories as needed.
pub fn write_json_pretty<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    let file = BufWriter::new(
        File::create(path).with_context(|| format!("creating {}", path.display()))?,
    );
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(file, formatter);
    value
        .serialize(&mut ser)
        .with_context(|| format!("writing {}", path.display()))?;
    ser.into_inner().flush()?;
    Ok(())
}

/// Load a conversation record (a JSON array of utterances).
pub fn load_conversation_json(path: &Path) -> Result<Vec<Utterance>> {
    read_json(path)
}

/// Load a qsf template (or any qsf document).
pub fn load_qsf_json(path: &Path) -> Result<serde_json::Value> {
    read_json(path)
}

/// Load an experiment id -> audio URLs map. Experiments keep the file's order,
/// which is the order questions appear in flat surveys.
pub fn load_urls_json(path: &Path) -> Result<AudioUrls> {
    read_json(path)
}

/// Save an experiment id -> audio URLs map.
pub fn save_urls_json(urls: &AudioUrls, path: &Path) -> Result<()> {
    write_json_pretty(urls, path)
}

/// Save an assignment table so later runs can rebuild the same surveys.
pub fn save_assignments_json(table: &AssignmentTable, path: &Path) -> Result<()> {
    write_json_pretty(table, path)
}

/// Load an assignment table written with `save_assignments_json`.
pub fn load_assignments_json(path: &Path) -> Result<AssignmentTable> {
    read_json(path)
}
