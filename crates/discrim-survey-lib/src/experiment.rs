//! Experiment identifiers and audio URL discovery.
//!
//! Every experiment lives in its own directory named by its id, e.g.
//! `sw_40106_148_4_4_2` or, when the target speaker's gender is known,
//! `sw_40106_148_4_4_M_2`. The directory holds `conversation.json` and one
//! `.wav` per audio choice (`0.wav`, `1.wav`, `0_indv.wav`, ...).

use std::fmt;
use std::path::Path;

use indexmap::IndexMap;

use crate::error::{Result, SurveyError};

/// Experiment id -> audio URLs, in the order experiments were listed.
pub type AudioUrls = IndexMap<String, Vec<String>>;

/// Speaker gender encoded in an experiment id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gender {
    Male,
    Female,
}

/// A parsed experiment directory name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentId {
    raw: String,
    target_utter_id: u64,
    gender: Option<Gender>,
}

impl ExperimentId {
    /// Parse an experiment id.
    ///
    /// The target utterance id is the fourth underscore-separated field from
    /// the end, or the fifth when a gender tag sits third-to-last.
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = || SurveyError::InvalidExperimentId(raw.to_string());

        let gender = match raw.chars().rev().nth(2) {
            Some('M') => Some(Gender::Male),
            Some('F') => Some(Gender::Female),
            _ => None,
        };
        let from_end = if gender.is_some() { 5 } else { 4 };

        let fields: Vec<&str> = raw.split('_').collect();
        let idx = fields.len().checked_sub(from_end).ok_or_else(invalid)?;
        let target_utter_id = fields[idx].parse::<u64>().map_err(|_| invalid())?;

        Ok(ExperimentId {
            raw: raw.to_string(),
            target_utter_id,
            gender,
        })
    }

    /// Id of the utterance whose audio is being judged.
    pub fn target_utter_id(&self) -> u64 {
        self.target_utter_id
    }

    pub fn gender(&self) -> Option<Gender> {
        self.gender
    }
}

impl fmt::Display for ExperimentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn file_name(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

/// Whether `url` points at an individual rendition (`*indv.wav`).
pub fn is_individual_variant(url: &str) -> bool {
    let name = file_name(url);
    let stem = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
    stem.ends_with("indv")
}

/// Choice slot of an audio file: its leading digit plus one.
pub fn choice_slot(url: &str) -> Option<usize> {
    file_name(url)
        .chars()
        .next()
        .and_then(|c| c.to_digit(10))
        .map(|d| d as usize + 1)
}

/// Audio URLs for a condition: individual renditions in individual mode,
/// everything else otherwise.
pub fn select_audio(urls: &[String], individual: bool) -> Vec<&str> {
    urls.iter()
        .map(String::as_str)
        .filter(|u| is_individual_variant(u) == individual)
        .collect()
}

/// Discover experiments under `base_path` and build their audio URLs.
///
/// When `experiment_ids` is empty every directory directly under `base_path`
/// is an experiment. Each `*.wav` inside becomes
/// `{base_url}/{experiment_id}/{file_name}`.
pub fn collect_audio_urls(
    base_path: &Path,
    base_url: &str,
    experiment_ids: &[String],
) -> Result<AudioUrls> {
    let escaped_base = glob::Pattern::escape(&base_path.to_string_lossy());

    let ids: Vec<String> = if experiment_ids.is_empty() {
        let mut found = Vec::new();
        for entry in glob::glob(&format!("{}/*", escaped_base))? {
            let path = entry.map_err(std::io::Error::from)?;
            if !path.is_dir() {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                found.push(name.to_string());
            }
        }
        found
    } else {
        experiment_ids.to_vec()
    };

    let base_url = base_url.trim_end_matches('/');
    let mut urls = AudioUrls::new();
    for exp_id in ids {
        let pattern = format!("{}/{}/*.wav", escaped_base, glob::Pattern::escape(&exp_id));
        let mut exp_urls = Vec::new();
        for entry in glob::glob(&pattern)? {
            let path = entry.map_err(std::io::Error::from)?;
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                exp_urls.push(format!("{}/{}/{}", base_url, exp_id, name));
            }
        }
        if exp_urls.is_empty() {
            log::warn!("experiment {} has no .wav files", exp_id);
        }
        urls.insert(exp_id, exp_urls);
    }

    log::info!(
        "collected audio urls for {} experiments under {}",
        urls.len(),
        base_path.display()
    );
    Ok(urls)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_id() {
        let id = ExperimentId::parse("sw_40106_148_4_4_2").unwrap();
        assert_eq!(id.target_utter_id(), 148);
        assert_eq!(id.gender(), None);
        assert_eq!(id.to_string(), "sw_40106_148_4_4_2");
    }

    #[test]
    fn parses_gendered_id() {
        let id = ExperimentId::parse("sw_40106_148_4_4_F_2").unwrap();
        assert_eq!(id.target_utter_id(), 148);
        assert_eq!(id.gender(), Some(Gender::Female));
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!(ExperimentId::parse("sw_2").is_err());
        assert!(ExperimentId::parse("sw_40106_x_4_4_2").is_err());
    }

    #[test]
    fn splits_individual_variants() {
        let urls = vec![
            "https://host/exp/0.wav".to_string(),
            "https://host/exp/1.wav".to_string(),
            "https://host/exp/0_indv.wav".to_string(),
        ];
        assert_eq!(select_audio(&urls, true), vec!["https://host/exp/0_indv.wav"]);
        assert_eq!(
            select_audio(&urls, false),
            vec!["https://host/exp/0.wav", "https://host/exp/1.wav"]
        );
        assert_eq!(choice_slot("https://host/exp/1.wav"), Some(2));
        assert_eq!(choice_slot("https://host/exp/x.wav"), None);
    }
}
