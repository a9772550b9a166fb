//! Survey build configuration.
//!
//! A single `SurveyConfig` carries everything a batch needs: survey id,
//! template and output locations, where experiments live, the context
//! conditions and how the template's elements are laid out. It is loaded
//! once (usually from TOML) and passed explicitly to the assigner and the
//! survey builder.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::assign::Condition;

/// Default QID number of the first generated question. QID1..QID3 belong to
/// the template's own consent and intro questions.
pub const DEFAULT_FIRST_QUESTION_ID: usize = 4;
/// Questions already present in the template and counted in the survey length.
pub const DEFAULT_TEMPLATE_QUESTION_COUNT: usize = 2;
pub const DEFAULT_REPEATS: usize = 3;

/// How generated questions are arranged in the survey.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SurveyLayout {
    /// Every question appended to the first block, separated by page breaks.
    #[default]
    Flat,
    /// One block per experiment, presented through the flow's block randomizer.
    Blocks,
}

impl SurveyLayout {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::Blocks => "blocks",
        }
    }
}

/// Positions of the fixed elements inside the template's `SurveyElements`.
///
/// The discrimination question template is always the last element and the
/// gender question template the second-to-last.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ElementLayout {
    pub blocks: usize,
    pub flow: usize,
    pub response_set: usize,
    pub question_count: usize,
    /// Elements `passthrough_start..passthrough_end` are copied unchanged.
    pub passthrough_start: usize,
    pub passthrough_end: usize,
    /// Index of the block randomizer inside the flow's `Flow` array.
    pub randomizer: usize,
    /// Block ids are `BL_{i + first_block_index}`.
    pub first_block_index: usize,
    /// Flow ids are `FL_{i + first_flow_index}`.
    pub first_flow_index: usize,
}

impl Default for ElementLayout {
    fn default() -> Self {
        ElementLayout {
            blocks: 0,
            flow: 1,
            response_set: 2,
            question_count: 7,
            passthrough_start: 2,
            passthrough_end: 10,
            randomizer: 1,
            first_block_index: 2,
            first_flow_index: 4,
        }
    }
}

fn default_conditions() -> Vec<Condition> {
    vec![
        Condition::new(0, 0, true),
        Condition::new(0, 0, false),
        Condition::new(4, 0, true),
        Condition::new(4, 0, false),
        Condition::new(2, 2, true),
        Condition::new(2, 2, false),
    ]
}

fn default_repeats() -> usize {
    DEFAULT_REPEATS
}

fn default_first_question_id() -> usize {
    DEFAULT_FIRST_QUESTION_ID
}

fn default_template_question_count() -> usize {
    DEFAULT_TEMPLATE_QUESTION_COUNT
}

/// Configuration for one survey batch.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SurveyConfig {
    /// Survey id stamped on every survey element.
    pub survey_id: String,
    /// qsf template (JSON).
    pub template: PathBuf,
    /// Audio player HTML snippet with a `$url` placeholder.
    pub audio_template: PathBuf,
    /// Optional wrapper for question text with a `$content` placeholder.
    #[serde(default)]
    pub question_template: Option<PathBuf>,
    /// Output files are `{output_prefix}_{participant}.qsf` and
    /// `{output_prefix}_assignments.json`.
    pub output_prefix: PathBuf,
    /// Directory holding one sub-directory per experiment.
    pub base_path: PathBuf,
    /// Public URL corresponding to `base_path`.
    pub base_url: String,
    /// `urls.json` mapping experiment ids to audio URLs.
    #[serde(default)]
    pub urls: Option<PathBuf>,
    #[serde(default)]
    pub layout: SurveyLayout,
    /// Ordered conditions; the order defines condition indices.
    #[serde(default = "default_conditions")]
    pub conditions: Vec<Condition>,
    #[serde(default = "default_repeats")]
    pub repeats: usize,
    /// Blocks shown per participant by the block randomizer.
    #[serde(default)]
    pub questions_per_participant: Option<usize>,
    #[serde(default = "default_first_question_id")]
    pub first_question_id: usize,
    #[serde(default = "default_template_question_count")]
    pub template_question_count: usize,
    #[serde(default)]
    pub elements: ElementLayout,
}

impl SurveyConfig {
    /// Load a TOML config; relative paths are resolved against the config
    /// file's directory.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let mut cfg: SurveyConfig = toml::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        if let Some(dir) = path.parent() {
            cfg.resolve_relative_to(dir);
        }
        Ok(cfg)
    }

    /// Prefix every relative path with `dir`.
    pub fn resolve_relative_to(&mut self, dir: &Path) {
        let fix = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = dir.join(&*p);
            }
        };
        fix(&mut self.template);
        fix(&mut self.audio_template);
        fix(&mut self.output_prefix);
        fix(&mut self.base_path);
        if let Some(p) = self.question_template.as_mut() {
            fix(p);
        }
        if let Some(p) = self.urls.as_mut() {
            fix(p);
        }
    }

    /// Output path of one participant's survey.
    pub fn survey_output_path(&self, participant: &str) -> PathBuf {
        suffixed(&self.output_prefix, &format!("_{}.qsf", participant))
    }

    /// Output path of the persisted assignment table.
    pub fn assignments_output_path(&self) -> PathBuf {
        suffixed(&self.output_prefix, "_assignments.json")
    }

    /// Location of an experiment's conversation record.
    pub fn conversation_path(&self, experiment_id: &str) -> PathBuf {
        self.base_path.join(experiment_id).join("conversation.json")
    }
}

fn suffixed(prefix: &Path, suffix: &str) -> PathBuf {
    let mut s = prefix.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_takes_defaults() {
        let cfg: SurveyConfig = toml::from_str(
            r#"
            survey_id = "SV_test"
            template = "template_discrim.json"
            audio_template = "audio_template.html"
            output_prefix = "out/discrim"
            base_path = "/data/experiments"
            base_url = "https://example.org/experiments/"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.layout, SurveyLayout::Flat);
        assert_eq!(cfg.conditions.len(), 6);
        assert_eq!(cfg.repeats, 3);
        assert_eq!(cfg.first_question_id, 4);
        assert_eq!(cfg.elements, ElementLayout::default());
        assert_eq!(
            cfg.survey_output_path("c"),
            PathBuf::from("out/discrim_c.qsf")
        );
    }

    #[test]
    fn explicit_conditions_and_layout() {
        let cfg: SurveyConfig = toml::from_str(
            r#"
            survey_id = "SV_test"
            template = "t.json"
            audio_template = "a.html"
            output_prefix = "out/blocks"
            base_path = "data"
            base_url = "https://example.org/"
            layout = "blocks"
            repeats = 1
            questions_per_participant = 20
            conditions = [
                { window = { before = 0, after = 0 }, individual = true },
                { window = { before = 3, after = 3 } },
            ]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.layout, SurveyLayout::Blocks);
        assert_eq!(
            cfg.conditions,
            vec![Condition::new(0, 0, true), Condition::new(3, 3, false)]
        );
        assert_eq!(cfg.questions_per_participant, Some(20));
    }

    #[test]
    fn relative_paths_follow_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("survey.toml");
        fs::write(
            &path,
            r#"
            survey_id = "SV_x"
            template = "t.json"
            audio_template = "/abs/a.html"
            output_prefix = "out/x"
            base_path = "data"
            base_url = "https://example.org/"
            "#,
        )
        .unwrap();
        let cfg = SurveyConfig::from_toml_file(&path).unwrap();
        assert_eq!(cfg.template, dir.path().join("t.json"));
        assert_eq!(cfg.audio_template, PathBuf::from("/abs/a.html"));
        assert_eq!(
            cfg.conversation_path("sw_1_2_3_4_5"),
            dir.path().join("data/sw_1_2_3_4_5/conversation.json")
        );
    }
}
