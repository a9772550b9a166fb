use thiserror::Error;

/// Errors raised by turn segmentation, rendering, assignment and survey assembly.
///
/// All variants are deterministic logic or input errors; callers are expected
/// to abort the batch rather than retry.
#[derive(Debug, Error)]
pub enum SurveyError {
    #[error("cannot build speaker turns from an empty utterance list")]
    EmptyInput,

    #[error("utterance {utter_id} is not part of any speaker turn")]
    NotFound { utter_id: u64 },

    #[error("{requested} participant slots requested but only {available} participant keys exist")]
    CapacityExceeded { requested: usize, available: usize },

    #[error("invalid experiment id '{0}'")]
    InvalidExperimentId(String),

    #[error("no value supplied for template placeholder '${0}'")]
    MissingTemplateVar(String),

    #[error("survey template: {0}")]
    Template(String),

    #[error("invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SurveyError>;
