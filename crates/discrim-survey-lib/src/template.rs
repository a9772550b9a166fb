//! `$name` placeholder substitution for HTML snippets (audio player, question
//! wrapper).
//!
//! Supported forms are `$name`, `${name}` and `$$` for a literal dollar sign.
//! A placeholder without a value is an error; a lone `$` not followed by a
//! name is copied through.

use std::fs;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::error::{Result, SurveyError};

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$(?:(\$)|([A-Za-z_][A-Za-z0-9_]*)|\{([A-Za-z_][A-Za-z0-9_]*)\})")
        .expect("valid regex")
});

/// A loaded HTML snippet with `$name` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlTemplate {
    source: String,
}

impl HtmlTemplate {
    pub fn new(source: impl Into<String>) -> Self {
        HtmlTemplate {
            source: source.into(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        Ok(Self::new(fs::read_to_string(path)?))
    }

    /// Substitute every placeholder with its value from `vars`.
    pub fn substitute(&self, vars: &[(&str, &str)]) -> Result<String> {
        substitute(&self.source, vars)
    }
}

/// Substitute `$name` / `${name}` placeholders in `source`.
pub fn substitute(source: &str, vars: &[(&str, &str)]) -> Result<String> {
    let mut out = String::with_capacity(source.len());
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(source) {
        let whole = caps.get(0).expect("group 0 always matches");
        out.push_str(&source[last..whole.start()]);
        out.push_str(resolve(&caps, vars)?);
        last = whole.end();
    }
    out.push_str(&source[last..]);
    Ok(out)
}

fn resolve<'a>(caps: &Captures<'_>, vars: &[(&str, &'a str)]) -> Result<&'a str> {
    if caps.get(1).is_some() {
        return Ok("$");
    }
    let name = caps
        .get(2)
        .or_else(|| caps.get(3))
        .map(|m| m.as_str())
        .unwrap_or_default();
    vars.iter()
        .find(|(k, _)| *k == name)
        .map(|(_, v)| *v)
        .ok_or_else(|| SurveyError::MissingTemplateVar(name.to_string()))
}
