//! Balanced random assignment of context conditions to participants.
//!
//! Each anonymous participant (a letter key) sees every experiment exactly
//! once, under one condition. For every experiment the participant keys are
//! shuffled and split into one near-equal group per condition, so each
//! condition is seen by the same number of participants (give or take one).

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SurveyError};

/// Participant key alphabet; its length caps the number of participants.
pub const PARTICIPANT_ALPHABET: &str = "abcdefghijklmnopqrstuvwxyz";

/// Number of speaker turns shown before and after the target turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowShape {
    pub before: usize,
    pub after: usize,
}

/// A context condition: window shape plus individual-mode flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Condition {
    pub window: WindowShape,
    #[serde(default)]
    pub individual: bool,
}

impl Condition {
    pub fn new(before: usize, after: usize, individual: bool) -> Self {
        Condition {
            window: WindowShape { before, after },
            individual,
        }
    }
}

/// Per-participant condition assignments for a batch of experiments.
///
/// `experiment_ids` keeps the input order so surveys list experiments the way
/// they were supplied; `participants` maps key -> experiment id -> condition
/// index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentTable {
    pub experiment_ids: Vec<String>,
    pub participants: BTreeMap<String, BTreeMap<String, usize>>,
}

impl AssignmentTable {
    /// Participant keys in alphabetical order.
    pub fn participant_keys(&self) -> impl Iterator<Item = &str> {
        self.participants.keys().map(String::as_str)
    }

    /// Condition index assigned to `participant` for `experiment_id`.
    pub fn condition_for(&self, participant: &str, experiment_id: &str) -> Option<usize> {
        self.participants
            .get(participant)
            .and_then(|m| m.get(experiment_id))
            .copied()
    }

    /// `(experiment_id, condition index)` pairs for one participant, in
    /// experiment input order.
    pub fn structure<'a>(
        &'a self,
        participant: &'a str,
    ) -> impl Iterator<Item = (&'a str, usize)> + 'a {
        self.experiment_ids.iter().filter_map(move |exp_id| {
            self.condition_for(participant, exp_id)
                .map(|c| (exp_id.as_str(), c))
        })
    }

    /// Number of participants holding each condition for `experiment_id`.
    pub fn condition_counts(&self, experiment_id: &str, n_conditions: usize) -> Vec<usize> {
        let mut counts = vec![0usize; n_conditions];
        for assignments in self.participants.values() {
            if let Some(&c) = assignments.get(experiment_id) {
                if c < n_conditions {
                    counts[c] += 1;
                }
            }
        }
        counts
    }
}

/// The first `n` participant keys.
///
/// # Errors
///
/// `SurveyError::CapacityExceeded` when `n` exceeds the alphabet.
pub fn participant_keys(n: usize) -> Result<Vec<String>> {
    let available = PARTICIPANT_ALPHABET.len();
    if n > available {
        return Err(SurveyError::CapacityExceeded {
            requested: n,
            available,
        });
    }
    Ok(PARTICIPANT_ALPHABET
        .chars()
        .take(n)
        .map(String::from)
        .collect())
}

/// Split `items` into `parts` contiguous groups whose sizes differ by at most
/// one, larger groups first. `parts == 0` yields no groups.
pub fn balanced_partition<T: Clone>(items: &[T], parts: usize) -> Vec<Vec<T>> {
    if parts == 0 {
        return Vec::new();
    }
    let base = items.len() / parts;
    let extra = items.len() % parts;

    let mut groups = Vec::with_capacity(parts);
    let mut offset = 0;
    for i in 0..parts {
        let size = base + usize::from(i < extra);
        groups.push(items[offset..offset + size].to_vec());
        offset += size;
    }
    groups
}

/// Assign every participant one condition per experiment.
///
/// Participants are the first `conditions.len() * repeats` keys. Each
/// experiment consumes one shuffle from `rng`; group `i` of the balanced split
/// receives condition `i`.
///
/// # Errors
///
/// `SurveyError::CapacityExceeded` when more participants are needed than
/// there are keys; no table is built in that case.
pub fn assign_surveys<R: Rng + ?Sized>(
    experiment_ids: &[String],
    conditions: &[Condition],
    repeats: usize,
    rng: &mut R,
) -> Result<AssignmentTable> {
    let n_participants = conditions.len().saturating_mul(repeats);
    let keys = participant_keys(n_participants)?;

    let mut table = AssignmentTable {
        experiment_ids: experiment_ids.to_vec(),
        participants: keys
            .iter()
            .map(|k| (k.clone(), BTreeMap::new()))
            .collect(),
    };

    for exp_id in experiment_ids {
        let mut shuffled = keys.clone();
        shuffled.shuffle(rng);
        for (condition, group) in balanced_partition(&shuffled, conditions.len())
            .into_iter()
            .enumerate()
        {
            for key in group {
                if let Some(assignments) = table.participants.get_mut(&key) {
                    assignments.insert(exp_id.clone(), condition);
                }
            }
        }
    }

    log::info!(
        "assigned {} experiments across {} participants ({} conditions x {} repeats)",
        experiment_ids.len(),
        n_participants,
        conditions.len(),
        repeats
    );
    Ok(table)
}
