use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a probability table was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimationMethod {
    /// Every consistent permutation was counted
    Exact,
    /// Marginals estimated from a seeded Markov chain
    Sampled,
}

/// Per-pair perfect-match probabilities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityResult {
    pub women: Vec<String>,
    pub men: Vec<String>,
    /// woman -> man -> probability
    pub probabilities: BTreeMap<String, BTreeMap<String, f64>>,
    /// Consistent permutations counted (exact) or states recorded (sampled)
    #[serde(rename = "permutationCount")]
    pub permutation_count: u64,
    pub method: EstimationMethod,
}

impl ProbabilityResult {
    /// Probability that `woman` and `man` are a perfect match
    pub fn get(&self, woman: &str, man: &str) -> Option<f64> {
        self.probabilities.get(woman)?.get(man).copied()
    }

    /// Sum of a woman's probabilities over all men
    pub fn row_sum(&self, woman: &str) -> f64 {
        self.probabilities
            .get(woman)
            .map(|row| row.values().sum())
            .unwrap_or(0.0)
    }

    /// Sum of a man's probabilities over all women
    pub fn column_sum(&self, man: &str) -> f64 {
        self.probabilities
            .values()
            .filter_map(|row| row.get(man))
            .sum()
    }

    /// Most likely partner for a woman, ties broken by name
    pub fn best_match_for(&self, woman: &str) -> Option<(&str, f64)> {
        self.probabilities.get(woman)?.iter().fold(None, |best, (man, &p)| match best {
            Some((_, best_p)) if best_p >= p => best,
            _ => Some((man.as_str(), p)),
        })
    }
}

/// Outbound worker message
///
/// Zero or more `progress` messages, then exactly one `result` or `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerMessage {
    Progress { progress: f64, step: String },
    Result { result: ProbabilityResult },
    Error { error: String },
}

impl WorkerMessage {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkerMessage::Progress { .. })
    }
}

/// Outbound message tagged with the submission it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerEvent {
    pub generation: u64,
    pub message: WorkerMessage,
}
