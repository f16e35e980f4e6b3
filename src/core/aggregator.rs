use std::collections::BTreeMap;

use crate::core::constraints::ConstraintModel;
use crate::core::error::{EngineError, InfeasibleConstraintError};
use crate::models::{EstimationMethod, ProbabilityResult};

/// Tolerance for row and column sums
pub const SUM_TOLERANCE: f64 = 1e-9;

/// How often each (woman, man) pair occurred across recorded bijections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tally {
    counts: Vec<Vec<u64>>,
    total: u64,
}

impl Tally {
    pub fn new(size: usize) -> Self {
        Self {
            counts: vec![vec![0; size]; size],
            total: 0,
        }
    }

    /// Record one bijection, partner[w] = m
    pub fn record(&mut self, partner: &[usize]) {
        for (w, &m) in partner.iter().enumerate() {
            self.counts[w][m] += 1;
        }
        self.total += 1;
    }

    pub fn count(&self, woman: usize, man: usize) -> u64 {
        self.counts[woman][man]
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Number of women (and men) covered
    pub fn size(&self) -> usize {
        self.counts.len()
    }

    /// Share of recorded bijections containing (woman, man)
    pub fn frequency(&self, woman: usize, man: usize) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.counts[woman][man] as f64 / self.total as f64
        }
    }

    /// Add another tally over the same roster
    pub fn merge(&mut self, other: &Tally) {
        for (row, other_row) in self.counts.iter_mut().zip(&other.counts) {
            for (count, other_count) in row.iter_mut().zip(other_row) {
                *count += other_count;
            }
        }
        self.total += other.total;
    }
}

/// Turn pair frequencies into a probability table
///
/// Divides once per cell so a pair present in every bijection comes out
/// as exactly 1.0 and a pair present in none as exactly 0.0.
pub fn aggregate(
    model: &ConstraintModel,
    tally: &Tally,
    method: EstimationMethod,
) -> Result<ProbabilityResult, EngineError> {
    if tally.total == 0 {
        return Err(InfeasibleConstraintError::new(
            "the matching-night lights and matchboxes contradict each other",
        )
        .into());
    }

    let total = tally.total as f64;
    let size = model.size();
    let mut probabilities = BTreeMap::new();
    for (w, woman) in model.women.iter().enumerate() {
        let row: BTreeMap<String, f64> = model
            .men
            .iter()
            .enumerate()
            .map(|(m, man)| (man.clone(), tally.counts[w][m] as f64 / total))
            .collect();
        probabilities.insert(woman.clone(), row);
    }

    for &(w, m) in &model.confirmed {
        if tally.counts[w][m] != tally.total {
            return Err(EngineError::Computation(format!(
                "confirmed pair {} is missing from some permutations",
                model.pair((w, m))
            )));
        }
    }
    for &(w, m) in &model.excluded {
        if tally.counts[w][m] != 0 {
            return Err(EngineError::Computation(format!(
                "excluded pair {} appears in a permutation",
                model.pair((w, m))
            )));
        }
    }

    for i in 0..size {
        let row: f64 = (0..size).map(|m| tally.counts[i][m] as f64 / total).sum();
        let column: f64 = (0..size).map(|w| tally.counts[w][i] as f64 / total).sum();
        if (row - 1.0).abs() > SUM_TOLERANCE || (column - 1.0).abs() > SUM_TOLERANCE {
            return Err(EngineError::Computation(format!(
                "probabilities for {} / {} do not sum to 1 (row {}, column {})",
                model.women[i], model.men[i], row, column
            )));
        }
    }

    Ok(ProbabilityResult {
        women: model.women.clone(),
        men: model.men.clone(),
        probabilities,
        permutation_count: tally.total,
        method,
    })
}
