//! Markov-chain Monte Carlo estimate of pair marginals for large rosters.
//!
//! Several independent chains walk over consistent bijections, each seeded
//! from `seed` plus its index and started from its own randomized search.
//! Each move picks a block of k women (2 <= k <= 5) and redraws their
//! partners uniformly among every reassignment of the block's men that keeps
//! the whole assignment consistent. That is a Gibbs step on the uniform
//! distribution, so uniform is stationary; with k equal to the roster size a
//! single move reaches every state.
//!
//! Error bound: every marginal is a frequency over `samples` recorded states.
//! For independent draws its standard error is at most 0.5 / sqrt(samples)
//! (about 0.0016 at 100 000 samples). On heavily constrained seasons the
//! consistent bijections can fall apart into pieces no block move connects,
//! so every run carries diagnostics and [`SampleRun::unreliable`] names the
//! reason a run must not be reported:
//!
//! - a chain never left its starting assignment,
//! - chains disagree by more than the sampling noise allows,
//! - the run kept revisiting a small set of assignments, so exact
//!   enumeration is cheap.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

use crate::core::aggregator::Tally;
use crate::core::enumerator::{find_consistent, SearchSpace};
use crate::core::error::{EngineError, InfeasibleConstraintError};
use crate::core::progress::{CancelToken, ProgressReporter, Stage};

/// Largest block of women redrawn in one move
const MAX_BLOCK: usize = 5;

/// A run with fewer than one distinct assignment per this many samples
/// covered a space small enough to enumerate
const SMALL_SPACE_RATIO: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerSettings {
    pub samples: u64,
    pub burn_in: u64,
    pub thinning: u64,
    pub chains: u64,
    pub seed: u64,
    pub cancel_check_interval: u64,
    /// Smallest marginal disagreement between chains that marks a run
    /// unreliable
    pub max_chain_spread: f64,
}

/// One chain's share of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainRun {
    pub tally: Tally,
    pub moves: u64,
    /// Moves after burn-in that changed the assignment
    pub accepted: u64,
}

/// Pooled result of all chains
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleRun {
    pub tally: Tally,
    pub chains: Vec<ChainRun>,
    /// Distinct recorded assignments, counted up to the small-space cutoff
    pub distinct_states: u64,
}

impl SampleRun {
    pub fn moves(&self) -> u64 {
        self.chains.iter().map(|c| c.moves).sum()
    }

    pub fn accepted(&self) -> u64 {
        self.chains.iter().map(|c| c.accepted).sum()
    }

    pub fn acceptance_rate(&self) -> f64 {
        let moves = self.moves();
        if moves == 0 {
            0.0
        } else {
            self.accepted() as f64 / moves as f64
        }
    }

    /// Largest difference between one chain's marginal and the pooled one
    pub fn chain_spread(&self) -> f64 {
        let size = self.tally.size();
        let mut spread: f64 = 0.0;
        for chain in self.chains.iter().filter(|c| c.tally.total() > 0) {
            for w in 0..size {
                for m in 0..size {
                    spread = spread.max((chain.tally.frequency(w, m) - self.tally.frequency(w, m)).abs());
                }
            }
        }
        spread
    }

    /// Spread the sampling noise of the smallest chain can explain
    pub fn spread_tolerance(&self, max_chain_spread: f64) -> f64 {
        let smallest = self
            .chains
            .iter()
            .map(|c| c.tally.total())
            .filter(|&t| t > 0)
            .min()
            .unwrap_or(1);
        max_chain_spread.max(5.0 * 0.5 / (smallest as f64).sqrt())
    }

    /// Why this run's frequencies must not be reported, if they must not
    pub fn unreliable(&self, max_chain_spread: f64) -> Option<String> {
        if self.tally.size() >= 2 {
            if let Some(i) = self.chains.iter().position(|c| c.tally.total() > 0 && c.accepted == 0) {
                return Some(format!("chain {} never left its starting assignment", i));
            }
        }

        let spread = self.chain_spread();
        let tolerance = self.spread_tolerance(max_chain_spread);
        if spread > tolerance {
            return Some(format!(
                "chains disagree by {:.3} (tolerance {:.3})",
                spread, tolerance
            ));
        }

        if self.distinct_states * SMALL_SPACE_RATIO < self.tally.total() {
            return Some(format!(
                "only {} distinct assignments in {} samples",
                self.distinct_states,
                self.tally.total()
            ));
        }
        None
    }
}

/// Every ordering of `0..k`
fn permutations(k: usize) -> Vec<Vec<usize>> {
    if k == 0 {
        return vec![Vec::new()];
    }
    let mut all = Vec::new();
    for rest in permutations(k - 1) {
        for slot in 0..k {
            let mut perm = rest.clone();
            perm.insert(slot, k - 1);
            all.push(perm);
        }
    }
    all
}

/// Estimate pair frequencies by sampling consistent bijections
pub fn sample(
    space: &SearchSpace,
    settings: &SamplerSettings,
    cancel: &CancelToken,
    reporter: &mut ProgressReporter<'_>,
) -> Result<SampleRun, EngineError> {
    let size = space.size();
    let check_interval = settings.cancel_check_interval.max(1);
    let samples = settings.samples.max(1);
    let thinning = settings.thinning.max(1);
    let chains = settings.chains.clamp(1, samples);
    let total_moves = settings.burn_in * chains + samples * thinning;

    // blocks[k] holds every reordering of a block of k women
    let max_block = MAX_BLOCK.min(size);
    let blocks: Vec<Vec<Vec<usize>>> = (0..=max_block).map(permutations).collect();
    let distinct_cap = samples / SMALL_SPACE_RATIO + 1;
    let mut distinct: HashSet<Vec<u8>> = HashSet::new();

    reporter.update(Stage::Sampling, 0.0);
    let mut pooled = Tally::new(size);
    let mut runs = Vec::with_capacity(chains as usize);
    let mut step = 0u64;

    for chain in 0..chains {
        let mut rng = StdRng::seed_from_u64(settings.seed.wrapping_add(chain));
        let mut partner = find_consistent(space, cancel, check_interval, &mut rng)?.ok_or_else(|| {
            InfeasibleConstraintError::new("the matching-night lights and matchboxes contradict each other")
        })?;

        let chain_samples = samples / chains + u64::from(chain < samples % chains);
        let moves = settings.burn_in + chain_samples * thinning;
        let mut tally = Tally::new(size);
        let mut accepted = 0u64;
        let mut women = Vec::with_capacity(max_block);
        let mut current = Vec::with_capacity(max_block);
        let mut proposal = Vec::with_capacity(max_block);
        let mut valid = Vec::new();

        for mv in 1..=moves {
            step += 1;
            if step % check_interval == 0 {
                if cancel.is_cancelled() {
                    return Err(EngineError::Cancelled);
                }
                reporter.update(Stage::Sampling, step as f64 / total_moves as f64);
            }

            if size >= 2 {
                let k = rng.gen_range(2..=max_block);
                women.clear();
                women.extend(index::sample(&mut rng, size, k).into_iter());
                current.clear();
                current.extend(women.iter().map(|&w| partner[w]));

                valid.clear();
                for (i, order) in blocks[k].iter().enumerate() {
                    proposal.clear();
                    proposal.extend(order.iter().map(|&j| current[j]));
                    if space.reassignment_keeps_consistent(&partner, &women, &proposal) {
                        valid.push(i);
                    }
                }

                // The current assignment is always among the valid ones
                if !valid.is_empty() {
                    let order = &blocks[k][valid[rng.gen_range(0..valid.len())]];
                    let mut moved = false;
                    for (&w, &j) in women.iter().zip(order) {
                        moved |= partner[w] != current[j];
                        partner[w] = current[j];
                    }
                    if moved && mv > settings.burn_in {
                        accepted += 1;
                    }
                }
            }

            if mv > settings.burn_in && (mv - settings.burn_in) % thinning == 0 {
                tally.record(&partner);
                if (distinct.len() as u64) < distinct_cap {
                    distinct.insert(partner.iter().map(|&m| m as u8).collect());
                }
            }
        }

        tracing::debug!(
            "Chain {} recorded {} states, {} accepted moves after burn-in",
            chain,
            tally.total(),
            accepted
        );
        pooled.merge(&tally);
        runs.push(ChainRun {
            tally,
            moves,
            accepted,
        });
    }
    reporter.update(Stage::Sampling, 1.0);

    let run = SampleRun {
        tally: pooled,
        chains: runs,
        distinct_states: distinct.len() as u64,
    };
    tracing::debug!(
        "Sampled {} states over {} moves (acceptance {:.3}, chain spread {:.4})",
        run.tally.total(),
        run.moves(),
        run.acceptance_rate(),
        run.chain_spread()
    );
    Ok(run)
}
