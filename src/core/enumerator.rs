use rand::seq::SliceRandom;
use rand::Rng;

use crate::core::aggregator::Tally;
use crate::core::constraints::ConstraintModel;
use crate::core::error::EngineError;
use crate::core::progress::{CancelToken, ProgressReporter, Stage};

/// A matching night as seen by the search
#[derive(Debug, Clone)]
struct NightCheck {
    /// partner[w] is the man woman `w` sat with that night
    partner: Vec<Option<usize>>,
    lights: usize,
}

/// Candidate bijections, as allowed-partner bitmasks plus night constraints
#[derive(Debug, Clone)]
pub struct SearchSpace {
    size: usize,
    /// Bit `m` of allowed[w] is set if (w, m) is not excluded
    allowed: Vec<u64>,
    nights: Vec<NightCheck>,
}

impl SearchSpace {
    pub fn from_model(model: &ConstraintModel) -> Self {
        let size = model.size();
        let allowed = (0..size)
            .map(|w| {
                (0..size)
                    .filter(|&m| model.is_allowed(w, m))
                    .fold(0u64, |mask, m| mask | (1u64 << m))
            })
            .collect();
        let nights = model
            .nights
            .iter()
            .map(|night| NightCheck {
                partner: night.partner_by_woman(size),
                lights: night.lights,
            })
            .collect();

        Self { size, allowed, nights }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn allows(&self, woman: usize, man: usize) -> bool {
        self.allowed[woman] & (1u64 << man) != 0
    }

    /// Women left without any allowed partner
    pub fn stranded_women(&self) -> Vec<usize> {
        (0..self.size).filter(|&w| self.allowed[w] == 0).collect()
    }

    /// Men left without any allowed partner
    pub fn stranded_men(&self) -> Vec<usize> {
        let covered = self.allowed.iter().fold(0u64, |acc, mask| acc | mask);
        (0..self.size).filter(|&m| covered & (1u64 << m) == 0).collect()
    }

    /// Upper bound on the number of bijections left by the allowed pairs
    ///
    /// Bregman's bound on the permanent: prod over women of (r!)^(1/r),
    /// where r is the number of allowed partners. Exact (n!) when nothing
    /// is excluded.
    pub fn size_estimate(&self) -> f64 {
        let log_bound: f64 = self
            .allowed
            .iter()
            .map(|mask| {
                let r = mask.count_ones();
                if r == 0 {
                    return f64::NEG_INFINITY;
                }
                let log_factorial: f64 = (2..=r).map(|k| (k as f64).ln()).sum();
                log_factorial / r as f64
            })
            .sum();
        log_bound.exp()
    }

    /// Whether a full assignment (partner[w] = m) satisfies every constraint
    pub fn is_consistent(&self, partner: &[usize]) -> bool {
        if partner.len() != self.size {
            return false;
        }
        let mut used = 0u64;
        for (w, &m) in partner.iter().enumerate() {
            if m >= self.size || used & (1u64 << m) != 0 || !self.allows(w, m) {
                return false;
            }
            used |= 1u64 << m;
        }
        self.nights.iter().all(|night| {
            let hits = partner
                .iter()
                .enumerate()
                .filter(|&(w, &m)| night.partner[w] == Some(m))
                .count();
            hits == night.lights
        })
    }

    /// Whether giving woman `women[i]` the partner `men[i]` keeps a
    /// consistent assignment consistent
    ///
    /// `men` must be a permutation of the current partners of `women`, so
    /// the assignment stays a bijection and only these women's night
    /// agreements can change.
    pub fn reassignment_keeps_consistent(&self, partner: &[usize], women: &[usize], men: &[usize]) -> bool {
        if women.iter().zip(men).any(|(&w, &m)| !self.allows(w, m)) {
            return false;
        }
        self.nights.iter().all(|night| {
            let before = women
                .iter()
                .filter(|&&w| night.partner[w] == Some(partner[w]))
                .count();
            let after = women
                .iter()
                .zip(men)
                .filter(|&(&w, &m)| night.partner[w] == Some(m))
                .count();
            before == after
        })
    }

    /// Fail-first order: women with the fewest allowed partners go first
    fn search_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.size).collect();
        order.sort_by_key(|&w| (self.allowed[w].count_ones(), w));
        order
    }

    fn full_mask(&self) -> u64 {
        if self.size >= 64 {
            u64::MAX
        } else {
            (1u64 << self.size) - 1
        }
    }
}

/// Partial-assignment backtracking over a [`SearchSpace`]
///
/// Women are assigned in fail-first order. After every assignment each night
/// is checked: agreements so far may not exceed its lights, and agreements so
/// far plus agreements still reachable must meet them.
struct Backtracker<'a> {
    space: &'a SearchSpace,
    order: Vec<usize>,
    partner: Vec<usize>,
    hits: Vec<usize>,
    cancel: &'a CancelToken,
    check_interval: u64,
    nodes: u64,
    budget: u64,
    exhausted: bool,
}

impl<'a> Backtracker<'a> {
    fn new(space: &'a SearchSpace, cancel: &'a CancelToken, check_interval: u64, budget: u64) -> Self {
        Self {
            space,
            order: space.search_order(),
            partner: vec![usize::MAX; space.size],
            hits: vec![0; space.nights.len()],
            cancel,
            check_interval: check_interval.max(1),
            nodes: 0,
            budget,
            exhausted: false,
        }
    }

    /// Visit a node; true when the caller should poll for cancellation
    fn tick(&mut self) -> bool {
        self.nodes += 1;
        self.nodes % self.check_interval == 0
    }

    fn feasible(&self, depth: usize, used: u64) -> bool {
        self.space.nights.iter().zip(&self.hits).all(|(night, &hits)| {
            if hits > night.lights {
                return false;
            }
            let reachable = self.order[depth..]
                .iter()
                .filter(|&&w| match night.partner[w] {
                    Some(m) => used & (1u64 << m) == 0 && self.space.allows(w, m),
                    None => false,
                })
                .count();
            hits + reachable >= night.lights
        })
    }

    fn assign(&mut self, woman: usize, man: usize) {
        self.partner[woman] = man;
        for (night, hits) in self.space.nights.iter().zip(self.hits.iter_mut()) {
            if night.partner[woman] == Some(man) {
                *hits += 1;
            }
        }
    }

    fn unassign(&mut self, woman: usize, man: usize) {
        self.partner[woman] = usize::MAX;
        for (night, hits) in self.space.nights.iter().zip(self.hits.iter_mut()) {
            if night.partner[woman] == Some(man) {
                *hits -= 1;
            }
        }
    }

    fn candidates(&self, woman: usize, used: u64) -> Vec<usize> {
        let mut mask = self.space.allowed[woman] & !used & self.space.full_mask();
        let mut men = Vec::with_capacity(mask.count_ones() as usize);
        while mask != 0 {
            let m = mask.trailing_zeros() as usize;
            men.push(m);
            mask &= mask - 1;
        }
        men
    }

    /// Count every consistent bijection below this node
    ///
    /// `share` is this node's slice of the whole tree; settled slices add up
    /// to the progress fraction.
    fn count(
        &mut self,
        depth: usize,
        used: u64,
        share: f64,
        tally: &mut Tally,
        settled: &mut f64,
        reporter: &mut ProgressReporter<'_>,
    ) -> Result<(), EngineError> {
        if self.tick() {
            if self.cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            reporter.update(Stage::Enumerating, *settled);
        }
        if self.nodes > self.budget {
            self.exhausted = true;
            return Ok(());
        }

        if !self.feasible(depth, used) {
            *settled += share;
            return Ok(());
        }
        if depth == self.space.size {
            tally.record(&self.partner);
            *settled += share;
            return Ok(());
        }

        let woman = self.order[depth];
        let men = self.candidates(woman, used);
        if men.is_empty() {
            *settled += share;
            return Ok(());
        }

        let child_share = share / men.len() as f64;
        for man in men {
            self.assign(woman, man);
            let outcome = self.count(depth + 1, used | (1u64 << man), child_share, tally, settled, reporter);
            self.unassign(woman, man);
            outcome?;
            if self.exhausted {
                return Ok(());
            }
        }
        Ok(())
    }

    /// Depth-first search for any consistent bijection, trying partners in
    /// random order
    fn first<R: Rng>(&mut self, depth: usize, used: u64, rng: &mut R) -> Result<bool, EngineError> {
        if self.tick() && self.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        if !self.feasible(depth, used) {
            return Ok(false);
        }
        if depth == self.space.size {
            return Ok(true);
        }

        let woman = self.order[depth];
        let mut men = self.candidates(woman, used);
        men.shuffle(rng);
        for man in men {
            self.assign(woman, man);
            if self.first(depth + 1, used | (1u64 << man), rng)? {
                return Ok(true);
            }
            self.unassign(woman, man);
        }
        Ok(false)
    }
}

/// Count every consistent bijection of the space
pub fn enumerate(
    space: &SearchSpace,
    cancel: &CancelToken,
    check_interval: u64,
    reporter: &mut ProgressReporter<'_>,
) -> Result<Tally, EngineError> {
    let (tally, _) = search_all(space, cancel, check_interval, u64::MAX, reporter)?;
    Ok(tally)
}

/// Count every consistent bijection, giving up after `node_budget` search
/// nodes
///
/// Returns `None` when the budget ran out before the tree was exhausted.
pub fn enumerate_within(
    space: &SearchSpace,
    cancel: &CancelToken,
    check_interval: u64,
    node_budget: u64,
    reporter: &mut ProgressReporter<'_>,
) -> Result<Option<Tally>, EngineError> {
    let (tally, complete) = search_all(space, cancel, check_interval, node_budget, reporter)?;
    Ok(complete.then_some(tally))
}

fn search_all(
    space: &SearchSpace,
    cancel: &CancelToken,
    check_interval: u64,
    budget: u64,
    reporter: &mut ProgressReporter<'_>,
) -> Result<(Tally, bool), EngineError> {
    let mut tally = Tally::new(space.size());
    let mut settled = 0.0;
    let mut search = Backtracker::new(space, cancel, check_interval, budget);

    reporter.update(Stage::Enumerating, 0.0);
    search.count(0, 0, 1.0, &mut tally, &mut settled, reporter)?;
    if search.exhausted {
        tracing::debug!("Enumeration stopped after {} nodes", search.nodes);
        return Ok((tally, false));
    }
    reporter.update(Stage::Enumerating, 1.0);

    tracing::debug!(
        "Enumeration visited {} nodes, {} consistent permutations",
        search.nodes,
        tally.total()
    );
    Ok((tally, true))
}

/// Find one consistent bijection, or `None` if there is none
pub fn find_consistent<R: Rng>(
    space: &SearchSpace,
    cancel: &CancelToken,
    check_interval: u64,
    rng: &mut R,
) -> Result<Option<Vec<usize>>, EngineError> {
    let mut search = Backtracker::new(space, cancel, check_interval, u64::MAX);
    if search.first(0, 0, rng)? {
        Ok(Some(search.partner))
    } else {
        Ok(None)
    }
}
