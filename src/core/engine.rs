use crate::config::EngineSettings;
use crate::core::aggregator::aggregate;
use crate::core::broadcast::BroadcastResolver;
use crate::core::constraints::{ConstraintBuilder, ConstraintModel, EvaluationPoint};
use crate::core::aggregator::Tally;
use crate::core::enumerator::{enumerate, enumerate_within, SearchSpace};
use crate::core::error::{EngineError, InfeasibleConstraintError, ValidationError};
use crate::core::progress::{CancelToken, NoProgress, ProgressReporter, ProgressSink, Stage};
use crate::core::sampler::sample;
use crate::models::{EstimationMethod, ProbabilityInput, ProbabilityResult};

/// Probabilities after one matching night
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEntry {
    pub night: String,
    pub result: ProbabilityResult,
}

/// Main probability orchestrator
///
/// # Pipeline Stages
/// 1. Validation and constraint building
/// 2. Exact enumeration, or sampling once it exceeds `node_budget` nodes
/// 3. Aggregation into per-pair probabilities
#[derive(Debug, Clone)]
pub struct ProbabilityEngine {
    settings: EngineSettings,
    builder: ConstraintBuilder,
}

impl ProbabilityEngine {
    pub fn new(settings: EngineSettings) -> Result<Self, EngineError> {
        let resolver = BroadcastResolver::new(&settings.default_broadcast_time).map_err(|source| {
            ValidationError::Time {
                context: "default broadcast time".to_string(),
                source,
            }
        })?;

        Ok(Self {
            settings,
            builder: ConstraintBuilder::new(resolver),
        })
    }

    pub fn with_default_settings() -> Self {
        Self {
            settings: EngineSettings::default(),
            builder: ConstraintBuilder::default(),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Validate a snapshot and build its constraints without searching
    pub fn constraints(&self, input: &ProbabilityInput, at: EvaluationPoint) -> Result<ConstraintModel, EngineError> {
        Ok(self.builder.build(input, at)?)
    }

    /// Compute probabilities for everything recorded so far
    pub fn calculate(&self, input: &ProbabilityInput) -> Result<ProbabilityResult, EngineError> {
        self.run(input, &mut NoProgress, &CancelToken::never())
    }

    /// Compute probabilities with progress reporting and cancellation
    pub fn run(
        &self,
        input: &ProbabilityInput,
        sink: &mut dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<ProbabilityResult, EngineError> {
        self.run_at(input, EvaluationPoint::Now, sink, cancel)
    }

    /// Compute probabilities from the events in effect at `at`
    pub fn run_at(
        &self,
        input: &ProbabilityInput,
        at: EvaluationPoint,
        sink: &mut dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<ProbabilityResult, EngineError> {
        let mut reporter = ProgressReporter::new(sink, self.settings.progress_min_step);

        tracing::info!(
            "Starting probability run: {} participants, {} matching nights, {} matchboxes",
            input.participants.len(),
            input.matching_nights.len(),
            input.matchboxes.len()
        );

        // Stage 1: validation and constraints
        reporter.update(Stage::Validating, 0.0);
        let model = self.builder.build(input, at)?;
        reporter.update(Stage::Building, 1.0);
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let space = SearchSpace::from_model(&model);
        check_stranded(&model, &space)?;

        // Stage 2: search
        let (tally, method) = self.search(&space, cancel, &mut reporter)?;

        // Stage 3: aggregation
        reporter.update(Stage::Aggregating, 0.0);
        let result = aggregate(&model, &tally, method)?;
        reporter.finish();

        tracing::info!(
            "Probability run finished: {:?}, {} permutations",
            result.method,
            result.permutation_count
        );
        Ok(result)
    }

    /// Probabilities as they stood after each matching night, oldest first
    ///
    /// Each entry uses the nights up to and including that night and the
    /// matchboxes aired before it.
    pub fn timeline(&self, input: &ProbabilityInput) -> Result<Vec<TimelineEntry>, EngineError> {
        let resolver = self.builder.resolver();
        let nights = resolver.sort_oldest_first(&input.matching_nights).map_err(|source| {
            ValidationError::Time {
                context: "matching night".to_string(),
                source,
            }
        })?;

        // Validate the full snapshot once before the per-night runs
        self.builder.build(input, EvaluationPoint::Now)?;

        nights
            .iter()
            .map(|night| -> Result<TimelineEntry, EngineError> {
                let instant = resolver.effective_instant(night).map_err(|source| ValidationError::Time {
                    context: format!("matching night '{}'", night.name),
                    source,
                })?;
                let result = self.run_at(
                    input,
                    EvaluationPoint::AsOf(instant),
                    &mut NoProgress,
                    &CancelToken::never(),
                )?;
                Ok(TimelineEntry {
                    night: night.name.clone(),
                    result,
                })
            })
            .collect()
    }
}

impl ProbabilityEngine {
    /// Enumerate within the node budget, otherwise sample
    ///
    /// A sampled run whose diagnostics flag it is discarded and the space is
    /// enumerated without a budget, so a stuck chain never becomes a result.
    fn search(
        &self,
        space: &SearchSpace,
        cancel: &CancelToken,
        reporter: &mut ProgressReporter<'_>,
    ) -> Result<(Tally, EstimationMethod), EngineError> {
        let interval = self.settings.cancel_check_interval;
        tracing::debug!(
            "Enumerating at most {} nodes, up to {:.3e} candidate permutations",
            self.settings.node_budget,
            space.size_estimate()
        );
        if let Some(tally) = enumerate_within(space, cancel, interval, self.settings.node_budget, reporter)? {
            return Ok((tally, EstimationMethod::Exact));
        }

        tracing::warn!(
            "Exact enumeration exceeded {} nodes, sampling {} states",
            self.settings.node_budget,
            self.settings.samples
        );
        let run = sample(space, &self.settings.sampler(), cancel, reporter)?;
        match run.unreliable(self.settings.max_chain_spread) {
            None => Ok((run.tally, EstimationMethod::Sampled)),
            Some(reason) => {
                tracing::warn!("Discarding sampled estimate ({}), enumerating exactly", reason);
                let tally = enumerate(space, cancel, interval, reporter)?;
                Ok((tally, EstimationMethod::Exact))
            }
        }
    }
}

impl Default for ProbabilityEngine {
    fn default() -> Self {
        Self::with_default_settings()
    }
}

/// Fail before searching when someone has no possible partner left
fn check_stranded(model: &ConstraintModel, space: &SearchSpace) -> Result<(), EngineError> {
    if let Some(&w) = space.stranded_women().first() {
        return Err(InfeasibleConstraintError::new(format!("{} has no possible partner left", model.women[w])).into());
    }
    if let Some(&m) = space.stranded_men().first() {
        return Err(InfeasibleConstraintError::new(format!("{} has no possible partner left", model.men[m])).into());
    }
    Ok(())
}
