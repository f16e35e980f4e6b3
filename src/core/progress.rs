use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Receives progress updates from a running computation
pub trait ProgressSink {
    fn report(&mut self, progress: f64, step: &str);
}

impl<F: FnMut(f64, &str)> ProgressSink for F {
    fn report(&mut self, progress: f64, step: &str) {
        self(progress, step)
    }
}

/// Discards all progress updates
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _progress: f64, _step: &str) {}
}

/// Phases of a run, each owning a slice of the overall progress bar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validating,
    Building,
    Enumerating,
    Sampling,
    Aggregating,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Validating => "validating input",
            Stage::Building => "building constraints",
            Stage::Enumerating => "enumerating permutations",
            Stage::Sampling => "sampling permutations",
            Stage::Aggregating => "aggregating",
        }
    }

    fn span(&self) -> (f64, f64) {
        match self {
            Stage::Validating => (0.0, 0.05),
            Stage::Building => (0.05, 0.1),
            Stage::Enumerating | Stage::Sampling => (0.1, 0.9),
            Stage::Aggregating => (0.9, 1.0),
        }
    }
}

/// Throttles and orders progress updates before they reach a sink
///
/// Reported values never decrease. An update is forwarded when the stage
/// changes, when the value moved by at least `min_step`, or when it reaches 1.0.
pub struct ProgressReporter<'a> {
    sink: &'a mut dyn ProgressSink,
    min_step: f64,
    value: f64,
    emitted: Option<(f64, Stage)>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(sink: &'a mut dyn ProgressSink, min_step: f64) -> Self {
        Self {
            sink,
            min_step: min_step.max(0.0),
            value: 0.0,
            emitted: None,
        }
    }

    /// Report `fraction` (0..=1) of `stage` done
    pub fn update(&mut self, stage: Stage, fraction: f64) {
        let (start, end) = stage.span();
        let fraction = if fraction.is_finite() { fraction.clamp(0.0, 1.0) } else { 0.0 };
        self.value = self.value.max(start + (end - start) * fraction).min(1.0);

        let due = match self.emitted {
            None => true,
            Some((last, last_stage)) => {
                last_stage != stage
                    || self.value - last >= self.min_step
                    || (self.value >= 1.0 && last < 1.0)
            }
        };
        if due {
            tracing::trace!("progress {:.3} ({})", self.value, stage.label());
            self.sink.report(self.value, stage.label());
            self.emitted = Some((self.value, stage));
        }
    }

    /// Mark the run as fully done
    pub fn finish(&mut self) {
        self.update(Stage::Aggregating, 1.0);
    }

    /// Latest value, emitted or not
    pub fn value(&self) -> f64 {
        self.value
    }
}

/// Cooperative cancellation tied to a generation counter
///
/// A token is cancelled as soon as the shared counter moves away from the
/// generation it was issued for.
#[derive(Debug, Clone)]
pub struct CancelToken {
    current: Arc<AtomicU64>,
    generation: u64,
}

impl CancelToken {
    pub fn new(current: Arc<AtomicU64>, generation: u64) -> Self {
        Self { current, generation }
    }

    /// A token that is only cancelled through [`CancelToken::cancel`]
    pub fn never() -> Self {
        Self::new(Arc::new(AtomicU64::new(0)), 0)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_cancelled(&self) -> bool {
        self.current.load(Ordering::Acquire) != self.generation
    }

    /// Cancel this token and every clone of it
    pub fn cancel(&self) {
        self.current.fetch_add(1, Ordering::AcqRel);
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::never()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_monotone_and_throttled() {
        let mut seen: Vec<(f64, String)> = Vec::new();
        let mut sink = |p: f64, step: &str| seen.push((p, step.to_string()));
        {
            let mut reporter = ProgressReporter::new(&mut sink, 0.1);
            reporter.update(Stage::Validating, 0.0);
            reporter.update(Stage::Enumerating, 0.5);
            reporter.update(Stage::Enumerating, 0.51);
            reporter.update(Stage::Enumerating, 0.2);
            reporter.update(Stage::Enumerating, 1.0);
            reporter.finish();
        }

        assert_eq!(seen.first().map(|(_, s)| s.as_str()), Some("validating input"));
        assert_eq!(seen.last(), Some(&(1.0, "aggregating".to_string())));
        assert!(seen.windows(2).all(|w| w[0].0 <= w[1].0));
        // 0.51 is within the throttle step of 0.5 and is swallowed
        assert_eq!(seen.iter().filter(|(_, s)| s == "enumerating permutations").count(), 2);
    }

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::never();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());

        let counter = Arc::new(AtomicU64::new(7));
        let token = CancelToken::new(counter.clone(), 7);
        assert!(!token.is_cancelled());
        counter.store(8, Ordering::Release);
        assert!(token.is_cancelled());
    }
}
