// Core algorithm exports
pub mod aggregator;
pub mod broadcast;
pub mod constraints;
pub mod engine;
pub mod enumerator;
pub mod error;
pub mod progress;
pub mod sampler;

#[cfg(test)]
pub(crate) mod test_support;

pub use aggregator::{aggregate, Tally};
pub use broadcast::{parse_broadcast, Broadcast, BroadcastResolver};
pub use constraints::{ConstraintBuilder, ConstraintModel, EvaluationPoint, NightConstraint, NightSummary};
pub use engine::{ProbabilityEngine, TimelineEntry};
pub use enumerator::SearchSpace;
pub use error::{EngineError, InfeasibleConstraintError, TimeError, ValidationError};
pub use progress::{CancelToken, NoProgress, ProgressReporter, ProgressSink, Stage};
