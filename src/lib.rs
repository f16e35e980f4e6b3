//! Ayto Calc - perfect-match probability engine for the Ayto tracker
//!
//! Given the cast, the matching nights and the matchboxes aired so far, the
//! engine computes for every woman/man pair the probability that they are a
//! perfect match. It enumerates every consistent assignment when the search
//! space is small enough and falls back to seeded sampling above that.
//! Runs are hosted by a background worker that reports progress and drops
//! superseded results.

pub mod config;
pub mod core;
pub mod models;
pub mod services;
pub mod worker;

// Re-export commonly used types
pub use crate::config::{EngineSettings, Settings};
pub use crate::core::{CancelToken, EngineError, EvaluationPoint, ProbabilityEngine, ProgressSink};
pub use models::{ProbabilityInput, ProbabilityResult, WorkerEvent, WorkerMessage, WorkerRequest};
pub use services::{load_export, parse_export, snapshot, AytoStore, MemoryStore};
pub use worker::{HostState, ProbabilityWorker};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        let input = parse_export(
            r#"{ "participants": [ { "name": "Anna", "gender": "F" }, { "name": "Adam", "gender": "M" } ] }"#,
        )
        .unwrap()
        .into_input();
        let result = ProbabilityEngine::with_default_settings().calculate(&input).unwrap();
        assert_eq!(result.get("Anna", "Adam"), Some(1.0));
    }
}
