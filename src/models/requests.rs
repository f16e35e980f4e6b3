use serde::{Deserialize, Serialize};
use crate::models::domain::{Matchbox, MatchingNight, Participant};

/// Snapshot of the store handed to one computation run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityInput {
    pub participants: Vec<Participant>,
    #[serde(rename = "matchingNights", default)]
    pub matching_nights: Vec<MatchingNight>,
    #[serde(default)]
    pub matchboxes: Vec<Matchbox>,
}

/// Inbound worker message
///
/// ```json
/// { "type": "calculate", "input": { "participants": [], "matchingNights": [], "matchboxes": [] } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerRequest {
    Calculate { input: ProbabilityInput },
}
