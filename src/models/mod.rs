// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{Gender, MatchType, Matchbox, MatchingNight, Pair, Participant, ParticipantStatus, Penalty};
pub use requests::{ProbabilityInput, WorkerRequest};
pub use responses::{EstimationMethod, ProbabilityResult, WorkerEvent, WorkerMessage};
