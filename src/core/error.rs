use thiserror::Error;
use crate::models::Gender;

/// Malformed broadcast date or time
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeError {
    #[error("invalid broadcast date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("invalid broadcast time '{0}', expected HH:MM")]
    InvalidTime(String),

    #[error("broadcast hour {0} out of range 0-23")]
    HourOutOfRange(u32),

    #[error("broadcast minute {0} out of range 0-59")]
    MinuteOutOfRange(u32),
}

/// Input rejected before the search starts
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{context}: {source}")]
    Time {
        context: String,
        #[source]
        source: TimeError,
    },

    #[error("unknown participant '{name}' in {context}")]
    UnknownParticipant { name: String, context: String },

    #[error("participant '{name}' in {context} is not in group {expected}")]
    WrongGender {
        name: String,
        expected: Gender,
        context: String,
    },

    #[error("participant '{name}' appears more than once in {context}")]
    DuplicateInNight { name: String, context: String },

    #[error("duplicate participant name '{name}' in group {gender}")]
    DuplicateName { name: String, gender: Gender },

    #[error("group sizes differ: {women} women, {men} men")]
    UnequalGroups { women: usize, men: usize },

    #[error("{size} participants per group exceeds the supported maximum of {max}")]
    RosterTooLarge { size: usize, max: usize },

    #[error("{context} reports {lights} lights for {pairs} pairs")]
    LightsOutOfRange {
        context: String,
        lights: i32,
        pairs: usize,
    },
}

/// The constraints admit no bijection at all
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no pairing is consistent with the recorded results: {reason}")]
pub struct InfeasibleConstraintError {
    pub reason: String,
}

impl InfeasibleConstraintError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Errors produced by a probability run
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Infeasible(#[from] InfeasibleConstraintError),

    #[error("computation error: {0}")]
    Computation(String),

    #[error("computation cancelled")]
    Cancelled,
}

impl EngineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, EngineError::Cancelled)
    }
}
