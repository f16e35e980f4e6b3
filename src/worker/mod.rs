// Background execution exports
pub mod host;

pub use host::{HostState, ProbabilityWorker};
