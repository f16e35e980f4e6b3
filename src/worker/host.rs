use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};

use crate::core::error::EngineError;
use crate::core::progress::CancelToken;
use crate::core::ProbabilityEngine;
use crate::models::{ProbabilityInput, WorkerEvent, WorkerMessage, WorkerRequest};

/// Lifecycle of the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostState {
    Idle,
    Running { generation: u64 },
    Completed { generation: u64 },
    Failed { generation: u64, error: String },
}

/// A submission waiting for the worker task
#[derive(Debug, Clone)]
struct Job {
    generation: u64,
    input: ProbabilityInput,
}

#[derive(Debug)]
struct Inner {
    generation: u64,
    state: HostState,
}

/// State shared between the handle and the running job
#[derive(Debug)]
struct Shared {
    inner: Mutex<Inner>,
    current: Arc<AtomicU64>,
    events: mpsc::UnboundedSender<WorkerEvent>,
}

impl Shared {
    fn new(events: mpsc::UnboundedSender<WorkerEvent>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                generation: 0,
                state: HostState::Idle,
            }),
            current: Arc::new(AtomicU64::new(0)),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Inner holds plain values, a panic elsewhere cannot leave it half-written
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start a new generation, superseding whatever was in flight
    fn advance(&self, inner: &mut Inner) -> u64 {
        inner.generation += 1;
        self.current.store(inner.generation, Ordering::Release);
        inner.generation
    }

    /// Emit a message unless its generation has been superseded
    ///
    /// The check and the send happen under the lock that `submit` and
    /// `cancel` take, so nothing stale is emitted after they return.
    fn post(&self, generation: u64, message: WorkerMessage) -> bool {
        let mut inner = self.lock();
        if inner.generation != generation || !matches!(inner.state, HostState::Running { .. }) {
            if message.is_terminal() {
                tracing::warn!("Dropping outcome of superseded generation {}", generation);
            } else {
                tracing::trace!("Dropping progress from stale generation {}", generation);
            }
            return false;
        }

        match &message {
            WorkerMessage::Progress { progress, step } => {
                tracing::trace!("Generation {}: {:.3} {}", generation, progress, step);
            }
            WorkerMessage::Result { .. } => inner.state = HostState::Completed { generation },
            WorkerMessage::Error { error } => {
                inner.state = HostState::Failed {
                    generation,
                    error: error.clone(),
                }
            }
        }

        if self.events.send(WorkerEvent { generation, message }).is_err() {
            tracing::warn!("Event receiver dropped, discarding message for generation {}", generation);
            return false;
        }
        true
    }
}

/// Background host running one probability computation at a time
///
/// The latest submission always wins: a new request supersedes the one in
/// flight, whose messages are dropped from then on. Events arrive on the
/// receiver returned by [`ProbabilityWorker::spawn`].
#[derive(Debug)]
pub struct ProbabilityWorker {
    shared: Arc<Shared>,
    requests: watch::Sender<Option<Job>>,
    task: JoinHandle<()>,
}

impl ProbabilityWorker {
    /// Start the worker task on the current tokio runtime
    pub fn spawn(engine: ProbabilityEngine) -> (Self, mpsc::UnboundedReceiver<WorkerEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let (requests, jobs) = watch::channel(None);

        let shared = Arc::new(Shared::new(events));

        let task = tokio::spawn(run_loop(Arc::new(engine), shared.clone(), jobs));
        tracing::info!("Probability worker started");

        (Self { shared, requests, task }, receiver)
    }

    /// Queue a computation, superseding any run in progress
    ///
    /// Returns the generation the run's events will carry.
    pub fn submit(&self, input: ProbabilityInput) -> u64 {
        let mut inner = self.shared.lock();
        let superseded = matches!(inner.state, HostState::Running { .. });
        let generation = self.shared.advance(&mut inner);
        inner.state = HostState::Running { generation };
        self.requests.send_replace(Some(Job { generation, input }));

        if superseded {
            tracing::debug!("Generation {} supersedes the run in flight", generation);
        }
        generation
    }

    pub fn handle_request(&self, request: WorkerRequest) -> u64 {
        match request {
            WorkerRequest::Calculate { input } => self.submit(input),
        }
    }

    /// Accept a raw inbound JSON message
    ///
    /// A message that cannot be parsed still gets a generation and answers
    /// with an `error` event.
    pub fn handle_message(&self, message: &str) -> u64 {
        match serde_json::from_str::<WorkerRequest>(message) {
            Ok(request) => self.handle_request(request),
            Err(e) => {
                tracing::warn!("Rejecting malformed worker message: {}", e);
                self.reject(format!("Invalid message: {}", e))
            }
        }
    }

    /// Stop the run in progress without emitting anything for it
    pub fn cancel(&self) {
        let mut inner = self.shared.lock();
        if let HostState::Running { generation } = inner.state {
            self.shared.advance(&mut inner);
            inner.state = HostState::Idle;
            tracing::debug!("Cancelled generation {}", generation);
        }
    }

    pub fn state(&self) -> HostState {
        self.shared.lock().state.clone()
    }

    /// Generation of the latest submission
    pub fn generation(&self) -> u64 {
        self.shared.lock().generation
    }

    /// Cancel any run, close the request channel and wait for the task
    pub async fn shutdown(self) {
        self.cancel();
        let Self { shared, requests, task } = self;
        drop(requests);
        drop(shared);

        if let Err(e) = task.await {
            tracing::error!("Probability worker task failed: {}", e);
        }
        tracing::info!("Probability worker stopped");
    }

    fn reject(&self, error: String) -> u64 {
        let mut inner = self.shared.lock();
        let generation = self.shared.advance(&mut inner);
        inner.state = HostState::Running { generation };
        drop(inner);

        self.shared.post(generation, WorkerMessage::Error { error });
        generation
    }
}

async fn run_loop(engine: Arc<ProbabilityEngine>, shared: Arc<Shared>, mut jobs: watch::Receiver<Option<Job>>) {
    while jobs.changed().await.is_ok() {
        let Some(job) = jobs.borrow_and_update().clone() else {
            continue;
        };
        let generation = job.generation;
        let cancel = CancelToken::new(shared.current.clone(), generation);
        if cancel.is_cancelled() {
            tracing::debug!("Skipping generation {}, already superseded", generation);
            continue;
        }

        let engine = engine.clone();
        let job_shared = shared.clone();
        let outcome = tokio::task::spawn_blocking(move || execute(&engine, &job_shared, job, &cancel)).await;

        if let Err(e) = outcome {
            report_failure(&shared, generation, e);
        }
    }
}

/// Turn a panicked computation into an `error` event for its generation
fn report_failure(shared: &Shared, generation: u64, error: JoinError) {
    tracing::error!("Computation for generation {} panicked: {}", generation, error);
    shared.post(
        generation,
        WorkerMessage::Error {
            error: format!("Computation failed: {}", error),
        },
    );
}

fn execute(engine: &ProbabilityEngine, shared: &Shared, job: Job, cancel: &CancelToken) {
    let generation = job.generation;
    let mut sink = |progress: f64, step: &str| {
        shared.post(
            generation,
            WorkerMessage::Progress {
                progress,
                step: step.to_string(),
            },
        );
    };

    match engine.run(&job.input, &mut sink, cancel) {
        Ok(result) => {
            shared.post(generation, WorkerMessage::Result { result });
        }
        Err(EngineError::Cancelled) => {
            tracing::debug!("Generation {} stopped after cancellation", generation);
        }
        Err(e) => {
            tracing::warn!("Generation {} failed: {}", generation, e);
            shared.post(generation, WorkerMessage::Error { error: e.to_string() });
        }
    }
}
