//! Task execution with optional timeout, simulated duration and panic capture.

use crate::handler::{HandlerRegistry, TaskHandler};
use colony_core::{Attribute, Result, TaskAssignment, WorkerError};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// Outcome of executing one assignment.
#[derive(Debug)]
pub enum Execution {
    /// Outbound result attribute, ready to publish
    Completed(Attribute),
    /// No inbound attribute matched a registered handler
    Unrecognized,
    /// The handler could not produce a result
    Failed(WorkerError),
}

/// Bounds of the simulated task duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    min: Duration,
    max: Duration,
}

impl DelayRange {
    pub fn new(min: Duration, max: Duration) -> Result<Self> {
        if min > max {
            return Err(WorkerError::Configuration(format!(
                "delay minimum {:?} exceeds maximum {:?}",
                min, max
            )));
        }
        Ok(DelayRange { min, max })
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let millis = rng.gen_range(self.min.as_millis() as u64..=self.max.as_millis() as u64);
        Duration::from_millis(millis)
    }
}

pub struct TaskExecutor {
    handlers: HandlerRegistry,
    timeout: Option<Duration>,
    delay: Option<DelayRange>,
}

impl TaskExecutor {
    pub fn new(handlers: HandlerRegistry) -> Self {
        TaskExecutor {
            handlers,
            timeout: None,
            delay: None,
        }
    }

    pub fn with_timeout(mut self, limit: Option<Duration>) -> Self {
        self.timeout = limit;
        self
    }

    pub fn with_delay(mut self, delay: Option<DelayRange>) -> Self {
        self.delay = delay;
        self
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Execute an assignment. Never talks to the network.
    pub async fn execute(&self, assignment: &TaskAssignment) -> Execution {
        let Some((handler, attribute)) = self.handlers.find(assignment) else {
            return Execution::Unrecognized;
        };

        info!(
            process_id = %assignment.id,
            key = %attribute.key,
            value = %attribute.value,
            "Executing task"
        );

        let result_key = handler.result_key().to_string();
        let work = self.run(handler, attribute.value.clone());

        let outcome = match self.timeout {
            Some(limit) => match timeout(limit, work).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(process_id = %assignment.id, "Task timed out after {:?}", limit);
                    Err(WorkerError::Timeout(limit))
                }
            },
            None => work.await,
        };

        match outcome {
            Ok(value) => {
                Execution::Completed(Attribute::outbound(&assignment.id, result_key, value))
            }
            Err(e) => Execution::Failed(e),
        }
    }

    /// Run the handler on the blocking pool, then apply the simulated delay.
    ///
    /// A timed-out computation keeps its blocking thread until it finishes;
    /// only its result is discarded.
    async fn run(&self, handler: Arc<dyn TaskHandler>, value: String) -> Result<String> {
        let handle = tokio::task::spawn_blocking(move || handler.handle(&value));

        let result = match handle.await {
            Ok(result) => result?,
            Err(join_error) if join_error.is_panic() => {
                let message = join_error
                    .into_panic()
                    .downcast::<String>()
                    .map(|s| *s)
                    .or_else(|payload| payload.downcast::<&'static str>().map(|s| s.to_string()))
                    .unwrap_or_else(|_| "unknown panic".to_string());
                return Err(WorkerError::Execution(format!("handler panicked: {}", message)));
            }
            Err(join_error) => {
                return Err(WorkerError::Execution(format!(
                    "handler was cancelled: {}",
                    join_error
                )));
            }
        };

        if let Some(range) = &self.delay {
            let pause = range.sample(&mut rand::thread_rng());
            debug!("Simulating task duration of {:?}", pause);
            sleep(pause).await;
        }

        Ok(result)
    }
}
