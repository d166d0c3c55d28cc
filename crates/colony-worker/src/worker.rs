//! The poll-execute-report loop.

use crate::context::WorkerContext;
use crate::executor::{Execution, TaskExecutor};
use crate::retry::RetryPolicy;
use colony_client::ColonyClient;
use colony_core::{Attribute, Result, TaskAssignment, WorkerError};
use std::str::FromStr;
use std::sync::Arc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What to do with an assignment no handler recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnrecognizedPolicy {
    /// Leave it open for a worker type that can service it
    #[default]
    Leave,
    /// Close it as failed
    Fail,
}

impl FromStr for UnrecognizedPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "leave" => Ok(UnrecognizedPolicy::Leave),
            "fail" => Ok(UnrecognizedPolicy::Fail),
            other => Err(format!("unknown policy {:?}, expected leave or fail", other)),
        }
    }
}

/// Outcome of one loop iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Iteration {
    /// Result published and process closed as successful
    Completed(String),
    /// Process closed as failed
    Failed(String),
    /// Unrecognized process left open
    Skipped(String),
    /// Server had no work
    Idle,
    /// Assignment request failed
    PollFailed,
    /// Outcome known but the closing call failed
    Unreported(String),
}

impl Iteration {
    pub fn should_back_off(&self) -> bool {
        matches!(self, Iteration::Idle | Iteration::PollFailed)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub completed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub poll_failures: u64,
}

pub struct Worker {
    client: Arc<dyn ColonyClient>,
    context: WorkerContext,
    executor: TaskExecutor,
    retry: RetryPolicy,
    unrecognized: UnrecognizedPolicy,
    shutdown: CancellationToken,
    stats: WorkerStats,
}

impl Worker {
    pub fn new(
        client: Arc<dyn ColonyClient>,
        context: WorkerContext,
        executor: TaskExecutor,
    ) -> Self {
        Worker {
            client,
            context,
            executor,
            retry: RetryPolicy::default(),
            unrecognized: UnrecognizedPolicy::default(),
            shutdown: CancellationToken::new(),
            stats: WorkerStats::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_unrecognized_policy(mut self, policy: UnrecognizedPolicy) -> Self {
        self.unrecognized = policy;
        self
    }

    /// Cancelling the token stops the loop before its next poll or during
    /// backoff. A poll already sent and any assignment it returns still run
    /// to their closure.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn context(&self) -> &WorkerContext {
        &self.context
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats
    }

    /// Run until the shutdown token is cancelled.
    pub async fn run(&mut self) -> WorkerStats {
        info!(
            "Worker {} polling colony {} (handlers: {:?})",
            self.context.runtime_id(),
            self.context.colony_id(),
            self.executor.handlers().parameter_keys()
        );

        let shutdown = self.shutdown.clone();
        let mut attempt: u32 = 0;

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            // Never abandon a poll in flight; `assign_timeout` bounds it.
            let iteration = self.poll_once().await;

            if !iteration.should_back_off() {
                attempt = 0;
                continue;
            }

            let delay = self.retry.next_delay(attempt);
            attempt = attempt.saturating_add(1);
            debug!("Backing off for {:?}", delay);

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = sleep(delay) => {}
            }
        }

        info!(
            "Worker stopped: {} completed, {} failed, {} skipped, {} poll failures",
            self.stats.completed, self.stats.failed, self.stats.skipped, self.stats.poll_failures
        );
        self.stats
    }

    /// Request one assignment from the colony.
    pub async fn poll(&self) -> Result<Option<TaskAssignment>> {
        self.client
            .assign_process(self.context.colony_id(), self.context.credential())
            .await
            .map_err(|e| WorkerError::Poll(e.to_string()))
    }

    /// One full iteration without backoff.
    pub async fn poll_once(&mut self) -> Iteration {
        let polled = self.poll().await;
        self.settle(polled).await
    }

    async fn settle(&mut self, polled: Result<Option<TaskAssignment>>) -> Iteration {
        match polled {
            Ok(Some(assignment)) => self.handle_assignment(assignment).await,
            Ok(None) => {
                debug!("No process available");
                Iteration::Idle
            }
            Err(e) => {
                self.stats.poll_failures += 1;
                error!("{}", e);
                Iteration::PollFailed
            }
        }
    }

    /// Execute an accepted assignment and report the outcome.
    pub async fn handle_assignment(&mut self, assignment: TaskAssignment) -> Iteration {
        let process_id = assignment.id.clone();
        info!("Assigned process {}", process_id);

        match self.executor.execute(&assignment).await {
            Execution::Completed(attribute) => self.publish(&process_id, attribute).await,
            Execution::Unrecognized => match self.unrecognized {
                UnrecognizedPolicy::Leave => {
                    warn!("Process {} has no recognized parameter, leaving it open", process_id);
                    self.stats.skipped += 1;
                    Iteration::Skipped(process_id)
                }
                UnrecognizedPolicy::Fail => {
                    let reason = format!(
                        "no recognized parameter, expected one of {:?}",
                        self.executor.handlers().parameter_keys()
                    );
                    self.fail(&process_id, reason).await
                }
            },
            Execution::Failed(e) => {
                error!("Process {} failed: {}", process_id, e);
                self.fail(&process_id, e.to_string()).await
            }
        }
    }

    /// Publish the result, then close as successful. A result that cannot
    /// be published closes the process as failed.
    async fn publish(&mut self, process_id: &str, attribute: Attribute) -> Iteration {
        let credential = self.context.credential();

        if let Err(e) = self.client.add_attribute(&attribute, credential).await {
            error!("Failed to publish result for process {}: {}", process_id, e);
            return self
                .fail(process_id, format!("failed to publish result: {}", e))
                .await;
        }

        match self.client.close_successful(process_id, credential).await {
            Ok(()) => {
                self.stats.completed += 1;
                info!(
                    "Process {} completed ({}={}; {} completed, {} failed so far)",
                    process_id,
                    attribute.key,
                    attribute.value,
                    self.stats.completed,
                    self.stats.failed
                );
                Iteration::Completed(process_id.to_string())
            }
            Err(e) => {
                error!("Failed to close process {} as successful: {}", process_id, e);
                Iteration::Unreported(process_id.to_string())
            }
        }
    }

    async fn fail(&mut self, process_id: &str, reason: String) -> Iteration {
        let errors = [reason];
        match self
            .client
            .close_failed(process_id, &errors, self.context.credential())
            .await
        {
            Ok(()) => {
                self.stats.failed += 1;
                warn!(
                    "Process {} closed as failed ({} completed, {} failed so far)",
                    process_id, self.stats.completed, self.stats.failed
                );
                Iteration::Failed(process_id.to_string())
            }
            Err(e) => {
                error!("Failed to close process {} as failed: {}", process_id, e);
                Iteration::Unreported(process_id.to_string())
            }
        }
    }
}
