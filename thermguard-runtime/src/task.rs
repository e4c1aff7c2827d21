//! Spawned pipeline tasks and their stop protocol
//!
//! ## Stop protocol
//!
//! ```text
//! stop(timeout):
//!   cancel token ──► task notices at its next wait ──► returns ──► Stopped / Failed
//!        │
//!        └── timeout elapses first ──► abort ──► ForceTerminated (logged as error)
//! ```
//!
//! The requester never waits longer than `timeout`. An aborted task is
//! dropped at its next await point, which runs the `Drop` of everything it
//! owns (sensors are powered off there).
//!
//! ## Fault reporting
//!
//! A task that returns an error reports it on the fault channel before
//! finishing, so the supervisor can react without polling every handle.

use std::future::Future;
use std::time::Duration;

use log::{error, info, warn};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;

/// A task that exited with an error
#[derive(Debug, Clone, PartialEq)]
pub struct TaskFault {
    /// Task name
    pub task: &'static str,
    /// Why it exited
    pub error: TaskError,
}

/// How a stop request ended
#[derive(Debug, Clone, PartialEq)]
pub enum StopOutcome {
    /// Task returned normally within the timeout
    Stopped,
    /// Task had returned, or returned within the timeout, with an error
    Failed(TaskError),
    /// Task panicked
    Panicked,
    /// Task missed the timeout and was aborted
    ForceTerminated,
}

impl StopOutcome {
    /// Whether the task had to be force-terminated
    pub fn was_forced(&self) -> bool {
        matches!(self, StopOutcome::ForceTerminated)
    }
}

/// Owned handle to a running pipeline task
#[derive(Debug)]
pub struct TaskHandle {
    name: &'static str,
    token: CancellationToken,
    join: JoinHandle<Result<(), TaskError>>,
}

/// Spawn `task` on `executor`, reporting an error exit on `faults`
///
/// `task` receives a child of `parent`, so cancelling the parent stops it too.
pub fn spawn_task<F, Fut>(
    name: &'static str,
    executor: &Handle,
    parent: &CancellationToken,
    faults: mpsc::UnboundedSender<TaskFault>,
    task: F,
) -> TaskHandle
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    let token = parent.child_token();
    let fut = task(token.clone());
    let join = executor.spawn(async move {
        info!("{}: started", name);
        let result = fut.await;
        match &result {
            Ok(()) => info!("{}: stopped", name),
            Err(err) => {
                error!("{}: exited with {} ({})", name, err, err.as_label());
                // Nobody listening means the supervisor is already gone
                let _ = faults.send(TaskFault { task: name, error: err.clone() });
            }
        }
        result
    });
    TaskHandle { name, token, join }
}

impl TaskHandle {
    /// Task name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the task has returned
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Ask the task to stop and wait at most `timeout` for it
    pub async fn stop(mut self, timeout: Duration) -> StopOutcome {
        self.token.cancel();
        match time::timeout(timeout, &mut self.join).await {
            Ok(Ok(Ok(()))) => StopOutcome::Stopped,
            Ok(Ok(Err(err))) => StopOutcome::Failed(err),
            Ok(Err(join_err)) if join_err.is_panic() => {
                error!("{}: panicked", self.name);
                StopOutcome::Panicked
            }
            Ok(Err(_cancelled)) => {
                warn!("{}: aborted before stop", self.name);
                StopOutcome::ForceTerminated
            }
            Err(_elapsed) => {
                self.join.abort();
                error!(
                    "{}: did not stop within {:?}, force-terminated",
                    self.name, timeout
                );
                StopOutcome::ForceTerminated
            }
        }
    }
}
