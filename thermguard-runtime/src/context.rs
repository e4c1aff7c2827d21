//! Execution contexts tasks are pinned to
//!
//! The pipeline keeps producers and the sink apart: the sampler and the
//! checker/voter share one context, the monitor runs on another. Each
//! context is a single-threaded tokio runtime driven by its own OS thread,
//! so a task never migrates and a slow monitor cannot delay sampling.
//!
//! ```text
//! thermguard-producers ─┬─ sampler
//!                       └─ checker / voter
//! thermguard-sink ────── monitor
//! ```

use std::thread;

use log::{debug, warn};
use tokio::runtime::{Builder, Handle};
use tokio::sync::oneshot;

use crate::error::SupervisorError;

/// Where a task runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionContext {
    /// Sampler and checker/voter
    Producers,
    /// Monitor
    Sink,
}

impl ExecutionContext {
    /// Thread name of the context
    pub const fn thread_name(&self) -> &'static str {
        match self {
            ExecutionContext::Producers => "thermguard-producers",
            ExecutionContext::Sink => "thermguard-sink",
        }
    }
}

struct ContextThread {
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

/// Runtime handles of both execution contexts
pub struct Executors {
    producers: Handle,
    sink: Handle,
    threads: Vec<ContextThread>,
}

impl std::fmt::Debug for Executors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executors")
            .field("dedicated_threads", &self.threads.len())
            .finish()
    }
}

impl Executors {
    /// One dedicated single-threaded runtime per context
    pub fn pinned() -> Result<Self, SupervisorError> {
        let (producers, producers_thread) = start_context(ExecutionContext::Producers)?;
        let (sink, sink_thread) = start_context(ExecutionContext::Sink)?;
        Ok(Self {
            producers,
            sink,
            threads: vec![producers_thread, sink_thread],
        })
    }

    /// Both contexts on the caller's runtime
    ///
    /// Used by tests so that paused time applies to every task. Must be
    /// called from within a tokio runtime.
    pub fn current() -> Self {
        let handle = Handle::current();
        Self {
            producers: handle.clone(),
            sink: handle,
            threads: Vec::new(),
        }
    }

    /// Runtime of `context`
    pub fn handle(&self, context: ExecutionContext) -> &Handle {
        match context {
            ExecutionContext::Producers => &self.producers,
            ExecutionContext::Sink => &self.sink,
        }
    }
}

impl Drop for Executors {
    fn drop(&mut self) {
        for ctx in &mut self.threads {
            if let Some(shutdown) = ctx.shutdown.take() {
                let _ = shutdown.send(());
            }
            // Joining from inside a runtime would block it; detach instead
            if Handle::try_current().is_err() {
                if let Some(thread) = ctx.thread.take() {
                    if thread.join().is_err() {
                        warn!("execution context thread panicked");
                    }
                }
            }
        }
    }
}

fn start_context(context: ExecutionContext) -> Result<(Handle, ContextThread), SupervisorError> {
    let name = context.thread_name();
    let runtime = Builder::new_current_thread()
        .enable_all()
        .thread_name(name)
        .build()
        .map_err(|source| SupervisorError::Executor { context: name, source })?;
    let handle = runtime.handle().clone();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let thread = thread::Builder::new()
        .name(name.to_owned())
        .spawn(move || {
            debug!("{}: context running", name);
            // Drives every task spawned on this context until shutdown
            let _ = runtime.block_on(shutdown_rx);
            debug!("{}: context stopped", name);
        })
        .map_err(|source| SupervisorError::Executor { context: name, source })?;

    Ok((
        handle,
        ContextThread {
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pinned_contexts_run_on_their_own_threads() {
        let executors = Executors::pinned().unwrap();
        let probe = |context| {
            let (tx, rx) = std::sync::mpsc::channel();
            executors.handle(context).spawn(async move {
                let name = thread::current().name().map(str::to_owned);
                let _ = tx.send(name);
            });
            rx.recv().unwrap()
        };

        assert_eq!(probe(ExecutionContext::Producers).as_deref(), Some("thermguard-producers"));
        assert_eq!(probe(ExecutionContext::Sink).as_deref(), Some("thermguard-sink"));
    }

    #[tokio::test]
    async fn current_maps_both_contexts_to_caller() {
        let executors = Executors::current();
        let joined = executors
            .handle(ExecutionContext::Sink)
            .spawn(async { 7 })
            .await
            .unwrap();
        assert_eq!(joined, 7);
    }
}
