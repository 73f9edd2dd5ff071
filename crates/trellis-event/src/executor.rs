//! Task executors and error handlers used during dispatch.

use std::fmt;

use trellis_common::error::TrellisError;

/// A unit of work handed to an executor.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs listener invocations off the publishing thread.
pub trait TaskExecutor: Send + Sync {
    /// Schedules a task.
    ///
    /// # Errors
    ///
    /// Returns the task back if it was rejected; the caller then runs it
    /// on its own thread.
    fn execute(&self, task: Task) -> Result<(), Task>;
}

/// Runs every task immediately on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncTaskExecutor;

impl TaskExecutor for SyncTaskExecutor {
    fn execute(&self, task: Task) -> Result<(), Task> {
        task();
        Ok(())
    }
}

/// Runs tasks on a Tokio runtime's blocking pool.
#[derive(Clone)]
pub struct TokioTaskExecutor {
    handle: tokio::runtime::Handle,
}

impl fmt::Debug for TokioTaskExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioTaskExecutor").finish_non_exhaustive()
    }
}

impl TokioTaskExecutor {
    /// Uses the given runtime.
    #[must_use]
    pub const fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Uses the runtime the caller is running in, if any.
    #[must_use]
    pub fn from_current() -> Option<Self> {
        tokio::runtime::Handle::try_current().ok().map(Self::new)
    }
}

impl TaskExecutor for TokioTaskExecutor {
    fn execute(&self, task: Task) -> Result<(), Task> {
        drop(self.handle.spawn_blocking(task));
        Ok(())
    }
}

/// Receives listener failures instead of propagating them.
pub trait ErrorHandler: Send + Sync {
    /// Handles one failure.
    fn handle_error(&self, error: &TrellisError);
}

/// Logs listener failures and carries on.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingErrorHandler;

impl ErrorHandler for LoggingErrorHandler {
    fn handle_error(&self, error: &TrellisError) {
        tracing::warn!(error = %error, "listener invocation failed");
    }
}
