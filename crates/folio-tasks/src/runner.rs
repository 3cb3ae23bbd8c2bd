// SPDX-License-Identifier: MIT
//
// Single-shot background task execution.
//
// Each submission gets its own blocking worker immediately — there is no
// queue, no throttling, and no deduplication. "Single flight per view" is a
// caller policy (disable the trigger while a task is outstanding), not an
// engine guarantee. Once started, a task runs to completion; the handle's
// cancellation flag is poll-only and exists so a torn-down view can ignore
// the eventual outcome.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use folio_core::Result;
use tokio::sync::oneshot;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Unique identifier for a submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The result of one engine invocation, delivered exactly once per handle.
#[derive(Debug)]
pub enum TaskOutcome<R> {
    /// The operation returned normally. The payload is present only for
    /// operations that produce one (file lists, metadata, a rectified image).
    Success(Option<R>),
    /// The operation raised; the message is the error's Display text,
    /// unmodified, for the caller to show verbatim.
    Failure(String),
}

impl<R> TaskOutcome<R> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Handle to a running task.
///
/// Consume with [`TaskHandle::outcome`] (async), [`TaskHandle::try_outcome`]
/// (poll), or [`TaskHandle::blocking_outcome`] (sync, from outside the
/// runtime). Dropping the handle abandons the outcome; the worker still runs
/// to completion.
pub struct TaskHandle<R> {
    id: TaskId,
    rx: oneshot::Receiver<TaskOutcome<R>>,
    cancel: Arc<AtomicBool>,
}

impl<R> TaskHandle<R> {
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Ask the task to be ignored. In-flight work (including external
    /// process calls) is not preempted — this only raises the flag.
    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Await the outcome.
    pub async fn outcome(self) -> TaskOutcome<R> {
        match self.rx.await {
            Ok(outcome) => outcome,
            // The delivery task only disappears if the runtime shut down.
            Err(_) => TaskOutcome::Failure("task runner shut down before completion".to_string()),
        }
    }

    /// Non-blocking poll: `Some` once the outcome has arrived.
    pub fn try_outcome(&mut self) -> Option<TaskOutcome<R>> {
        self.rx.try_recv().ok()
    }

    /// Block the current (non-runtime) thread until the outcome arrives.
    pub fn blocking_outcome(self) -> TaskOutcome<R> {
        match self.rx.blocking_recv() {
            Ok(outcome) => outcome,
            Err(_) => TaskOutcome::Failure("task runner shut down before completion".to_string()),
        }
    }
}

/// Run `operation` on a dedicated blocking worker, returning a handle that
/// yields exactly one [`TaskOutcome`].
///
/// Must be called from within a tokio runtime. `Ok(Some(r))` becomes
/// `Success(Some(r))`, `Ok(None)` becomes `Success(None)`, and any `Err`
/// (or a worker panic) becomes `Failure(message)`.
pub fn submit<R, F>(operation: F) -> TaskHandle<R>
where
    R: Send + 'static,
    F: FnOnce() -> Result<Option<R>> + Send + 'static,
{
    let id = TaskId::new();
    let cancel = Arc::new(AtomicBool::new(false));
    let (tx, rx) = oneshot::channel();

    debug!(task_id = %id, "submitting task");

    let worker = tokio::task::spawn_blocking(operation);

    tokio::spawn(async move {
        let outcome = match worker.await {
            Ok(Ok(payload)) => {
                info!(task_id = %id, "task completed");
                TaskOutcome::Success(payload)
            }
            Ok(Err(err)) => {
                error!(task_id = %id, error = %err, "task failed");
                TaskOutcome::Failure(err.to_string())
            }
            Err(join_err) => {
                error!(task_id = %id, error = %join_err, "task worker panicked");
                TaskOutcome::Failure(format!("worker panicked: {join_err}"))
            }
        };
        // The receiver may have been dropped (view torn down) — that is fine.
        let _ = tx.send(outcome);
    });

    TaskHandle { id, rx, cancel }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::FolioError;

    #[tokio::test]
    async fn success_carries_payload() {
        let handle = submit(|| Ok(Some(42u32)));
        match handle.outcome().await {
            TaskOutcome::Success(Some(42)) => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn success_without_payload() {
        let handle = submit::<u32, _>(|| Ok(None));
        assert!(matches!(handle.outcome().await, TaskOutcome::Success(None)));
    }

    #[tokio::test]
    async fn failure_carries_error_text_verbatim() {
        let handle = submit::<u32, _>(|| Err(FolioError::IncorrectPassword));
        match handle.outcome().await {
            TaskOutcome::Failure(msg) => assert_eq!(msg, "Incorrect Password"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn panic_becomes_failure() {
        let handle = submit::<u32, _>(|| panic!("boom"));
        match handle.outcome().await {
            TaskOutcome::Failure(msg) => assert!(msg.contains("panic"), "got: {msg}"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancel_flag_is_advisory_only() {
        let handle = submit(|| Ok(Some("done".to_string())));
        handle.request_cancel();
        assert!(handle.is_cancel_requested());
        // The task still ran to completion and delivered its outcome.
        assert!(handle.outcome().await.is_success());
    }

    #[tokio::test]
    async fn concurrent_tasks_are_independent() {
        let a = submit(|| Ok(Some(1u32)));
        let b = submit::<u32, _>(|| Err(FolioError::Pdf("corrupt".into())));
        let c = submit(|| Ok(Some(3u32)));

        assert!(a.outcome().await.is_success());
        assert!(!b.outcome().await.is_success());
        assert!(c.outcome().await.is_success());
    }

    #[tokio::test]
    async fn try_outcome_eventually_yields() {
        let mut handle = submit(|| Ok(Some(7u32)));
        // Poll until delivery; bounded to keep the test finite.
        for _ in 0..200 {
            if let Some(outcome) = handle.try_outcome() {
                assert!(outcome.is_success());
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("outcome never arrived");
    }
}
