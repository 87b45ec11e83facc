//! Cooperative async scheduler (§4.4): tasks resumed on the main
//! (host-safe) thread, `run`/`defer`, per-task cancellation, and
//! non-fatal-by-default task errors.
//!
//! Grounded on the teacher's `dap/client.rs` reader/writer task-pair
//! (`tokio::spawn(Self::message_reader(...))`, `tokio::spawn(Self::message_writer(...))`):
//! this generalizes that inline pattern into a reusable primitive so every
//! component that needs a background task (protocol client, breakpoint
//! sync, session handshake) goes through the same cancellation and
//! failure-handling path instead of re-deriving it.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, warn};

/// A handle to a spawned task: its cancellation flag and join handle.
/// Dropping a `TaskHandle` does not cancel the task (matching
/// `tokio::task::JoinHandle`'s detach-on-drop semantics) — call `cancel()`
/// explicitly for that.
pub struct TaskHandle<T> {
    cancel_flag: Arc<CancelFlag>,
    join: JoinHandle<Option<T>>,
}

impl<T> TaskHandle<T> {
    pub fn cancel(&self) {
        self.cancel_flag.cancelled.store(true, Ordering::SeqCst);
        self.cancel_flag.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_flag.cancelled.load(Ordering::SeqCst)
    }

    /// Wait for the task to finish. `Ok(None)` means the task was cancelled
    /// or (in non-panic-mode) errored and was swallowed; `Err` means the
    /// tokio task itself panicked.
    pub async fn join(self) -> Result<Option<T>, tokio::task::JoinError> {
        self.join.await
    }

    pub fn abort(&self) {
        self.join.abort();
    }
}

struct CancelFlag {
    cancelled: AtomicBool,
    notify: Notify,
}

/// A cooperative task's view of its own cancellation state (§4.4:
/// "each task holds a cancel flag and a `preempted()` predicate").
#[derive(Clone)]
pub struct CancelToken {
    flag: Arc<CancelFlag>,
}

impl CancelToken {
    /// True once `TaskHandle::cancel` has been called. Long-running task
    /// bodies should check this at every suspension point and unwind early.
    pub fn preempted(&self) -> bool {
        self.flag.cancelled.load(Ordering::SeqCst)
    }

    /// Suspend until cancelled. Useful as one arm of a `tokio::select!` at a
    /// suspension point.
    pub async fn cancelled(&self) {
        if self.preempted() {
            return;
        }
        self.flag.notify.notified().await;
    }
}

/// Owned by whichever component spawns cooperative tasks (the protocol
/// client, the breakpoint engine's sync scheduler, session runtime
/// handshakes). `panic_mode` mirrors §4.4's runtime flag: off by default
/// (errors are logged and the task terminates quietly), settable to restore
/// fail-fast behavior for debugging.
#[derive(Clone)]
pub struct Scheduler {
    panic_mode: Arc<AtomicBool>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            panic_mode: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_panic_mode(&self, on: bool) {
        self.panic_mode.store(on, Ordering::SeqCst);
    }

    pub fn panic_mode(&self) -> bool {
        self.panic_mode.load(Ordering::SeqCst)
    }

    /// Start a task. `f` receives a `CancelToken` it should consult at its
    /// own suspension points; the executor additionally resumes `f` on the
    /// tokio runtime's worker, with all entity mutation still required to
    /// happen only through the single-threaded contract callers must
    /// uphold (§5) — `Scheduler` itself does not pin work to one OS thread,
    /// since `tokio::spawn` requires `Send` futures; a host integration
    /// that truly needs main-thread affinity drives everything through the
    /// `post_to_main` trampoline it owns (§9), with `Scheduler` tasks
    /// posting their result through it.
    pub fn run<F, Fut, T>(&self, f: F) -> TaskHandle<T>
    where
        F: FnOnce(CancelToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, crate::Error>> + Send + 'static,
        T: Send + 'static,
    {
        let cancel_flag = Arc::new(CancelFlag {
            cancelled: AtomicBool::new(false),
            notify: Notify::new(),
        });
        let token = CancelToken {
            flag: cancel_flag.clone(),
        };
        let panic_mode = self.panic_mode.clone();

        let join = tokio::spawn(async move {
            match f(token).await {
                Ok(v) => Some(v),
                Err(e) => {
                    if panic_mode.load(Ordering::SeqCst) {
                        panic!("scheduler task failed (panic_mode on): {e}");
                    }
                    error!(error = %e, "scheduler task failed; swallowed (panic_mode off)");
                    None
                }
            }
        });

        TaskHandle { cancel_flag, join }
    }

    /// Wrap a synchronous function into one that spawns a task and returns
    /// immediately (§4.4: "fire-and-forget; return value must not be
    /// used"). Errors from `f` are logged the same way `run`'s are.
    pub fn defer<F, Fut>(&self, f: F)
    where
        F: FnOnce(CancelToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), crate::Error>> + Send + 'static,
    {
        let handle = self.run(f);
        // Fire-and-forget: detach by dropping the handle without joining.
        // The task keeps running on the tokio runtime regardless.
        drop(handle);
    }

    /// Run `f` after `delay`, honoring cancellation (a cancelled sleep
    /// exits early rather than firing `f`). Used by the breakpoint engine's
    /// 50ms batch window (§4.8).
    pub fn run_after<F, Fut, T>(&self, delay: std::time::Duration, f: F) -> TaskHandle<T>
    where
        F: FnOnce(CancelToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, crate::Error>> + Send + 'static,
        T: Send + 'static,
    {
        self.run(move |token| async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = token.cancelled() => {
                    return Err(crate::Error::Cancelled("run_after cancelled before delay elapsed".into()));
                }
            }
            f(token).await
        })
    }
}

/// Logs a warning once if a future doesn't resolve within `warn_after` —
/// used by long awaited protocol calls to surface "this is taking a while"
/// without imposing a hard timeout (the hard timeouts live in `protocol`
/// and `session_runtime`, per §5).
pub async fn with_slow_warning<Fut, T>(label: &str, warn_after: std::time::Duration, fut: Fut) -> T
where
    Fut: Future<Output = T>,
{
    tokio::pin!(fut);
    tokio::select! {
        res = &mut fut => res,
        _ = tokio::time::sleep(warn_after) => {
            warn!(label, elapsed_ms = warn_after.as_millis() as u64, "operation is taking longer than expected");
            fut.await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    #[tokio::test]
    async fn run_returns_the_task_result() {
        let sched = Scheduler::new();
        let handle = sched.run(|_token| async move { Ok::<_, crate::Error>(42) });
        assert_eq!(handle.join().await.unwrap(), Some(42));
    }

    #[tokio::test]
    async fn errors_are_swallowed_by_default_panic_mode_off() {
        let sched = Scheduler::new();
        let handle = sched.run(|_token| async move {
            Err::<(), _>(crate::Error::Internal("boom".into()))
        });
        assert_eq!(handle.join().await.unwrap(), None);
    }

    #[tokio::test]
    async fn cancel_is_observed_by_the_token() {
        let sched = Scheduler::new();
        let observed = Arc::new(AtomicBool::new(false));
        let observed2 = observed.clone();
        let handle = sched.run(move |token| async move {
            token.cancelled().await;
            observed2.store(true, Ordering::SeqCst);
            Ok::<_, crate::Error>(())
        });
        handle.cancel();
        handle.join().await.unwrap();
        assert!(observed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn run_after_fires_f_once_delay_elapses() {
        let sched = Scheduler::new();
        let counter = Arc::new(AtomicU32::new(0));
        let counter2 = counter.clone();
        let handle = sched.run_after(Duration::from_millis(10), move |_token| async move {
            counter2.fetch_add(1, Ordering::SeqCst);
            Ok::<_, crate::Error>(())
        });
        handle.join().await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn run_after_cancelled_before_delay_never_fires_f() {
        let sched = Scheduler::new();
        let counter = Arc::new(AtomicU32::new(0));
        let counter2 = counter.clone();
        let handle = sched.run_after(Duration::from_millis(200), move |_token| async move {
            counter2.fetch_add(1, Ordering::SeqCst);
            Ok::<_, crate::Error>(())
        });
        handle.cancel();
        handle.join().await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
