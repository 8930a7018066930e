//! Trailing-edge debounce for async work
//!
//! Callers that arrive within the wait window join a pending batch; when the
//! window closes with no new caller, the underlying task runs once and every
//! joined caller receives a clone of its single result.
//!
//! ```text
//! call ──┐   call ──┐        call ──┐
//!        ▼          ▼               ▼
//!   [ pending batch, deadline pushed back on every call ]
//!                                   └── wait elapses ──> task() ──> all waiters
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;

type BoxedTask<T> = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = T> + Send>> + Send + Sync>;

struct PendingBatch<T> {
    deadline: Option<Instant>,
    waiters: Vec<oneshot::Sender<T>>,
    timer_running: bool,
}

/// Debounced handle around an async task producing `T`
pub struct AsyncDebouncer<T> {
    wait: Duration,
    batch: Arc<Mutex<PendingBatch<T>>>,
    task: BoxedTask<T>,
}

impl<T> AsyncDebouncer<T>
where
    T: Clone + Send + 'static,
{
    pub fn new<F, Fut>(wait: Duration, task: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        Self {
            wait,
            batch: Arc::new(Mutex::new(PendingBatch {
                deadline: None,
                waiters: Vec::new(),
                timer_running: false,
            })),
            task: Arc::new(move || -> Pin<Box<dyn Future<Output = T> + Send>> {
                Box::pin(task())
            }),
        }
    }

    /// Join the pending batch (or start one) and wait for its result.
    ///
    /// Returns `None` if the batch was cancelled before it flushed.
    pub async fn call(&self) -> Option<T> {
        let (tx, rx) = oneshot::channel();
        let start_timer = {
            let mut batch = self.batch.lock();
            batch.waiters.push(tx);
            batch.deadline = Some(Instant::now() + self.wait);
            !std::mem::replace(&mut batch.timer_running, true)
        };
        if start_timer {
            tokio::spawn(Self::flush_when_quiet(
                Arc::clone(&self.batch),
                Arc::clone(&self.task),
            ));
        }
        rx.await.ok()
    }

    /// Number of callers waiting on the pending batch
    pub fn pending(&self) -> usize {
        self.batch.lock().waiters.len()
    }

    /// Drop the pending batch; its waiters resolve to `None`.
    pub fn cancel(&self) {
        let mut batch = self.batch.lock();
        batch.deadline = None;
        batch.waiters.clear();
    }

    async fn flush_when_quiet(batch: Arc<Mutex<PendingBatch<T>>>, task: BoxedTask<T>) {
        loop {
            let deadline = batch.lock().deadline;
            match deadline {
                Some(deadline) if Instant::now() < deadline => {
                    tokio::time::sleep_until(deadline).await
                }
                _ => break,
            }
        }

        let waiters = {
            let mut batch = batch.lock();
            batch.timer_running = false;
            batch.deadline = None;
            std::mem::take(&mut batch.waiters)
        };
        if waiters.is_empty() {
            return;
        }

        let result = task().await;
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
    }
}
