use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::trace;

/// Single-slot delayed action.
///
/// Holds at most one pending timer. Arming a new one cancels the previous
/// one, and the action only ever runs from the spawned timer task, never
/// inline from `schedule_after`. Must be used from within a tokio runtime.
#[derive(Debug, Default)]
pub struct RetryScheduler {
    pending: Option<JoinHandle<()>>,
}

impl RetryScheduler {
    pub fn new() -> Self {
        Self { pending: None }
    }

    /// Arm the timer so that `action` runs once after `delay`
    pub fn schedule_after<F>(&mut self, delay: Duration, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.cancel_pending();

        trace!("Arming retry timer for {:?}", delay);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action();
        });

        self.pending = Some(handle);
    }

    /// Cancel the pending timer, if any
    pub fn cancel_pending(&mut self) {
        if let Some(handle) = self.pending.take() {
            if !handle.is_finished() {
                trace!("Cancelling pending retry timer");
                handle.abort();
            }
        }
    }

    /// Whether a timer is armed and has not fired yet
    pub fn is_pending(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for RetryScheduler {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use tokio::time::{timeout, Instant};

    #[tokio::test(start_paused = true)]
    async fn test_action_runs_once_after_delay() {
        let mut scheduler = RetryScheduler::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let started = Instant::now();

        scheduler.schedule_after(Duration::from_millis(3000), move || {
            let _ = tx.send(Instant::now());
        });
        assert!(scheduler.is_pending());

        let fired_at = rx.recv().await.unwrap();
        assert!(fired_at - started >= Duration::from_millis(3000));

        // The closure owned the only sender, so nothing else can arrive
        assert!(rx.recv().await.is_none());
        assert!(!scheduler.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_action_never_runs_synchronously() {
        let mut scheduler = RetryScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        scheduler.schedule_after(Duration::ZERO, move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearming_replaces_pending_timer() {
        let mut scheduler = RetryScheduler::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let first = tx.clone();
        scheduler.schedule_after(Duration::from_millis(3000), move || {
            let _ = first.send("first");
        });
        let second = tx.clone();
        scheduler.schedule_after(Duration::from_millis(3000), move || {
            let _ = second.send("second");
        });
        drop(tx);

        assert_eq!(rx.recv().await, Some("second"));
        assert_eq!(
            timeout(Duration::from_secs(10), rx.recv()).await.unwrap(),
            None
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_action() {
        let mut scheduler = RetryScheduler::new();
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();

        scheduler.schedule_after(Duration::from_millis(3000), move || {
            let _ = tx.send(());
        });
        scheduler.cancel_pending();
        assert!(!scheduler.is_pending());

        assert_eq!(
            timeout(Duration::from_secs(10), rx.recv()).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let mut scheduler = RetryScheduler::new();
        scheduler.cancel_pending();
        scheduler.cancel_pending();
        assert!(!scheduler.is_pending());
    }
}
