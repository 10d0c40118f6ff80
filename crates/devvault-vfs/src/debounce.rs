//! Batching of change events.
//!
//! Agents often write several files in quick succession. Each delivered batch
//! costs the host a directory re-render, so events are buffered and flushed
//! together once per window.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

struct DebounceState<T> {
    pending: Vec<T>,
    /// The scheduled flush, if one is pending.
    timer: Option<JoinHandle<()>>,
}

/// Buffers events and delivers them as one batch per debounce window.
///
/// The first `schedule` after a flush arms a timer; later calls only append.
/// Events are never dropped or reordered before delivery.
pub struct EventDebouncer<T> {
    delay: Duration,
    state: Arc<Mutex<DebounceState<T>>>,
    tx: broadcast::Sender<Vec<T>>,
}

impl<T: Clone + Send + 'static> EventDebouncer<T> {
    /// Create a debouncer delivering batches on a broadcast channel.
    pub fn new(delay: Duration, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            delay,
            state: Arc::new(Mutex::new(DebounceState {
                pending: Vec::new(),
                timer: None,
            })),
            tx,
        }
    }

    /// Receive future batches.
    pub fn subscribe(&self) -> broadcast::Receiver<Vec<T>> {
        self.tx.subscribe()
    }

    /// Append an event, arming the flush timer if none is pending.
    ///
    /// Outside a tokio runtime there is nothing to arm, so the event is
    /// delivered immediately.
    pub fn schedule(&self, event: T) {
        self.schedule_all([event]);
    }

    /// Append several events atomically: they always land in the same batch.
    pub fn schedule_all(&self, events: impl IntoIterator<Item = T>) {
        let mut state = self.state.lock();
        state.pending.extend(events);
        if state.pending.is_empty() || state.timer.is_some() {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            let batch = std::mem::take(&mut state.pending);
            drop(state);
            self.deliver(batch);
            return;
        };

        let shared = Arc::clone(&self.state);
        let tx = self.tx.clone();
        let delay = self.delay;
        state.timer = Some(handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let batch = {
                let mut state = shared.lock();
                // Dropping our own handle detaches it; it must not abort.
                state.timer = None;
                std::mem::take(&mut state.pending)
            };
            if !batch.is_empty() {
                let _ = tx.send(batch);
            }
        }));
    }

    /// Deliver everything pending now and cancel the timer.
    pub fn flush(&self) {
        let batch = {
            let mut state = self.state.lock();
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
            std::mem::take(&mut state.pending)
        };
        self.deliver(batch);
    }

    /// Cancel any pending flush and drop buffered events.
    pub fn dispose(&self) {
        let mut state = self.state.lock();
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.pending.clear();
    }

    /// Number of buffered, undelivered events.
    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    fn deliver(&self, batch: Vec<T>) {
        if batch.is_empty() {
            return;
        }
        // No receivers is fine: nobody is watching.
        let _ = self.tx.send(batch);
    }
}

impl<T> Drop for EventDebouncer<T> {
    fn drop(&mut self) {
        if let Some(timer) = self.state.lock().timer.take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    const WINDOW: Duration = Duration::from_millis(5);

    #[tokio::test(start_paused = true)]
    async fn test_burst_is_one_batch_in_order() {
        let debouncer = EventDebouncer::new(WINDOW, 16);
        let mut rx = debouncer.subscribe();

        for i in 0..5 {
            debouncer.schedule(i);
        }
        assert_eq!(debouncer.pending_len(), 5);

        let batch = rx.recv().await.unwrap();
        assert_eq!(batch, vec![0, 1, 2, 3, 4]);
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test(start_paused = true)]
    async fn test_separated_events_are_separate_batches() {
        let debouncer = EventDebouncer::new(WINDOW, 16);
        let mut rx = debouncer.subscribe();

        debouncer.schedule("first");
        tokio::time::sleep(WINDOW * 4).await;
        debouncer.schedule("second");
        tokio::time::sleep(WINDOW * 4).await;

        assert_eq!(rx.recv().await.unwrap(), vec!["first"]);
        assert_eq!(rx.recv().await.unwrap(), vec!["second"]);
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_events_do_not_postpone_flush() {
        let debouncer = EventDebouncer::new(Duration::from_millis(10), 16);
        let mut rx = debouncer.subscribe();

        debouncer.schedule(1);
        tokio::time::sleep(Duration::from_millis(6)).await;
        debouncer.schedule(2);
        tokio::time::sleep(Duration::from_millis(6)).await;

        // 12ms after the first event: the first timer has fired.
        assert_eq!(rx.try_recv().unwrap(), vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_flush_and_dispose() {
        let debouncer = EventDebouncer::new(WINDOW, 16);
        let mut rx = debouncer.subscribe();

        debouncer.flush();
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty), "empty flush delivers nothing");

        debouncer.schedule(7);
        debouncer.flush();
        assert_eq!(rx.try_recv().unwrap(), vec![7]);

        debouncer.schedule(8);
        debouncer.dispose();
        tokio::time::sleep(WINDOW * 4).await;
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
        assert_eq!(debouncer.pending_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_all_joins_pending_batch() {
        let debouncer = EventDebouncer::new(WINDOW, 16);
        let mut rx = debouncer.subscribe();

        debouncer.schedule("a");
        debouncer.schedule_all(["b", "c"]);
        debouncer.schedule_all(std::iter::empty());

        assert_eq!(rx.recv().await.unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_without_runtime_delivers_immediately() {
        let debouncer = EventDebouncer::new(WINDOW, 4);
        let mut rx = debouncer.subscribe();
        debouncer.schedule(1);
        assert_eq!(rx.try_recv().unwrap(), vec![1]);
    }
}
