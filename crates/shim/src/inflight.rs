use crate::request::RequestHolder;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Marker for the single request currently waiting on a hardware callback.
///
/// Written by the request thread just before issuing hardware work, read and
/// cleared by whichever callback completes it. A callback that finds the slot
/// empty is stale.
#[derive(Debug, Default)]
pub struct InFlightSlot {
    holder: Mutex<Option<Arc<RequestHolder>>>,
}

impl InFlightSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<RequestHolder>>> {
        self.holder.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set(&self, holder: Arc<RequestHolder>) {
        *self.lock() = Some(holder);
    }

    /// Claim the in-flight request, leaving the slot empty.
    pub fn take(&self) -> Option<Arc<RequestHolder>> {
        self.lock().take()
    }

    pub fn clear(&self) {
        self.lock().take();
    }

    /// Claim the in-flight request only if it is still frame `frame_number`.
    /// A callback belonging to an earlier request leaves the slot untouched.
    pub fn take_if_frame(&self, frame_number: u64) -> Option<Arc<RequestHolder>> {
        let mut holder = self.lock();
        if holder.as_ref()?.frame_number() == frame_number {
            holder.take()
        } else {
            None
        }
    }

    pub fn holds_frame(&self, frame_number: u64) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|h| h.frame_number() == frame_number)
    }

    pub fn is_set(&self) -> bool {
        self.lock().is_some()
    }
}

/// Level-triggered completion signal with a bounded wait.
///
/// `notify` opens it (idempotent), `wait` blocks until open and consumes the
/// notification, `reset` closes it before new hardware work is issued so a
/// leftover notification cannot satisfy the next wait.
#[derive(Debug, Clone)]
pub struct CompletionSignal {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionSignal {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::bounded(1);
        Self { tx, rx }
    }

    pub fn notify(&self) {
        match self.tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => unreachable!("signal owns both ends"),
        }
    }

    pub fn reset(&self) {
        while self.rx.try_recv().is_ok() {}
    }

    /// Returns `false` if `timeout` elapsed first.
    pub fn wait(&self, timeout: Duration) -> bool {
        self.rx.recv_timeout(timeout).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{BurstHolder, CaptureRequest};
    use std::thread;
    use std::time::Instant;

    fn holder(frame: u64) -> Arc<RequestHolder> {
        let burst = BurstHolder::new(0, false, vec![Arc::new(CaptureRequest::new())]);
        Arc::new(burst.produce_request_holders(frame).unwrap().remove(0))
    }

    #[test]
    fn empty_slot_takes_nothing() {
        let slot = InFlightSlot::new();
        assert!(!slot.is_set());
        assert!(slot.take().is_none());
        assert!(slot.take_if_frame(0).is_none());
        assert!(!slot.holds_frame(0));
    }

    #[test]
    fn mismatched_frame_leaves_slot_in_place() {
        let slot = InFlightSlot::new();
        slot.set(holder(7));

        assert!(!slot.holds_frame(6));
        assert!(slot.take_if_frame(6).is_none());
        assert!(slot.is_set());

        assert!(slot.holds_frame(7));
        assert_eq!(slot.take_if_frame(7).map(|h| h.frame_number()), Some(7));
        assert!(!slot.is_set());
    }

    #[test]
    fn signal_times_out_when_not_notified() {
        let signal = CompletionSignal::new();
        let start = Instant::now();
        assert!(!signal.wait(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn signal_notify_before_wait_is_kept() {
        let signal = CompletionSignal::new();
        signal.notify();
        signal.notify();
        assert!(signal.wait(Duration::from_millis(10)));
        assert!(
            !signal.wait(Duration::from_millis(10)),
            "repeated notifications collapse into one"
        );
    }

    #[test]
    fn reset_discards_stale_notification() {
        let signal = CompletionSignal::new();
        signal.notify();
        signal.reset();
        assert!(!signal.wait(Duration::from_millis(10)));
    }

    #[test]
    fn signal_wakes_waiter_from_other_thread() {
        let signal = CompletionSignal::new();
        let remote = signal.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            remote.notify();
        });
        assert!(signal.wait(Duration::from_secs(5)));
        handle.join().unwrap();
    }
}
