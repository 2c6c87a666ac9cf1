use crate::errors::{EngineError, Result};
use crate::request::{BurstHolder, CaptureRequest};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Outcome of a burst submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitInfo {
    pub request_id: u32,
    /// For a one-shot burst, the frame number its last request will get.
    /// For a repeating burst, the last frame number of the repeating burst it
    /// replaced, or `None` if nothing was replaced or it never produced a frame.
    pub last_frame_number: Option<u64>,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<BurstHolder>,
    repeating: Option<BurstHolder>,
    next_request_id: u32,
    next_frame_number: u64,
    /// One past the last frame handed out for the active repeating burst.
    repeating_frame_end: Option<u64>,
}

impl QueueState {
    fn last_repeating_frame(&self) -> Option<u64> {
        self.repeating_frame_end.map(|end| end - 1)
    }
}

/// Pending capture bursts: an ordered list of one-shot bursts plus at most one
/// repeating burst that is served whenever the list is empty.
///
/// Frame numbers are handed out when a burst is dequeued, so they are strictly
/// increasing with no gaps over the lifetime of the queue.
#[derive(Debug, Default)]
pub struct RequestQueue {
    state: Mutex<QueueState>,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a burst. A repeating burst replaces the current repeating burst.
    pub fn submit(
        &self,
        requests: Vec<Arc<CaptureRequest>>,
        repeating: bool,
    ) -> Result<SubmitInfo> {
        if requests.is_empty() {
            return Err(EngineError::EmptyBurst);
        }

        let mut state = self.lock();
        let request_id = state.next_request_id;
        state.next_request_id = state.next_request_id.wrapping_add(1);
        let burst = BurstHolder::new(request_id, repeating, requests);

        let last_frame_number = if repeating {
            let replaced = state
                .repeating
                .as_ref()
                .and_then(|_| state.last_repeating_frame());
            if let Some(old) = &state.repeating {
                tracing::debug!(
                    old_request_id = old.request_id(),
                    request_id,
                    "Replacing repeating burst"
                );
            }
            state.repeating_frame_end = None;
            state.repeating = Some(burst);
            replaced
        } else {
            let queued: u64 = state.pending.iter().map(|b| b.len() as u64).sum();
            let last = state.next_frame_number + queued + burst.len() as u64 - 1;
            state.pending.push_back(burst);
            Some(last)
        };

        Ok(SubmitInfo {
            request_id,
            last_frame_number,
        })
    }

    /// Deactivate the repeating burst if it is `request_id`.
    ///
    /// Returns the last frame number that burst will still produce, or `None`
    /// (invalid) if `request_id` is not the active repeating burst or it never
    /// produced a frame.
    pub fn stop_repeating(&self, request_id: u32) -> Option<u64> {
        let mut state = self.lock();
        let active = state
            .repeating
            .as_ref()
            .is_some_and(|burst| burst.request_id() == request_id);
        if !active {
            tracing::warn!(request_id, "Cancel for request that is not repeating");
            return None;
        }

        let last = state.last_repeating_frame();
        state.repeating = None;
        state.repeating_frame_end = None;
        last
    }

    /// Next burst to expand and the frame number of its first request.
    pub fn get_next(&self) -> Option<(BurstHolder, u64)> {
        let mut state = self.lock();
        let burst = match state.pending.pop_front() {
            Some(burst) => burst,
            None => {
                let burst = state.repeating.clone()?;
                let end = state.next_frame_number + burst.len() as u64;
                state.repeating_frame_end = Some(end);
                burst
            }
        };

        let first_frame = state.next_frame_number;
        state.next_frame_number += burst.len() as u64;
        Some((burst, first_frame))
    }

    /// Drop all work that has not been dequeued yet, including the repeating
    /// burst. Returns the number of bursts discarded.
    pub fn flush(&self) -> usize {
        let mut state = self.lock();
        let dropped = state.pending.len() + usize::from(state.repeating.is_some());
        state.pending.clear();
        state.repeating = None;
        state.repeating_frame_end = None;
        dropped
    }

    pub fn is_empty(&self) -> bool {
        let state = self.lock();
        state.pending.is_empty() && state.repeating.is_none()
    }

    pub fn has_repeating(&self) -> bool {
        self.lock().repeating.is_some()
    }
}
