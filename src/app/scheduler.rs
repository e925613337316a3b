use std::time::Instant;

/// Identifies one requested frame so it can be cancelled later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHandle(u64);

/// Deadline-based stand-in for the display's frame callback.
pub trait FrameScheduler {
    /// Ask for a frame at `at`. Replaces any frame still pending.
    fn request_frame(&mut self, at: Instant) -> FrameHandle;
    fn cancel_frame(&mut self, handle: FrameHandle);
}

/// Scheduler polled by the event loop's `about_to_wait`.
#[derive(Debug, Default)]
pub struct WinitFrameScheduler {
    next_id: u64,
    pending: Option<(FrameHandle, Instant)>,
}

impl WinitFrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.map(|(_, at)| at)
    }

    /// Take the pending frame if its deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> Option<FrameHandle> {
        match self.pending {
            Some((handle, at)) if at <= now => {
                self.pending = None;
                Some(handle)
            }
            _ => None,
        }
    }
}

impl FrameScheduler for WinitFrameScheduler {
    fn request_frame(&mut self, at: Instant) -> FrameHandle {
        self.next_id += 1;
        let handle = FrameHandle(self.next_id);
        self.pending = Some((handle, at));
        handle
    }

    fn cancel_frame(&mut self, handle: FrameHandle) {
        if self.pending.is_some_and(|(pending, _)| pending == handle) {
            self.pending = None;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::time::Duration;

    /// Records every request and cancellation.
    #[derive(Debug, Default)]
    pub struct RecordingScheduler {
        pub requested: Vec<(FrameHandle, Instant)>,
        pub cancelled: Vec<FrameHandle>,
    }

    impl RecordingScheduler {
        pub fn last_requested(&self) -> Option<FrameHandle> {
            self.requested.last().map(|(handle, _)| *handle)
        }
    }

    impl FrameScheduler for RecordingScheduler {
        fn request_frame(&mut self, at: Instant) -> FrameHandle {
            let handle = FrameHandle(self.requested.len() as u64 + 1);
            self.requested.push((handle, at));
            handle
        }

        fn cancel_frame(&mut self, handle: FrameHandle) {
            self.cancelled.push(handle);
        }
    }

    #[test]
    fn frame_becomes_due_at_deadline() {
        let mut scheduler = WinitFrameScheduler::new();
        let now = Instant::now();
        let handle = scheduler.request_frame(now + Duration::from_millis(16));
        assert_eq!(scheduler.take_due(now), None);
        assert_eq!(scheduler.take_due(now + Duration::from_millis(16)), Some(handle));
        assert_eq!(scheduler.deadline(), None);
    }

    #[test]
    fn new_request_replaces_pending_and_cancel_matches_handle() {
        let mut scheduler = WinitFrameScheduler::new();
        let now = Instant::now();
        let first = scheduler.request_frame(now);
        let second = scheduler.request_frame(now + Duration::from_millis(40));
        assert_ne!(first, second);

        scheduler.cancel_frame(first);
        assert!(scheduler.deadline().is_some());
        scheduler.cancel_frame(second);
        assert_eq!(scheduler.deadline(), None);
    }
}
