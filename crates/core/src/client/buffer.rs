//! Jitter buffer and advisory flow control.
//!
//! ```text
//!  Receiver ──push──▶ [ f f f f f ... ] ──pop──▶ Scheduler
//!                     ^min_buffer    ^capacity
//! ```
//!
//! The receiver is the only producer and the scheduler the only consumer.
//! When a push would exceed `capacity` the receiver holds the frame, sends
//! `BUFFER_FULL`, and waits for the level to fall below `min_buffer` before
//! sending `BUFFER_READY`. [`FlowController`] makes sure each advisory is
//! emitted once per episode.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::media::Frame;
use crate::protocol::Advisory;

struct Inner {
    frames: VecDeque<Frame>,
    capacity: usize,
    min_buffer: usize,
    exhausted: bool,
}

/// Outcome of [`JitterBuffer::wait_for_level`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferWait {
    /// The requested level was reached.
    Ready,
    /// The source ended before the level was reached.
    Exhausted,
    TimedOut,
}

fn clamp_limits(capacity: usize, min_buffer: usize) -> (usize, usize) {
    let capacity = capacity.max(1);
    (capacity, min_buffer.clamp(1, capacity))
}

/// Bounded FIFO of reassembled frames.
pub struct JitterBuffer {
    inner: Mutex<Inner>,
    changed: Condvar,
}

impl JitterBuffer {
    /// Both limits are clamped to `1..=capacity`: a zero low watermark could
    /// never be drained below.
    pub fn new(capacity: usize, min_buffer: usize) -> Self {
        let (capacity, min_buffer) = clamp_limits(capacity, min_buffer);
        Self {
            inner: Mutex::new(Inner {
                frames: VecDeque::with_capacity(capacity),
                capacity,
                min_buffer,
                exhausted: false,
            }),
            changed: Condvar::new(),
        }
    }

    /// Resize for a new quality profile. Frames already queued are kept.
    pub fn set_limits(&self, capacity: usize, min_buffer: usize) {
        let (capacity, min_buffer) = clamp_limits(capacity, min_buffer);
        let mut inner = self.inner.lock();
        inner.capacity = capacity;
        inner.min_buffer = min_buffer;
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    pub fn min_buffer(&self) -> usize {
        self.inner.lock().min_buffer
    }

    pub fn len(&self) -> usize {
        self.inner.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().frames.is_empty()
    }

    pub fn is_full(&self) -> bool {
        let inner = self.inner.lock();
        inner.frames.len() >= inner.capacity
    }

    /// Enqueue a frame, handing it back if the buffer is full.
    pub fn push(&self, frame: Frame) -> Result<(), Frame> {
        let mut inner = self.inner.lock();
        if inner.frames.len() >= inner.capacity {
            return Err(frame);
        }
        inner.frames.push_back(frame);
        self.changed.notify_all();
        Ok(())
    }

    pub fn pop(&self) -> Option<Frame> {
        let mut inner = self.inner.lock();
        let frame = inner.frames.pop_front();
        if frame.is_some() {
            self.changed.notify_all();
        }
        frame
    }

    /// Drop every queued frame and forget end-of-stream. Returns how many
    /// frames were discarded.
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let discarded = inner.frames.len();
        inner.frames.clear();
        inner.exhausted = false;
        self.changed.notify_all();
        discarded
    }

    /// Record that no more frames will arrive.
    pub fn mark_source_exhausted(&self) {
        let mut inner = self.inner.lock();
        inner.exhausted = true;
        self.changed.notify_all();
    }

    pub fn is_source_exhausted(&self) -> bool {
        self.inner.lock().exhausted
    }

    /// Block until at least `level` frames are queued, the source is
    /// exhausted, or `timeout` elapses.
    pub fn wait_for_level(&self, level: usize, timeout: Duration) -> BufferWait {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            if inner.frames.len() >= level {
                return BufferWait::Ready;
            }
            if inner.exhausted {
                return BufferWait::Exhausted;
            }
            if self.changed.wait_until(&mut inner, deadline).timed_out() {
                return if inner.frames.len() >= level {
                    BufferWait::Ready
                } else {
                    BufferWait::TimedOut
                };
            }
        }
    }

    /// Block until fewer than `level` frames are queued or `timeout`
    /// elapses. Returns whether the level was reached.
    pub fn wait_below(&self, level: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        while inner.frames.len() >= level {
            if self.changed.wait_until(&mut inner, deadline).timed_out() {
                return inner.frames.len() < level;
            }
        }
        true
    }
}

/// Whether the server has been asked to hold off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowState {
    #[default]
    Flowing,
    Backpressured,
}

/// Edge detector for the advisory handshake.
#[derive(Debug, Default)]
pub struct FlowController {
    state: FlowState,
}

impl FlowController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    /// The buffer refused a frame. Yields `BUFFER_FULL` only on the first
    /// refusal of an episode.
    pub fn on_full(&mut self) -> Option<Advisory> {
        match self.state {
            FlowState::Flowing => {
                self.state = FlowState::Backpressured;
                Some(Advisory::BufferFull)
            }
            FlowState::Backpressured => None,
        }
    }

    /// The buffer drained below its low watermark. Yields `BUFFER_READY`
    /// only if a `BUFFER_FULL` is outstanding.
    pub fn on_drained(&mut self) -> Option<Advisory> {
        match self.state {
            FlowState::Backpressured => {
                self.state = FlowState::Flowing;
                Some(Advisory::BufferReady)
            }
            FlowState::Flowing => None,
        }
    }

    pub fn reset(&mut self) {
        self.state = FlowState::Flowing;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn frame(number: u16) -> Frame {
        Frame {
            number,
            data: vec![number as u8],
        }
    }

    #[test]
    fn fifo_and_capacity() {
        let buf = JitterBuffer::new(3, 2);
        for n in 1..=3 {
            buf.push(frame(n)).unwrap();
        }
        assert!(buf.is_full());
        let rejected = buf.push(frame(4)).unwrap_err();
        assert_eq!(rejected.number, 4);

        assert_eq!(buf.pop().unwrap().number, 1);
        assert_eq!(buf.pop().unwrap().number, 2);
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.clear(), 1);
        assert!(buf.pop().is_none());
    }

    #[test]
    fn min_buffer_never_exceeds_capacity() {
        let buf = JitterBuffer::new(5, 10);
        assert_eq!(buf.min_buffer(), 5);
        buf.set_limits(200, 25);
        assert_eq!((buf.capacity(), buf.min_buffer()), (200, 25));
    }

    #[test]
    fn wait_for_level_outcomes() {
        let buf = Arc::new(JitterBuffer::new(10, 3));
        assert_eq!(buf.wait_for_level(3, Duration::from_millis(20)), BufferWait::TimedOut);

        let producer = buf.clone();
        let handle = thread::spawn(move || {
            for n in 1..=3 {
                thread::sleep(Duration::from_millis(5));
                producer.push(frame(n)).unwrap();
            }
        });
        assert_eq!(buf.wait_for_level(3, Duration::from_secs(5)), BufferWait::Ready);
        handle.join().unwrap();

        buf.clear();
        buf.push(frame(1)).unwrap();
        buf.mark_source_exhausted();
        assert_eq!(buf.wait_for_level(3, Duration::from_secs(5)), BufferWait::Exhausted);
        assert!(buf.is_source_exhausted());
        buf.clear();
        assert!(!buf.is_source_exhausted());
    }

    #[test]
    fn limits_never_reach_zero() {
        let buf = JitterBuffer::new(3, 0);
        assert_eq!((buf.capacity(), buf.min_buffer()), (3, 1));

        buf.set_limits(0, 0);
        assert_eq!((buf.capacity(), buf.min_buffer()), (1, 1));

        buf.set_limits(4, 9);
        assert_eq!((buf.capacity(), buf.min_buffer()), (4, 4));
    }

    #[test]
    fn wait_below_wakes_on_pop() {
        let buf = Arc::new(JitterBuffer::new(4, 2));
        for n in 1..=4 {
            buf.push(frame(n)).unwrap();
        }
        assert!(!buf.wait_below(2, Duration::from_millis(10)));

        let consumer = buf.clone();
        let handle = thread::spawn(move || {
            for _ in 0..3 {
                thread::sleep(Duration::from_millis(5));
                consumer.pop();
            }
        });
        assert!(buf.wait_below(2, Duration::from_secs(5)));
        handle.join().unwrap();
    }

    #[test]
    fn advisories_once_per_episode() {
        let mut flow = FlowController::new();
        assert_eq!(flow.on_drained(), None);

        assert_eq!(flow.on_full(), Some(Advisory::BufferFull));
        assert_eq!(flow.on_full(), None);
        assert_eq!(flow.on_full(), None);
        assert_eq!(flow.state(), FlowState::Backpressured);

        assert_eq!(flow.on_drained(), Some(Advisory::BufferReady));
        assert_eq!(flow.on_drained(), None);

        assert_eq!(flow.on_full(), Some(Advisory::BufferFull));
        flow.reset();
        assert_eq!(flow.on_drained(), None);
    }
}
