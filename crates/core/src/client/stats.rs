use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Counters written by the receive loop and read anywhere through
/// [`snapshot`](Self::snapshot).
#[derive(Debug, Default)]
pub struct ReceiverStats {
    frames_received: AtomicU64,
    bytes_received: AtomicU64,
    lost_frames: AtomicU64,
    abandoned_frames: AtomicU64,
    buffer_full_episodes: AtomicU64,
    /// `f64` bits.
    kbps: AtomicU64,
}

/// Point-in-time copy of [`ReceiverStats`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StatsSnapshot {
    pub frames_received: u64,
    pub bytes_received: u64,
    pub lost_frames: u64,
    pub abandoned_frames: u64,
    pub buffer_full_episodes: u64,
    pub kbps: f64,
}

impl ReceiverStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_frame(&self, bytes: usize) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn add_lost(&self, frames: u64) {
        if frames > 0 {
            self.lost_frames.fetch_add(frames, Ordering::Relaxed);
        }
    }

    pub fn set_abandoned(&self, frames: u64) {
        self.abandoned_frames.store(frames, Ordering::Relaxed);
    }

    pub fn record_buffer_full(&self) {
        self.buffer_full_episodes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_kbps(&self, kbps: f64) {
        self.kbps.store(kbps.to_bits(), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            lost_frames: self.lost_frames.load(Ordering::Relaxed),
            abandoned_frames: self.abandoned_frames.load(Ordering::Relaxed),
            buffer_full_episodes: self.buffer_full_episodes.load(Ordering::Relaxed),
            kbps: f64::from_bits(self.kbps.load(Ordering::Relaxed)),
        }
    }

    /// Zero every counter. Called at session teardown.
    pub fn reset(&self) {
        self.frames_received.store(0, Ordering::Relaxed);
        self.bytes_received.store(0, Ordering::Relaxed);
        self.lost_frames.store(0, Ordering::Relaxed);
        self.abandoned_frames.store(0, Ordering::Relaxed);
        self.buffer_full_episodes.store(0, Ordering::Relaxed);
        self.kbps.store(0f64.to_bits(), Ordering::Relaxed);
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "frames={} bytes={} lost={} incomplete={} buffer_full={} rate={:.1} kbps",
            self.frames_received,
            self.bytes_received,
            self.lost_frames,
            self.abandoned_frames,
            self.buffer_full_episodes,
            self.kbps
        )
    }
}

/// Counts frames skipped between consecutive completed frames.
#[derive(Debug, Default)]
pub struct LossCounter {
    previous: Option<u16>,
}

impl LossCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed frame and return how many were skipped before it.
    /// Repeats and backward jumps count as zero.
    pub fn observe(&mut self, frame_number: u16) -> u64 {
        let gap = match self.previous {
            Some(previous) => i64::from(frame_number) - i64::from(previous) - 1,
            None => 0,
        };
        self.previous = Some(frame_number);
        gap.max(0) as u64
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }
}

/// Bytes per fixed wall-clock window, reported as kbps averaged over the
/// last few windows.
#[derive(Debug)]
pub struct BandwidthMeter {
    window: Duration,
    window_start: Option<Instant>,
    bytes: u64,
    history: VecDeque<f64>,
    history_len: usize,
}

impl BandwidthMeter {
    pub fn new(window: Duration, history_len: usize) -> Self {
        Self {
            window,
            window_start: None,
            bytes: 0,
            history: VecDeque::with_capacity(history_len.max(1)),
            history_len: history_len.max(1),
        }
    }

    /// Add `bytes` observed at `now`. Returns the new average when a window
    /// closes.
    pub fn record(&mut self, bytes: usize, now: Instant) -> Option<f64> {
        let start = *self.window_start.get_or_insert(now);
        let elapsed = now.saturating_duration_since(start);

        let closed = if elapsed >= self.window {
            let kbps = (self.bytes as f64 * 8.0) / 1000.0 / elapsed.as_secs_f64();
            if self.history.len() == self.history_len {
                self.history.pop_front();
            }
            self.history.push_back(kbps);
            self.window_start = Some(now);
            self.bytes = 0;
            Some(self.average())
        } else {
            None
        };

        self.bytes += bytes as u64;
        closed
    }

    pub fn average(&self) -> f64 {
        if self.history.is_empty() {
            return 0.0;
        }
        self.history.iter().sum::<f64>() / self.history.len() as f64
    }

    pub fn reset(&mut self) {
        self.window_start = None;
        self.bytes = 0;
        self.history.clear();
    }
}

impl Default for BandwidthMeter {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), 3)
    }
}
