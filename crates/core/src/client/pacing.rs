//! Adaptive display pacing and the playback clock.
//!
//! The display interval follows buffer occupancy: a nearly empty buffer
//! slows playback to `max_interval` so the network can catch up, a full one
//! speeds it up to `min_interval`. Occupancy is sampled periodically and
//! smoothed over a sliding window so single bursts do not jerk the rate.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Sampling parameters shared by both quality profiles.
#[derive(Debug, Clone)]
pub struct PacingConfig {
    /// How often buffer occupancy is sampled.
    pub sample_period: Duration,
    /// Number of samples averaged.
    pub window: usize,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            sample_period: Duration::from_millis(500),
            window: 10,
        }
    }
}

/// Interval controller for the playback scheduler.
#[derive(Debug)]
pub struct AdaptivePacer {
    config: PacingConfig,
    min_interval: Duration,
    max_interval: Duration,
    samples: VecDeque<f64>,
    last_sample: Option<Instant>,
    interval: Duration,
}

impl AdaptivePacer {
    /// Starts at `max_interval` until the first sample is taken.
    pub fn new(config: PacingConfig, min_interval: Duration, max_interval: Duration) -> Self {
        let window = config.window.max(1);
        Self {
            config: PacingConfig { window, ..config },
            min_interval: min_interval.min(max_interval),
            max_interval,
            samples: VecDeque::with_capacity(window),
            last_sample: None,
            interval: max_interval,
        }
    }

    /// Current display interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// `max - (max - min) * ratio`, with `ratio` clamped to `[0, 1]`.
    pub fn interval_for_ratio(&self, ratio: f64) -> Duration {
        let ratio = if ratio.is_nan() { 0.0 } else { ratio.clamp(0.0, 1.0) };
        let span = (self.max_interval - self.min_interval).as_nanos() as f64;
        self.max_interval - Duration::from_nanos((span * ratio).round() as u64)
    }

    /// Record occupancy if a sample is due and return the interval to use.
    pub fn observe(&mut self, now: Instant, occupancy: usize, capacity: usize) -> Duration {
        let due = self
            .last_sample
            .is_none_or(|last| now.duration_since(last) >= self.config.sample_period);
        if !due {
            return self.interval;
        }
        self.last_sample = Some(now);

        if self.samples.len() == self.config.window {
            self.samples.pop_front();
        }
        self.samples.push_back(occupancy as f64);

        let average = self.samples.iter().sum::<f64>() / self.samples.len() as f64;
        let ratio = if capacity == 0 { 0.0 } else { average / capacity as f64 };
        let interval = self.interval_for_ratio(ratio);

        if interval != self.interval {
            tracing::trace!(
                occupancy,
                average,
                interval_ms = interval.as_millis() as u64,
                "display interval adjusted"
            );
        }
        self.interval = interval;
        interval
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.last_sample = None;
        self.interval = self.max_interval;
    }
}

/// Elapsed playback time that survives pause and resume.
#[derive(Debug, Default, Clone)]
pub struct PlaybackClock {
    started: Option<Instant>,
    accumulated: Duration,
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start or resume. No effect if already running.
    pub fn start(&mut self, now: Instant) {
        if self.started.is_none() {
            self.started = Some(now);
        }
    }

    /// Freeze the elapsed time. No effect if already paused.
    pub fn pause(&mut self, now: Instant) {
        if let Some(started) = self.started.take() {
            self.accumulated += now.saturating_duration_since(started);
        }
    }

    pub fn is_running(&self) -> bool {
        self.started.is_some()
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        self.accumulated
            + self
                .started
                .map_or(Duration::ZERO, |s| now.saturating_duration_since(s))
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
