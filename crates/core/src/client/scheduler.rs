//! Client playback loop.
//!
//! Pops one frame per display interval and presents it. The interval comes
//! from [`AdaptivePacer`]. An empty buffer is either a transient underrun
//! (wait) or, once the source is exhausted, the end of playback.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::client::buffer::JitterBuffer;
use crate::client::display::{Display, FrameArtifact, Severity};
use crate::client::pacing::{AdaptivePacer, PlaybackClock};
use crate::session::ClientSession;
use crate::sync::StopSignal;

const UNDERRUN_WAIT: Duration = Duration::from_millis(10);
const TICK: Duration = Duration::from_millis(5);

/// Why the playback loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackExit {
    Stopped,
    Ended,
}

pub struct PlaybackScheduler {
    buffer: Arc<JitterBuffer>,
    artifact: Arc<FrameArtifact>,
    display: Arc<dyn Display>,
    clock: Arc<Mutex<PlaybackClock>>,
    session: Arc<Mutex<ClientSession>>,
    pacer: AdaptivePacer,
}

impl PlaybackScheduler {
    pub fn new(
        buffer: Arc<JitterBuffer>,
        artifact: Arc<FrameArtifact>,
        display: Arc<dyn Display>,
        clock: Arc<Mutex<PlaybackClock>>,
        session: Arc<Mutex<ClientSession>>,
        pacer: AdaptivePacer,
    ) -> Self {
        Self {
            buffer,
            artifact,
            display,
            clock,
            session,
            pacer,
        }
    }

    pub fn run(mut self, stop: &StopSignal) -> PlaybackExit {
        self.clock.lock().start(Instant::now());
        let mut last_shown: Option<Instant> = None;

        let exit = loop {
            if stop.is_raised() {
                break PlaybackExit::Stopped;
            }

            let now = Instant::now();
            let interval = self
                .pacer
                .observe(now, self.buffer.len(), self.buffer.capacity());
            if last_shown.is_some_and(|t| now.duration_since(t) < interval) {
                stop.wait_timeout(TICK);
                continue;
            }

            let Some(frame) = self.buffer.pop() else {
                if self.buffer.is_source_exhausted() {
                    break PlaybackExit::Ended;
                }
                tracing::trace!("buffer underrun");
                stop.wait_timeout(UNDERRUN_WAIT);
                continue;
            };

            let number = frame.number;
            if let Err(e) = self.artifact.present(frame, self.display.as_ref()) {
                tracing::warn!(frame_number = number, error = %e, "failed to write cache file");
            }
            last_shown = Some(now);

            let elapsed = self.clock.lock().elapsed(Instant::now());
            self.display.set_elapsed(elapsed);
            self.display
                .set_buffer_level(self.buffer.len(), self.buffer.capacity());
            tracing::trace!(frame_number = number, interval_ms = interval.as_millis() as u64, "frame shown");
        };

        self.clock.lock().pause(Instant::now());
        if exit == PlaybackExit::Ended {
            self.session.lock().finish_playback();
            tracing::info!("playback ended");
            self.display.set_status("playback ended", Severity::Success);
        }
        exit
    }
}
