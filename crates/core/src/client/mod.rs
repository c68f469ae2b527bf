//! Streaming client.
//!
//! ## Threads
//!
//! ```text
//!  user ──setup/play/pause/teardown──▶ Client ──requests──▶ TCP
//!                                        ▲
//!  control-listener ──replies────────────┘   (implicit teardown on loss)
//!  receiver   UDP ──▶ Reassembler ──▶ JitterBuffer      (from SETUP)
//!  scheduler  JitterBuffer ──▶ FrameArtifact ──▶ Display (while PLAYING)
//! ```
//!
//! Requests are strictly one in flight: each call blocks until the reply
//! with the matching CSeq arrives or `reply_timeout` elapses.

pub mod buffer;
pub mod control;
pub mod display;
pub mod pacing;
pub mod receiver;
pub mod scheduler;
pub mod stats;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::{Result, StreamError};
use crate::media::QualityMode;
use crate::protocol::{RtspRequest, RtspResponse};
use crate::session::{ClientSession, Method, SessionState, TransportHeader};
use crate::sync::Worker;
use crate::transport::UdpTransport;

pub use buffer::{BufferWait, FlowController, FlowState, JitterBuffer};
pub use control::{ControlChannel, ControlEvent, ControlWriter};
pub use display::{Display, FrameArtifact, Severity};
pub use pacing::{AdaptivePacer, PacingConfig, PlaybackClock};
pub use receiver::FrameReceiver;
pub use scheduler::PlaybackScheduler;
pub use stats::{ReceiverStats, StatsSnapshot};

/// Buffering and pacing limits for one quality mode.
#[derive(Debug, Clone)]
pub struct QualityProfile {
    pub capacity: usize,
    /// Low watermark: frames needed before playback starts, and the level
    /// the buffer must fall below before `BUFFER_READY`.
    pub min_buffer: usize,
    /// Display interval with a full buffer.
    pub min_interval: Duration,
    /// Display interval with an empty buffer.
    pub max_interval: Duration,
}

impl QualityProfile {
    pub fn normal() -> Self {
        Self {
            capacity: 120,
            min_buffer: 10,
            min_interval: Duration::from_millis(42),
            max_interval: Duration::from_millis(80),
        }
    }

    pub fn hd() -> Self {
        Self {
            capacity: 200,
            min_buffer: 25,
            min_interval: Duration::from_millis(33),
            max_interval: Duration::from_millis(80),
        }
    }
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// `host:port` of the server's control listener.
    pub server_addr: String,
    /// Resource name sent on every request.
    pub resource: String,
    /// Media receive port; 0 lets the OS choose.
    pub rtp_port: u16,
    /// Receive timeout of the media socket.
    pub poll_interval: Duration,
    pub reply_timeout: Duration,
    /// How long the first PLAY waits for the low watermark.
    pub buffer_timeout: Duration,
    /// Where `cache-<sessionId>.jpg` is written. `None` keeps frames in memory only.
    pub cache_dir: Option<PathBuf>,
    pub normal: QualityProfile,
    pub hd: QualityProfile,
    pub pacing: PacingConfig,
}

impl ClientConfig {
    pub fn new(server_addr: &str, resource: &str) -> Self {
        Self {
            server_addr: server_addr.to_string(),
            resource: resource.to_string(),
            rtp_port: 0,
            poll_interval: Duration::from_millis(50),
            reply_timeout: Duration::from_secs(5),
            buffer_timeout: Duration::from_secs(15),
            cache_dir: None,
            normal: QualityProfile::normal(),
            hd: QualityProfile::hd(),
            pacing: PacingConfig::default(),
        }
    }

    pub fn profile(&self, mode: QualityMode) -> &QualityProfile {
        match mode {
            QualityMode::Normal => &self.normal,
            QualityMode::Hd => &self.hd,
        }
    }
}

#[derive(Default)]
struct Workers {
    receiver: Option<Worker>,
    scheduler: Option<Worker>,
}

impl Workers {
    fn stop_scheduler(&mut self) {
        if let Some(mut w) = self.scheduler.take() {
            w.stop();
        }
    }

    fn stop_all(&mut self) {
        self.stop_scheduler();
        if let Some(mut w) = self.receiver.take() {
            w.stop();
        }
    }
}

/// State shared with the worker threads and the control listener.
struct Shared {
    session: Arc<Mutex<ClientSession>>,
    buffer: Arc<JitterBuffer>,
    stats: Arc<ReceiverStats>,
    clock: Arc<Mutex<PlaybackClock>>,
    artifact: Arc<FrameArtifact>,
    display: Arc<dyn Display>,
    workers: Mutex<Workers>,
}

impl Shared {
    /// Local half of teardown. Safe to run more than once.
    fn release(&self) {
        self.workers.lock().stop_all();
        self.clock.lock().reset();
        let discarded = self.buffer.clear();
        if discarded > 0 {
            tracing::debug!(discarded, "buffered frames discarded");
        }
        self.artifact.remove();
        tracing::info!(stats = %self.stats.snapshot(), "session statistics");
        self.stats.reset();
        self.display.set_buffer_level(0, self.buffer.capacity());
    }

    fn connection_lost(&self) {
        self.release();
        self.session.lock().reset();
        self.display.set_status("connection to server lost", Severity::Error);
    }
}

/// One client connected to one server resource.
pub struct Client {
    config: ClientConfig,
    shared: Arc<Shared>,
    control: Option<ControlChannel>,
}

impl Client {
    /// Open the control connection. The session starts in INIT.
    pub fn connect(config: ClientConfig, display: Arc<dyn Display>) -> Result<Self> {
        let profile = config.profile(QualityMode::default());
        let shared = Arc::new(Shared {
            session: Arc::new(Mutex::new(ClientSession::new())),
            buffer: Arc::new(JitterBuffer::new(profile.capacity, profile.min_buffer)),
            stats: Arc::new(ReceiverStats::new()),
            clock: Arc::new(Mutex::new(PlaybackClock::new())),
            artifact: Arc::new(FrameArtifact::new()),
            display,
            workers: Mutex::new(Workers::default()),
        });

        let on_lost = {
            let shared = shared.clone();
            move || shared.connection_lost()
        };
        let control = match ControlChannel::connect(&config.server_addr, on_lost) {
            Ok(control) => control,
            Err(e) => {
                shared
                    .display
                    .set_status(&format!("connection to {} failed", config.server_addr), Severity::Error);
                return Err(e);
            }
        };

        Ok(Self {
            config,
            shared,
            control: Some(control),
        })
    }

    pub fn state(&self) -> SessionState {
        self.shared.session.lock().state()
    }

    pub fn session_id(&self) -> Option<u32> {
        self.shared.session.lock().session_id()
    }

    pub fn quality(&self) -> QualityMode {
        self.shared.session.lock().quality()
    }

    /// Frames currently queued for display.
    pub fn buffer_level(&self) -> usize {
        self.shared.buffer.len()
    }

    /// `(capacity, min_buffer)` of the jitter buffer.
    pub fn buffer_limits(&self) -> (usize, usize) {
        (self.shared.buffer.capacity(), self.shared.buffer.min_buffer())
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn elapsed(&self) -> Duration {
        self.shared.clock.lock().elapsed(Instant::now())
    }

    /// Open the media port, send SETUP, and start receiving frames.
    pub fn setup(&mut self) -> Result<()> {
        self.ensure_valid(Method::Setup)?;

        let quality = self.quality();
        let profile = self.config.profile(quality).clone();
        self.shared.buffer.clear();
        self.shared.buffer.set_limits(profile.capacity, profile.min_buffer);

        // Bound before SETUP so nothing pushed after the reply is lost.
        let socket = UdpTransport::bind_receiver(self.config.rtp_port, self.config.poll_interval)?;
        let port = socket.local_port()?;
        let transport = TransportHeader::new(port).to_header_value();

        if let Err(e) = self.request(Method::Setup, &[("Transport", transport.as_str())]) {
            self.shared.display.set_status("setup failed", Severity::Error);
            return Err(e);
        }

        let session_id = self.session_id();
        if let (Some(dir), Some(id)) = (&self.config.cache_dir, session_id) {
            self.shared
                .artifact
                .set_cache_path(Some(dir.join(format!("cache-{id}.jpg"))));
        }

        let mut receiver = FrameReceiver::new(
            socket,
            self.shared.buffer.clone(),
            self.shared.stats.clone(),
            self.shared.display.clone(),
            self.config.poll_interval,
        );
        if let Some(control) = &self.control {
            receiver = receiver.with_advisories(control.writer());
        }
        let worker = Worker::spawn("receiver", move |stop| {
            receiver.run(&stop);
        })?;
        self.shared.workers.lock().receiver = Some(worker);

        tracing::info!(?session_id, rtp_port = port, %quality, "session ready");
        self.shared.display.set_status("ready", Severity::Success);
        Ok(())
    }

    /// Wait for the low watermark, send PLAY, and start the scheduler.
    pub fn play(&mut self) -> Result<()> {
        self.ensure_valid(Method::Play)?;

        let min_buffer = self.shared.buffer.min_buffer();
        self.shared
            .display
            .set_status(&format!("buffering {min_buffer} frames"), Severity::Info);
        if self.shared.buffer.wait_for_level(min_buffer, self.config.buffer_timeout) == BufferWait::TimedOut {
            let have = self.shared.buffer.len();
            tracing::warn!(wanted = min_buffer, have, "failed to buffer");
            self.shared.display.set_status("failed to buffer", Severity::Error);
            return Err(StreamError::BufferTimeout {
                wanted: min_buffer,
                have,
                timeout_ms: self.config.buffer_timeout.as_millis(),
            });
        }

        self.request(Method::Play, &[])?;
        self.start_scheduler()?;
        self.shared.display.set_status("playing", Severity::Success);
        Ok(())
    }

    /// Send PAUSE and stop playback. Frames keep arriving.
    pub fn pause(&mut self) -> Result<()> {
        self.request(Method::Pause, &[])?;
        self.shared.workers.lock().stop_scheduler();
        self.shared.display.set_status("paused", Severity::Info);
        Ok(())
    }

    /// Ask for a framing mode. Takes effect at the next SETUP; a running
    /// session keeps its framing and buffer limits. Returns the session
    /// description.
    pub fn describe(&mut self, mode: QualityMode) -> Result<Option<String>> {
        self.shared.session.lock().request_quality(mode);
        let reply = self.request(Method::Describe, &[("Mode", mode.as_str())])?;
        let status = if self.quality() == mode {
            format!("quality set to {mode}")
        } else {
            format!("quality {mode} applies after teardown")
        };
        self.shared.display.set_status(&status, Severity::Info);
        Ok(reply.body)
    }

    /// End the session and close the control connection.
    ///
    /// Local teardown happens even if the server does not answer; that
    /// failure is returned afterwards.
    pub fn teardown(&mut self) -> Result<()> {
        self.ensure_valid(Method::Teardown)?;

        self.shared.workers.lock().stop_all();
        let result = self.request(Method::Teardown, &[]);

        self.shared.release();
        self.shared.session.lock().reset();
        if let Some(control) = self.control.take() {
            control.close();
        }

        self.shared.display.set_status("session closed", Severity::Info);
        result.map(|_| ())
    }

    /// Pause, ask the user, then either tear down or resume. Returns whether
    /// the user chose to quit.
    pub fn request_quit(&mut self) -> Result<bool> {
        let was_playing = self.state() == SessionState::Playing;
        if was_playing {
            self.pause()?;
        }

        if self.shared.display.confirm_quit() {
            if self.state() != SessionState::Init {
                self.teardown()?;
            }
            return Ok(true);
        }

        if was_playing {
            self.play()?;
        }
        Ok(false)
    }

    fn ensure_valid(&self, method: Method) -> Result<()> {
        if self.control.is_none() {
            return Err(StreamError::NotConnected);
        }
        let state = self.state();
        if state.accepts(method) {
            Ok(())
        } else {
            Err(StreamError::InvalidTransition { method, state })
        }
    }

    fn start_scheduler(&mut self) -> Result<()> {
        let profile = self.config.profile(self.quality());
        let pacer = AdaptivePacer::new(self.config.pacing.clone(), profile.min_interval, profile.max_interval);
        let scheduler = PlaybackScheduler::new(
            self.shared.buffer.clone(),
            self.shared.artifact.clone(),
            self.shared.display.clone(),
            self.shared.clock.clone(),
            self.shared.session.clone(),
            pacer,
        );

        let mut workers = self.shared.workers.lock();
        workers.stop_scheduler();
        workers.scheduler = Some(Worker::spawn("scheduler", move |stop| {
            scheduler.run(&stop);
        })?);
        Ok(())
    }

    /// Send one request and wait for its reply.
    fn request(&mut self, method: Method, headers: &[(&str, &str)]) -> Result<RtspResponse> {
        let control = self.control.as_ref().ok_or(StreamError::NotConnected)?;

        let (cseq, session_id) = {
            let mut session = self.shared.session.lock();
            (session.begin(method)?, session.session_id())
        };

        let mut request =
            RtspRequest::new(method, &self.config.resource).add_header("CSeq", &cseq.to_string());
        if let Some(id) = session_id {
            request = request.add_header("Session", &id.to_string());
        }
        for (name, value) in headers {
            request = request.add_header(name, value);
        }

        tracing::debug!(%method, cseq, "sending request");
        control.send_request(&request)?;

        let deadline = Instant::now() + self.config.reply_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match control.next_event(remaining) {
                Some(ControlEvent::Reply(reply)) => match self.shared.session.lock().apply_reply(&reply) {
                    Ok(_) => return Ok(reply),
                    Err(StreamError::CSeqMismatch { expected, got }) => {
                        tracing::debug!(expected, got, "stale reply discarded");
                    }
                    Err(e) => return Err(e),
                },
                Some(ControlEvent::Closed) => return Err(StreamError::ConnectionLost),
                None => {
                    tracing::warn!(%method, cseq, "no reply before timeout");
                    return Err(StreamError::NoReply(method));
                }
            }
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Some(control) = self.control.take() {
            control.close();
        }
        self.shared.workers.lock().stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_scale_with_quality() {
        let config = ClientConfig::new("127.0.0.1:8554", "movie.Mjpeg");
        let normal = config.profile(QualityMode::Normal);
        let hd = config.profile(QualityMode::Hd);
        assert_eq!((normal.min_buffer, normal.capacity), (10, 120));
        assert_eq!((hd.min_buffer, hd.capacity), (25, 200));
        assert!(hd.min_interval < normal.min_interval);
        assert_eq!(normal.max_interval, Duration::from_millis(80));
    }
}
