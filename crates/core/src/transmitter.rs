//! Server-side push loop.
//!
//! Starts at SETUP and keeps pulling frames from the session's
//! [`FrameSource`], fragmenting them and sending the datagrams to the
//! client's media port. PLAY and PAUSE do not touch it. It ends when the
//! source runs dry (after sending [`END_OF_VIDEO`]) or when the stop signal
//! is raised by TEARDOWN or a dropped control connection. The client's
//! `BUFFER_FULL` / `BUFFER_READY` advisories suspend and resume it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crate::error::Result;
use crate::media::{END_OF_VIDEO, FrameSource, Packetizer};
use crate::sync::{StopSignal, Worker};
use crate::transport::UdpTransport;

/// Handle to a running push loop.
pub struct FrameTransmitter {
    worker: Worker,
    suspended: Arc<AtomicBool>,
    frames_sent: Arc<AtomicU64>,
}

/// Everything the push loop owns for its lifetime.
struct PushLoop {
    session_id: u32,
    source: Box<dyn FrameSource>,
    packetizer: Box<dyn Packetizer>,
    socket: UdpTransport,
    dest: SocketAddr,
    poll_interval: Duration,
    suspended: Arc<AtomicBool>,
    frames_sent: Arc<AtomicU64>,
}

impl FrameTransmitter {
    /// Spawn the push loop. The media socket is released when the loop exits.
    pub fn start(
        session_id: u32,
        source: Box<dyn FrameSource>,
        packetizer: Box<dyn Packetizer>,
        socket: UdpTransport,
        dest: SocketAddr,
        poll_interval: Duration,
    ) -> Result<Self> {
        let suspended = Arc::new(AtomicBool::new(false));
        let frames_sent = Arc::new(AtomicU64::new(0));

        let push = PushLoop {
            session_id,
            source,
            packetizer,
            socket,
            dest,
            poll_interval,
            suspended: suspended.clone(),
            frames_sent: frames_sent.clone(),
        };

        let worker = Worker::spawn(&format!("transmitter-{session_id}"), move |stop| push.run(&stop))?;
        tracing::info!(session_id, %dest, "frame transmission started");

        Ok(Self {
            worker,
            suspended,
            frames_sent,
        })
    }

    /// Stop pulling frames until [`resume`](Self::resume).
    pub fn suspend(&self) {
        if !self.suspended.swap(true, Ordering::SeqCst) {
            tracing::debug!("transmission suspended by client");
        }
    }

    pub fn resume(&self) {
        if self.suspended.swap(false, Ordering::SeqCst) {
            tracing::debug!("transmission resumed by client");
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }

    /// Whether the loop has exited (end of stream or stopped).
    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::SeqCst)
    }

    /// Permanently stop the loop and wait for it. Idempotent.
    pub fn stop(&mut self) {
        self.worker.stop();
    }
}

impl PushLoop {
    fn run(mut self, stop: &StopSignal) {
        let session_id = self.session_id;
        loop {
            if stop.wait_timeout(self.poll_interval) {
                tracing::info!(session_id, frames = self.frames_sent.load(Ordering::SeqCst), "transmission stopped");
                return;
            }
            if self.suspended.load(Ordering::SeqCst) {
                continue;
            }

            let frame = match self.source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    tracing::info!(session_id, frames = self.source.frame_index(), "end of video reached");
                    self.send_end_of_video();
                    return;
                }
                Err(e) => {
                    tracing::error!(session_id, error = %e, "frame source failed, ending stream");
                    self.send_end_of_video();
                    return;
                }
            };

            // Frame numbers wrap at 16 bits.
            let frame_number = self.source.frame_index() as u16;
            self.send_frame(frame_number, &frame);
            self.frames_sent.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn send_frame(&mut self, frame_number: u16, frame: &[u8]) {
        let packets = self.packetizer.packetize(frame_number, frame);
        if packets.is_empty() {
            tracing::debug!(frame_number, "empty frame skipped");
        }
        for (i, packet) in packets.iter().enumerate() {
            if let Err(e) = self.socket.send_to(packet, self.dest) {
                tracing::warn!(
                    frame_number,
                    fragment = i,
                    fragments = packets.len(),
                    error = %e,
                    "send failed, dropping rest of frame"
                );
                return;
            }
        }
        tracing::trace!(frame_number, fragments = packets.len(), "frame sent");
    }

    fn send_end_of_video(&self) {
        if let Err(e) = self.socket.send_to(END_OF_VIDEO, self.dest) {
            tracing::warn!(session_id = self.session_id, error = %e, "failed to send end-of-video marker");
        }
    }
}
