//! Client media receive loop.
//!
//! Reads datagrams, rebuilds frames, keeps the bandwidth and loss counters
//! current, and feeds the jitter buffer. When the buffer is full it runs the
//! advisory handshake with the server before enqueueing the held frame.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::client::buffer::{FlowController, JitterBuffer};
use crate::client::control::ControlWriter;
use crate::client::display::{Display, Severity};
use crate::client::stats::{BandwidthMeter, LossCounter, ReceiverStats};
use crate::media::{END_OF_VIDEO, Frame, MediaPacket, Reassembler};
use crate::protocol::Advisory;
use crate::sync::StopSignal;
use crate::transport::UdpTransport;
use crate::transport::udp::MAX_DATAGRAM;

/// Why the receive loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveExit {
    Stopped,
    EndOfVideo,
    SocketError,
}

/// Everything the receive loop owns for its lifetime.
pub struct FrameReceiver {
    socket: UdpTransport,
    buffer: Arc<JitterBuffer>,
    stats: Arc<ReceiverStats>,
    display: Arc<dyn Display>,
    advisories: Option<ControlWriter>,
    poll_interval: Duration,
    reassembler: Reassembler,
    loss: LossCounter,
    bandwidth: BandwidthMeter,
    flow: FlowController,
}

impl FrameReceiver {
    pub fn new(
        socket: UdpTransport,
        buffer: Arc<JitterBuffer>,
        stats: Arc<ReceiverStats>,
        display: Arc<dyn Display>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            socket,
            buffer,
            stats,
            display,
            advisories: None,
            poll_interval,
            reassembler: Reassembler::new(),
            loss: LossCounter::new(),
            bandwidth: BandwidthMeter::default(),
            flow: FlowController::new(),
        }
    }

    /// Where `BUFFER_FULL` / `BUFFER_READY` are sent. Without one the loop
    /// still waits for the buffer to drain but tells nobody.
    pub fn with_advisories(mut self, writer: ControlWriter) -> Self {
        self.advisories = Some(writer);
        self
    }

    pub fn run(mut self, stop: &StopSignal) -> ReceiveExit {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let exit = loop {
            if stop.is_raised() {
                break ReceiveExit::Stopped;
            }

            let len = match self.socket.recv(&mut buf) {
                Ok(Some(len)) => len,
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!(error = %e, "media socket failed");
                    self.display.set_status("media connection failed", Severity::Error);
                    break ReceiveExit::SocketError;
                }
            };

            let datagram = &buf[..len];
            if datagram == END_OF_VIDEO {
                tracing::info!(frames = self.stats.snapshot().frames_received, "end of video received");
                self.buffer.mark_source_exhausted();
                self.display.set_status("end of video received", Severity::Info);
                break ReceiveExit::EndOfVideo;
            }

            let packet = match MediaPacket::decode(datagram) {
                Ok(packet) => packet,
                Err(e) => {
                    tracing::debug!(error = %e, "datagram dropped");
                    continue;
                }
            };

            let Some(frame) = self.reassembler.push(packet) else {
                continue;
            };
            self.stats.set_abandoned(self.reassembler.abandoned());
            self.account(&frame);

            if !self.enqueue(frame, stop) {
                break ReceiveExit::Stopped;
            }
            self.display
                .set_buffer_level(self.buffer.len(), self.buffer.capacity());
        };

        tracing::debug!(?exit, "receive loop exited");
        exit
    }

    fn account(&mut self, frame: &Frame) {
        self.stats.record_frame(frame.data.len());

        let lost = self.loss.observe(frame.number);
        if lost > 0 {
            tracing::debug!(frame_number = frame.number, lost, "frames missing");
            self.stats.add_lost(lost);
        }

        if let Some(kbps) = self.bandwidth.record(frame.data.len(), Instant::now()) {
            self.stats.set_kbps(kbps);
        }
        tracing::trace!(frame_number = frame.number, bytes = frame.data.len(), "frame received");
    }

    /// Push `frame`, holding it through a full episode if needed. Returns
    /// `false` if stopped while waiting.
    fn enqueue(&mut self, frame: Frame, stop: &StopSignal) -> bool {
        let held = match self.buffer.push(frame) {
            Ok(()) => return true,
            Err(held) => held,
        };

        if let Some(advisory) = self.flow.on_full() {
            tracing::info!(level = self.buffer.len(), "jitter buffer full");
            self.stats.record_buffer_full();
            self.advise(advisory);
        }

        let low = self.buffer.min_buffer();
        while !self.buffer.wait_below(low, self.poll_interval) {
            if stop.is_raised() {
                return false;
            }
        }

        if let Some(advisory) = self.flow.on_drained() {
            tracing::info!(level = self.buffer.len(), "jitter buffer drained");
            self.advise(advisory);
        }

        if let Err(dropped) = self.buffer.push(held) {
            tracing::warn!(frame_number = dropped.number, "frame dropped after drain");
        }
        true
    }

    fn advise(&self, advisory: Advisory) {
        if let Some(writer) = &self.advisories
            && let Err(e) = writer.send_advisory(advisory)
        {
            tracing::warn!(%advisory, error = %e, "failed to send advisory");
        }
    }
}
