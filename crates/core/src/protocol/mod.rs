//! Control-channel protocol (RTSP/1.0 subset, RFC 2326).
//!
//! This module handles the text-based signaling between client and server:
//! parsing requests, building replies, routing methods on the server, and
//! generating the SDP returned by DESCRIBE.
//!
//! ## Message format (RFC 2326 §4)
//!
//! ```text
//! SETUP movie.Mjpeg RTSP/1.0\r\n
//! CSeq: 1\r\n
//! Transport: RTP/UDP; client_port=25000\r\n
//! \r\n
//! ```
//!
//! ## Supported methods
//!
//! | Method | Purpose |
//! |--------|---------|
//! | SETUP | Open the video, bind the media socket, start pushing frames |
//! | PLAY | Acknowledge client-side playback start |
//! | PAUSE | Acknowledge client-side playback stop |
//! | TEARDOWN | Stop transmission and destroy the session |
//! | DESCRIBE | Negotiate framing via `Mode: normal\|hd`, return SDP |
//!
//! ## Advisory lines
//!
//! The client also sends the bare lines `BUFFER_FULL` and `BUFFER_READY`
//! on the same connection. They are not requests: no CSeq, no reply.

pub mod handler;
pub mod request;
pub mod response;
pub mod sdp;

use std::fmt;

pub use handler::MethodHandler;
pub use request::RtspRequest;
pub use response::RtspResponse;

/// Client-to-server flow-control messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advisory {
    /// The client's jitter buffer is at capacity; suspend transmission.
    BufferFull,
    /// The buffer drained below its low watermark; resume transmission.
    BufferReady,
}

impl Advisory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BufferFull => "BUFFER_FULL",
            Self::BufferReady => "BUFFER_READY",
        }
    }

    /// Recognize an advisory from the first line of an incoming message.
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim() {
            "BUFFER_FULL" => Some(Self::BufferFull),
            "BUFFER_READY" => Some(Self::BufferReady),
            _ => None,
        }
    }

    /// Wire form: the token on its own CRLF-terminated line.
    pub fn serialize(&self) -> String {
        format!("{}\r\n", self.as_str())
    }
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advisory_lines() {
        assert_eq!(Advisory::parse("BUFFER_FULL\r\n"), Some(Advisory::BufferFull));
        assert_eq!(Advisory::parse("BUFFER_READY"), Some(Advisory::BufferReady));
        assert_eq!(Advisory::parse("PLAY movie RTSP/1.0"), None);
        assert_eq!(Advisory::BufferFull.serialize(), "BUFFER_FULL\r\n");
    }
}
