//! Motion-JPEG video on demand over an RTSP-style control channel and
//! RTP-style UDP media.
//!
//! The server pushes frames from SETUP onwards; the client buffers them in
//! a bounded jitter buffer, paces playback from buffer occupancy, and pushes
//! back with `BUFFER_FULL` / `BUFFER_READY` advisories when it falls behind.

pub mod client;
pub mod error;
pub mod media;
pub mod protocol;
pub mod server;
pub mod session;
pub mod sync;
pub mod transmitter;
pub mod transport;

pub use client::{Client, ClientConfig, Display, QualityProfile, Severity};
pub use error::{Result, StreamError};
pub use media::{Frame, FrameSource, Packetizer, QualityMode};
pub use server::{Server, ServerConfig};
pub use session::SessionState;
