//! Error types for the streaming library.

use std::fmt;

use crate::session::{Method, SessionState};

/// Errors that can occur anywhere in the streaming stack.
///
/// Variants map to the failure classes the client and server surface:
///
/// - **Protocol**: [`Parse`](Self::Parse), [`CSeqMismatch`](Self::CSeqMismatch),
///   [`SessionMismatch`](Self::SessionMismatch), [`Status`](Self::Status),
///   [`InvalidTransition`](Self::InvalidTransition).
/// - **Transport**: [`Io`](Self::Io), [`NoReply`](Self::NoReply),
///   [`NotConnected`](Self::NotConnected), [`ConnectionLost`](Self::ConnectionLost).
/// - **Media**: [`MalformedPacket`](Self::MalformedPacket),
///   [`InvalidFrameHeader`](Self::InvalidFrameHeader).
/// - **Buffering**: [`BufferTimeout`](Self::BufferTimeout).
/// - **Server**: [`NotStarted`](Self::NotStarted),
///   [`AlreadyRunning`](Self::AlreadyRunning).
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse a control-channel message.
    #[error("RTSP parse error: {kind}")]
    Parse { kind: ParseErrorKind },

    /// A datagram shorter than the fixed 12-byte media header.
    #[error("malformed media packet: {len} bytes is shorter than the header")]
    MalformedPacket { len: usize },

    /// A `normal`-mode frame did not start with a 5-digit ASCII length.
    #[error("invalid frame length prefix: {0:?}")]
    InvalidFrameHeader(String),

    /// The request is not legal in the current session state.
    #[error("{method} is not valid in state {state}")]
    InvalidTransition {
        method: Method,
        state: SessionState,
    },

    /// A reply answered some other request than the one in flight.
    #[error("reply CSeq {got} does not match outstanding request {expected}")]
    CSeqMismatch { expected: u32, got: u32 },

    /// A reply carried a session id other than the established one.
    #[error("reply session {got} does not match established session {expected}")]
    SessionMismatch { expected: u32, got: u32 },

    /// The server answered with a non-200 status.
    #[error("server replied {code} {reason}")]
    Status { code: u16, reason: String },

    /// No matching reply arrived before the reply timeout.
    #[error("no reply to {0} before timeout")]
    NoReply(Method),

    /// The control connection has been closed by TEARDOWN.
    #[error("control connection is not open")]
    NotConnected,

    /// The control connection dropped during an active session.
    #[error("control connection lost")]
    ConnectionLost,

    /// The jitter buffer did not reach its low watermark in time.
    #[error("failed to buffer {wanted} frames within {timeout_ms} ms (have {have})")]
    BufferTimeout {
        wanted: usize,
        have: usize,
        timeout_ms: u128,
    },

    /// `Mode` header or CLI argument was neither `normal` nor `hd`.
    #[error("unknown quality mode: {0}")]
    InvalidQuality(String),

    /// [`Server::start`](crate::Server::start) has not been called yet.
    #[error("server not started")]
    NotStarted,

    /// [`Server::start`](crate::Server::start) was called while already running.
    #[error("server already running")]
    AlreadyRunning,
}

/// Specific kind of control-channel parse failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Input was empty (no first line).
    EmptyMessage,
    /// Request line did not have the expected `Method URI Version` format.
    InvalidRequestLine,
    /// Status line did not have the expected `Version Code Reason` format.
    InvalidStatusLine,
    /// A header line did not contain a colon separator.
    InvalidHeader,
    /// The mandatory `CSeq` header is missing or not a number.
    MissingCSeq,
    /// The method token is not one of the supported methods.
    UnknownMethod(String),
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyMessage => write!(f, "empty message"),
            Self::InvalidRequestLine => write!(f, "invalid request line"),
            Self::InvalidStatusLine => write!(f, "invalid status line"),
            Self::InvalidHeader => write!(f, "invalid header"),
            Self::MissingCSeq => write!(f, "missing or non-numeric CSeq"),
            Self::UnknownMethod(m) => write!(f, "unknown method {m}"),
        }
    }
}

impl StreamError {
    pub(crate) fn parse(kind: ParseErrorKind) -> Self {
        Self::Parse { kind }
    }
}

/// Convenience alias for `Result<T, StreamError>`.
pub type Result<T> = std::result::Result<T, StreamError>;
