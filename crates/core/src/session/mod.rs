//! Session state machine shared by client and server (RFC 2326 §A.1, reduced).
//!
//! Both ends keep their own copy of the session and move it with the same
//! transition table; the client only commits a transition once the server
//! has answered `200 OK` for the matching CSeq.
//!
//! ```text
//! INIT    --SETUP-->    READY
//! READY   --PLAY-->     PLAYING
//! PLAYING --PAUSE-->    READY
//! READY | PLAYING --TEARDOWN--> INIT
//! any     --DESCRIBE--> (unchanged)
//! ```
//!
//! Media starts flowing at SETUP, not at PLAY. PLAY and PAUSE only start
//! and stop local playback on the client; the server keeps pushing frames
//! until TEARDOWN, end of stream, or a `BUFFER_FULL` advisory.

pub mod transport;

use std::fmt;
use std::str::FromStr;

use crate::error::{ParseErrorKind, Result, StreamError};
use crate::media::QualityMode;
use crate::protocol::RtspResponse;
pub use transport::TransportHeader;

/// Playback state of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Connected, no media session yet.
    #[default]
    Init,
    /// Media is being pushed into the client's buffer; playback stopped.
    Ready,
    /// The client is displaying frames.
    Playing,
}

impl SessionState {
    /// Whether `method` may be issued from this state.
    pub fn accepts(self, method: Method) -> bool {
        match method {
            Method::Setup => self == Self::Init,
            Method::Play => self == Self::Ready,
            Method::Pause => self == Self::Playing,
            Method::Teardown => self != Self::Init,
            Method::Describe => true,
        }
    }

    /// State reached after a successful `method`, or `None` if it is illegal here.
    pub fn after(self, method: Method) -> Option<Self> {
        if !self.accepts(method) {
            return None;
        }
        Some(match method {
            Method::Setup | Method::Pause => Self::Ready,
            Method::Play => Self::Playing,
            Method::Teardown => Self::Init,
            Method::Describe => self,
        })
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Init => "INIT",
            Self::Ready => "READY",
            Self::Playing => "PLAYING",
        })
    }
}

/// Control-channel request methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Setup,
    Play,
    Pause,
    Teardown,
    Describe,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Setup => "SETUP",
            Self::Play => "PLAY",
            Self::Pause => "PAUSE",
            Self::Teardown => "TEARDOWN",
            Self::Describe => "DESCRIBE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "SETUP" => Ok(Self::Setup),
            "PLAY" => Ok(Self::Play),
            "PAUSE" => Ok(Self::Pause),
            "TEARDOWN" => Ok(Self::Teardown),
            "DESCRIBE" => Ok(Self::Describe),
            other => Err(StreamError::parse(ParseErrorKind::UnknownMethod(other.to_string()))),
        }
    }
}

/// Client-side view of the session.
///
/// Owns the CSeq counter and the server-assigned session id. Requests are
/// validated here before they are written to the socket, and replies are
/// matched here before any transition is applied.
#[derive(Debug, Default)]
pub struct ClientSession {
    state: SessionState,
    cseq: u32,
    session_id: Option<u32>,
    pending: Option<Method>,
    /// Mode of the current (or next, while in INIT) media session.
    quality: QualityMode,
    /// Mode named by the outstanding DESCRIBE.
    requested_quality: Option<QualityMode>,
    /// Mode acknowledged mid-session, applied once the session returns to INIT.
    pending_quality: Option<QualityMode>,
}

impl ClientSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn cseq(&self) -> u32 {
        self.cseq
    }

    pub fn session_id(&self) -> Option<u32> {
        self.session_id
    }

    pub fn quality(&self) -> QualityMode {
        self.quality
    }

    /// Mode the next SETUP will use.
    pub fn next_quality(&self) -> QualityMode {
        self.pending_quality.unwrap_or(self.quality)
    }

    pub fn last_request(&self) -> Option<Method> {
        self.pending
    }

    /// Reserve the next CSeq for `method`.
    ///
    /// Fails without consuming a sequence number if the request is not legal
    /// in the current state.
    pub fn begin(&mut self, method: Method) -> Result<u32> {
        self.cseq += 1;
        if !self.state.accepts(method) {
            self.cseq -= 1;
            tracing::debug!(%method, state = %self.state, "request rejected locally");
            return Err(StreamError::InvalidTransition {
                method,
                state: self.state,
            });
        }
        self.pending = Some(method);
        Ok(self.cseq)
    }

    /// Remember which mode the next DESCRIBE asks for.
    pub fn request_quality(&mut self, mode: QualityMode) {
        self.requested_quality = Some(mode);
    }

    /// Match a reply against the outstanding request and apply it.
    ///
    /// Returns the new state on `200 OK`. A reply for another CSeq yields
    /// [`StreamError::CSeqMismatch`] and leaves everything untouched, so the
    /// caller can keep waiting for the right one.
    pub fn apply_reply(&mut self, reply: &RtspResponse) -> Result<SessionState> {
        let got = reply
            .cseq()
            .ok_or_else(|| StreamError::parse(ParseErrorKind::MissingCSeq))?;
        if got != self.cseq {
            return Err(StreamError::CSeqMismatch {
                expected: self.cseq,
                got,
            });
        }
        let Some(method) = self.pending else {
            return Err(StreamError::CSeqMismatch {
                expected: self.cseq,
                got,
            });
        };

        let reply_session = reply.session_id();
        match (self.session_id, reply_session) {
            (Some(expected), Some(got)) if expected != got => {
                tracing::warn!(expected, got, "reply for another session ignored");
                return Err(StreamError::SessionMismatch { expected, got });
            }
            _ => {}
        }

        self.pending = None;

        if reply.status_code != 200 {
            tracing::warn!(%method, code = reply.status_code, reason = %reply.status_text, "request failed");
            return Err(StreamError::Status {
                code: reply.status_code,
                reason: reply.status_text.clone(),
            });
        }

        match method {
            Method::Setup => {
                if self.session_id.is_none() {
                    self.session_id = reply_session;
                }
            }
            Method::Describe => {
                if let Some(mode) = self.requested_quality.take() {
                    if self.state == SessionState::Init {
                        self.quality = mode;
                    } else {
                        tracing::debug!(%mode, "quality mode deferred to next setup");
                        self.pending_quality = Some(mode);
                    }
                }
            }
            Method::Teardown => {
                self.session_id = None;
                self.promote_quality();
            }
            Method::Play | Method::Pause => {}
        }

        let next = self.state.after(method).unwrap_or(self.state);
        if next != self.state {
            tracing::debug!(%method, old_state = %self.state, new_state = %next, "state transition");
        }
        self.state = next;
        Ok(next)
    }

    /// Local end of playback (buffer drained after end of stream).
    pub fn finish_playback(&mut self) {
        if self.state == SessionState::Playing {
            tracing::debug!("playback finished, back to READY");
            self.state = SessionState::Ready;
        }
    }

    /// Implicit teardown after the control connection is lost.
    pub fn reset(&mut self) {
        self.state = SessionState::Init;
        self.session_id = None;
        self.pending = None;
        self.promote_quality();
    }

    fn promote_quality(&mut self) {
        if let Some(mode) = self.pending_quality.take() {
            self.quality = mode;
        }
    }
}
