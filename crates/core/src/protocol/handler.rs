use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::media::{MjpegPacketizer, Packetizer, QualityMode, VideoFile};
use crate::protocol::Advisory;
use crate::protocol::request::RtspRequest;
use crate::protocol::response::RtspResponse;
use crate::protocol::sdp;
use crate::server::ServerConfig;
use crate::session::transport::TransportHeader;
use crate::session::{Method, SessionState};
use crate::transmitter::FrameTransmitter;
use crate::transport::UdpTransport;

/// Server view of the one session a connection may own.
#[derive(Default)]
struct ServerSession {
    state: SessionState,
    id: Option<u32>,
    quality: QualityMode,
    transmitter: Option<FrameTransmitter>,
}

/// Handles control requests for a single TCP connection.
///
/// Owns at most one session. The session's transmitter is stopped on
/// TEARDOWN and on [`cleanup`](Self::cleanup) when the connection drops.
pub struct MethodHandler {
    config: Arc<ServerConfig>,
    client_addr: SocketAddr,
    server_addr: SocketAddr,
    session: ServerSession,
}

impl MethodHandler {
    pub fn new(config: Arc<ServerConfig>, client_addr: SocketAddr, server_addr: SocketAddr) -> Self {
        MethodHandler {
            config,
            client_addr,
            server_addr,
            session: ServerSession::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.session.state
    }

    pub fn session_id(&self) -> Option<u32> {
        self.session.id
    }

    pub fn handle(&mut self, request: &RtspRequest) -> RtspResponse {
        let cseq = request.get_header("CSeq").unwrap_or("0").to_string();

        let method = match request.method() {
            Ok(m) => m,
            Err(_) => {
                tracing::warn!(method = %request.method, %cseq, "unsupported method");
                return RtspResponse::not_implemented().add_header("CSeq", &cseq);
            }
        };

        if let (Some(established), Some(named)) = (self.session.id, request.session_id())
            && established != named
        {
            tracing::warn!(%method, established, named, "request for unknown session");
            return RtspResponse::session_not_found().add_header("CSeq", &cseq);
        }

        if !self.accepts(method) {
            tracing::warn!(%method, state = %self.session.state, "method not valid in current state");
            return self.reply(RtspResponse::method_not_valid(), &cseq);
        }

        match method {
            Method::Setup => self.handle_setup(&cseq, request),
            Method::Play => self.handle_play(&cseq),
            Method::Pause => self.handle_pause(&cseq),
            Method::Teardown => self.handle_teardown(&cseq),
            Method::Describe => self.handle_describe(&cseq, request),
        }
    }

    /// Apply a flow-control advisory. Never produces a reply.
    pub fn handle_advisory(&mut self, advisory: Advisory) {
        match (&self.session.transmitter, advisory) {
            (Some(tx), Advisory::BufferFull) => tx.suspend(),
            (Some(tx), Advisory::BufferReady) => tx.resume(),
            (None, _) => {
                tracing::debug!(%advisory, "advisory without active transmission ignored");
            }
        }
    }

    /// Stop the session's transmission after the connection is gone.
    pub fn cleanup(&mut self) {
        if let Some(mut tx) = self.session.transmitter.take() {
            tx.stop();
            tracing::info!(session_id = ?self.session.id, client = %self.client_addr, "transmission stopped on disconnect");
        }
        self.session = ServerSession::default();
    }

    /// The client's table, relaxed for PLAY and PAUSE: the client may end
    /// playback locally without telling the server.
    fn accepts(&self, method: Method) -> bool {
        match method {
            Method::Play | Method::Pause => self.session.state != SessionState::Init,
            _ => self.session.state.accepts(method),
        }
    }

    /// Attach CSeq, and Session once one is established.
    fn reply(&self, response: RtspResponse, cseq: &str) -> RtspResponse {
        let response = response.add_header("CSeq", cseq);
        match self.session.id {
            Some(id) => response.add_header("Session", &id.to_string()),
            None => response,
        }
    }

    fn handle_setup(&mut self, cseq: &str, request: &RtspRequest) -> RtspResponse {
        let Some(transport) = request.get_header("Transport").and_then(TransportHeader::parse) else {
            tracing::warn!(%cseq, "SETUP without usable Transport header");
            return self.reply(RtspResponse::bad_request(), cseq);
        };

        let Some(path) = self.resolve(&request.uri) else {
            tracing::warn!(uri = %request.uri, "SETUP for resource outside media root");
            return self.reply(RtspResponse::not_found(), cseq);
        };

        let source = match VideoFile::open(&path, self.session.quality) {
            Ok(source) => source,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot open video");
                return self.reply(RtspResponse::not_found(), cseq);
            }
        };

        let socket = match UdpTransport::bind() {
            Ok(socket) => socket,
            Err(e) => {
                tracing::error!(error = %e, "failed to bind media socket");
                return self.reply(RtspResponse::internal_error(), cseq);
            }
        };

        let session_id: u32 = rand::random_range(100_000..=999_999);
        let dest = SocketAddr::new(self.client_addr.ip(), transport.client_port);
        let packetizer = MjpegPacketizer::with_max_payload(self.config.max_payload);

        let transmitter = match FrameTransmitter::start(
            session_id,
            Box::new(source),
            Box::new(packetizer),
            socket,
            dest,
            self.config.poll_interval,
        ) {
            Ok(tx) => tx,
            Err(e) => {
                tracing::error!(error = %e, "failed to start transmitter");
                return self.reply(RtspResponse::internal_error(), cseq);
            }
        };

        self.session.id = Some(session_id);
        self.session.state = SessionState::Ready;
        self.session.transmitter = Some(transmitter);

        tracing::info!(
            session_id,
            uri = %request.uri,
            quality = %self.session.quality,
            client_rtp = %dest,
            "session created via SETUP"
        );

        self.reply(RtspResponse::ok(), cseq)
            .add_header("Transport", &transport.to_header_value())
    }

    fn handle_play(&mut self, cseq: &str) -> RtspResponse {
        self.session.state = SessionState::Playing;
        tracing::info!(session_id = ?self.session.id, "session playing");
        self.reply(RtspResponse::ok(), cseq)
    }

    fn handle_pause(&mut self, cseq: &str) -> RtspResponse {
        self.session.state = SessionState::Ready;
        tracing::info!(session_id = ?self.session.id, "session paused");
        self.reply(RtspResponse::ok(), cseq)
    }

    fn handle_teardown(&mut self, cseq: &str) -> RtspResponse {
        // Join before replying so nothing is sent after the reply.
        if let Some(mut tx) = self.session.transmitter.take() {
            tx.stop();
        }
        let response = self.reply(RtspResponse::ok(), cseq);
        tracing::info!(session_id = ?self.session.id, "session terminated via TEARDOWN");

        let quality = self.session.quality;
        self.session = ServerSession {
            quality,
            ..ServerSession::default()
        };
        response
    }

    fn handle_describe(&mut self, cseq: &str, request: &RtspRequest) -> RtspResponse {
        let quality = match request.get_header("Mode").map(str::parse::<QualityMode>) {
            None => self.session.quality,
            Some(Ok(mode)) => mode,
            Some(Err(e)) => {
                tracing::warn!(%cseq, error = %e, "DESCRIBE with invalid Mode");
                return self.reply(RtspResponse::bad_request(), cseq);
            }
        };

        if !self.resolve(&request.uri).is_some_and(|p| p.is_file()) {
            tracing::warn!(uri = %request.uri, "DESCRIBE for unknown resource");
            return self.reply(RtspResponse::not_found(), cseq);
        }

        if quality != self.session.quality {
            tracing::info!(old = %self.session.quality, new = %quality, "quality mode changed");
        }
        self.session.quality = quality;

        let body = sdp::generate_sdp(
            &request.uri,
            &self.server_addr.ip().to_string(),
            self.session.id.unwrap_or(0),
            MjpegPacketizer::new().payload_type(),
            quality,
        );

        self.reply(RtspResponse::ok(), cseq)
            .add_header("Content-Type", "application/sdp")
            .with_body(body)
    }

    /// Map a resource name onto the media root. Rejects anything that could
    /// escape it.
    fn resolve(&self, resource: &str) -> Option<PathBuf> {
        let relative = Path::new(resource);
        let plain = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if resource.is_empty() || !plain {
            return None;
        }
        Some(self.config.media_root.join(relative))
    }
}
