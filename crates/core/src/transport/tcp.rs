use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::protocol::{Advisory, MethodHandler, RtspRequest};
use crate::server::ServerConfig;

/// Non-blocking TCP accept loop.
///
/// Checks the `running` flag between accepts with a 50ms poll interval
/// so that [`crate::server::Server::stop`] can terminate it promptly.
/// Each accepted connection gets its own thread and its own session.
pub fn accept_loop(listener: TcpListener, config: Arc<ServerConfig>, running: Arc<AtomicBool>) {
    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, _)) => {
                if stream.set_nonblocking(false).is_err() {
                    continue;
                }
                let r = running.clone();
                let c = config.clone();
                thread::spawn(move || {
                    Connection::handle(stream, c, r);
                });
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    tracing::warn!(error = %e, "TCP accept error");
                }
            }
        }
    }
    tracing::debug!("accept loop exited");
}

/// One incoming unit on the control connection.
enum Incoming {
    Request(String),
    Advisory(Advisory),
}

/// A single client connection with its own lifecycle.
struct Connection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    handler: MethodHandler,
    peer_addr: SocketAddr,
}

impl Connection {
    /// Entry point: set up a connection and run its request loop.
    pub fn handle(stream: TcpStream, config: Arc<ServerConfig>, running: Arc<AtomicBool>) {
        let (Ok(peer_addr), Ok(local_addr)) = (stream.peer_addr(), stream.local_addr()) else {
            return;
        };

        tracing::info!(%peer_addr, "client connected");

        let reader_stream = match stream.try_clone() {
            Ok(s) => s,
            Err(_) => return,
        };

        let mut conn = Connection {
            reader: BufReader::new(reader_stream),
            writer: stream,
            handler: MethodHandler::new(config, peer_addr, local_addr),
            peer_addr,
        };

        let reason = conn.run(&running);
        conn.handler.cleanup();

        tracing::info!(%peer_addr, reason, "client disconnected");
    }

    /// Request/response loop. Returns the reason for exiting.
    fn run(&mut self, running: &Arc<AtomicBool>) -> &'static str {
        while running.load(Ordering::SeqCst) {
            let incoming = match self.read_incoming() {
                Ok(Some(incoming)) => incoming,
                Ok(None) => return "connection closed by client",
                Err(_) => return "read error",
            };

            let request_text = match incoming {
                Incoming::Advisory(advisory) => {
                    tracing::debug!(peer = %self.peer_addr, %advisory, "advisory");
                    self.handler.handle_advisory(advisory);
                    continue;
                }
                Incoming::Request(text) => text,
            };

            match RtspRequest::parse(&request_text) {
                Ok(request) => {
                    tracing::debug!(
                        peer = %self.peer_addr,
                        method = %request.method,
                        uri = %request.uri,
                        cseq = ?request.cseq(),
                        "request"
                    );

                    let response = self.handler.handle(&request);

                    tracing::debug!(
                        peer = %self.peer_addr,
                        status = response.status_code,
                        "response"
                    );

                    if self
                        .writer
                        .write_all(response.serialize().as_bytes())
                        .is_err()
                    {
                        return "write error";
                    }
                }
                Err(e) => {
                    tracing::warn!(peer = %self.peer_addr, error = %e, "parse error");
                }
            }
        }

        "server shutting down"
    }

    /// Read one request or one advisory line. A request is only complete at
    /// its terminating blank line; without one it gets no reply. Stray blank
    /// lines between messages are skipped.
    fn read_incoming(&mut self) -> std::io::Result<Option<Incoming>> {
        let mut text = String::new();
        loop {
            let mut line = String::new();
            if self.reader.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            let blank = line == "\r\n" || line == "\n";

            if text.is_empty() {
                if blank {
                    continue;
                }
                if let Some(advisory) = Advisory::parse(&line) {
                    return Ok(Some(Incoming::Advisory(advisory)));
                }
            }

            text.push_str(&line);
            if blank {
                return Ok(Some(Incoming::Request(text)));
            }
        }
    }
}
