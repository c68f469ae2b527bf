//! Client end of the control connection.
//!
//! A listener thread reads replies off the socket and forwards them over a
//! channel; requests and advisories are written through a shared
//! [`ControlWriter`] so the receive loop can send `BUFFER_FULL` while the
//! user thread is waiting on a reply.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{Result, StreamError};
use crate::protocol::{Advisory, RtspRequest, RtspResponse};

/// What the listener thread reports.
#[derive(Debug)]
pub enum ControlEvent {
    Reply(RtspResponse),
    /// The server closed the connection or the socket failed.
    Closed,
}

/// Cloneable write half of the control connection.
#[derive(Clone)]
pub struct ControlWriter {
    stream: Arc<Mutex<TcpStream>>,
}

impl ControlWriter {
    pub fn send_request(&self, request: &RtspRequest) -> Result<()> {
        self.write(request.serialize().as_bytes())
    }

    pub fn send_advisory(&self, advisory: Advisory) -> Result<()> {
        tracing::debug!(%advisory, "sending advisory");
        self.write(advisory.serialize().as_bytes())
    }

    fn write(&self, bytes: &[u8]) -> Result<()> {
        let mut stream = self.stream.lock();
        stream.write_all(bytes)?;
        stream.flush()?;
        Ok(())
    }
}

/// An open control connection.
pub struct ControlChannel {
    writer: ControlWriter,
    events: Receiver<ControlEvent>,
    closing: Arc<AtomicBool>,
    listener: Option<JoinHandle<()>>,
}

impl ControlChannel {
    /// Connect and start the reply listener. `on_lost` runs on the listener
    /// thread if the connection drops without [`close`](Self::close).
    pub fn connect<F>(addr: &str, on_lost: F) -> Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        let reader = BufReader::new(stream.try_clone()?);
        tracing::info!(server = addr, local = %stream.local_addr()?, "control connection established");

        let (tx, events) = mpsc::channel();
        let closing = Arc::new(AtomicBool::new(false));
        let listener_closing = closing.clone();

        let listener = thread::Builder::new()
            .name("control-listener".to_string())
            .spawn(move || listen(reader, tx, listener_closing, on_lost))?;

        Ok(Self {
            writer: ControlWriter {
                stream: Arc::new(Mutex::new(stream)),
            },
            events,
            closing,
            listener: Some(listener),
        })
    }

    pub fn writer(&self) -> ControlWriter {
        self.writer.clone()
    }

    pub fn send_request(&self, request: &RtspRequest) -> Result<()> {
        self.writer.send_request(request)
    }

    /// Next listener event, or `None` if nothing arrived within `timeout`.
    pub fn next_event(&self, timeout: Duration) -> Option<ControlEvent> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(ControlEvent::Closed),
        }
    }

    /// Shut the connection down and wait for the listener to exit.
    pub fn close(self) {
        drop(self);
    }

    fn shutdown(&mut self) {
        self.closing.store(true, Ordering::SeqCst);
        if let Err(e) = self.writer.stream.lock().shutdown(Shutdown::Both)
            && e.kind() != std::io::ErrorKind::NotConnected
        {
            tracing::debug!(error = %e, "control shutdown failed");
        }
        if let Some(handle) = self.listener.take()
            && handle.join().is_err()
        {
            tracing::error!("control listener panicked");
        }
    }
}

impl Drop for ControlChannel {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn listen<F>(mut reader: BufReader<TcpStream>, tx: Sender<ControlEvent>, closing: Arc<AtomicBool>, on_lost: F)
where
    F: FnOnce(),
{
    let reason = loop {
        match read_reply(&mut reader) {
            Ok(Some(reply)) => {
                tracing::debug!(status = reply.status_code, cseq = ?reply.cseq(), "reply received");
                if tx.send(ControlEvent::Reply(reply)).is_err() {
                    break "client dropped";
                }
            }
            Ok(None) => break "connection closed by server",
            // Already logged; skip to the next message.
            Err(StreamError::Parse { .. }) => continue,
            Err(e) => {
                if closing.load(Ordering::SeqCst) {
                    break "closed";
                }
                tracing::warn!(error = %e, "control read failed");
                break "read error";
            }
        }
    };

    let _ = tx.send(ControlEvent::Closed);
    if closing.load(Ordering::SeqCst) {
        tracing::debug!("control listener stopped");
    } else {
        tracing::warn!(reason, "control connection lost");
        on_lost();
    }
}

/// Read one reply: status line and headers up to the blank line, then a
/// body of `Content-Length` bytes. Returns `None` on a clean EOF.
fn read_reply(reader: &mut impl BufRead) -> Result<Option<RtspResponse>> {
    let mut head = String::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let blank = line == "\r\n" || line == "\n";
        if blank && head.is_empty() {
            continue;
        }
        head.push_str(&line);
        if blank {
            break;
        }
    }

    let reply = match RtspResponse::parse(&head) {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!(error = %e, "unparseable reply");
            return Err(e);
        }
    };

    match reply.content_length().filter(|&n| n > 0) {
        Some(len) => {
            let mut body = vec![0u8; len];
            reader.read_exact(&mut body)?;
            Ok(Some(reply.with_body(String::from_utf8_lossy(&body).into_owned())))
        }
        None => Ok(Some(reply)),
    }
}
