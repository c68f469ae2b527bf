use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use crate::error::Result;

/// Largest datagram the receiver accepts.
pub const MAX_DATAGRAM: usize = 65_536;

/// UDP socket for the media channel.
///
/// The server binds an ephemeral socket per session and sends fragments to
/// the client's advertised port; the client binds its receive port with a
/// short read timeout so the receive loop can observe its stop signal.
///
/// This layer is address-only; it knows nothing about sessions or frames.
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Bind an ephemeral socket for outbound media.
    pub fn bind() -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        Ok(Self { socket })
    }

    /// Bind the client's receive socket. `port` 0 lets the OS choose.
    pub fn bind_receiver(port: u16, poll_interval: Duration) -> Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", port))?;
        socket.set_read_timeout(Some(poll_interval.max(Duration::from_millis(1))))?;
        tracing::debug!(port = socket.local_addr()?.port(), "media receive port opened");
        Ok(Self { socket })
    }

    pub fn local_port(&self) -> Result<u16> {
        Ok(self.socket.local_addr()?.port())
    }

    /// Send raw bytes to a specific socket address.
    pub fn send_to(&self, payload: &[u8], addr: SocketAddr) -> Result<usize> {
        Ok(self.socket.send_to(payload, addr)?)
    }

    /// Receive one datagram into `buf`. Returns `None` when the read timeout
    /// elapses without data.
    pub fn recv(&self, buf: &mut [u8]) -> Result<Option<usize>> {
        match self.socket.recv_from(buf) {
            Ok((n, _)) => Ok(Some(n)),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
