use std::net::{SocketAddr, TcpListener};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::error::{Result, StreamError};
use crate::media::mjpeg::MAX_PAYLOAD;
use crate::transport::tcp;

/// Server-level configuration shared by every connection.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directory resource names are resolved against.
    pub media_root: PathBuf,
    /// Idle wait between frames in the push loop. Also bounds how long a
    /// stop request takes to be observed.
    pub poll_interval: Duration,
    /// Largest payload carried by one media packet.
    pub max_payload: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            media_root: PathBuf::from("."),
            poll_interval: Duration::from_millis(50),
            max_payload: MAX_PAYLOAD,
        }
    }
}

/// Video-on-demand server.
///
/// Listens for control connections and delegates each one to
/// [`transport::tcp`](crate::transport::tcp), where a per-connection
/// handler owns the session and its frame transmitter.
pub struct Server {
    running: Arc<AtomicBool>,
    bind_addr: String,
    local_addr: Option<SocketAddr>,
    config: Arc<ServerConfig>,
}

impl Server {
    pub fn new(bind_addr: &str) -> Self {
        Self::with_config(bind_addr, ServerConfig::default())
    }

    pub fn with_config(bind_addr: &str, config: ServerConfig) -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            bind_addr: bind_addr.to_string(),
            local_addr: None,
            config: Arc::new(config),
        }
    }

    pub fn start(&mut self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(StreamError::AlreadyRunning);
        }

        let listener = TcpListener::bind(&self.bind_addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        self.local_addr = Some(local_addr);

        self.running.store(true, Ordering::SeqCst);

        let running = self.running.clone();
        let config = self.config.clone();

        tracing::info!(
            addr = %local_addr,
            media_root = %config.media_root.display(),
            "server listening"
        );

        thread::spawn(move || {
            tcp::accept_loop(listener, config, running);
        });

        Ok(())
    }

    /// Stop accepting connections. Sessions already running end when their
    /// clients disconnect.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        tracing::info!("server stopping");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Address actually bound, useful when binding port 0.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.local_addr.ok_or(StreamError::NotStarted)
    }

    pub fn config(&self) -> Arc<ServerConfig> {
        self.config.clone()
    }
}
