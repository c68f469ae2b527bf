use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use clap::Parser;
use mjpeg_rtsp::media::Frame;
use mjpeg_rtsp::{Client, ClientConfig, Display, QualityMode, Severity};

#[derive(Parser)]
#[command(
    name = "mjpeg-client",
    about = "Motion-JPEG video-on-demand client"
)]
struct Args {
    /// Video resource to request
    resource: String,

    /// Server control address (host:port)
    #[arg(long, short, default_value = "127.0.0.1:8554")]
    server: String,

    /// Local media port (0 picks a free one)
    #[arg(long, short, default_value_t = 0)]
    rtp_port: u16,

    /// Directory for the cache-<session>.jpg frame file
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Seconds to wait for the buffer to fill before giving up on PLAY
    #[arg(long, default_value_t = 15)]
    buffer_timeout: u64,
}

/// Logs presentation events and prints status lines.
#[derive(Default)]
struct ConsoleDisplay {
    rendered: AtomicUsize,
}

impl Display for ConsoleDisplay {
    fn render(&self, frame: &Frame) {
        let n = self.rendered.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(frame_number = frame.number, bytes = frame.data.len(), rendered = n, "frame");
    }

    fn set_status(&self, text: &str, severity: Severity) {
        match severity {
            Severity::Error => eprintln!("[error] {text}"),
            Severity::Warning => eprintln!("[warn] {text}"),
            Severity::Success | Severity::Info => println!("[status] {text}"),
        }
    }

    fn set_buffer_level(&self, current: usize, capacity: usize) {
        tracing::trace!(current, capacity, "buffer level");
    }

    fn set_elapsed(&self, elapsed: Duration) {
        let secs = elapsed.as_secs();
        if elapsed.subsec_millis() < 50 {
            tracing::debug!("elapsed {:02}:{:02}", secs / 60, secs % 60);
        }
    }

    fn confirm_quit(&self) -> bool {
        print!("Quit? [y/N] ");
        let _ = io::stdout().flush();
        let mut answer = String::new();
        if io::stdin().read_line(&mut answer).is_err() {
            return true;
        }
        matches!(answer.trim(), "y" | "Y" | "yes")
    }
}

const HELP: &str = "commands: setup | play | pause | describe <normal|hd> | stats | teardown | quit";

fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let mut config = ClientConfig::new(&args.server, &args.resource);
    config.rtp_port = args.rtp_port;
    config.cache_dir = args.cache_dir;
    config.buffer_timeout = Duration::from_secs(args.buffer_timeout);

    let display = Arc::new(ConsoleDisplay::default());
    let mut client = match Client::connect(config, display) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Failed to connect: {}", e);
            std::process::exit(1);
        }
    };

    println!("{HELP}");
    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("[{}] > ", client.state());
        let _ = io::stdout().flush();

        line.clear();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }

        let mut words = line.split_whitespace();
        let result = match (words.next(), words.next()) {
            (None, _) => continue,
            (Some("setup"), _) => client.setup(),
            (Some("play"), _) => client.play(),
            (Some("pause"), _) => client.pause(),
            (Some("teardown"), _) => client.teardown(),
            (Some("describe"), Some(mode)) => match mode.parse::<QualityMode>() {
                Ok(mode) => client.describe(mode).map(|sdp| {
                    if let Some(sdp) = sdp {
                        print!("{sdp}");
                    }
                }),
                Err(e) => Err(e),
            },
            (Some("stats"), _) => {
                let elapsed = client.elapsed().as_secs();
                println!(
                    "{} buffered={} elapsed={:02}:{:02}",
                    client.stats(),
                    client.buffer_level(),
                    elapsed / 60,
                    elapsed % 60
                );
                Ok(())
            }
            (Some("quit"), _) => match client.request_quit() {
                Ok(true) => break,
                Ok(false) => Ok(()),
                Err(e) => Err(e),
            },
            _ => {
                println!("{HELP}");
                continue;
            }
        };

        if let Err(e) = result {
            eprintln!("error: {e}");
        }
    }
}
