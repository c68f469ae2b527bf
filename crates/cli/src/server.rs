use clap::Parser;
use mjpeg_rtsp::{Server, ServerConfig};
use std::io;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "mjpeg-server",
    about = "Motion-JPEG video-on-demand server"
)]
struct Args {
    /// Bind address (host:port)
    #[arg(long, short, default_value = "0.0.0.0:8554")]
    bind: String,

    /// Directory video files are served from
    #[arg(long, short, default_value = ".")]
    media_root: PathBuf,

    /// Wait between frames, in milliseconds
    #[arg(long, default_value_t = 50)]
    poll_ms: u64,

    /// Largest payload per media packet
    #[arg(long, default_value_t = 1500)]
    max_payload: usize,
}

fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let config = ServerConfig {
        media_root: args.media_root,
        poll_interval: Duration::from_millis(args.poll_ms),
        max_payload: args.max_payload.max(1),
    };
    let mut server = Server::with_config(&args.bind, config);

    if let Err(e) = server.start() {
        eprintln!("Failed to start server: {}", e);
        std::process::exit(1);
    }

    println!("Serving on {}, press Enter to stop", args.bind);
    let mut input = String::new();
    if let Err(e) = io::stdin().read_line(&mut input) {
        tracing::warn!(error = %e, "stdin closed");
    }

    server.stop();
}
