//! End-to-end tests: a real server on loopback driven by the library client
//! or by a raw TCP/UDP peer.

use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpStream, UdpSocket};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use mjpeg_rtsp::media::{END_OF_VIDEO, Frame, MediaPacket};
use mjpeg_rtsp::{
    Client, ClientConfig, Display, QualityMode, Server, ServerConfig, SessionState, Severity,
    StreamError,
};
use parking_lot::Mutex;

#[derive(Default)]
struct RecordingDisplay {
    rendered: Mutex<Vec<Frame>>,
    statuses: Mutex<Vec<(String, Severity)>>,
}

impl RecordingDisplay {
    fn numbers(&self) -> Vec<u16> {
        self.rendered.lock().iter().map(|f| f.number).collect()
    }
}

impl Display for RecordingDisplay {
    fn render(&self, frame: &Frame) {
        self.rendered.lock().push(frame.clone());
    }

    fn set_status(&self, text: &str, severity: Severity) {
        self.statuses.lock().push((text.to_string(), severity));
    }

    fn set_buffer_level(&self, _current: usize, _capacity: usize) {}

    fn confirm_quit(&self) -> bool {
        true
    }
}

/// Body of frame `n`: a fake JPEG whose length and content depend on `n`.
fn frame_bytes(n: usize) -> Vec<u8> {
    let mut data = vec![0xFF, 0xD8];
    data.extend((0..n * 700).map(|i| (i % 251) as u8));
    data.extend([0xFF, 0xD9]);
    data
}

/// Write a normal-framing video with `frames` frames into a fresh directory.
fn media_dir(tag: &str, frames: usize) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("mjpeg-rtsp-it-{}-{}", tag, std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    let mut video = Vec::new();
    for n in 1..=frames {
        let frame = frame_bytes(n % 7 + 1);
        video.extend_from_slice(format!("{:05}", frame.len()).as_bytes());
        video.extend_from_slice(&frame);
    }
    fs::write(dir.join("movie.Mjpeg"), video).unwrap();
    dir
}

/// Write an hd-framing video (bare marker-delimited JPEGs) with `frames` frames.
fn hd_media_dir(tag: &str, frames: usize) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("mjpeg-rtsp-it-{}-{}", tag, std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    let video: Vec<u8> = (1..=frames).flat_map(|n| frame_bytes(n % 7 + 1)).collect();
    fs::write(dir.join("movie.Mjpeg"), video).unwrap();
    dir
}

fn start_server(media_root: PathBuf) -> Server {
    let mut server = Server::with_config(
        "127.0.0.1:0",
        ServerConfig {
            media_root,
            poll_interval: Duration::from_millis(5),
            ..ServerConfig::default()
        },
    );
    server.start().expect("server start");
    server
}

fn fast_client_config(server: &Server) -> ClientConfig {
    let mut config = ClientConfig::new(&server.local_addr().unwrap().to_string(), "movie.Mjpeg");
    config.poll_interval = Duration::from_millis(10);
    config.buffer_timeout = Duration::from_secs(5);
    config.normal.min_interval = Duration::from_millis(1);
    config.normal.max_interval = Duration::from_millis(2);
    config.hd.min_interval = Duration::from_millis(1);
    config.hd.max_interval = Duration::from_millis(2);
    config
}

fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    done()
}

fn rtsp_request(stream: &mut TcpStream, request: &str) -> std::io::Result<String> {
    stream.write_all(request.as_bytes())?;
    stream.flush()?;

    let mut reader = BufReader::new(stream);
    let mut response = String::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        response.push_str(&line);
        if line == "\r\n" || line == "\n" {
            break;
        }
    }

    // Parse Content-Length and read body if present
    if let Some(len) = response
        .lines()
        .find(|l| l.to_lowercase().starts_with("content-length:"))
        .and_then(|l| l.split(':').nth(1))
        .and_then(|v| v.trim().parse::<usize>().ok())
        && len > 0
    {
        let mut body = vec![0u8; len];
        reader.read_exact(&mut body)?;
        response.push_str(&String::from_utf8_lossy(&body));
    }

    Ok(response)
}

fn session_header(response: &str) -> String {
    response
        .lines()
        .find_map(|l| l.strip_prefix("Session: "))
        .expect("Session header")
        .trim()
        .to_string()
}

#[test]
fn plays_whole_video_in_order_then_returns_to_ready() {
    let server = start_server(media_dir("play", 10));
    let display = Arc::new(RecordingDisplay::default());
    let mut client = Client::connect(fast_client_config(&server), display.clone()).unwrap();

    client.setup().unwrap();
    assert_eq!(client.state(), SessionState::Ready);
    let session_id = client.session_id().unwrap();
    assert!((100_000..=999_999).contains(&session_id));

    client.play().unwrap();
    assert!(
        wait_until(Duration::from_secs(5), || client.state() == SessionState::Ready),
        "playback did not end"
    );

    assert_eq!(display.numbers(), (1..=10).collect::<Vec<u16>>());
    for frame in display.rendered.lock().iter() {
        assert_eq!(frame.data, frame_bytes(frame.number as usize % 7 + 1));
    }
    assert_eq!(client.buffer_level(), 0);
    assert_eq!(client.stats().frames_received, 10);
    assert_eq!(client.stats().lost_frames, 0);
    assert!(display.statuses.lock().iter().any(|(s, _)| s == "playback ended"));

    // Playback over: PAUSE is illegal, PLAY is not.
    assert!(matches!(client.pause(), Err(StreamError::InvalidTransition { .. })));

    client.teardown().unwrap();
    assert_eq!(client.state(), SessionState::Init);
    assert_eq!(client.session_id(), None);
}

#[test]
fn hd_mode_negotiated_before_setup_plays_marker_framed_video() {
    let server = start_server(hd_media_dir("hd", 30));
    let display = Arc::new(RecordingDisplay::default());
    let mut client = Client::connect(fast_client_config(&server), display.clone()).unwrap();

    let sdp = client.describe(QualityMode::Hd).unwrap().expect("session description");
    assert!(sdp.contains("a=framing:hd"));
    assert_eq!(client.quality(), QualityMode::Hd);

    client.setup().unwrap();
    assert_eq!(client.buffer_limits(), (200, 25));

    client.play().unwrap();
    assert!(
        wait_until(Duration::from_secs(5), || client.state() == SessionState::Ready),
        "playback did not end"
    );
    assert_eq!(display.numbers(), (1..=30).collect::<Vec<u16>>());
    for frame in display.rendered.lock().iter() {
        assert_eq!(frame.data, frame_bytes(frame.number as usize % 7 + 1));
    }
    client.teardown().unwrap();
}

#[test]
fn describe_during_session_keeps_running_mode() {
    let server = start_server(media_dir("describe-late", 12));
    let display = Arc::new(RecordingDisplay::default());
    let mut client = Client::connect(fast_client_config(&server), display.clone()).unwrap();

    client.setup().unwrap();
    client.describe(QualityMode::Hd).unwrap();
    assert_eq!(client.quality(), QualityMode::Normal);
    assert_eq!(client.buffer_limits(), (120, 10));

    client.play().unwrap();
    assert!(
        wait_until(Duration::from_secs(5), || client.state() == SessionState::Ready),
        "playback did not end"
    );
    assert_eq!(display.numbers(), (1..=12).collect::<Vec<u16>>());

    client.teardown().unwrap();
    assert_eq!(client.quality(), QualityMode::Hd);
}

#[test]
fn zero_low_watermark_plays_to_the_end() {
    let server = start_server(media_dir("zero-min", 10));
    let display = Arc::new(RecordingDisplay::default());
    let mut config = fast_client_config(&server);
    config.normal.capacity = 3;
    config.normal.min_buffer = 0;
    let mut client = Client::connect(config, display.clone()).unwrap();

    client.setup().unwrap();
    assert_eq!(client.buffer_limits(), (3, 1));
    client.play().unwrap();
    assert!(
        wait_until(Duration::from_secs(5), || client.state() == SessionState::Ready),
        "playback did not end"
    );
    assert_eq!(display.numbers(), (1..=10).collect::<Vec<u16>>());
    client.teardown().unwrap();
}

#[test]
fn client_teardown_discards_buffered_frames() {
    let dir = media_dir("discard", 40);
    let server = start_server(dir.clone());
    let display = Arc::new(RecordingDisplay::default());
    let mut config = fast_client_config(&server);
    config.cache_dir = Some(dir.clone());
    let mut client = Client::connect(config, display.clone()).unwrap();

    client.setup().unwrap();
    assert!(wait_until(Duration::from_secs(5), || client.buffer_level() >= 5));

    client.teardown().unwrap();
    assert!(display.rendered.lock().is_empty());
    assert_eq!(client.buffer_level(), 0);
    assert_eq!(client.state(), SessionState::Init);
    assert_eq!(client.stats().frames_received, 0);

    assert!(matches!(client.setup(), Err(StreamError::NotConnected)));
}

#[test]
fn pause_and_resume_keep_order() {
    let dir = media_dir("pause", 30);
    let server = start_server(dir.clone());
    let display = Arc::new(RecordingDisplay::default());
    let mut config = fast_client_config(&server);
    config.normal.min_interval = Duration::from_millis(15);
    config.normal.max_interval = Duration::from_millis(20);
    config.cache_dir = Some(dir.clone());
    let mut client = Client::connect(config, display.clone()).unwrap();

    client.setup().unwrap();
    let cache = dir.join(format!("cache-{}.jpg", client.session_id().unwrap()));
    client.play().unwrap();
    assert!(wait_until(Duration::from_secs(5), || display.rendered.lock().len() >= 3));

    client.pause().unwrap();
    assert_eq!(client.state(), SessionState::Ready);
    let shown = display.rendered.lock().len();
    let elapsed = client.elapsed();
    thread::sleep(Duration::from_millis(60));
    assert_eq!(display.rendered.lock().len(), shown);
    assert_eq!(client.elapsed(), elapsed);

    let last = display.rendered.lock().last().cloned().unwrap();
    assert_eq!(fs::read(&cache).unwrap(), last.data);

    client.play().unwrap();
    assert!(wait_until(Duration::from_secs(5), || client.state() == SessionState::Ready));
    assert_eq!(display.numbers(), (1..=30).collect::<Vec<u16>>());
    assert!(client.elapsed() > elapsed);

    client.teardown().unwrap();
    assert!(!cache.exists());
}

#[test]
fn full_buffer_suspends_and_resumes_transmission() {
    let server = start_server(media_dir("backpressure", 50));
    let display = Arc::new(RecordingDisplay::default());
    let mut config = fast_client_config(&server);
    config.normal.capacity = 6;
    config.normal.min_buffer = 3;
    let mut client = Client::connect(config, display.clone()).unwrap();

    client.setup().unwrap();
    assert!(wait_until(Duration::from_secs(5), || client.stats().buffer_full_episodes == 1));
    assert_eq!(client.buffer_level(), 6);

    // Server holds off: nothing new is received while playback is stopped.
    let received = client.stats().frames_received;
    thread::sleep(Duration::from_millis(100));
    assert!(client.stats().frames_received <= received + 2);

    client.play().unwrap();
    assert!(
        wait_until(Duration::from_secs(10), || client.state() == SessionState::Ready),
        "playback did not end"
    );
    assert_eq!(display.numbers(), (1..=50).collect::<Vec<u16>>());
    assert!(client.stats().buffer_full_episodes >= 1);
    client.teardown().unwrap();
}

#[test]
fn setup_of_missing_video_leaves_init() {
    let server = start_server(media_dir("missing", 1));
    let display = Arc::new(RecordingDisplay::default());
    let mut config = fast_client_config(&server);
    config.resource = "nope.Mjpeg".to_string();
    let mut client = Client::connect(config, display.clone()).unwrap();

    match client.setup() {
        Err(StreamError::Status { code, .. }) => assert_eq!(code, 404),
        other => panic!("expected 404, got {other:?}"),
    }
    assert_eq!(client.state(), SessionState::Init);
    assert_eq!(client.session_id(), None);
    assert!(matches!(client.play(), Err(StreamError::InvalidTransition { .. })));
}

#[test]
fn raw_handshake_and_status_codes() {
    let server = start_server(media_dir("raw", 3));
    let mut stream = TcpStream::connect(server.local_addr().unwrap()).expect("connect to server");
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    let media = UdpSocket::bind("127.0.0.1:0").unwrap();
    let port = media.local_addr().unwrap().port();

    // DESCRIBE
    let resp = rtsp_request(&mut stream, "DESCRIBE movie.Mjpeg RTSP/1.0\r\nCSeq: 1\r\nMode: normal\r\n\r\n").unwrap();
    assert!(resp.starts_with("RTSP/1.0 200 OK"), "DESCRIBE: {resp}");
    assert!(resp.contains("Content-Type: application/sdp"));
    assert!(resp.contains("m=video 0 RTP/AVP 26"));
    assert!(!resp.contains("Session:"));

    // PLAY before SETUP
    let resp = rtsp_request(&mut stream, "PLAY movie.Mjpeg RTSP/1.0\r\nCSeq: 2\r\n\r\n").unwrap();
    assert!(resp.starts_with("RTSP/1.0 455"), "PLAY in INIT: {resp}");

    // Unknown method
    let resp = rtsp_request(&mut stream, "OPTIONS movie.Mjpeg RTSP/1.0\r\nCSeq: 3\r\n\r\n").unwrap();
    assert!(resp.starts_with("RTSP/1.0 501"));
    assert!(resp.contains("CSeq: 3\r\n"));

    // SETUP
    let setup = format!("SETUP movie.Mjpeg RTSP/1.0\r\nCSeq: 4\r\nTransport: RTP/UDP; client_port={port}\r\n\r\n");
    let resp = rtsp_request(&mut stream, &setup).unwrap();
    assert!(resp.starts_with("RTSP/1.0 200 OK"), "SETUP: {resp}");
    let session = session_header(&resp);

    // Advisory lines get no reply; the next request is answered normally.
    stream.write_all(b"BUFFER_FULL\r\nBUFFER_READY\r\n").unwrap();

    let resp = rtsp_request(&mut stream, &format!("PLAY movie.Mjpeg RTSP/1.0\r\nCSeq: 5\r\nSession: {session}\r\n\r\n")).unwrap();
    assert!(resp.starts_with("RTSP/1.0 200 OK"), "PLAY: {resp}");
    assert!(resp.contains("CSeq: 5\r\n"));
    assert_eq!(session_header(&resp), session);

    let resp = rtsp_request(&mut stream, "PAUSE movie.Mjpeg RTSP/1.0\r\nCSeq: 6\r\nSession: 1\r\n\r\n").unwrap();
    assert!(resp.starts_with("RTSP/1.0 454"), "PAUSE with wrong session: {resp}");

    // All three frames then the end marker.
    media.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    let mut buf = [0u8; 2048];
    let mut frames = Vec::new();
    loop {
        let n = media.recv(&mut buf).expect("datagram");
        if &buf[..n] == END_OF_VIDEO {
            break;
        }
        let packet = MediaPacket::decode(&buf[..n]).unwrap();
        assert_eq!(packet.payload_type, 26);
        if packet.marker {
            frames.push(packet.frame_number);
        }
    }
    assert_eq!(frames, vec![1, 2, 3]);

    let resp = rtsp_request(&mut stream, &format!("TEARDOWN movie.Mjpeg RTSP/1.0\r\nCSeq: 7\r\nSession: {session}\r\n\r\n")).unwrap();
    assert!(resp.starts_with("RTSP/1.0 200 OK"), "TEARDOWN: {resp}");
}

#[test]
fn no_packets_after_teardown_reply() {
    let server = start_server(media_dir("teardown", 2000));
    let mut stream = TcpStream::connect(server.local_addr().unwrap()).expect("connect to server");
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    let media = UdpSocket::bind("127.0.0.1:0").unwrap();
    let port = media.local_addr().unwrap().port();

    let setup = format!("SETUP movie.Mjpeg RTSP/1.0\r\nCSeq: 1\r\nTransport: RTP/UDP; client_port={port}\r\n\r\n");
    let resp = rtsp_request(&mut stream, &setup).unwrap();
    let session = session_header(&resp);

    media.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    let mut buf = [0u8; 2048];
    for _ in 0..5 {
        media.recv(&mut buf).expect("media flowing after SETUP");
    }

    let resp = rtsp_request(&mut stream, &format!("TEARDOWN movie.Mjpeg RTSP/1.0\r\nCSeq: 2\r\nSession: {session}\r\n\r\n")).unwrap();
    assert!(resp.starts_with("RTSP/1.0 200 OK"), "TEARDOWN: {resp}");

    // Drain whatever was already in flight, then expect silence.
    media.set_read_timeout(Some(Duration::from_millis(20))).unwrap();
    while media.recv(&mut buf).is_ok() {}
    thread::sleep(Duration::from_millis(150));
    assert!(media.recv(&mut buf).is_err(), "packet received after TEARDOWN reply");
}

#[test]
fn request_is_answered_only_after_blank_line() {
    let server = start_server(media_dir("framing", 1));
    let mut stream = TcpStream::connect(server.local_addr().unwrap()).expect("connect to server");
    stream.set_read_timeout(Some(Duration::from_millis(200))).unwrap();

    stream.write_all(b"DESCRIBE movie.Mjpeg RTSP/1.0\r\nCSeq: 1\r\n").unwrap();
    let mut byte = [0u8; 1];
    assert!(stream.read(&mut byte).is_err(), "reply before blank line");

    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    let resp = rtsp_request(&mut stream, "\r\n").unwrap();
    assert!(resp.starts_with("RTSP/1.0 200 OK"), "DESCRIBE: {resp}");
    assert!(resp.contains("CSeq: 1\r\n"));
}
