//! SDP (Session Description Protocol) generation (RFC 4566 / RFC 8866).
//!
//! Produces the body returned by DESCRIBE:
//!
//! ```text
//! v=0                                       ← protocol version
//! o=- <sess-id> 0 IN IP4 <addr>             ← origin
//! s=<resource>                              ← session name
//! c=IN IP4 <addr>                           ← connection address
//! t=0 0                                     ← timing (unbounded)
//! a=tool:mjpeg-rtsp                         ← server software
//! a=sendonly                                ← direction
//! m=video 0 RTP/AVP 26                      ← media description
//! a=rtpmap:26 JPEG/90000                    ← codec/clock rate
//! a=framing:<normal|hd>                     ← container framing the server will use
//! ```

use crate::media::QualityMode;

/// Generate the session description for `resource` in `mode`.
pub fn generate_sdp(
    resource: &str,
    host: &str,
    session_id: u32,
    payload_type: u8,
    mode: QualityMode,
) -> String {
    let sdp = [
        "v=0".to_string(),
        format!("o=- {} 0 IN IP4 {}", session_id, host),
        format!("s={}", resource),
        format!("c=IN IP4 {}", host),
        "t=0 0".to_string(),
        "a=tool:mjpeg-rtsp".to_string(),
        "a=sendonly".to_string(),
        format!("m=video 0 RTP/AVP {}", payload_type),
        format!("a=rtpmap:{} JPEG/90000", payload_type),
        format!("a=framing:{}", mode),
    ];

    tracing::trace!("SDP: {}", sdp.join("\r\n"));

    format!("{}\r\n", sdp.join("\r\n"))
}
