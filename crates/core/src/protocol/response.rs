use crate::error::{ParseErrorKind, StreamError};

use super::request::{RTSP_VERSION, find_header, parse_headers, parse_session_value};

/// A control-channel reply.
///
/// ```text
/// RTSP/1.0 200 OK\r\n
/// CSeq: 1\r\n
/// Session: 482913\r\n
/// \r\n
/// ```
///
/// Uses a builder pattern: chain [`add_header`](Self::add_header) and
/// [`with_body`](Self::with_body), then call [`serialize`](Self::serialize).
/// `Content-Length` is computed automatically when a body is present.
#[must_use]
#[derive(Debug, Clone)]
pub struct RtspResponse {
    pub status_code: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

/// Server identification string included in every reply.
pub const SERVER_AGENT: &str = "mjpeg-rtsp/0.1";

impl RtspResponse {
    pub fn new(status_code: u16, status_text: &str) -> Self {
        RtspResponse {
            status_code,
            status_text: status_text.to_string(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Reply as sent by the server: carries the `Server` header.
    fn from_server(status_code: u16, status_text: &str) -> Self {
        Self::new(status_code, status_text).add_header("Server", SERVER_AGENT)
    }

    pub fn ok() -> Self {
        Self::from_server(200, "OK")
    }

    pub fn bad_request() -> Self {
        Self::from_server(400, "Bad Request")
    }

    pub fn not_found() -> Self {
        Self::from_server(404, "Not Found")
    }

    pub fn session_not_found() -> Self {
        Self::from_server(454, "Session Not Found")
    }

    pub fn method_not_valid() -> Self {
        Self::from_server(455, "Method Not Valid in This State")
    }

    pub fn internal_error() -> Self {
        Self::from_server(500, "Internal Server Error")
    }

    pub fn not_implemented() -> Self {
        Self::from_server(501, "Not Implemented")
    }

    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: String) -> Self {
        self.body = Some(body);
        self
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn cseq(&self) -> Option<u32> {
        self.get_header("CSeq").and_then(|v| v.trim().parse().ok())
    }

    pub fn session_id(&self) -> Option<u32> {
        self.get_header("Session").and_then(parse_session_value)
    }

    pub fn content_length(&self) -> Option<usize> {
        self.get_header("Content-Length").and_then(|v| v.parse().ok())
    }

    pub fn is_ok(&self) -> bool {
        self.status_code == 200
    }

    /// Serialize to the text wire format.
    ///
    /// If a body is present, `Content-Length` is appended automatically.
    pub fn serialize(&self) -> String {
        let mut response = format!("{} {} {}\r\n", RTSP_VERSION, self.status_code, self.status_text);

        for (name, value) in &self.headers {
            response.push_str(&format!("{}: {}\r\n", name, value));
        }

        if let Some(body) = &self.body {
            response.push_str(&format!("Content-Length: {}\r\n", body.len()));
            response.push_str("\r\n");
            response.push_str(body);
        } else {
            response.push_str("\r\n");
        }
        response
    }

    /// Parse the status line and headers of a reply. The body, if any, is
    /// read separately by the caller using [`content_length`](Self::content_length).
    pub fn parse(raw: &str) -> crate::error::Result<Self> {
        let mut lines = raw.lines();

        let status_line = lines
            .next()
            .filter(|l| !l.trim().is_empty())
            .ok_or_else(|| StreamError::parse(ParseErrorKind::EmptyMessage))?;

        let mut parts = status_line.splitn(3, ' ');
        let version = parts.next().unwrap_or_default();
        let code = parts.next().and_then(|c| c.trim().parse::<u16>().ok());
        let reason = parts.next().unwrap_or_default().trim();

        let (true, Some(status_code)) = (version.starts_with("RTSP/"), code) else {
            return Err(StreamError::parse(ParseErrorKind::InvalidStatusLine));
        };

        Ok(Self {
            status_code,
            status_text: reason.to_string(),
            headers: parse_headers(lines)?,
            body: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_no_body() {
        let resp = RtspResponse::ok()
            .add_header("CSeq", "1")
            .add_header("Session", "123456");
        let s = resp.serialize();
        assert!(s.starts_with("RTSP/1.0 200 OK\r\n"));
        assert!(s.contains("Server: mjpeg-rtsp/0.1\r\n"));
        assert!(s.contains("CSeq: 1\r\n"));
        assert!(s.contains("Session: 123456\r\n"));
        assert!(s.ends_with("\r\n\r\n"));
    }

    #[test]
    fn serialize_with_body() {
        let resp = RtspResponse::ok()
            .add_header("CSeq", "2")
            .with_body("v=0\r\n".to_string());
        let s = resp.serialize();
        assert!(s.contains("Content-Length: 5\r\n"));
        assert!(s.ends_with("\r\n\r\nv=0\r\n"));
    }

    #[test]
    fn status_helpers() {
        assert_eq!(RtspResponse::not_found().status_code, 404);
        assert_eq!(RtspResponse::session_not_found().status_code, 454);
        assert_eq!(RtspResponse::method_not_valid().status_code, 455);
        assert_eq!(RtspResponse::internal_error().status_code, 500);
        let s = RtspResponse::not_found().add_header("CSeq", "5").serialize();
        assert!(s.starts_with("RTSP/1.0 404 Not Found\r\n"));
    }

    #[test]
    fn parse_reply() {
        let raw = "RTSP/1.0 200 OK\r\nCSeq: 7\r\nSession: 482913;timeout=60\r\n\r\n";
        let reply = RtspResponse::parse(raw).unwrap();
        assert!(reply.is_ok());
        assert_eq!(reply.status_text, "OK");
        assert_eq!(reply.cseq(), Some(7));
        assert_eq!(reply.session_id(), Some(482913));
    }

    #[test]
    fn parse_reply_without_trailing_blank_line() {
        let reply = RtspResponse::parse("RTSP/1.0 404 Not Found\nCSeq: 3\nSession: 0").unwrap();
        assert_eq!(reply.status_code, 404);
        assert_eq!(reply.status_text, "Not Found");
        assert_eq!(reply.cseq(), Some(3));
        assert_eq!(reply.session_id(), Some(0));
    }

    #[test]
    fn parse_rejects_bad_status_line() {
        assert!(RtspResponse::parse("").is_err());
        assert!(RtspResponse::parse("HTTP/1.1 200 OK\r\n\r\n").is_err());
        assert!(RtspResponse::parse("RTSP/1.0 abc OK\r\n\r\n").is_err());
    }

    #[test]
    fn serialized_reply_parses_back() {
        let text = RtspResponse::method_not_valid()
            .add_header("CSeq", "9")
            .serialize();
        let reply = RtspResponse::parse(&text).unwrap();
        assert_eq!(reply.status_code, 455);
        assert_eq!(reply.cseq(), Some(9));
        assert_eq!(reply.get_header("server"), Some(SERVER_AGENT));
    }
}
