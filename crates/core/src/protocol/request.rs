use crate::error::{ParseErrorKind, StreamError};
use crate::session::Method;

/// Protocol version token used on every request and reply line.
pub const RTSP_VERSION: &str = "RTSP/1.0";

/// A control-channel request.
///
/// ```text
/// Method SP Resource SP RTSP/1.0 CRLF
/// *(Header: Value CRLF)
/// CRLF
/// ```
///
/// Header lookup is case-insensitive per RFC 2326 §4.2.
#[derive(Debug, Clone)]
pub struct RtspRequest {
    /// Method token as received (`SETUP`, `PLAY`, ...).
    pub method: String,
    /// Resource name, typically a file name relative to the server's media root.
    pub uri: String,
    /// Protocol version (expected: `RTSP/1.0`).
    pub version: String,
    /// Headers as ordered (name, value) pairs. Names are stored as-received.
    pub headers: Vec<(String, String)>,
}

impl RtspRequest {
    /// Start building a request for `method` on `uri`.
    pub fn new(method: Method, uri: &str) -> Self {
        Self {
            method: method.as_str().to_string(),
            uri: uri.to_string(),
            version: RTSP_VERSION.to_string(),
            headers: Vec::new(),
        }
    }

    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Parse a request from its text representation (request line plus headers).
    pub fn parse(raw: &str) -> crate::error::Result<Self> {
        let mut lines = raw.lines();

        let request_line = lines
            .next()
            .filter(|l| !l.trim().is_empty())
            .ok_or_else(|| StreamError::parse(ParseErrorKind::EmptyMessage))?;

        let parts: Vec<&str> = request_line.split_whitespace().collect();
        if parts.len() != 3 {
            return Err(StreamError::parse(ParseErrorKind::InvalidRequestLine));
        }

        let method = parts[0].to_string();
        let uri = parts[1].to_string();
        let version = parts[2].to_string();

        if version != RTSP_VERSION {
            tracing::warn!(version, "client sent non-RTSP/1.0 version");
        }

        let headers = parse_headers(lines)?;

        Ok(RtspRequest {
            method,
            uri,
            version,
            headers,
        })
    }

    /// Look up a header value by name (case-insensitive).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Numeric `CSeq` header, which pairs each request with its reply.
    pub fn cseq(&self) -> Option<u32> {
        self.get_header("CSeq").and_then(|v| v.parse().ok())
    }

    /// Session id named by the request, without any `;timeout=` suffix.
    pub fn session_id(&self) -> Option<u32> {
        self.get_header("Session").and_then(parse_session_value)
    }

    /// Parsed method, if it is one this stack implements.
    pub fn method(&self) -> crate::error::Result<Method> {
        self.method.parse()
    }

    /// Serialize to the wire format, terminated by an empty line.
    pub fn serialize(&self) -> String {
        let mut request = format!("{} {} {}\r\n", self.method, self.uri, self.version);
        for (name, value) in &self.headers {
            request.push_str(&format!("{}: {}\r\n", name, value));
        }
        request.push_str("\r\n");
        request
    }
}

pub(crate) fn parse_headers<'a>(
    lines: impl Iterator<Item = &'a str>,
) -> crate::error::Result<Vec<(String, String)>> {
    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            break;
        }

        let colon_pos = line
            .find(':')
            .ok_or_else(|| StreamError::parse(ParseErrorKind::InvalidHeader))?;

        let name = line[..colon_pos].trim().to_string();
        let value = line[colon_pos + 1..].trim().to_string();
        headers.push((name, value));
    }
    Ok(headers)
}

pub(crate) fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// `"123456;timeout=60"` -> `123456`
pub(crate) fn parse_session_value(value: &str) -> Option<u32> {
    value.split(';').next().and_then(|id| id.trim().parse().ok())
}
