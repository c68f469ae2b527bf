/// Parsed client transport info from the `Transport` header.
///
/// Only the receive port matters: media is a single unicast UDP flow from
/// the server's ephemeral socket to `client_addr:client_port`.
///
/// ## Wire format
///
/// ```text
/// Transport: RTP/UDP; client_port=25000
/// ```
///
/// A `client_port=RTP-RTCP` pair (RFC 2326 §12.39 style) is also accepted;
/// the RTCP half is ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportHeader {
    /// Client's media receive port.
    pub client_port: u16,
}

impl TransportHeader {
    pub fn new(client_port: u16) -> Self {
        Self { client_port }
    }

    /// Parse the `Transport` header value.
    ///
    /// ## Examples
    ///
    /// ```
    /// use mjpeg_rtsp::session::TransportHeader;
    ///
    /// let th = TransportHeader::parse("RTP/UDP; client_port=25000").unwrap();
    /// assert_eq!(th.client_port, 25000);
    ///
    /// assert!(TransportHeader::parse("RTP/UDP").is_none());
    /// ```
    pub fn parse(header: &str) -> Option<Self> {
        header
            .split(';')
            .map(str::trim)
            .find_map(|part| part.strip_prefix("client_port="))
            .and_then(|ports| ports.split('-').next())
            .and_then(|port| port.trim().parse().ok())
            .map(Self::new)
    }

    /// Header value as sent by the client.
    pub fn to_header_value(&self) -> String {
        format!("RTP/UDP; client_port={}", self.client_port)
    }
}
