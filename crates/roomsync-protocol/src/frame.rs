//! STOMP 1.2 framing.
//!
//! A frame is a command line, `name:value` header lines, a blank line, an
//! optional body and a NUL terminator. A lone end-of-line between frames is
//! a heartbeat. One WebSocket message may carry several frames and
//! heartbeats back to back.

use std::fmt;

use crate::ProtocolError;

/// STOMP commands used by Roomsync, in both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Connect,
    Stomp,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Stomp => "STOMP",
            Self::Connected => "CONNECTED",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Disconnect => "DISCONNECT",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    fn parse(line: &str) -> Result<Self, ProtocolError> {
        Ok(match line {
            "CONNECT" => Self::Connect,
            "STOMP" => Self::Stomp,
            "CONNECTED" => Self::Connected,
            "SEND" => Self::Send,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "DISCONNECT" => Self::Disconnect,
            "MESSAGE" => Self::Message,
            "RECEIPT" => Self::Receipt,
            "ERROR" => Self::Error,
            other => {
                return Err(ProtocolError::MalformedFrame(format!(
                    "unknown command {other:?}"
                )));
            }
        })
    }

    // CONNECT and CONNECTED headers are sent verbatim, without escaping.
    fn escapes_headers(self) -> bool {
        !matches!(self, Self::Connect | Self::Stomp | Self::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Frame {
    /// Creates a frame with no headers and an empty body.
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Appends a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the value of the first header named `name`.
    ///
    /// When a header repeats, only the first occurrence counts.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the body as UTF-8 text.
    pub fn body_text(&self) -> Result<&str, ProtocolError> {
        std::str::from_utf8(&self.body).map_err(|e| {
            ProtocolError::MalformedFrame(format!("body is not UTF-8: {e}"))
        })
    }

    /// Serializes the frame, adding `content-length` when there is a body.
    pub fn encode(&self) -> Vec<u8> {
        let escape = self.command.escapes_headers();
        let mut out = Vec::with_capacity(64 + self.body.len());
        out.extend_from_slice(self.command.as_str().as_bytes());
        out.push(b'\n');
        for (name, value) in &self.headers {
            if escape {
                out.extend_from_slice(escape_header(name).as_bytes());
                out.push(b':');
                out.extend_from_slice(escape_header(value).as_bytes());
            } else {
                out.extend_from_slice(name.as_bytes());
                out.push(b':');
                out.extend_from_slice(value.as_bytes());
            }
            out.push(b'\n');
        }
        if !self.body.is_empty() && self.get("content-length").is_none() {
            out.extend_from_slice(
                format!("content-length:{}\n", self.body.len()).as_bytes(),
            );
        }
        out.push(b'\n');
        out.extend_from_slice(&self.body);
        out.push(0);
        out
    }
}

/// One unit read off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Heartbeat,
    Frame(Frame),
}

/// Splits one transport message into heartbeats and frames.
///
/// Consecutive end-of-lines collapse into a single [`Packet::Heartbeat`].
///
/// # Errors
/// Returns [`ProtocolError::MalformedFrame`] if a frame is truncated, has an
/// unknown command, or a header line without a colon.
pub fn decode_packets(data: &[u8]) -> Result<Vec<Packet>, ProtocolError> {
    let mut packets = Vec::new();
    let mut pos = 0;

    while pos < data.len() {
        let mut saw_eol = false;
        while pos < data.len() && (data[pos] == b'\n' || data[pos] == b'\r') {
            pos += 1;
            saw_eol = true;
        }
        if saw_eol {
            packets.push(Packet::Heartbeat);
        }
        if pos >= data.len() {
            break;
        }
        let (frame, used) = decode_frame(&data[pos..])?;
        packets.push(Packet::Frame(frame));
        pos += used;
    }

    Ok(packets)
}

fn decode_frame(data: &[u8]) -> Result<(Frame, usize), ProtocolError> {
    let mut pos = 0;
    let command_line = read_line(data, &mut pos)?;
    let command = Command::parse(command_line)?;
    let unescape = command.escapes_headers();

    let mut headers = Vec::new();
    loop {
        let line = read_line(data, &mut pos)?;
        if line.is_empty() {
            break;
        }
        let (name, value) = line.split_once(':').ok_or_else(|| {
            ProtocolError::MalformedFrame(format!("header without colon: {line:?}"))
        })?;
        if unescape {
            headers.push((unescape_header(name)?, unescape_header(value)?));
        } else {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    let content_length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .map(|(_, v)| {
            v.trim().parse::<usize>().map_err(|_| {
                ProtocolError::MalformedFrame(format!("bad content-length {v:?}"))
            })
        })
        .transpose()?;

    let rest = &data[pos..];
    let body_len = match content_length {
        Some(len) => {
            if rest.len() <= len || rest[len] != 0 {
                return Err(ProtocolError::MalformedFrame(
                    "body shorter than content-length or missing NUL".into(),
                ));
            }
            len
        }
        None => rest.iter().position(|b| *b == 0).ok_or_else(|| {
            ProtocolError::MalformedFrame("frame not NUL-terminated".into())
        })?,
    };

    let frame = Frame {
        command,
        headers,
        body: rest[..body_len].to_vec(),
    };
    Ok((frame, pos + body_len + 1))
}

fn read_line<'a>(data: &'a [u8], pos: &mut usize) -> Result<&'a str, ProtocolError> {
    let start = *pos;
    let end = data[start..]
        .iter()
        .position(|b| *b == b'\n')
        .map(|i| start + i)
        .ok_or_else(|| ProtocolError::MalformedFrame("truncated frame".into()))?;
    *pos = end + 1;
    let line = data[start..end].strip_suffix(b"\r").unwrap_or(&data[start..end]);
    std::str::from_utf8(line)
        .map_err(|e| ProtocolError::MalformedFrame(format!("header is not UTF-8: {e}")))
}

fn escape_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(raw: &str) -> Result<String, ProtocolError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => {
                return Err(ProtocolError::MalformedFrame(format!(
                    "undefined escape \\{}",
                    other.map(String::from).unwrap_or_default()
                )));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn only_frame(data: &[u8]) -> Frame {
        match decode_packets(data).unwrap().as_slice() {
            [Packet::Frame(f)] => f.clone(),
            other => panic!("expected one frame, got {other:?}"),
        }
    }

    #[test]
    fn test_encode_send_frame_adds_content_length() {
        let frame = Frame::new(Command::Send)
            .header("destination", "/app/code_change")
            .body("{}");
        let bytes = frame.encode();
        assert_eq!(
            bytes,
            b"SEND\ndestination:/app/code_change\ncontent-length:2\n\n{}\0"
        );
    }

    #[test]
    fn test_decode_frame_with_content_length_allows_nul_in_body() {
        let data = b"MESSAGE\ncontent-length:3\n\na\0b\0";
        let frame = only_frame(data);
        assert_eq!(frame.command, Command::Message);
        assert_eq!(frame.body, b"a\0b");
    }

    #[test]
    fn test_decode_frame_without_content_length_reads_to_nul() {
        let frame = only_frame(b"MESSAGE\nsubscription:sub-0\n\n{\"a\":1}\0");
        assert_eq!(frame.get("subscription"), Some("sub-0"));
        assert_eq!(frame.body_text().unwrap(), "{\"a\":1}");
    }

    #[test]
    fn test_decode_accepts_crlf_line_endings() {
        let frame = only_frame(b"CONNECTED\r\nversion:1.2\r\n\r\n\0");
        assert_eq!(frame.command, Command::Connected);
        assert_eq!(frame.get("version"), Some("1.2"));
    }

    #[test]
    fn test_decode_heartbeats_and_frames_in_one_message() {
        let data = b"\n\nRECEIPT\nreceipt-id:7\n\n\0\n";
        let packets = decode_packets(data).unwrap();
        assert_eq!(packets.len(), 3);
        assert_eq!(packets[0], Packet::Heartbeat);
        assert!(matches!(&packets[1], Packet::Frame(f) if f.get("receipt-id") == Some("7")));
        assert_eq!(packets[2], Packet::Heartbeat);
    }

    #[test]
    fn test_header_escaping_survives_encode_and_decode() {
        let frame = Frame::new(Command::Message).header("note", "a:b\nc\\d");
        let encoded = frame.encode();
        let text = String::from_utf8(encoded.clone()).unwrap();
        assert!(text.contains("note:a\\cb\\nc\\\\d\n"), "got {text:?}");
        assert_eq!(only_frame(&encoded).get("note"), Some("a:b\nc\\d"));
    }

    #[test]
    fn test_connected_headers_are_not_unescaped() {
        let frame = only_frame(b"CONNECTED\nserver:x\\cy\n\n\0");
        assert_eq!(frame.get("server"), Some("x\\cy"));
    }

    #[test]
    fn test_repeated_header_first_wins() {
        let frame = only_frame(b"MESSAGE\nfoo:1\nfoo:2\n\n\0");
        assert_eq!(frame.get("foo"), Some("1"));
    }

    #[test]
    fn test_decode_unknown_command_fails() {
        let result = decode_packets(b"SHOUT\n\n\0");
        assert!(matches!(result, Err(ProtocolError::MalformedFrame(_))));
    }

    #[test]
    fn test_decode_truncated_frame_fails() {
        assert!(decode_packets(b"MESSAGE\ndestination:/x").is_err());
        assert!(decode_packets(b"MESSAGE\n\nno terminator").is_err());
        assert!(decode_packets(b"MESSAGE\ncontent-length:10\n\nshort\0").is_err());
    }

    #[test]
    fn test_decode_undefined_escape_fails() {
        assert!(decode_packets(b"MESSAGE\nx:\\t\n\n\0").is_err());
    }
}
