use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::Frame;
use crate::parser::{FrameError, parse_frame, uses_escaping};

/// Apply STOMP 1.2 header escaping.
pub fn escape_header(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            ':' => out.push_str("\\c"),
            _ => out.push(ch),
        }
    }
    out
}

/// What travels over the socket: a frame or a bare EOL heart-beat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StompItem {
    Frame(Frame),
    Heartbeat,
}

/// `tokio_util` codec for STOMP.
///
/// WebSocket brokers usually send one frame per message, but nothing in the
/// protocol requires it: a frame may be split across messages, and several
/// frames (or trailing EOLs) may share one. The transport therefore appends
/// every message payload to a `BytesMut` and drains it with [`Decoder::decode`]
/// until it yields `Ok(None)`.
#[derive(Debug, Default)]
pub struct StompCodec;

impl StompCodec {
    pub fn new() -> Self {
        Self
    }

    /// Encode `item` into a fresh buffer, for transports that send whole
    /// messages rather than writing into a shared stream.
    pub fn encode_to_vec(&mut self, item: StompItem) -> Result<Vec<u8>, FrameError> {
        let mut buf = BytesMut::new();
        self.encode(item, &mut buf)?;
        Ok(buf.to_vec())
    }
}

impl Decoder for StompCodec {
    type Item = StompItem;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<StompItem>, FrameError> {
        match src.first() {
            None => return Ok(None),
            Some(b'\n') => {
                src.advance(1);
                return Ok(Some(StompItem::Heartbeat));
            }
            Some(b'\r') => {
                return match src.get(1) {
                    None => Ok(None),
                    Some(b'\n') => {
                        src.advance(2);
                        Ok(Some(StompItem::Heartbeat))
                    }
                    Some(_) => Err(FrameError::MalformedHeader("stray CR".into())),
                };
            }
            Some(_) => {}
        }

        match parse_frame(src)? {
            Some((frame, consumed)) => {
                src.advance(consumed);
                Ok(Some(StompItem::Frame(frame)))
            }
            None => Ok(None),
        }
    }
}

impl Encoder<StompItem> for StompCodec {
    type Error = FrameError;

    /// A `content-length` header is added to any non-empty body that lacks
    /// one, so bodies containing NUL survive the trip.
    fn encode(&mut self, item: StompItem, dst: &mut BytesMut) -> Result<(), FrameError> {
        let frame = match item {
            StompItem::Heartbeat => {
                dst.put_u8(b'\n');
                return Ok(());
            }
            StompItem::Frame(frame) => frame,
        };

        let escaped = uses_escaping(&frame.command);
        dst.extend_from_slice(frame.command.as_bytes());
        dst.put_u8(b'\n');

        let mut headers = frame.headers;
        if !frame.body.is_empty() && !headers.iter().any(|(k, _)| k == "content-length") {
            headers.push(("content-length".into(), frame.body.len().to_string()));
        }
        for (k, v) in &headers {
            if escaped {
                dst.extend_from_slice(escape_header(k).as_bytes());
                dst.put_u8(b':');
                dst.extend_from_slice(escape_header(v).as_bytes());
            } else {
                dst.extend_from_slice(k.as_bytes());
                dst.put_u8(b':');
                dst.extend_from_slice(v.as_bytes());
            }
            dst.put_u8(b'\n');
        }

        dst.put_u8(b'\n');
        dst.extend_from_slice(&frame.body);
        dst.put_u8(0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(codec: &mut StompCodec, buf: &mut BytesMut) -> Vec<StompItem> {
        let mut items = Vec::new();
        while let Some(item) = codec.decode(buf).expect("decode") {
            items.push(item);
        }
        items
    }

    #[test]
    fn send_frame_gets_content_length() {
        let mut codec = StompCodec::new();
        let bytes = codec
            .encode_to_vec(StompItem::Frame(Frame::send(
                "/app/echo",
                std::iter::empty::<(String, String)>(),
                "{\"x\":1}",
            )))
            .unwrap();
        assert_eq!(
            bytes,
            b"SEND\ndestination:/app/echo\ncontent-length:7\n\n{\"x\":1}\0".to_vec()
        );
    }

    #[test]
    fn connect_headers_are_not_escaped() {
        let mut codec = StompCodec::new();
        let bytes = codec
            .encode_to_vec(StompItem::Frame(
                Frame::new("CONNECT").header("passcode", "a:b"),
            ))
            .unwrap();
        assert_eq!(bytes, b"CONNECT\npasscode:a:b\n\n\0".to_vec());
    }

    #[test]
    fn frames_and_eols_in_one_message() {
        let mut codec = StompCodec::new();
        let mut buf = BytesMut::from(&b"\nMESSAGE\n\na\0\r\nMESSAGE\n\nb\0\n"[..]);
        let items = drain(&mut codec, &mut buf);
        assert_eq!(items.len(), 5);
        assert_eq!(items[0], StompItem::Heartbeat);
        assert!(matches!(&items[1], StompItem::Frame(f) if f.body == b"a"));
        assert_eq!(items[2], StompItem::Heartbeat);
        assert!(matches!(&items[3], StompItem::Frame(f) if f.body == b"b"));
        assert_eq!(items[4], StompItem::Heartbeat);
        assert!(buf.is_empty());
    }

    #[test]
    fn frame_split_across_messages() {
        let mut codec = StompCodec::new();
        let mut buf = BytesMut::from(&b"MESSAGE\nsubscr"[..]);
        assert!(drain(&mut codec, &mut buf).is_empty());
        buf.extend_from_slice(b"iption:sub-0\n\n{}");
        assert!(drain(&mut codec, &mut buf).is_empty());
        buf.extend_from_slice(b"\0");
        let items = drain(&mut codec, &mut buf);
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn lone_cr_waits_for_lf() {
        let mut codec = StompCodec::new();
        let mut buf = BytesMut::from(&b"\r"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn escaped_headers_round_trip() {
        let mut codec = StompCodec::new();
        let original = Frame::new("MESSAGE").header("k:1", "line\nbreak\\");
        let mut buf = BytesMut::new();
        codec
            .encode(StompItem::Frame(original.clone()), &mut buf)
            .unwrap();
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(StompItem::Frame(original))
        );
    }
}
