//! Outbound publish requests and inbound message decoding.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::frame::Frame;

/// Inbound body that could not be turned into a value.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("message body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parse a MESSAGE body as JSON.
pub fn decode_body(body: &[u8]) -> Result<Value, DecodeError> {
    Ok(serde_json::from_slice(body)?)
}

/// A publish request: `body` is serialized to JSON and sent to
/// `destination` with `headers`.
///
/// Deserializes from `{"destination": ..., "body": ..., "headers": {...}}`;
/// `body` and `headers` may be omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundRequest {
    pub destination: String,
    #[serde(default)]
    pub body: Value,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl OutboundRequest {
    pub fn new(destination: impl Into<String>, body: Value) -> Self {
        Self {
            destination: destination.into(),
            body,
            headers: BTreeMap::new(),
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// The SEND frame for this request.
    pub fn to_frame(&self) -> Result<Frame, serde_json::Error> {
        let body = serde_json::to_vec(&self.body)?;
        Ok(Frame::send(&self.destination, &self.headers, body))
    }
}

/// A message delivered on the active subscription.
///
/// `body` is `None` when the payload was not valid JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub destination: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl InboundMessage {
    /// Decode a MESSAGE frame. Decode failures are logged and leave `body`
    /// empty.
    pub fn from_frame(frame: Frame) -> Self {
        let body = match decode_body(&frame.body) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(
                    destination = frame.get_header("destination").unwrap_or_default(),
                    error = %e,
                    "message parsing error"
                );
                None
            }
        };
        Self {
            destination: frame.get_header("destination").map(str::to_string),
            headers: frame.headers,
            body,
        }
    }

    /// Move the value out, leaving the message empty.
    pub fn take(&mut self) -> Option<Value> {
        self.body.take()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn echo_request_serializes_body() {
        let frame = OutboundRequest::new("/app/echo", json!({"x": 1}))
            .to_frame()
            .unwrap();
        assert_eq!(frame.command, "SEND");
        assert_eq!(frame.get_header("destination"), Some("/app/echo"));
        assert_eq!(frame.headers.len(), 1);
        assert_eq!(frame.body, br#"{"x":1}"#);
    }

    #[test]
    fn request_headers_follow_destination() {
        let frame = OutboundRequest::new("/app/q", json!("hi"))
            .header("priority", "9")
            .header("content-type", "application/json")
            .to_frame()
            .unwrap();
        assert_eq!(frame.headers[0].0, "destination");
        assert_eq!(frame.get_header("priority"), Some("9"));
        assert_eq!(frame.get_header("content-type"), Some("application/json"));
        assert_eq!(frame.body, br#""hi""#);
    }

    #[test]
    fn reserved_request_headers_are_ignored() {
        let frame = OutboundRequest::new("/app/echo", json!({"x": 1}))
            .header("destination", "/app/other")
            .header("content-length", "1")
            .to_frame()
            .unwrap();
        assert_eq!(
            frame.headers,
            [("destination".to_string(), "/app/echo".to_string())]
        );

        let bytes = crate::codec::StompCodec::new()
            .encode_to_vec(crate::codec::StompItem::Frame(frame))
            .unwrap();
        let (decoded, _) = crate::parser::parse_frame(&bytes).unwrap().unwrap();
        assert_eq!(decoded.get_header("content-length"), Some("7"));
        assert_eq!(decoded.body, br#"{"x":1}"#);
    }

    #[test]
    fn request_deserializes_with_defaults() {
        let req: OutboundRequest =
            serde_json::from_str(r#"{"destination": "/app/ping"}"#).unwrap();
        assert_eq!(req.body, Value::Null);
        assert!(req.headers.is_empty());

        let req: OutboundRequest = serde_json::from_str(
            r#"{"destination": "/app/a", "body": [1, 2], "headers": {"k": "v"}}"#,
        )
        .unwrap();
        assert_eq!(req.body, json!([1, 2]));
        assert_eq!(req.headers.get("k").map(String::as_str), Some("v"));
    }

    #[test]
    fn malformed_body_becomes_empty() {
        let frame = Frame::new("MESSAGE")
            .header("destination", "/topic/a")
            .set_body("{not json");
        let msg = InboundMessage::from_frame(frame);
        assert!(msg.is_empty());
        assert_eq!(msg.destination.as_deref(), Some("/topic/a"));

        let empty = InboundMessage::from_frame(Frame::new("MESSAGE"));
        assert!(empty.is_empty());
    }

    #[test]
    fn take_clears_the_value() {
        let mut msg = InboundMessage::from_frame(Frame::new("MESSAGE").set_body(r#"{"a":[1]}"#));
        assert_eq!(msg.take(), Some(json!({"a": [1]})));
        assert!(msg.is_empty());
        assert_eq!(msg.take(), None);
    }
}
