//! Unit tests for `Frame` construction helpers.

use stomp_websocket::Frame;
use std::collections::BTreeMap;

#[test]
fn frame_new_is_empty() {
    let frame = Frame::new("SEND");
    assert_eq!(frame.command, "SEND");
    assert!(frame.headers.is_empty());
    assert!(frame.body.is_empty());
}

#[test]
fn header_builder_preserves_order() {
    let frame = Frame::new("SEND")
        .header("z-header", "z")
        .header("a-header", "a")
        .header("m-header", "m");
    let names: Vec<&str> = frame.headers.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(names, ["z-header", "a-header", "m-header"]);
}

#[test]
fn subscribe_frame_shape() {
    let frame = Frame::subscribe("sub-3", "/topic/prices");
    assert_eq!(frame.command, "SUBSCRIBE");
    assert_eq!(frame.get_header("id"), Some("sub-3"));
    assert_eq!(frame.get_header("destination"), Some("/topic/prices"));
    assert_eq!(frame.get_header("ack"), Some("auto"));
}

#[test]
fn unsubscribe_frame_shape() {
    let frame = Frame::unsubscribe("sub-3");
    assert_eq!(frame.command, "UNSUBSCRIBE");
    assert_eq!(frame.headers, vec![("id".to_string(), "sub-3".to_string())]);
}

#[test]
fn send_frame_from_map() {
    let mut headers = BTreeMap::new();
    headers.insert("b".to_string(), "2".to_string());
    headers.insert("a".to_string(), "1".to_string());
    let frame = Frame::send("/app/x", &headers, b"{}".to_vec());
    assert_eq!(frame.headers[0].0, "destination");
    assert_eq!(frame.headers[1], ("a".to_string(), "1".to_string()));
    assert_eq!(frame.headers[2], ("b".to_string(), "2".to_string()));
}

#[test]
fn get_header_missing() {
    let frame = Frame::new("MESSAGE").header("destination", "/topic/a");
    assert_eq!(frame.get_header("subscription"), None);
}

#[test]
fn frame_clone_is_independent() {
    let original = Frame::new("SEND").set_body(b"hello".to_vec());
    let mut cloned = original.clone();
    cloned.body.push(b'!');
    assert_eq!(original.body, b"hello");
    assert_eq!(cloned.body, b"hello!");
}
