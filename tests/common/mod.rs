//! In-process STOMP-over-WebSocket broker for integration tests.

#![allow(dead_code)]

use bytes::BytesMut;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use stomp_websocket::{Frame, StompCodec, StompItem};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_util::codec::Decoder;

pub const WAIT: Duration = Duration::from_secs(5);

fn pick_subprotocol(req: &Request, mut resp: Response) -> Result<Response, ErrorResponse> {
    if req.headers().contains_key(SEC_WEBSOCKET_PROTOCOL) {
        resp.headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static("v12.stomp"));
    }
    Ok(resp)
}

pub struct MockBroker {
    listener: TcpListener,
}

impl MockBroker {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self { listener }
    }

    pub fn url(&self) -> String {
        format!("ws://{}/ws", self.listener.local_addr().unwrap())
    }

    /// Accept the next WebSocket upgrade without answering CONNECT.
    pub async fn accept(&self) -> BrokerConn {
        let (stream, _) = tokio::time::timeout(WAIT, self.listener.accept())
            .await
            .expect("client never connected")
            .unwrap();
        let ws = tokio_tungstenite::accept_hdr_async(stream, pick_subprotocol)
            .await
            .unwrap();
        BrokerConn {
            ws,
            codec: StompCodec::new(),
            buf: BytesMut::new(),
        }
    }

    /// Accept a connection and complete the STOMP handshake.
    pub async fn accept_session(&self) -> BrokerConn {
        self.accept_session_with_heartbeat("0,0").await
    }

    /// Like [`accept_session`](Self::accept_session), answering CONNECT with
    /// the given `heart-beat` header.
    pub async fn accept_session_with_heartbeat(&self, heartbeat: &str) -> BrokerConn {
        let mut conn = self.accept().await;
        let connect = conn.next_frame().await;
        assert_eq!(connect.command, "CONNECT");
        conn.send(
            Frame::new("CONNECTED")
                .header("version", "1.2")
                .header("heart-beat", heartbeat),
        )
        .await;
        conn
    }
}

pub struct BrokerConn {
    ws: WebSocketStream<TcpStream>,
    codec: StompCodec,
    buf: BytesMut,
}

impl BrokerConn {
    /// Next frame or heart-beat from the client.
    pub async fn next_item(&mut self) -> StompItem {
        tokio::time::timeout(WAIT, async {
            loop {
                if let Some(item) = self.codec.decode(&mut self.buf).unwrap() {
                    return item;
                }
                match self.ws.next().await.expect("client closed").unwrap() {
                    Message::Text(text) => self.buf.extend_from_slice(text.as_bytes()),
                    Message::Binary(data) => self.buf.extend_from_slice(&data),
                    _ => {}
                }
            }
        })
        .await
        .expect("nothing from client")
    }

    /// Next frame from the client, skipping heart-beats.
    pub async fn next_frame(&mut self) -> Frame {
        loop {
            if let StompItem::Frame(f) = self.next_item().await {
                return f;
            }
        }
    }

    pub async fn send(&mut self, frame: Frame) {
        let bytes = self.codec.encode_to_vec(StompItem::Frame(frame)).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        self.ws.send(Message::Text(text)).await.unwrap();
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}
