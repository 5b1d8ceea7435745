use bytes::BytesMut;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::codec::Decoder;
use tracing::{debug, trace};

use crate::codec::{StompCodec, StompItem};
use crate::frame::{Frame, command};
use crate::parser::FrameError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Errors returned while establishing or using a [`Transport`].
#[derive(Error, Debug)]
pub enum ConnError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The broker answered CONNECT with an ERROR frame.
    #[error("server rejected connection: {0}")]
    ServerRejected(ServerError),
    #[error("no CONNECTED frame within {0:?}")]
    HandshakeTimeout(Duration),
    #[error("connection closed by peer")]
    Closed,
}

/// Contents of a broker ERROR frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    /// The `message` header, or a placeholder when the broker omitted it.
    pub message: String,
    pub body: Option<String>,
    pub frame: Frame,
}

impl ServerError {
    pub fn from_frame(frame: Frame) -> Self {
        let message = frame
            .get_header("message")
            .unwrap_or("unknown error")
            .to_string();
        let body = (!frame.body.is_empty())
            .then(|| String::from_utf8_lossy(&frame.body).into_owned());
        Self {
            message,
            body,
            frame,
        }
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.body {
            Some(body) => write!(f, "{}: {}", self.message, body),
            None => f.write_str(&self.message),
        }
    }
}

/// Parse a `heart-beat` header ("cx,cy" in milliseconds). Missing or
/// unparsable fields read as `0`.
pub fn parse_heartbeat_header(header: &str) -> (u64, u64) {
    let mut fields = header
        .split(',')
        .map(|s| s.trim().parse::<u64>().unwrap_or(0));
    let cx = fields.next().unwrap_or(0);
    let cy = fields.next().unwrap_or(0);
    (cx, cy)
}

/// Negotiate `(outgoing, incoming)` heart-beat intervals.
///
/// A direction is enabled only when both sides offer a non-zero value; the
/// interval is then the larger of the two.
pub fn negotiate_heartbeats(
    client_out: u64,
    client_in: u64,
    server_out: u64,
    server_in: u64,
) -> (Option<Duration>, Option<Duration>) {
    let pick = |ours: u64, theirs: u64| {
        (ours != 0 && theirs != 0).then(|| Duration::from_millis(ours.max(theirs)))
    };
    (pick(client_out, server_in), pick(client_in, server_out))
}

/// Settings for the WebSocket upgrade and the STOMP CONNECT frame.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub login: Option<String>,
    pub passcode: Option<String>,
    /// Virtual host sent in the `host` header.
    pub host: Option<String>,
    /// Client `heart-beat` header, "cx,cy" in milliseconds.
    pub heartbeat: String,
    /// Extra CONNECT headers, sent after the standard ones.
    pub headers: Vec<(String, String)>,
    /// WebSocket subprotocols offered during the upgrade.
    pub subprotocols: Vec<String>,
    /// Upper bound on WebSocket upgrade plus CONNECT/CONNECTED.
    pub handshake_timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            login: None,
            passcode: None,
            host: None,
            heartbeat: "10000,10000".to_string(),
            headers: Vec::new(),
            subprotocols: ["v12.stomp", "v11.stomp", "v10.stomp"]
                .map(String::from)
                .to_vec(),
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

impl ConnectOptions {
    pub fn with_credentials(
        mut self,
        login: impl Into<String>,
        passcode: impl Into<String>,
    ) -> Self {
        self.login = Some(login.into());
        self.passcode = Some(passcode.into());
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_heartbeat(mut self, heartbeat: impl Into<String>) -> Self {
        self.heartbeat = heartbeat.into();
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn with_subprotocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subprotocols = protocols.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Build the CONNECT frame these options describe.
    pub fn connect_frame(&self) -> Frame {
        let mut frame = Frame::new(command::CONNECT)
            .header("accept-version", "1.2,1.1,1.0")
            .header("heart-beat", &self.heartbeat);
        if let Some(host) = &self.host {
            frame = frame.header("host", host);
        }
        if let Some(login) = &self.login {
            frame = frame.header("login", login);
        }
        if let Some(passcode) = &self.passcode {
            frame = frame.header("passcode", passcode);
        }
        for (k, v) in &self.headers {
            frame = frame.header(k, v);
        }
        frame
    }
}

/// One WebSocket connection carrying an established STOMP session.
///
/// A `Transport` only exists after the CONNECTED frame arrived, so holding
/// one means the session is live.
pub struct Transport {
    sink: SplitSink<WsStream, Message>,
    stream: SplitStream<WsStream>,
    codec: StompCodec,
    read_buf: BytesMut,
    version: String,
    server: Option<String>,
    outgoing: Option<Duration>,
    incoming: Option<Duration>,
    last_sent: Instant,
    last_received: Instant,
}

impl Transport {
    /// Open the WebSocket at `url` and complete the STOMP handshake.
    ///
    /// An ERROR frame in place of CONNECTED yields
    /// [`ConnError::ServerRejected`].
    pub async fn connect(url: &str, options: &ConnectOptions) -> Result<Self, ConnError> {
        let timeout = options.handshake_timeout;
        tokio::time::timeout(timeout, Self::handshake(url, options))
            .await
            .map_err(|_| ConnError::HandshakeTimeout(timeout))?
    }

    async fn handshake(url: &str, options: &ConnectOptions) -> Result<Self, ConnError> {
        let mut request = url.into_client_request()?;
        if !options.subprotocols.is_empty() {
            let offered = HeaderValue::from_str(&options.subprotocols.join(", "))
                .map_err(|e| ConnError::Protocol(format!("invalid subprotocol list: {}", e)))?;
            request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, offered);
        }

        let (ws, _response) = connect_async(request).await?;
        let (sink, stream) = ws.split();
        let now = Instant::now();
        let mut transport = Transport {
            sink,
            stream,
            codec: StompCodec::new(),
            read_buf: BytesMut::new(),
            version: "1.0".to_string(),
            server: None,
            outgoing: None,
            incoming: None,
            last_sent: now,
            last_received: now,
        };

        transport.send_frame(options.connect_frame()).await?;

        loop {
            match transport.next_item().await {
                Some(Ok(StompItem::Heartbeat)) => continue,
                Some(Ok(StompItem::Frame(f))) if f.is(command::CONNECTED) => {
                    transport.accept_connected(&f, &options.heartbeat);
                    return Ok(transport);
                }
                Some(Ok(StompItem::Frame(f))) if f.is(command::ERROR) => {
                    return Err(ConnError::ServerRejected(ServerError::from_frame(f)));
                }
                Some(Ok(StompItem::Frame(f))) => {
                    return Err(ConnError::Protocol(format!(
                        "expected CONNECTED, got {}",
                        f.command
                    )));
                }
                Some(Err(e)) => return Err(e),
                None => return Err(ConnError::Closed),
            }
        }
    }

    fn accept_connected(&mut self, connected: &Frame, client_heartbeat: &str) {
        if let Some(v) = connected.get_header("version") {
            self.version = v.to_string();
        }
        self.server = connected.get_header("server").map(str::to_string);

        let (cx, cy) = parse_heartbeat_header(client_heartbeat);
        let (sx, sy) = parse_heartbeat_header(connected.get_header("heart-beat").unwrap_or("0,0"));
        (self.outgoing, self.incoming) = negotiate_heartbeats(cx, cy, sx, sy);
        debug!(
            version = %self.version,
            server = ?self.server,
            outgoing = ?self.outgoing,
            incoming = ?self.incoming,
            "stomp session established"
        );
    }

    /// Protocol version the broker picked.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Broker `server` header, if sent.
    pub fn server(&self) -> Option<&str> {
        self.server.as_deref()
    }

    /// Negotiated `(outgoing, incoming)` heart-beat intervals.
    pub fn heartbeats(&self) -> (Option<Duration>, Option<Duration>) {
        (self.outgoing, self.incoming)
    }

    /// Whether the writer has been idle for a full outgoing interval.
    pub fn heartbeat_due(&self) -> bool {
        self.outgoing
            .is_some_and(|interval| self.last_sent.elapsed() >= interval)
    }

    /// Whether the broker has been silent for more than twice the incoming
    /// interval.
    pub fn peer_silent(&self) -> bool {
        self.incoming
            .is_some_and(|interval| self.last_received.elapsed() > interval * 2)
    }

    pub async fn send_frame(&mut self, frame: Frame) -> Result<(), ConnError> {
        trace!(command = %frame.command, "sending frame");
        self.send_item(StompItem::Frame(frame)).await
    }

    pub async fn send_heartbeat(&mut self) -> Result<(), ConnError> {
        trace!("sending heart-beat");
        self.send_item(StompItem::Heartbeat).await
    }

    async fn send_item(&mut self, item: StompItem) -> Result<(), ConnError> {
        let bytes = self.codec.encode_to_vec(item)?;
        let message = match String::from_utf8(bytes) {
            Ok(text) => Message::Text(text),
            Err(binary) => Message::Binary(binary.into_bytes()),
        };
        self.sink.send(message).await?;
        self.last_sent = Instant::now();
        Ok(())
    }

    /// Next frame or heart-beat from the broker; `None` once the socket is
    /// closed.
    ///
    /// Cancel safe: a payload is appended to the read buffer only after the
    /// underlying stream yields it. A partial frame that outgrows
    /// [`MAX_FRAME_SIZE`](crate::parser::MAX_FRAME_SIZE) is an error, which
    /// bounds the buffer.
    pub async fn next_item(&mut self) -> Option<Result<StompItem, ConnError>> {
        loop {
            match self.codec.decode(&mut self.read_buf) {
                Ok(Some(item)) => return Some(Ok(item)),
                Ok(None) => {}
                Err(e) => return Some(Err(e.into())),
            }

            let payload = match self.stream.next().await? {
                Ok(Message::Text(text)) => text.into_bytes(),
                Ok(Message::Binary(data)) => data,
                Ok(Message::Close(reason)) => {
                    debug!(?reason, "websocket closed by peer");
                    return None;
                }
                Ok(_) => {
                    self.last_received = Instant::now();
                    continue;
                }
                Err(e) => return Some(Err(e.into())),
            };
            self.last_received = Instant::now();
            self.read_buf.extend_from_slice(&payload);
        }
    }

    /// Send DISCONNECT and close the socket.
    pub async fn disconnect(mut self) -> Result<(), ConnError> {
        self.send_frame(Frame::new(command::DISCONNECT)).await?;
        self.sink.close().await?;
        Ok(())
    }
}
