use std::fmt;

/// STOMP commands this client emits or expects to receive.
pub mod command {
    pub const CONNECT: &str = "CONNECT";
    pub const CONNECTED: &str = "CONNECTED";
    pub const DISCONNECT: &str = "DISCONNECT";
    pub const SEND: &str = "SEND";
    pub const SUBSCRIBE: &str = "SUBSCRIBE";
    pub const UNSUBSCRIBE: &str = "UNSUBSCRIBE";
    pub const MESSAGE: &str = "MESSAGE";
    pub const RECEIPT: &str = "RECEIPT";
    pub const ERROR: &str = "ERROR";
}

/// One STOMP frame: command line, ordered headers and raw body.
///
/// Header order is preserved because STOMP 1.2 gives the first occurrence of
/// a repeated header precedence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Frame {
    /// Create a frame with no headers and an empty body.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Append a header (builder style).
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Replace the body (builder style).
    pub fn set_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// First value for `key`, compared case-sensitively as STOMP requires.
    pub fn get_header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Whether this frame carries the given command.
    pub fn is(&self, command: &str) -> bool {
        self.command == command
    }

    /// SUBSCRIBE for `destination` under the local subscription `id`.
    pub fn subscribe(id: &str, destination: &str) -> Self {
        Frame::new(command::SUBSCRIBE)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    /// UNSUBSCRIBE for the local subscription `id`.
    pub fn unsubscribe(id: &str) -> Self {
        Frame::new(command::UNSUBSCRIBE).header("id", id)
    }

    /// SEND to `destination`; `headers` are appended after `destination`.
    ///
    /// Caller headers named `destination` or `content-length` are dropped:
    /// the destination is fixed by the argument and the length by the body.
    pub fn send<I, K, V>(destination: &str, headers: I, body: impl Into<Vec<u8>>) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut frame = Frame::new(command::SEND).header("destination", destination);
        for (k, v) in headers {
            let k = k.into();
            if k == "destination" || k == "content-length" {
                continue;
            }
            frame = frame.header(k, v);
        }
        frame.set_body(body)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.command)?;
        for (k, v) in &self.headers {
            writeln!(f, "  {}: {}", k, v)?;
        }
        write!(f, "  <{} byte body>", self.body.len())
    }
}
