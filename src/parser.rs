//! Slice parser for a single STOMP frame.
//!
//! Operates on whatever bytes have been accumulated so far. Returns
//! `Ok(None)` when the frame is incomplete so the caller can wait for the
//! next WebSocket message.

use thiserror::Error;

use crate::frame::{Frame, command};

/// Largest frame accepted from a peer, headers included.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Errors raised while decoding or encoding frames.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed header line: {0:?}")]
    MalformedHeader(String),
    #[error("invalid escape sequence \\{0}")]
    InvalidEscape(char),
    #[error("dangling backslash at end of header")]
    DanglingEscape,
    #[error("invalid utf8 in {0}")]
    Utf8(&'static str),
    #[error("invalid content-length {0:?}")]
    ContentLength(String),
    #[error("missing NUL terminator after content-length body")]
    MissingNul,
    #[error("frame of {0} bytes exceeds the size limit")]
    TooLarge(usize),
}

/// Undo STOMP 1.2 header escaping (`\\`, `\n`, `\r`, `\c`).
pub fn unescape_header(raw: &[u8]) -> Result<Vec<u8>, FrameError> {
    let mut out = Vec::with_capacity(raw.len());
    let mut bytes = raw.iter();
    while let Some(&b) = bytes.next() {
        if b != b'\\' {
            out.push(b);
            continue;
        }
        match bytes.next() {
            Some(b'\\') => out.push(b'\\'),
            Some(b'n') => out.push(b'\n'),
            Some(b'r') => out.push(b'\r'),
            Some(b'c') => out.push(b':'),
            Some(&other) => return Err(FrameError::InvalidEscape(other as char)),
            None => return Err(FrameError::DanglingEscape),
        }
    }
    Ok(out)
}

/// Headers on CONNECT and CONNECTED frames are never escaped, for
/// compatibility with 1.0 brokers.
pub(crate) fn uses_escaping(cmd: &str) -> bool {
    cmd != command::CONNECT && cmd != command::CONNECTED
}

fn header_text(
    raw: &[u8],
    escaped: bool,
    what: &'static str,
) -> Result<String, FrameError> {
    let bytes = if escaped {
        unescape_header(raw)?
    } else {
        raw.to_vec()
    };
    String::from_utf8(bytes).map_err(|_| FrameError::Utf8(what))
}

fn strip_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn content_length(headers: &[(String, String)]) -> Result<Option<usize>, FrameError> {
    match headers.iter().find(|(k, _)| k == "content-length") {
        Some((_, v)) => v
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|_| FrameError::ContentLength(v.clone())),
        None => Ok(None),
    }
}

/// `Ok(None)` while a partial frame is still within [`MAX_FRAME_SIZE`].
fn incomplete(input: &[u8]) -> Result<Option<(Frame, usize)>, FrameError> {
    if input.len() > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge(input.len()));
    }
    Ok(None)
}

/// Parse one frame from the start of `input`.
///
/// Returns the frame and the number of bytes it occupied, including the NUL
/// terminator. Trailing EOLs after the NUL are left for the caller, which
/// reports them as heart-beats.
pub fn parse_frame(input: &[u8]) -> Result<Option<(Frame, usize)>, FrameError> {
    let Some(cmd_end) = input.iter().position(|&b| b == b'\n') else {
        return incomplete(input);
    };
    let cmd = std::str::from_utf8(strip_cr(&input[..cmd_end]))
        .map_err(|_| FrameError::Utf8("command"))?
        .to_string();
    let escaped = uses_escaping(&cmd);
    let mut pos = cmd_end + 1;

    let mut headers = Vec::new();
    loop {
        let Some(rel) = input[pos..].iter().position(|&b| b == b'\n') else {
            return incomplete(input);
        };
        let line = strip_cr(&input[pos..pos + rel]);
        pos += rel + 1;
        if line.is_empty() {
            break;
        }
        let colon = line.iter().position(|&b| b == b':').ok_or_else(|| {
            FrameError::MalformedHeader(String::from_utf8_lossy(line).into_owned())
        })?;
        let key = header_text(&line[..colon], escaped, "header name")?;
        let value = header_text(&line[colon + 1..], escaped, "header value")?;
        headers.push((key, value));
    }

    let body_len = match content_length(&headers)? {
        Some(n) => {
            if n > MAX_FRAME_SIZE {
                return Err(FrameError::TooLarge(n));
            }
            let end = pos
                .checked_add(n)
                .and_then(|e| e.checked_add(1))
                .ok_or_else(|| FrameError::ContentLength(n.to_string()))?;
            if input.len() < end {
                return Ok(None);
            }
            if input[pos + n] != 0 {
                return Err(FrameError::MissingNul);
            }
            n
        }
        None => match input[pos..].iter().position(|&b| b == 0) {
            Some(n) => n,
            None => return incomplete(input),
        },
    };

    let frame = Frame {
        command: cmd,
        headers,
        body: input[pos..pos + body_len].to_vec(),
    };
    Ok(Some((frame, pos + body_len + 1)))
}
