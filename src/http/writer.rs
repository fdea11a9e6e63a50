use std::io;

use crate::http::connection::Transport;
use crate::http::response::Response;

const HTTP_VERSION: &str = "HTTP/1.1";

/// Serializes a response into wire bytes.
///
/// Every response announces `Connection: close`; the server never reuses a
/// connection for a second request.
pub fn serialize_response(resp: &Response) -> Vec<u8> {
    let mut buf = Vec::with_capacity(resp.body.len() + 256);

    // Status line
    let status_line = format!(
        "{} {} {}\r\n",
        HTTP_VERSION,
        resp.status.as_u16(),
        resp.status.reason_phrase()
    );
    buf.extend_from_slice(status_line.as_bytes());

    // Headers, sorted so the output is stable
    let mut headers: Vec<_> = resp
        .headers
        .iter()
        .filter(|(k, _)| !k.eq_ignore_ascii_case("Connection"))
        .collect();
    headers.sort();

    for (k, v) in headers {
        buf.extend_from_slice(k.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(v.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
    buf.extend_from_slice(b"Connection: close\r\n");

    // Header/body separator
    buf.extend_from_slice(b"\r\n");

    // Body
    buf.extend_from_slice(&resp.body);

    buf
}

/// Outcome of one non-blocking send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteProgress {
    /// The socket accepted `n` bytes; more remain.
    Partial(usize),
    /// The last byte has been handed to the socket.
    Done,
    /// The socket was not ready; nothing was written.
    WouldBlock,
}

/// Write buffer plus the offset of bytes already drained to the socket.
///
/// `written` never exceeds `buffer.len()`.
#[derive(Debug, Default)]
pub struct ResponseWriter {
    buffer: Vec<u8>,
    written: usize,
}

impl ResponseWriter {
    pub fn new(response: &Response) -> Self {
        Self {
            buffer: serialize_response(response),
            written: 0,
        }
    }

    pub fn is_drained(&self) -> bool {
        self.written >= self.buffer.len()
    }

    pub fn remaining(&self) -> &[u8] {
        &self.buffer[self.written..]
    }

    pub fn written(&self) -> usize {
        self.written
    }

    /// Size of the whole serialized response.
    pub fn total(&self) -> usize {
        self.buffer.len()
    }

    /// Performs a single non-blocking send of the remaining bytes.
    pub fn write_once<S: Transport>(&mut self, stream: &mut S) -> io::Result<WriteProgress> {
        if self.is_drained() {
            return Ok(WriteProgress::Done);
        }

        match stream.try_write(self.remaining()) {
            Ok(0) => Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "connection closed while writing",
            )),
            Ok(n) => {
                self.written = (self.written + n).min(self.buffer.len());
                if self.is_drained() {
                    Ok(WriteProgress::Done)
                } else {
                    Ok(WriteProgress::Partial(n))
                }
            }
            Err(e) if is_transient(&e) => Ok(WriteProgress::WouldBlock),
            Err(e) => Err(e),
        }
    }
}

/// Errors that only mean "try again on the next readiness event".
pub fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::response::{ResponseBuilder, StatusCode};

    #[test]
    fn serializes_status_headers_and_body() {
        let resp = ResponseBuilder::new(StatusCode::Ok)
            .content_type("text/plain")
            .body("hi")
            .build();
        let wire = String::from_utf8(serialize_response(&resp)).unwrap();

        assert!(wire.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(wire.contains("Content-Length: 2\r\n"));
        assert!(wire.contains("Connection: close\r\n"));
        assert!(wire.ends_with("\r\n\r\nhi"));
    }

    #[test]
    fn connection_header_is_always_close() {
        let resp = ResponseBuilder::new(StatusCode::Ok)
            .header("Connection", "keep-alive")
            .build();
        let wire = String::from_utf8(serialize_response(&resp)).unwrap();

        assert!(!wire.contains("keep-alive"));
        assert_eq!(wire.matches("Connection:").count(), 1);
    }
}
