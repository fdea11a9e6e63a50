use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use tracing::{debug, error, info, warn};

use crate::config::HEADER_HEADROOM;
use crate::handler::RequestHandler;
use crate::http::parser::{
    HEADER_TERMINATOR_LEN, find_headers_end, parse_http_request, scan_content_length,
};
use crate::http::response::{Response, StatusCode};
use crate::http::writer::{ResponseWriter, WriteProgress, is_transient};
use crate::server::Server;

/// Size of the scratch buffer used for each receive.
const READ_CHUNK: usize = 4096;

/// A non-blocking byte stream.
///
/// Both calls must return immediately; "not ready" is reported as
/// `io::ErrorKind::WouldBlock`.
pub trait Transport {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize>;
}

impl Transport for tokio::net::TcpStream {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        tokio::net::TcpStream::try_read(self, buf)
    }

    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> {
        tokio::net::TcpStream::try_write(self, buf)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    ReadingRequest,
    /// Entered and left within a single read event.
    Processing,
    WritingResponse,
    /// Terminal; the owner drops the connection and its socket.
    Closing,
}

/// One accepted socket: read buffer, write buffer and lifecycle.
///
/// The connection borrows the server context, so the server must outlive
/// every connection it drives. Only one request is ever in flight; once a
/// response has been queued no further bytes are read.
pub struct Connection<'a, S> {
    stream: S,
    peer: SocketAddr,
    server: &'a Server,
    read_buf: BytesMut,
    writer: ResponseWriter,
    last_activity: Instant,
    state: ConnectionState,
    should_close: bool,
}

impl<'a, S: Transport> Connection<'a, S> {
    pub fn new(stream: S, peer: SocketAddr, server: &'a Server) -> Self {
        info!(peer = %peer, "New connection");
        Self {
            stream,
            peer,
            server,
            read_buf: BytesMut::with_capacity(READ_CHUNK),
            writer: ResponseWriter::default(),
            last_activity: Instant::now(),
            state: ConnectionState::ReadingRequest,
            should_close: false,
        }
    }

    /// Handles a readable socket with a single non-blocking receive.
    ///
    /// Returns `false` once no further reads should be attempted: the peer
    /// closed the connection or the socket failed.
    pub fn on_readable(&mut self) -> bool {
        if self.state != ConnectionState::ReadingRequest {
            return true;
        }

        let mut scratch = [0u8; READ_CHUNK];
        let n = match self.stream.try_read(&mut scratch) {
            Ok(0) => {
                debug!(peer = %self.peer, "Client closed connection");
                self.should_close = true;
                return false;
            }
            Ok(n) => n,
            Err(e) if is_transient(&e) => return true,
            Err(e) => {
                error!(peer = %self.peer, error = %e, "Read failed");
                self.should_close = true;
                self.state = ConnectionState::Closing;
                return false;
            }
        };

        self.read_buf.extend_from_slice(&scratch[..n]);
        self.touch();

        debug!(
            peer = %self.peer,
            read = n,
            total = self.read_buf.len(),
            "Read bytes"
        );

        self.advance();
        true
    }

    /// Handles a writable socket with a single non-blocking send.
    pub fn on_writable(&mut self) -> bool {
        if self.writer.is_drained() {
            self.should_close = true;
            self.state = ConnectionState::Closing;
            return true;
        }

        match self.writer.write_once(&mut self.stream) {
            Ok(WriteProgress::WouldBlock) => true,
            Ok(WriteProgress::Partial(n)) => {
                self.touch();
                debug!(
                    peer = %self.peer,
                    wrote = n,
                    progress = self.writer.written(),
                    total = self.writer.total(),
                    "Wrote bytes"
                );
                true
            }
            Ok(WriteProgress::Done) => {
                self.touch();
                info!(peer = %self.peer, bytes = self.writer.total(), "Response complete");
                self.should_close = true;
                self.state = ConnectionState::Closing;
                true
            }
            Err(e) => {
                error!(peer = %self.peer, error = %e, "Write failed");
                self.should_close = true;
                self.state = ConnectionState::Closing;
                false
            }
        }
    }

    /// Frames the buffered bytes and, once a full message is present,
    /// dispatches it and queues the response.
    fn advance(&mut self) {
        let max_body = self.server.config.max_body_size;
        let limit = max_body.saturating_add(HEADER_HEADROOM);

        let Some(headers_end) = find_headers_end(&self.read_buf) else {
            if self.read_buf.len() > limit {
                warn!(peer = %self.peer, size = self.read_buf.len(), "Request head too large");
                self.reject(StatusCode::PayloadTooLarge, "Request entity too large");
            }
            return;
        };

        let declared = match scan_content_length(&self.read_buf[..headers_end]) {
            Ok(declared) => declared,
            Err(e) => {
                warn!(peer = %self.peer, error = %e, "Rejecting request");
                self.reject(StatusCode::BadRequest, "Bad Request");
                return;
            }
        };

        if let Some(length) = declared {
            if length > max_body {
                warn!(
                    peer = %self.peer,
                    length,
                    max = max_body,
                    "Request body too large"
                );
                self.reject(
                    StatusCode::PayloadTooLarge,
                    &format!(
                        "Request entity too large. Maximum allowed size is {max_body} bytes."
                    ),
                );
                return;
            }
        }

        if self.read_buf.len() > limit {
            warn!(peer = %self.peer, size = self.read_buf.len(), "Request buffer too large");
            self.reject(StatusCode::PayloadTooLarge, "Request entity too large");
            return;
        }

        if let Some(length) = declared {
            let received = self.read_buf.len() - (headers_end + HEADER_TERMINATOR_LEN);
            if received < length {
                debug!(peer = %self.peer, received, length, "Waiting for more body data");
                return;
            }
        }

        self.state = ConnectionState::Processing;

        match parse_http_request(&self.read_buf) {
            Ok((request, _consumed)) => {
                debug!(
                    peer = %self.peer,
                    method = request.method.as_str(),
                    path = %request.path,
                    keep_alive = request.keep_alive(),
                    "Complete request received"
                );
                let response = RequestHandler::new(self.server).handle(&request);
                self.read_buf.clear();
                self.queue(response);
            }
            Err(e) => {
                warn!(peer = %self.peer, error = %e, "Failed to parse HTTP request");
                self.reject(StatusCode::BadRequest, "Bad Request");
            }
        }
    }

    /// Queues a generic error response and marks the connection for closing.
    fn reject(&mut self, status: StatusCode, message: &str) {
        self.read_buf.clear();
        self.queue(Response::error_page(status, message));
        self.should_close = true;
    }

    fn queue(&mut self, response: Response) {
        self.writer = ResponseWriter::new(&response);
        self.state = ConnectionState::WritingResponse;
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Whether more than `timeout` has passed since the last I/O progress.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_activity.elapsed() > timeout
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn should_close(&self) -> bool {
        self.should_close
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn stream(&self) -> &S {
        &self.stream
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Bytes received but not yet consumed by a complete request.
    pub fn buffered(&self) -> &[u8] {
        &self.read_buf
    }

    /// Serialized response bytes not yet handed to the socket.
    pub fn pending_output(&self) -> &[u8] {
        self.writer.remaining()
    }
}

impl<S> Drop for Connection<'_, S> {
    fn drop(&mut self) {
        debug!(peer = %self.peer, "Connection closed");
    }
}
