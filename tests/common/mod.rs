//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use webserv::config::{Config, RouteConfig};
use webserv::http::connection::{Connection, ConnectionState, Transport};
use webserv::server::Server;

static NEXT_DIR: AtomicUsize = AtomicUsize::new(0);

/// A directory under the system temp dir, removed on drop.
pub struct TempDir {
    path: PathBuf,
}

impl TempDir {
    pub fn new(label: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "webserv-{}-{}-{}",
            label,
            std::process::id(),
            NEXT_DIR.fetch_add(1, Ordering::SeqCst)
        ));
        let _ = std::fs::remove_dir_all(&path);
        std::fs::create_dir_all(&path).unwrap();
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, relative: &str, content: impl AsRef<[u8]>) -> PathBuf {
        let path = self.path.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn mkdir(&self, relative: &str) -> PathBuf {
        let path = self.path.join(relative);
        std::fs::create_dir_all(&path).unwrap();
        path
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

/// A `/` route rooted at `root` accepting GET, POST and DELETE.
pub fn route(root: &Path) -> RouteConfig {
    RouteConfig {
        path: "/".to_string(),
        root: root.to_path_buf(),
        methods: vec!["GET".into(), "POST".into(), "DELETE".into()],
        index: vec!["index.html".into()],
        ..RouteConfig::default()
    }
}

pub fn config(root: &Path) -> Config {
    Config {
        routes: vec![route(root)],
        ..Config::default()
    }
}

pub fn peer() -> SocketAddr {
    "127.0.0.1:40000".parse().unwrap()
}

pub enum ReadEvent {
    Data(Vec<u8>),
    WouldBlock,
    Eof,
}

/// Scripted non-blocking stream. Reads replay `reads` in order and report
/// `WouldBlock` once exhausted. Writes accept at most `write_limit` bytes
/// per call, and the first `blocked_writes` calls report `WouldBlock`.
#[derive(Default)]
pub struct MockStream {
    pub reads: VecDeque<ReadEvent>,
    pub written: Vec<u8>,
    pub write_limit: Option<usize>,
    pub blocked_writes: usize,
    pub read_calls: usize,
}

impl MockStream {
    pub fn with_chunks<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        Self {
            reads: chunks.into_iter().map(|c| ReadEvent::Data(c.into())).collect(),
            ..Self::default()
        }
    }
}

impl Transport for MockStream {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_calls += 1;
        match self.reads.pop_front() {
            Some(ReadEvent::Data(mut data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    self.reads.push_front(ReadEvent::Data(data.split_off(n)));
                }
                Ok(n)
            }
            Some(ReadEvent::Eof) => Ok(0),
            Some(ReadEvent::WouldBlock) | None => Err(io::ErrorKind::WouldBlock.into()),
        }
    }

    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.blocked_writes > 0 {
            self.blocked_writes -= 1;
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let n = self.write_limit.map_or(buf.len(), |limit| limit.min(buf.len()));
        self.written.extend_from_slice(&buf[..n]);
        Ok(n)
    }
}

/// Feeds `chunks` one read at a time, then drains the response.
pub fn exchange<I, C>(server: &Server, chunks: I) -> Vec<u8>
where
    I: IntoIterator<Item = C>,
    C: Into<Vec<u8>>,
{
    let mut conn = Connection::new(MockStream::with_chunks(chunks), peer(), server);

    while conn.state() == ConnectionState::ReadingRequest {
        assert!(conn.on_readable(), "peer closed before a response was queued");
        if conn.stream().reads.is_empty() && conn.state() == ConnectionState::ReadingRequest {
            panic!("request never completed");
        }
    }

    while conn.state() == ConnectionState::WritingResponse {
        conn.on_writable();
    }

    assert_eq!(conn.state(), ConnectionState::Closing);
    assert!(conn.should_close());
    conn.stream().written.clone()
}

pub struct ParsedResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl ParsedResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Splits serialized response bytes into status, headers and body.
pub fn parse_response(wire: &[u8]) -> ParsedResponse {
    let end = wire
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("response has no header terminator");
    let head = std::str::from_utf8(&wire[..end]).unwrap();
    let mut lines = head.split("\r\n");
    let status = lines
        .next()
        .and_then(|l| l.split_whitespace().nth(1))
        .and_then(|code| code.parse().ok())
        .expect("bad status line");
    let headers = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    ParsedResponse {
        status,
        headers,
        body: wire[end + 4..].to_vec(),
    }
}
