//! HTTP/1.1 wire handling.
//!
//! - **`connection`**: per-socket framing state machine driven by readiness events
//! - **`parser`**: framing helpers and the request parser
//! - **`request`**: parsed request and method
//! - **`response`**: status codes and response builder
//! - **`writer`**: response serialization and the partial-write buffer
//! - **`mime`**: MIME type detection based on file extensions
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌──────────────────┐
//!        │  ReadingRequest  │ ← Accumulate bytes until a full message is framed
//!        └────────┬─────────┘
//!                 │ Headers + Content-Length bytes received
//!                 ▼                 (or 400 / 413 synthesized)
//!        ┌──────────────────┐
//!        │   Processing     │ ← Dispatch, within the same read event
//!        └────────┬─────────┘
//!                 │ Response serialized into the write buffer
//!                 ▼
//!        ┌──────────────────┐
//!        │ WritingResponse  │ ← Drain with partial non-blocking sends
//!        └────────┬─────────┘
//!                 │ Last byte sent
//!                 ▼
//!        ┌──────────────────┐
//!        │     Closing      │ ← Always; connections are never reused
//!        └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use webserv::config::Config;
//! use webserv::server::{Server, listener};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let server = Arc::new(Server::new(Config::load()?));
//!     listener::run(server).await
//! }
//! ```

pub mod request;
pub mod response;
pub mod parser;
pub mod connection;
pub mod writer;
pub mod mime;
