//! webserv - HTTP/1.1 static file, upload and CGI server
//!
//! Core library: connection framing, request dispatch and response
//! generation.

pub mod config;
pub mod handler;
pub mod http;
pub mod server;
