use crate::http::request::{Method, Request};
use std::collections::HashMap;
use thiserror::Error;

/// Length of the `\r\n\r\n` header terminator.
pub const HEADER_TERMINATOR_LEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("malformed request line")]
    InvalidRequest,
    #[error("request target must be an absolute path without '..' segments")]
    InvalidPath,
    #[error("malformed header line")]
    InvalidHeader,
    #[error("Content-Length is not a decimal number")]
    InvalidContentLength,
    #[error("message is incomplete")]
    Incomplete,
}

/// Parses one complete request from the start of `buf`.
///
/// Returns the request and the number of bytes it occupied. The body is
/// exactly `Content-Length` bytes; extra trailing bytes are not consumed.
pub fn parse_http_request(buf: &[u8]) -> Result<(Request, usize), ParseError> {
    // Look for header/body separator
    let headers_end = find_headers_end(buf).ok_or(ParseError::Incomplete)?;
    let header_bytes = &buf[..headers_end];
    let body_bytes = &buf[headers_end + HEADER_TERMINATOR_LEN..];

    let headers_str = std::str::from_utf8(header_bytes)
        .map_err(|_| ParseError::InvalidRequest)?;

    let mut lines = headers_str.split("\r\n");

    // Request line
    let request_line = lines.next().ok_or(ParseError::InvalidRequest)?;
    let mut parts = request_line.split_whitespace();

    let method_str = parts.next().ok_or(ParseError::InvalidRequest)?;
    let target = parts.next().ok_or(ParseError::InvalidRequest)?;
    let version = parts.next().ok_or(ParseError::InvalidRequest)?;

    if parts.next().is_some() || !version.starts_with("HTTP/") {
        return Err(ParseError::InvalidRequest);
    }

    let method = Method::from_token(method_str);
    let (path, query) = split_target(target)?;

    // Headers, first occurrence wins
    let mut headers = HashMap::new();

    for line in lines {
        if line.is_empty() {
            continue;
        }

        let (key, value) = line
            .split_once(':')
            .ok_or(ParseError::InvalidHeader)?;

        let key = key.trim();
        if key.is_empty() {
            return Err(ParseError::InvalidHeader);
        }

        headers
            .entry(key.to_ascii_lowercase())
            .or_insert_with(|| value.trim().to_string());
    }

    // Body
    let content_length = scan_content_length(header_bytes)?.unwrap_or(0);

    if body_bytes.len() < content_length {
        return Err(ParseError::Incomplete);
    }

    let body = body_bytes[..content_length].to_vec();

    let request = Request {
        method,
        path: path.to_string(),
        query: query.to_string(),
        version: version.to_string(),
        headers,
        body,
    };

    let total_consumed = headers_end + HEADER_TERMINATOR_LEN + content_length;
    Ok((request, total_consumed))
}

/// Offset of the `\r\n\r\n` header terminator, if present.
pub fn find_headers_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_TERMINATOR_LEN)
        .position(|w| w == b"\r\n\r\n")
}

/// Finds the first `Content-Length` header in a raw header block.
///
/// Returns `Ok(None)` when no such header is present. The request line is
/// skipped, names are compared case-insensitively and the first match wins.
pub fn scan_content_length(header_block: &[u8]) -> Result<Option<usize>, ParseError> {
    for line in header_block.split(|&b| b == b'\n').skip(1) {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let Some(colon) = line.iter().position(|&b| b == b':') else {
            continue;
        };
        if !line[..colon].trim_ascii().eq_ignore_ascii_case(b"content-length") {
            continue;
        }
        let value = std::str::from_utf8(line[colon + 1..].trim_ascii())
            .map_err(|_| ParseError::InvalidContentLength)?;
        if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseError::InvalidContentLength);
        }
        return value
            .parse()
            .map(Some)
            .map_err(|_| ParseError::InvalidContentLength);
    }
    Ok(None)
}

fn split_target(target: &str) -> Result<(&str, &str), ParseError> {
    let (path, query) = target.split_once('?').unwrap_or((target, ""));

    if !path.starts_with('/') || path.split('/').any(|segment| segment == "..") {
        return Err(ParseError::InvalidPath);
    }

    Ok((path, query))
}
