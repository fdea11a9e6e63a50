use std::collections::{BTreeMap, HashMap};

/// HTTP request methods.
///
/// Only GET, POST and DELETE are served. Any other token is kept as
/// `Unsupported` so the dispatcher can answer it with 501 Not Implemented
/// instead of rejecting the whole request as malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    /// GET - Retrieve a resource
    GET,
    /// POST - Submit data, upload files or run a script
    POST,
    /// DELETE - Remove a file
    DELETE,
    /// Any other method token, as sent by the client
    Unsupported(String),
}

impl Method {
    /// Parses an HTTP method token.
    ///
    /// Matching is case-sensitive, so `get` becomes `Unsupported("get")`.
    ///
    /// ```
    /// # use webserv::http::request::Method;
    /// assert_eq!(Method::from_token("GET"), Method::GET);
    /// assert_eq!(Method::from_token("PUT"), Method::Unsupported("PUT".into()));
    /// ```
    pub fn from_token(s: &str) -> Self {
        match s {
            "GET" => Method::GET,
            "POST" => Method::POST,
            "DELETE" => Method::DELETE,
            other => Method::Unsupported(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::DELETE => "DELETE",
            Method::Unsupported(token) => token,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Method::Unsupported(_))
    }
}

/// Represents a parsed HTTP request from a client.
///
/// Header names are stored lowercased; use [`Request::header`] for
/// case-insensitive lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// The HTTP method (GET, POST, etc.)
    pub method: Method,
    /// The request path without the query string (e.g., "/index.html")
    pub path: String,
    /// Raw query string, without the leading `?`
    pub query: String,
    /// HTTP version (typically "HTTP/1.1")
    pub version: String,
    /// Request headers keyed by lowercased name
    pub headers: HashMap<String, String>,
    /// Request body, exactly `Content-Length` bytes
    pub body: Vec<u8>,
}

/// Builder for constructing Request objects.
pub struct RequestBuilder {
    method: Option<Method>,
    path: Option<String>,
    query: String,
    version: Option<String>,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self {
            method: None,
            path: None,
            query: String::new(),
            version: None,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(key.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn build(self) -> Result<Request, &'static str> {
        Ok(Request {
            method: self.method.ok_or("method missing")?,
            path: self.path.ok_or("path missing")?,
            query: self.query,
            version: self.version.unwrap_or_else(|| "HTTP/1.1".to_string()),
            headers: self.headers,
            body: self.body,
        })
    }
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Request {
    /// Retrieves a header value by name, ignoring ASCII case.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .get(&key.to_ascii_lowercase())
            .map(|v| v.as_str())
    }

    /// The declared Content-Length, or 0 when missing or not a number.
    pub fn content_length(&self) -> usize {
        self.header("Content-Length")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    /// The Content-Type header, or an empty string.
    pub fn content_type(&self) -> &str {
        self.header("Content-Type").unwrap_or("")
    }

    pub fn is_multipart(&self) -> bool {
        self.content_type()
            .to_ascii_lowercase()
            .starts_with("multipart/form-data")
    }

    /// The `boundary=` parameter of a multipart Content-Type, unquoted.
    pub fn multipart_boundary(&self) -> Option<&str> {
        if !self.is_multipart() {
            return None;
        }
        self.content_type()
            .split(';')
            .skip(1)
            .filter_map(|param| param.trim().split_once('='))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("boundary"))
            .map(|(_, value)| value.trim().trim_matches('"'))
            .filter(|boundary| !boundary.is_empty())
    }

    /// Whether the client announced `Transfer-Encoding: chunked`.
    ///
    /// Only the header is detected; chunked bodies are not reassembled.
    pub fn is_chunked(&self) -> bool {
        self.header("Transfer-Encoding")
            .map(|v| v.to_ascii_lowercase().contains("chunked"))
            .unwrap_or(false)
    }

    /// Decodes an `application/x-www-form-urlencoded` body into sorted pairs.
    pub fn form_data(&self) -> BTreeMap<String, String> {
        url::form_urlencoded::parse(&self.body)
            .into_owned()
            .collect()
    }

    /// Whether the client asked to keep the connection open.
    ///
    /// Recorded for diagnostics only; every response closes the connection.
    pub fn keep_alive(&self) -> bool {
        self.header("Connection")
            .map(|v| v.eq_ignore_ascii_case("keep-alive"))
            .unwrap_or(self.version == "HTTP/1.1")
    }
}
