use std::collections::HashMap;
use webserv::http::request::{Method, Request, RequestBuilder};

fn request_with(headers: &[(&str, &str)]) -> Request {
    headers
        .iter()
        .fold(
            RequestBuilder::new().method(Method::GET).path("/"),
            |b, (k, v)| b.header(*k, *v),
        )
        .build()
        .unwrap()
}

#[test]
fn test_request_header_retrieval() {
    let req = request_with(&[("Host", "example.com"), ("Content-Type", "application/json")]);

    assert_eq!(req.header("Host"), Some("example.com"));
    assert_eq!(req.header("host"), Some("example.com"));
    assert_eq!(req.header("CONTENT-TYPE"), Some("application/json"));
    assert_eq!(req.header("Missing"), None);
}

#[test]
fn test_request_content_length_parsing() {
    let req = request_with(&[("Content-Length", "42")]);
    assert_eq!(req.content_length(), 42);
}

#[test]
fn test_request_content_length_missing() {
    let req = request_with(&[]);
    assert_eq!(req.content_length(), 0);
}

#[test]
fn test_request_content_length_invalid() {
    let req = request_with(&[("Content-Length", "not-a-number")]);
    assert_eq!(req.content_length(), 0);
}

#[test]
fn test_request_multipart_detection() {
    let req = request_with(&[(
        "Content-Type",
        "Multipart/Form-Data; charset=utf-8; boundary=----x1",
    )]);

    assert!(req.is_multipart());
    assert_eq!(req.multipart_boundary(), Some("----x1"));

    let plain = request_with(&[("Content-Type", "text/plain; boundary=nope")]);
    assert!(!plain.is_multipart());
    assert_eq!(plain.multipart_boundary(), None);
}

#[test]
fn test_request_chunked_detection() {
    assert!(request_with(&[("Transfer-Encoding", "gzip, Chunked")]).is_chunked());
    assert!(!request_with(&[]).is_chunked());
}

#[test]
fn test_request_keep_alive_http11_default() {
    assert!(request_with(&[]).keep_alive());
}

#[test]
fn test_request_keep_alive_close() {
    assert!(!request_with(&[("Connection", "close")]).keep_alive());
    assert!(request_with(&[("Connection", "Keep-Alive")]).keep_alive());
}

#[test]
fn test_request_keep_alive_http10_default() {
    let req = RequestBuilder::new()
        .method(Method::GET)
        .path("/")
        .version("HTTP/1.0")
        .build()
        .unwrap();
    assert!(!req.keep_alive());
}

#[test]
fn test_request_method_from_token() {
    assert_eq!(Method::from_token("GET"), Method::GET);
    assert_eq!(Method::from_token("POST"), Method::POST);
    assert_eq!(Method::from_token("DELETE"), Method::DELETE);
    assert_eq!(Method::from_token("get"), Method::Unsupported("get".to_string())); // Case-sensitive
    assert!(!Method::from_token("PUT").is_supported());
    assert_eq!(Method::from_token("PUT").as_str(), "PUT");
}

#[test]
fn test_request_builder_requires_method_and_path() {
    assert!(RequestBuilder::new().path("/").build().is_err());
    assert!(RequestBuilder::new().method(Method::GET).build().is_err());
}

#[test]
fn test_request_with_body() {
    let body_content = b"test body content".to_vec();
    let req = Request {
        method: Method::POST,
        path: "/api".to_string(),
        query: String::new(),
        version: "HTTP/1.1".to_string(),
        headers: HashMap::new(),
        body: body_content.clone(),
    };

    assert_eq!(req.body, body_content);
}
