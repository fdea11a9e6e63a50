mod common;

use std::time::{Duration, Instant};

use common::{TempDir, config};
use webserv::config::{Config, RouteConfig};
use webserv::handler::RequestHandler;
use webserv::http::request::{Method, Request, RequestBuilder};
use webserv::http::response::{Response, StatusCode};
use webserv::server::Server;

const ECHO_SCRIPT: &str = "printf 'Status: 201 Created\\r\\nContent-Type: text/plain\\r\\n\\r\\n'\n\
                           printf '%s|%s|' \"$QUERY_STRING\" \"$REQUEST_METHOD\"\n\
                           cat\n";

/// `/cgi-bin` route running `.sh` scripts through `sh`.
fn cgi_config(dir: &TempDir, extension: &str) -> Config {
    let mut cfg = config(dir.path());
    cfg.routes.push(RouteConfig {
        path: "/cgi-bin".to_string(),
        root: dir.path().join("cgi-bin"),
        methods: vec!["GET".into(), "POST".into()],
        cgi_enabled: true,
        cgi_extension: Some(extension.to_string()),
        cgi_interpreter: Some("sh".to_string()),
        ..RouteConfig::default()
    });
    cfg
}

fn handle(server: &Server, req: &Request) -> Response {
    RequestHandler::new(server).handle(req)
}

#[test]
fn test_script_output_becomes_response() {
    let dir = TempDir::new("cgi-echo");
    dir.write("cgi-bin/echo.sh", ECHO_SCRIPT);
    let server = Server::new(cgi_config(&dir, "sh"));

    let req = RequestBuilder::new()
        .method(Method::POST)
        .path("/cgi-bin/echo.sh")
        .query("a=1&b=2")
        .header("Content-Length", "7")
        .body("payload")
        .build()
        .unwrap();
    let resp = handle(&server, &req);

    assert_eq!(resp.status, StatusCode::Created);
    assert_eq!(resp.header("Content-Type"), Some("text/plain"));
    assert_eq!(resp.body, b"a=1&b=2|POST|payload");
}

#[test]
fn test_configured_extension_case_is_ignored() {
    let dir = TempDir::new("cgi-case");
    dir.write("cgi-bin/echo.sh", ECHO_SCRIPT);
    let server = Server::new(cgi_config(&dir, ".SH"));

    let req = RequestBuilder::new()
        .method(Method::GET)
        .path("/cgi-bin/echo.sh")
        .build()
        .unwrap();
    let resp = handle(&server, &req);

    assert_eq!(resp.status, StatusCode::Created);
    assert_eq!(resp.body, b"|GET|");
}

#[test]
fn test_unstartable_interpreter_is_500() {
    let dir = TempDir::new("cgi-spawn");
    dir.write("cgi-bin/echo.sh", ECHO_SCRIPT);
    let mut cfg = cgi_config(&dir, "sh");
    cfg.routes[1].cgi_interpreter = Some("/nonexistent/interpreter".to_string());
    let server = Server::new(cfg);

    let req = RequestBuilder::new()
        .method(Method::GET)
        .path("/cgi-bin/echo.sh")
        .build()
        .unwrap();

    assert_eq!(handle(&server, &req).status, StatusCode::InternalServerError);
}

#[test]
fn test_script_outliving_idle_timeout_is_killed() {
    let dir = TempDir::new("cgi-slow");
    dir.write("cgi-bin/slow.sh", "sleep 5\nprintf 'late'\n");
    let server = Server::new(Config {
        idle_timeout_secs: 1,
        ..cgi_config(&dir, "sh")
    });

    let req = RequestBuilder::new()
        .method(Method::GET)
        .path("/cgi-bin/slow.sh")
        .build()
        .unwrap();

    let started = Instant::now();
    let resp = handle(&server, &req);

    assert_eq!(resp.status, StatusCode::InternalServerError);
    assert!(!String::from_utf8_lossy(&resp.body).contains("late"));
    assert!(started.elapsed() < Duration::from_secs(4));
}
