//! CGI hand-off.
//!
//! The dispatcher only depends on [`CgiExecutor`]; [`ProcessCgi`] is the
//! default implementation that runs the script as a child process and
//! kills it once it outlives the configured idle timeout.

use std::io::{Read, Write};
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, anyhow, bail};
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::task;
use tracing::{error, warn};

use crate::config::{Config, RouteConfig};
use crate::http::request::Request;
use crate::http::response::{Response, ResponseBuilder, StatusCode};

const SERVER_SOFTWARE: &str = "webserv/1.0";
const WAIT_POLL: Duration = Duration::from_millis(10);

/// Produces a complete response for a request aimed at a CGI script.
pub trait CgiExecutor {
    fn execute(
        &self,
        request: &Request,
        config: &Config,
        route: &RouteConfig,
        script: &Path,
    ) -> Response;
}

/// Runs scripts as child processes, CGI/1.1 style.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessCgi;

impl CgiExecutor for ProcessCgi {
    fn execute(
        &self,
        request: &Request,
        config: &Config,
        route: &RouteConfig,
        script: &Path,
    ) -> Response {
        let limit = config.idle_timeout();
        let run = || run_script(request, route, script, limit);

        // The wait blocks. On a multi-thread runtime the worker's other
        // tasks are handed off first.
        let result = match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                task::block_in_place(run)
            }
            _ => run(),
        };

        match result {
            Ok(output) => parse_cgi_output(&output),
            Err(e) => {
                error!(script = %script.display(), error = %e, "CGI execution failed");
                Response::error_page(StatusCode::InternalServerError, "CGI execution failed")
            }
        }
    }
}

fn run_script(
    request: &Request,
    route: &RouteConfig,
    script: &Path,
    limit: Duration,
) -> anyhow::Result<Vec<u8>> {
    let script = script
        .canonicalize()
        .with_context(|| format!("resolving {}", script.display()))?;

    let mut cmd = match route.cgi_interpreter.as_deref() {
        Some(interpreter) => {
            let mut cmd = Command::new(interpreter);
            cmd.arg(&script);
            cmd
        }
        None => Command::new(&script),
    };

    if let Some(dir) = script.parent() {
        cmd.current_dir(dir);
    }

    // Own process group, so a timeout also takes down anything the script forked.
    cmd.envs(cgi_environment(request, &script))
        .process_group(0)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());

    let mut child = cmd.spawn().context("spawning CGI script")?;
    let mut stdout = child.stdout.take().context("CGI stdout not captured")?;

    if let Some(mut stdin) = child.stdin.take() {
        let body = request.body.clone();
        thread::spawn(move || {
            if let Err(e) = stdin.write_all(&body) {
                warn!(error = %e, "CGI script did not read its whole input");
            }
        });
    }

    let reader = thread::spawn(move || {
        let mut output = Vec::new();
        stdout.read_to_end(&mut output).map(|_| output)
    });

    let status = wait_with_deadline(&mut child, limit)?;
    let output = reader
        .join()
        .map_err(|_| anyhow!("CGI output reader panicked"))?
        .context("reading CGI output")?;

    if !status.success() && output.is_empty() {
        bail!("script exited with {status}");
    }

    Ok(output)
}

/// Polls `child` until it exits, killing its process group once `limit`
/// has passed.
fn wait_with_deadline(child: &mut Child, limit: Duration) -> anyhow::Result<ExitStatus> {
    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait().context("waiting for CGI script")? {
            return Ok(status);
        }
        if started.elapsed() >= limit {
            kill_script(child);
            bail!("script ran longer than {}s", limit.as_secs_f32());
        }
        thread::sleep(WAIT_POLL);
    }
}

fn kill_script(child: &mut Child) {
    if let Ok(pid) = i32::try_from(child.id()) {
        if let Err(e) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
            warn!(pid, error = %e, "Failed to kill CGI process group");
        }
    }
    if let Err(e) = child.kill() {
        warn!(error = %e, "Failed to kill CGI script");
    }
    if let Err(e) = child.wait() {
        warn!(error = %e, "Failed to reap CGI script");
    }
}

/// CGI/1.1 meta-variables for `request`.
pub fn cgi_environment(request: &Request, script: &Path) -> Vec<(String, String)> {
    let script_filename = script.to_string_lossy().into_owned();
    let content_length = if request.body.is_empty() {
        request.content_length()
    } else {
        request.body.len()
    };

    let mut env = vec![
        ("GATEWAY_INTERFACE".to_string(), "CGI/1.1".to_string()),
        ("SERVER_PROTOCOL".to_string(), request.version.clone()),
        ("SERVER_SOFTWARE".to_string(), SERVER_SOFTWARE.to_string()),
        ("REQUEST_METHOD".to_string(), request.method.as_str().to_string()),
        ("QUERY_STRING".to_string(), request.query.clone()),
        ("SCRIPT_NAME".to_string(), request.path.clone()),
        ("PATH_INFO".to_string(), request.path.clone()),
        ("SCRIPT_FILENAME".to_string(), script_filename),
        ("CONTENT_LENGTH".to_string(), content_length.to_string()),
        ("CONTENT_TYPE".to_string(), request.content_type().to_string()),
    ];

    for (name, value) in &request.headers {
        let var = format!("HTTP_{}", name.to_ascii_uppercase().replace('-', "_"));
        env.push((var, value.clone()));
    }

    env
}

/// Converts script output (`Status:`, headers, blank line, body) into a
/// response. Output without a header block is served as an HTML body.
pub fn parse_cgi_output(output: &[u8]) -> Response {
    let split = output
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|i| (i, i + 4))
        .or_else(|| output.windows(2).position(|w| w == b"\n\n").map(|i| (i, i + 2)));

    let Some((head_end, body_start)) = split else {
        return ResponseBuilder::new(StatusCode::Ok)
            .content_type("text/html")
            .body(output.to_vec())
            .build();
    };

    let head = String::from_utf8_lossy(&output[..head_end]);
    let mut status = StatusCode::Ok;
    let mut builder_headers = Vec::new();
    let mut has_content_type = false;

    for line in head.lines() {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let (name, value) = (name.trim(), value.trim());

        if name.eq_ignore_ascii_case("Status") {
            status = value
                .split_whitespace()
                .next()
                .and_then(|code| code.parse().ok())
                .and_then(StatusCode::from_u16)
                .unwrap_or(StatusCode::BadGateway);
        } else if !name.eq_ignore_ascii_case("Content-Length") {
            has_content_type |= name.eq_ignore_ascii_case("Content-Type");
            builder_headers.push((name.to_string(), value.to_string()));
        }
    }

    let mut builder = ResponseBuilder::new(status);
    if !has_content_type {
        builder = builder.content_type("text/html");
    }
    for (name, value) in builder_headers {
        builder = builder.header(name, value);
    }

    builder.body(output[body_start..].to_vec()).build()
}
