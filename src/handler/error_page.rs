use std::fs;

use tracing::info;

use crate::config::Config;
use crate::handler::static_files::resolve_file_path;
use crate::http::response::{Response, ResponseBuilder, StatusCode};

/// Builds the response for an error status.
///
/// Serves the configured custom page for `status` (resolved against the
/// `/` route) when it exists and is non-empty; otherwise a generic page
/// embedding the status and `message`.
pub fn error_response(config: &Config, status: StatusCode, message: &str) -> Response {
    custom_page(config, status).unwrap_or_else(|| Response::error_page(status, message))
}

fn custom_page(config: &Config, status: StatusCode) -> Option<Response> {
    let page = config.error_page(status.as_u16())?;
    let route = config.match_route("/")?;
    let path = resolve_file_path(page, route);

    let content = fs::read(&path).ok().filter(|c| !c.is_empty())?;
    info!(status = status.as_u16(), page = %path.display(), "Serving custom error page");

    Some(
        ResponseBuilder::new(status)
            .content_type("text/html")
            .body(content)
            .build(),
    )
}
