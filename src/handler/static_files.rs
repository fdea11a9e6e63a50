//! Static file serving: path resolution, directory indexes and listings,
//! and conditional GET.

use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{error, info};
use url::Url;

use crate::config::RouteConfig;
use crate::handler::RequestHandler;
use crate::http::request::Request;
use crate::http::response::{Response, ResponseBuilder, StatusCode, escape_html};

const STATIC_CACHE_CONTROL: &str = "public, max-age=3600";
/// Only used to borrow `Url`'s path-segment encoding.
const LISTING_ORIGIN: &str = "http://localhost/";

/// Maps a request path onto the route's root directory.
///
/// The route prefix is stripped and the remainder appended to the root
/// with exactly one separator between them.
pub fn resolve_file_path(request_path: &str, route: &RouteConfig) -> PathBuf {
    let relative = request_path
        .strip_prefix(route.path.as_str())
        .unwrap_or(request_path);

    let mut full = route.root.to_string_lossy().into_owned();
    match (full.ends_with('/'), relative.starts_with('/')) {
        (true, true) => full.push_str(&relative[1..]),
        (false, false) if !full.is_empty() => {
            full.push('/');
            full.push_str(relative);
        }
        _ => full.push_str(relative),
    }

    PathBuf::from(full)
}

/// Lowercased extension without the dot, or an empty string.
pub fn file_extension(path: &Path) -> String {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

/// Validator derived from inode, modification time and size, in hex.
pub fn generate_etag(meta: &fs::Metadata) -> String {
    format!("{:x}-{:x}-{:x}", meta.ino(), meta.mtime(), meta.size())
}

/// Formats a modification time as an HTTP date.
pub fn http_date(meta: &fs::Metadata) -> Option<String> {
    let modified = meta.modified().ok()?;
    Some(
        DateTime::<Utc>::from(modified)
            .format("%a, %d %b %Y %H:%M:%S GMT")
            .to_string(),
    )
}

/// Serves an existing path: directory index or listing, then the file
/// itself with validators and cache policy.
pub(crate) fn serve(
    handler: &RequestHandler<'_>,
    request: &Request,
    route: &RouteConfig,
    mut file_path: PathBuf,
) -> Response {
    if file_path.is_dir() {
        match find_index(&file_path, &route.index) {
            Some(index) => file_path = index,
            None if route.autoindex => {
                return match directory_listing(&file_path, &request.path) {
                    Ok(html) => ResponseBuilder::new(StatusCode::Ok)
                        .content_type("text/html")
                        .body(html)
                        .build(),
                    Err(e) => {
                        error!(path = %file_path.display(), error = %e, "Failed to list directory");
                        handler.error(StatusCode::InternalServerError, "Failed to list directory")
                    }
                };
            }
            None => return handler.error(StatusCode::Forbidden, "Directory listing is disabled"),
        }
    }

    let meta = match fs::metadata(&file_path) {
        Ok(meta) => meta,
        Err(e) => {
            error!(path = %file_path.display(), error = %e, "Failed to stat file");
            return handler.error(StatusCode::InternalServerError, "Failed to read file");
        }
    };
    let content = match fs::read(&file_path) {
        Ok(content) => content,
        Err(e) => {
            error!(path = %file_path.display(), error = %e, "Failed to read file");
            return handler.error(StatusCode::InternalServerError, "Failed to read file");
        }
    };

    let etag = generate_etag(&meta);
    let quoted = format!("\"{etag}\"");

    if request
        .header("If-None-Match")
        .is_some_and(|client| client.trim() == quoted)
    {
        return ResponseBuilder::new(StatusCode::NotModified)
            .header("ETag", quoted)
            .build();
    }

    // If-Modified-Since is accepted but not compared; ETag is the validator.

    let extension = file_extension(&file_path);
    let mut builder = ResponseBuilder::new(StatusCode::Ok)
        .content_type(handler.server().config.mime_type(&extension))
        .header("ETag", quoted);

    if let Some(date) = http_date(&meta) {
        builder = builder.header("Last-Modified", date);
    }

    builder = match extension.as_str() {
        "html" | "htm" => builder.no_cache(),
        _ => builder.header("Cache-Control", STATIC_CACHE_CONTROL),
    };

    info!(path = %file_path.display(), bytes = content.len(), "Served file");
    builder.body(content).build()
}

/// First configured index file that exists and is not a directory.
pub fn find_index(dir: &Path, index_files: &[String]) -> Option<PathBuf> {
    index_files
        .iter()
        .map(|name| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// HTML index of a directory, entries sorted by name, directories suffixed
/// with `/`. A parent link is included unless `request_path` is `/`.
pub fn directory_listing(dir: &Path, request_path: &str) -> std::io::Result<String> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_dir = entry.path().is_dir();
        entries.push((name, is_dir));
    }
    entries.sort();

    let base = if request_path.ends_with('/') {
        request_path.to_string()
    } else {
        format!("{request_path}/")
    };
    let title = escape_html(request_path);

    let mut html = format!(
        "<!DOCTYPE html>\n<html>\n<head><title>Index of {title}</title></head>\n\
         <body>\n<h1>Index of {title}</h1>\n<hr>\n<ul>\n"
    );

    if request_path != "/" {
        html.push_str(&format!(
            "<li><a href=\"{}\">../</a></li>\n",
            escape_html(parent_path(&base))
        ));
    }

    for (name, is_dir) in entries {
        let suffix = if is_dir { "/" } else { "" };
        html.push_str(&format!(
            "<li><a href=\"{}\">{}{suffix}</a></li>\n",
            escape_html(&entry_href(&base, &name, is_dir)),
            escape_html(&name)
        ));
    }

    html.push_str("</ul>\n<hr>\n<p><em>webserv/1.0</em></p>\n</body>\n</html>\n");
    Ok(html)
}

/// `/a/b/` → `/a/`, `/a/` → `/`.
fn parent_path(base: &str) -> &str {
    let trimmed = base.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(slash) => &base[..=slash],
        None => "/",
    }
}

/// Absolute link to `name` under `base`, percent-encoded as a path segment.
fn entry_href(base: &str, name: &str, is_dir: bool) -> String {
    let Ok(mut url) = Url::parse(LISTING_ORIGIN) else {
        return format!("{base}{name}");
    };
    url.set_path(base);
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push(name);
        if is_dir {
            segments.push("");
        }
    }
    url.path().to_string()
}
