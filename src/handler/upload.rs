//! POST bodies: multipart/form-data uploads, urlencoded forms and the
//! generic acknowledgment page.

use std::fs::{self, DirBuilder};
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::RouteConfig;
use crate::handler::RequestHandler;
use crate::http::request::Request;
use crate::http::response::{Response, ResponseBuilder, StatusCode, escape_html};

const DEFAULT_PART_CONTENT_TYPE: &str = "application/octet-stream";

/// One file part of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MultipartError {
    #[error("Missing boundary in multipart/form-data")]
    MissingBoundary,
    #[error("No files found in upload")]
    NoFiles,
}

/// Extracts the file parts of a multipart request.
pub fn extract_files(request: &Request) -> Result<Vec<UploadedFile>, MultipartError> {
    let boundary = request
        .multipart_boundary()
        .ok_or(MultipartError::MissingBoundary)?;

    let files = parse_multipart(&request.body, boundary);
    if files.is_empty() {
        return Err(MultipartError::NoFiles);
    }
    Ok(files)
}

/// Splits `body` on `--boundary` and keeps every part that names a file.
///
/// Parts without a `filename="..."` are form fields and are skipped, as are
/// parts without a blank line between headers and content.
pub fn parse_multipart(body: &[u8], boundary: &str) -> Vec<UploadedFile> {
    let delimiter = format!("--{boundary}").into_bytes();
    let mut files = Vec::new();
    let mut pos = 0;

    while let Some(found) = find(body, &delimiter, pos) {
        let mut start = found + delimiter.len();
        if body.get(start) == Some(&b'\r') {
            start += 1;
        }
        if body.get(start) == Some(&b'\n') {
            start += 1;
        }

        let Some(next) = find(body, &delimiter, start) else {
            break;
        };

        if let Some(file) = parse_part(&body[start..next]) {
            debug!(filename = %file.filename, bytes = file.content.len(), "Parsed file part");
            files.push(file);
        }

        pos = next;
    }

    files
}

fn parse_part(part: &[u8]) -> Option<UploadedFile> {
    let header_end = find(part, b"\r\n\r\n", 0)
        .map(|i| i + 4)
        .or_else(|| find(part, b"\n\n", 0).map(|i| i + 2))?;

    let headers = String::from_utf8_lossy(&part[..header_end]);
    let mut content = &part[header_end..];
    if let Some(stripped) = content.strip_suffix(b"\r\n") {
        content = stripped;
    } else if let Some(stripped) = content.strip_suffix(b"\n") {
        content = stripped;
    }

    let mut filename = None;
    let mut content_type = DEFAULT_PART_CONTENT_TYPE.to_string();

    for line in headers.lines() {
        let lower = line.to_ascii_lowercase();
        if lower.starts_with("content-disposition") {
            if let Some(start) = line.find("filename=\"") {
                let rest = &line[start + "filename=\"".len()..];
                if let Some(end) = rest.find('"') {
                    filename = Some(rest[..end].to_string());
                }
            }
        } else if lower.starts_with("content-type:") {
            if let Some((_, value)) = line.split_once(':') {
                content_type = value.trim_start().to_string();
            }
        }
    }

    let filename = filename.filter(|name| !name.is_empty())?;
    Some(UploadedFile {
        filename,
        content_type,
        content: content.to_vec(),
    })
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}

/// Writes `content` into `upload_dir` as `<unix-seconds>_<filename>`.
///
/// Only the final component of `filename` is used. Returns the saved path,
/// or `None` when the name is unusable or the write fails.
pub fn save_uploaded_file(content: &[u8], filename: &str, upload_dir: &Path) -> Option<PathBuf> {
    let basename = Path::new(filename).file_name()?.to_string_lossy().into_owned();

    if let Err(e) = DirBuilder::new().recursive(true).mode(0o755).create(upload_dir) {
        error!(dir = %upload_dir.display(), error = %e, "Failed to create upload directory");
        return None;
    }

    let full_path = upload_dir.join(format!("{}_{}", Utc::now().timestamp(), basename));
    match fs::write(&full_path, content) {
        Ok(()) => Some(full_path),
        Err(e) => {
            error!(path = %full_path.display(), error = %e, "Failed to create file");
            None
        }
    }
}

pub(crate) fn handle_upload(
    handler: &RequestHandler<'_>,
    request: &Request,
    route: &RouteConfig,
) -> Response {
    let files = match extract_files(request) {
        Ok(files) => files,
        Err(e) => {
            warn!(error = %e, "Rejecting upload");
            return Response::error_page(StatusCode::BadRequest, &e.to_string());
        }
    };

    let upload_dir = route.upload_dir();
    let saved: Vec<PathBuf> = files
        .iter()
        .filter_map(|file| save_uploaded_file(&file.content, &file.filename, &upload_dir))
        .inspect(|path| info!(path = %path.display(), "Saved uploaded file"))
        .collect();

    if saved.is_empty() {
        return handler.error(StatusCode::InternalServerError, "Failed to save uploaded files");
    }

    let mut items = String::new();
    for path in &saved {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        items.push_str(&format!("<li>{}</li>\n", escape_html(&name)));
    }

    let body = format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n\
         <title>Upload Successful</title>\n</head>\n<body>\n\
         <h1>Upload Successful</h1>\n<p>{} file(s) uploaded</p>\n\
         <ul>\n{items}</ul>\n</body>\n</html>\n",
        saved.len()
    );

    ResponseBuilder::new(StatusCode::Created)
        .content_type("text/html; charset=utf-8")
        .no_cache()
        .body(body)
        .build()
}

/// Echoes urlencoded form fields back as an HTML table.
pub(crate) fn form_acknowledgment(request: &Request) -> Response {
    let form = request.form_data();
    info!(fields = form.len(), "Form data received");

    let mut rows = String::new();
    for (field, value) in &form {
        debug!(field = %field, value = %value, "Form field");
        rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td></tr>\n",
            escape_html(field),
            escape_html(value)
        ));
    }

    let body = format!(
        "<!DOCTYPE html>\n<html>\n<head><title>Form Received</title></head>\n<body>\n\
         <h1>Form Data Received</h1>\n<table border='1'>\n\
         <tr><th>Field</th><th>Value</th></tr>\n{rows}</table>\n</body>\n</html>\n"
    );

    ResponseBuilder::new(StatusCode::Ok)
        .content_type("text/html")
        .body(body)
        .build()
}

/// Acknowledges any other POST body by describing it.
pub(crate) fn post_acknowledgment(request: &Request) -> Response {
    let mut body = format!(
        "<!DOCTYPE html>\n<html>\n<head><title>POST Received</title></head>\n<body>\n\
         <h1>POST Request Received</h1>\n<p>Content-Type: {}</p>\n<p>Body size: {} bytes</p>\n",
        escape_html(request.content_type()),
        request.body.len()
    );
    if request.is_chunked() {
        body.push_str("<p>Transfer-Encoding: chunked</p>\n");
    }
    body.push_str("</body>\n</html>\n");

    ResponseBuilder::new(StatusCode::Ok)
        .content_type("text/html")
        .body(body)
        .build()
}
