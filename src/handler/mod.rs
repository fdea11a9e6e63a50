//! Request dispatch.
//!
//! Resolves a parsed request against the route table and produces a
//! response: static files, directory listings, CGI, uploads and deletion.
//!
//! ```text
//!   method known? ──no──► 501
//!        │
//!   route match?  ──no──► 404
//!        │
//!   method allowed? ─no─► 405
//!        │
//!   redirect? ────yes───► 301
//!        │
//!   GET / POST / DELETE
//! ```

pub mod cgi;
pub mod error_page;
pub mod static_files;
pub mod upload;

use std::fs;
use std::path::Path;

use nix::unistd::{AccessFlags, access};
use tracing::{debug, error, info, warn};

use crate::config::{RouteConfig, dotted};
use crate::http::mime::is_static_extension;
use crate::http::request::{Method, Request};
use crate::http::response::{Response, StatusCode};
use crate::server::Server;

use static_files::{file_extension, resolve_file_path};

pub struct RequestHandler<'a> {
    server: &'a Server,
}

impl<'a> RequestHandler<'a> {
    pub fn new(server: &'a Server) -> Self {
        Self { server }
    }

    pub fn handle(&self, request: &Request) -> Response {
        info!(method = request.method.as_str(), path = %request.path, "Handling request");

        if !request.method.is_supported() {
            warn!(method = request.method.as_str(), "Unknown method");
            return self.error(
                StatusCode::NotImplemented,
                &format!("Method {} is not implemented.", request.method.as_str()),
            );
        }

        let Some(route) = self.server.config.match_route(&request.path) else {
            warn!(path = %request.path, "No route found");
            return self.not_found(&request.path);
        };

        if !route.is_method_allowed(&request.method) {
            warn!(
                method = request.method.as_str(),
                path = %request.path,
                "Method not allowed"
            );
            return self.method_not_allowed(&request.method);
        }

        if let Some(target) = route.redirect.as_deref().filter(|t| !t.is_empty()) {
            info!(location = target, "Redirecting");
            return Response::redirect(target, StatusCode::MovedPermanently);
        }

        match request.method {
            Method::GET => self.handle_get(request, route),
            Method::POST => self.handle_post(request, route),
            Method::DELETE => self.handle_delete(request, route),
            Method::Unsupported(_) => self.error(StatusCode::NotImplemented, "Not Implemented"),
        }
    }

    fn handle_get(&self, request: &Request, route: &RouteConfig) -> Response {
        let file_path = resolve_file_path(&request.path, route);
        debug!(path = %file_path.display(), "Resolved file path");

        if let Some(response) = self.try_cgi(request, route, &file_path) {
            return response;
        }

        if !file_path.exists() {
            return self.not_found(&request.path);
        }

        static_files::serve(self, request, route, file_path)
    }

    fn handle_post(&self, request: &Request, route: &RouteConfig) -> Response {
        info!(content_type = request.content_type(), "POST request");

        let file_path = resolve_file_path(&request.path, route);

        if let Some(response) = self.try_cgi(request, route, &file_path) {
            return response;
        }

        // Static resources have no POST handler, whatever the body holds.
        if file_path.is_file() && is_static_extension(&file_extension(&file_path)) {
            return self.method_not_allowed(&request.method);
        }

        if request.is_multipart() {
            if !route.upload_enabled {
                return self.error(
                    StatusCode::Forbidden,
                    "File upload is not allowed for this resource",
                );
            }
            return upload::handle_upload(self, request, route);
        }

        if request
            .content_type()
            .to_ascii_lowercase()
            .contains("application/x-www-form-urlencoded")
        {
            return upload::form_acknowledgment(request);
        }

        upload::post_acknowledgment(request)
    }

    fn handle_delete(&self, request: &Request, route: &RouteConfig) -> Response {
        let file_path = resolve_file_path(&request.path, route);
        debug!(path = %file_path.display(), "Attempting to delete");

        if !file_path.exists() {
            return self.not_found(&request.path);
        }

        if file_path.is_dir() {
            return self.error(StatusCode::Forbidden, "Cannot delete directories");
        }

        if access(file_path.as_path(), AccessFlags::W_OK).is_err() {
            return self.error(StatusCode::Forbidden, "Permission denied: cannot delete file");
        }

        match fs::remove_file(&file_path) {
            Ok(()) => {
                info!(path = %file_path.display(), "Deleted file");
                Response::empty(StatusCode::NoContent)
            }
            Err(e) => {
                error!(path = %file_path.display(), error = %e, "Failed to delete file");
                self.error(StatusCode::InternalServerError, "Failed to delete file")
            }
        }
    }

    /// Hands the request to the CGI executor when the resolved path carries
    /// the route's CGI extension. Returns `None` when CGI does not apply.
    fn try_cgi(
        &self,
        request: &Request,
        route: &RouteConfig,
        file_path: &Path,
    ) -> Option<Response> {
        let cgi_ext = route.cgi_extension()?;
        let ext = file_extension(file_path);
        if ext.is_empty() || dotted(&ext) != cgi_ext {
            return None;
        }

        if !file_path.exists() {
            return Some(self.not_found(&request.path));
        }

        info!(script = %file_path.display(), "Executing CGI script");
        Some(
            self.server
                .cgi()
                .execute(request, &self.server.config, route, file_path),
        )
    }

    pub(crate) fn server(&self) -> &Server {
        self.server
    }

    pub(crate) fn not_found(&self, path: &str) -> Response {
        self.error(
            StatusCode::NotFound,
            &format!("The requested URL {path} was not found on this server."),
        )
    }

    pub(crate) fn method_not_allowed(&self, method: &Method) -> Response {
        self.error(
            StatusCode::MethodNotAllowed,
            &format!("Method {} is not allowed for this resource.", method.as_str()),
        )
    }

    /// Error response with the configured custom page when one is usable.
    pub(crate) fn error(&self, status: StatusCode, message: &str) -> Response {
        error_page::error_response(&self.server.config, status, message)
    }
}
