//! Server configuration.
//!
//! Loaded once at startup from a YAML file and shared read-only by every
//! connection.

use anyhow::{Context, bail};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::http::mime;
use crate::http::request::Method;

/// Bytes allowed on top of `max_body_size` for the request line and headers.
pub const HEADER_HEADROOM: usize = 8192;

const DEFAULT_LISTEN: &str = "127.0.0.1:8080";
const DEFAULT_UPLOAD_DIR: &str = "./uploads";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen_addr: String,
    /// Largest accepted request body, in bytes.
    pub max_body_size: usize,
    pub idle_timeout_secs: u64,
    /// Custom error page per status code, resolved against the `/` route.
    pub error_pages: HashMap<u16, String>,
    /// Extension → MIME type overrides.
    pub mime_types: HashMap<String, String>,
    pub routes: Vec<RouteConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
    /// URL path prefix handled by this route.
    pub path: String,
    /// Filesystem directory the prefix maps to.
    pub root: PathBuf,
    pub methods: Vec<String>,
    pub redirect: Option<String>,
    pub index: Vec<String>,
    pub autoindex: bool,
    pub cgi_enabled: bool,
    pub cgi_extension: Option<String>,
    /// Program used to run scripts, e.g. `python3`. Scripts are executed
    /// directly when unset.
    pub cgi_interpreter: Option<String>,
    pub upload_enabled: bool,
    pub upload_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN.to_string(),
            max_body_size: 1024 * 1024,
            idle_timeout_secs: 60,
            error_pages: HashMap::new(),
            mime_types: HashMap::new(),
            routes: vec![RouteConfig::default()],
        }
    }
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            root: PathBuf::from("./www"),
            methods: vec!["GET".to_string()],
            redirect: None,
            index: vec!["index.html".to_string()],
            autoindex: false,
            cgi_enabled: false,
            cgi_extension: None,
            cgi_interpreter: None,
            upload_enabled: false,
            upload_dir: None,
        }
    }
}

impl Config {
    /// Loads the configuration named by `WEBSERV_CONFIG`, falling back to
    /// built-in defaults.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(None)
    }

    /// Loads `path` (or `WEBSERV_CONFIG` when `None`), falling back to
    /// built-in defaults. `LISTEN` overrides the listen address in every case.
    pub fn load_from(path: Option<&str>) -> anyhow::Result<Self> {
        let path = path
            .map(str::to_string)
            .or_else(|| std::env::var("WEBSERV_CONFIG").ok());

        let mut cfg = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        if let Ok(listen_addr) = std::env::var("LISTEN") {
            cfg.listen_addr = listen_addr;
        }

        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        let cfg: Config = serde_yaml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.routes.is_empty() {
            bail!("configuration defines no routes");
        }
        for route in &self.routes {
            if !route.path.starts_with('/') {
                bail!("route path {:?} must start with '/'", route.path);
            }
            if route.cgi_enabled && route.cgi_extension.is_none() {
                bail!("route {:?} enables CGI without cgi_extension", route.path);
            }
        }
        Ok(())
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Longest route prefix matching `path` on a segment boundary.
    pub fn match_route(&self, path: &str) -> Option<&RouteConfig> {
        self.routes
            .iter()
            .filter(|route| route.matches(path))
            .max_by_key(|route| route.path.len())
    }

    /// MIME type for an extension: configured table, then built-in table.
    pub fn mime_type(&self, extension: &str) -> String {
        let extension = extension.trim_start_matches('.').to_ascii_lowercase();
        self.mime_types
            .get(&extension)
            .cloned()
            .or_else(|| mime::lookup(&extension).map(str::to_string))
            .unwrap_or_else(|| mime::DEFAULT_MIME_TYPE.to_string())
    }

    pub fn error_page(&self, status: u16) -> Option<&str> {
        self.error_pages.get(&status).map(String::as_str)
    }
}

impl RouteConfig {
    pub fn matches(&self, path: &str) -> bool {
        let prefix = self.path.as_str();
        if prefix == "/" {
            return true;
        }
        match path.strip_prefix(prefix) {
            Some(rest) => rest.is_empty() || prefix.ends_with('/') || rest.starts_with('/'),
            None => false,
        }
    }

    pub fn is_method_allowed(&self, method: &Method) -> bool {
        self.methods
            .iter()
            .any(|m| m.eq_ignore_ascii_case(method.as_str()))
    }

    /// The lowercased CGI extension with a leading dot, if CGI is enabled.
    pub fn cgi_extension(&self) -> Option<String> {
        if !self.cgi_enabled {
            return None;
        }
        self.cgi_extension
            .as_deref()
            .filter(|ext| !ext.is_empty())
            .map(dotted)
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.upload_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOAD_DIR))
    }
}

/// Normalizes an extension to lowercase with exactly one leading dot.
pub fn dotted(ext: &str) -> String {
    format!(".{}", ext.trim_start_matches('.').to_ascii_lowercase())
}
