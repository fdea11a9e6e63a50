//! Server context and the event loop driving connections.

pub mod listener;

use crate::config::Config;
use crate::handler::cgi::{CgiExecutor, ProcessCgi};

/// Read-only context shared by every connection: configuration plus the
/// collaborator that runs CGI scripts.
pub struct Server {
    pub config: Config,
    cgi: Box<dyn CgiExecutor + Send + Sync>,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self::with_cgi(config, ProcessCgi)
    }

    pub fn with_cgi(config: Config, cgi: impl CgiExecutor + Send + Sync + 'static) -> Self {
        Self {
            config,
            cgi: Box::new(cgi),
        }
    }

    pub fn cgi(&self) -> &dyn CgiExecutor {
        self.cgi.as_ref()
    }
}
