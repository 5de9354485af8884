use crate::config::{Config, Credentials, DEFAULT_IDP_HOST, DEFAULT_OSDD_URL};
use std::time::Duration;

/// Numeric limits shared by the planner, executor and downloader.
#[derive(Debug, Clone)]
pub struct Limits {
    pub max_orbits_per_request: usize,
    pub results_per_query: usize,
    pub max_attempts: usize,
    pub retry_delay: Duration,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_orbits_per_request: 50,
            results_per_query: 1000,
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
        }
    }
}

/// Per-run state handed explicitly to every stage.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub limits: Limits,
    pub credentials: Credentials,
    pub osdd_url: String,
    pub idp_host: String,
}

impl RunContext {
    pub fn new(config: &Config) -> Self {
        Self {
            limits: Limits::default(),
            credentials: config.credentials.clone(),
            osdd_url: config.catalogue.osdd_url.clone(),
            idp_host: config.catalogue.idp_host.clone(),
        }
    }

    pub fn with_credentials(credentials: Credentials) -> Self {
        Self {
            limits: Limits::default(),
            credentials,
            osdd_url: DEFAULT_OSDD_URL.to_string(),
            idp_host: DEFAULT_IDP_HOST.to_string(),
        }
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Collections the user is allowed to query.
    pub fn allowed_collections(&self) -> &[String] {
        &self.credentials.collections
    }
}
