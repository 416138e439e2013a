use std::time::Duration;

use super::error::{CouchDaoError, CouchResult};

const DEFAULT_DATABASE: &str = "live_scoring";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Where the score documents live and how to authenticate.
#[derive(Debug, Clone)]
pub struct CouchConfig {
    pub base_url: String,
    pub database: String,
    pub credentials: Option<(String, String)>,
    /// Per-request deadline; finalize persistence has its own bound on top.
    pub request_timeout: Duration,
}

impl CouchConfig {
    /// Read `COUCH_BASE_URL`, `COUCH_DB`, `COUCH_USERNAME` and `COUCH_PASSWORD`.
    pub fn from_env() -> CouchResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`CouchConfig::from_env`] over an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> CouchResult<Self> {
        let base_url = lookup("COUCH_BASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or(CouchDaoError::MissingSetting("COUCH_BASE_URL"))?;
        let credentials = lookup("COUCH_USERNAME").zip(lookup("COUCH_PASSWORD"));

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            database: lookup("COUCH_DB").unwrap_or_else(|| DEFAULT_DATABASE.to_owned()),
            credentials,
            request_timeout: DEFAULT_TIMEOUT,
        })
    }
}
