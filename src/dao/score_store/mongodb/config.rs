use std::time::Duration;

use mongodb::options::ClientOptions;

use super::error::{MongoDaoError, MongoResult};

const DEFAULT_DATABASE: &str = "live_scoring";
const APP_NAME: &str = "live-scoring-back";
/// Server selection bound; the supervisor retries on top of it.
const SELECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Parsed driver options plus the database holding the score collections.
#[derive(Clone)]
pub struct MongoConfig {
    pub options: ClientOptions,
    pub database: String,
    /// Pings attempted before a connection is reported unreachable.
    pub ping_attempts: u32,
}

impl MongoConfig {
    /// Read `MONGO_URI` (required) and `MONGO_DB`.
    pub async fn from_env() -> MongoResult<Self> {
        let uri = std::env::var("MONGO_URI")
            .ok()
            .filter(|uri| !uri.trim().is_empty())
            .ok_or(MongoDaoError::MissingSetting("MONGO_URI"))?;
        let database = std::env::var("MONGO_DB").unwrap_or_else(|_| DEFAULT_DATABASE.into());
        Self::parse(&uri, database).await
    }

    /// Parse `uri`; the driver may resolve SRV records here.
    pub async fn parse(uri: &str, database: impl Into<String>) -> MongoResult<Self> {
        let mut options = ClientOptions::parse(uri)
            .await
            .map_err(MongoDaoError::InvalidUri)?;
        options.app_name.get_or_insert_with(|| APP_NAME.to_owned());
        options
            .server_selection_timeout
            .get_or_insert(SELECTION_TIMEOUT);

        Ok(Self {
            options,
            database: database.into(),
            ping_attempts: 5,
        })
    }
}
