use std::time::Duration;

use mongodb::{Client, Database, bson::doc};
use tracing::{debug, info};

use super::{
    config::MongoConfig,
    error::{MongoDaoError, MongoResult},
};

const FIRST_RETRY: Duration = Duration::from_millis(250);
const MAX_RETRY: Duration = Duration::from_secs(4);

/// Live handle on the configured database.
pub struct Connection {
    pub database: Database,
    // Dropping the client shuts its pool down.
    _client: Client,
}

impl Connection {
    /// Build a client and wait for the deployment to answer a ping.
    pub async fn open(config: &MongoConfig) -> MongoResult<Self> {
        let client = Client::with_options(config.options.clone()).map_err(MongoDaoError::Client)?;
        let database = client.database(&config.database);

        let mut delay = FIRST_RETRY;
        let mut attempt = 1;
        loop {
            match ping(&database).await {
                Ok(()) => break,
                Err(source) if attempt >= config.ping_attempts => {
                    return Err(MongoDaoError::Unreachable {
                        attempts: attempt,
                        source,
                    });
                }
                Err(err) => {
                    debug!(attempt, error = %err, "MongoDB not answering yet");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(MAX_RETRY);
                    attempt += 1;
                }
            }
        }

        info!(database = %config.database, "connected to MongoDB");
        Ok(Self {
            database,
            _client: client,
        })
    }
}

pub async fn ping(database: &Database) -> Result<(), mongodb::error::Error> {
    database.run_command(doc! { "ping": 1 }).await.map(|_| ())
}
