use std::time::Duration;

use mongodb::{Client, Database, bson::doc};
use tokio::time::sleep;
use tracing::{debug, warn};

use super::{
    config::MongoConfig,
    error::{MongoDaoError, MongoResult},
};

const FIRST_RETRY: Duration = Duration::from_millis(250);
const MAX_RETRY: Duration = Duration::from_secs(5);

/// Open the configured database and wait until the server answers a ping.
pub async fn open_database(config: &MongoConfig) -> MongoResult<Database> {
    let client = Client::with_options(config.options.clone())
        .map_err(|source| MongoDaoError::ClientConstruction { source })?;
    let database = client.database(&config.database_name);

    let attempts = config.connect_attempts.max(1);
    let mut attempt = 0;
    let mut delay = FIRST_RETRY;
    loop {
        attempt += 1;
        match database.run_command(doc! { "ping": 1 }).await {
            Ok(_) => break,
            Err(source) if attempt >= attempts => {
                return Err(MongoDaoError::InitialPing {
                    attempts: attempt,
                    source,
                });
            }
            Err(err) => {
                debug!(attempt, error = %err, "MongoDB not answering yet");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_RETRY);
            }
        }
    }

    warn_without_replica_set(&database).await;
    Ok(database)
}

/// Change streams need a replica set. Without one writes still work and clients poll.
async fn warn_without_replica_set(database: &Database) {
    match database.run_command(doc! { "hello": 1 }).await {
        Ok(reply) if reply.contains_key("setName") => {}
        Ok(_) => warn!(
            database = %database.name(),
            "MongoDB is not a replica set; change feeds are unavailable and clients fall back to polling"
        ),
        Err(err) => debug!(error = %err, "unable to inspect MongoDB topology"),
    }
}
