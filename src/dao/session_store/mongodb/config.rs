use mongodb::options::ClientOptions;

use super::error::{MongoDaoError, MongoResult};

const DEFAULT_DB: &str = "quiz_live";
const APP_NAME: &str = "quiz-live-back";
const DEFAULT_CONNECT_ATTEMPTS: u32 = 10;

/// Connection settings of the MongoDB session store.
#[derive(Clone)]
pub struct MongoConfig {
    /// Parsed driver options.
    pub options: ClientOptions,
    /// Database holding every collection.
    pub database_name: String,
    /// Pings tried before a connection attempt is reported as failed.
    pub connect_attempts: u32,
}

impl MongoConfig {
    /// Parse `uri`. An explicit `db_name` wins over the database named in the URI.
    pub async fn from_uri(uri: &str, db_name: Option<&str>) -> MongoResult<Self> {
        let mut options =
            ClientOptions::parse(uri)
                .await
                .map_err(|source| MongoDaoError::InvalidUri {
                    uri: uri.to_owned(),
                    source,
                })?;
        let database_name = db_name
            .or(options.default_database.as_deref())
            .unwrap_or(DEFAULT_DB)
            .to_owned();
        options.app_name.get_or_insert_with(|| APP_NAME.to_owned());

        Ok(Self {
            options,
            database_name,
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
        })
    }
}
