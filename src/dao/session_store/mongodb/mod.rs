/// Connection settings read from the environment.
pub mod config;
mod connection;
mod error;
mod models;
/// The MongoDB session store.
pub mod store;

pub use config::MongoConfig;
pub use error::MongoDaoError;
pub use store::MongoSessionStore;

use crate::dao::storage::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        match err {
            MongoDaoError::Duplicate { constraint, .. } => StorageError::UniqueViolation { constraint },
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
