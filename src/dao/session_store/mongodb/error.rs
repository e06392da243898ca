use mongodb::error::{Error as MongoError, ErrorKind, WriteFailure};
use thiserror::Error;

/// Result alias for MongoDB operations.
pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

const DUPLICATE_KEY_CODE: i32 = 11000;

/// Failures of the MongoDB session store.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// The connection string could not be parsed.
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        /// Offending URI.
        uri: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// The driver refused the client options.
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// No ping succeeded while connecting.
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        /// Pings tried.
        attempts: u32,
        /// Last driver error.
        #[source]
        source: MongoError,
    },
    /// A periodic health ping failed.
    #[error("MongoDB ping health check failed")]
    HealthPing {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// An index could not be created.
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        /// Target collection.
        collection: &'static str,
        /// Index name.
        index: &'static str,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A write hit a unique index.
    #[error("duplicate key on `{constraint}`")]
    Duplicate {
        /// Logical constraint name reported upwards.
        constraint: &'static str,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Any other failed read or write.
    #[error("failed to {action} in collection `{collection}`")]
    Query {
        /// What was attempted.
        action: &'static str,
        /// Target collection.
        collection: &'static str,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A stored id is not a UUID.
    #[error("malformed identifier `{value}` in collection `{collection}`")]
    MalformedId {
        /// Collection holding the document.
        collection: &'static str,
        /// Raw stored value.
        value: String,
        /// Parse error.
        #[source]
        source: uuid::Error,
    },
    /// A change stream could not be opened.
    #[error("failed to open change stream on `{collection}`")]
    Watch {
        /// Watched collection.
        collection: &'static str,
        /// Driver error.
        #[source]
        source: MongoError,
    },
}

impl MongoDaoError {
    /// Map a write failure, turning duplicate-key errors into [`MongoDaoError::Duplicate`].
    pub fn write(
        action: &'static str,
        collection: &'static str,
        constraint: &'static str,
        source: MongoError,
    ) -> Self {
        if is_duplicate_key(&source) {
            MongoDaoError::Duplicate { constraint, source }
        } else {
            MongoDaoError::Query {
                action,
                collection,
                source,
            }
        }
    }

    /// Map a failed read or non-unique write.
    pub fn query(action: &'static str, collection: &'static str, source: MongoError) -> Self {
        MongoDaoError::Query {
            action,
            collection,
            source,
        }
    }
}

/// Whether the driver error is a duplicate-key violation (code 11000).
pub fn is_duplicate_key(err: &MongoError) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => {
            write_error.code == DUPLICATE_KEY_CODE
        }
        ErrorKind::Command(command_error) => command_error.code == DUPLICATE_KEY_CODE,
        _ => false,
    }
}
