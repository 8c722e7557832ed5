use mongodb::error::Error as MongoError;
use thiserror::Error;

/// Result alias for MongoDB operations.
pub type MongoResult<T> = Result<T, MongoDaoError>;

/// Failures raised by the MongoDB backend.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// Required environment variable is missing.
    #[error("missing MongoDB environment variable `{var}`")]
    MissingEnvVar {
        /// Variable name.
        var: &'static str,
    },
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
    /// The server never answered the initial ping.
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        /// Attempts made.
        attempts: u32,
        /// Last driver error.
        #[source]
        source: MongoError,
    },
    /// Health check ping failed.
    #[error("MongoDB ping health check failed")]
    HealthPing {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Reading the match record failed.
    #[error("failed to load match record")]
    LoadMatch {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Writing the match record failed.
    #[error("failed to save match record")]
    SaveMatch {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Another writer changed the record first.
    #[error("match record version conflict: expected {expected:?}, found {actual:?}")]
    VersionConflict {
        /// Version the write was based on.
        expected: Option<u64>,
        /// Version found in the collection.
        actual: Option<u64>,
    },
}
