//! Error types shared by the Redis rank store.

use redis::RedisError;
use thiserror::Error;

/// Convenient result alias returning [`RedisDaoError`] failures.
pub type RedisResult<T> = Result<T, RedisDaoError>;

/// Failures that can occur while interacting with Redis.
#[derive(Debug, Error)]
pub enum RedisDaoError {
    /// Required environment variable is missing.
    #[error("missing Redis environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    /// Environment variable is present but unparsable.
    #[error("invalid value `{value}` for Redis environment variable `{var}`")]
    InvalidEnvVar { var: &'static str, value: String },
    /// The client or its multiplexed connection could not be created.
    #[error("failed to connect to Redis")]
    Connect {
        #[source]
        source: RedisError,
    },
    /// PING did not succeed.
    #[error("Redis ping failed")]
    Ping {
        #[source]
        source: RedisError,
    },
    /// A command against a key failed.
    #[error("Redis command `{command}` failed for `{key}`")]
    Command {
        command: &'static str,
        key: String,
        #[source]
        source: RedisError,
    },
}
