//! Error types shared by the MySQL storage implementation.

use thiserror::Error;

use crate::dao::codes::CodeError;

/// Convenient result alias returning [`MySqlDaoError`] failures.
pub type MySqlResult<T> = Result<T, MySqlDaoError>;

/// Failures that can occur while interacting with MySQL.
#[derive(Debug, Error)]
pub enum MySqlDaoError {
    /// Required environment variable is missing.
    #[error("missing MySQL environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    /// Environment variable is present but unparsable.
    #[error("invalid value `{value}` for MySQL environment variable `{var}`")]
    InvalidEnvVar { var: &'static str, value: String },
    /// The connection pool could not be created.
    #[error("failed to connect to MySQL")]
    Connect {
        #[source]
        source: sqlx::Error,
    },
    /// Health check query failed.
    #[error("MySQL ping failed")]
    Ping {
        #[source]
        source: sqlx::Error,
    },
    /// A read statement failed.
    #[error("failed to query `{table}`")]
    Query {
        table: &'static str,
        #[source]
        source: sqlx::Error,
    },
    /// A write statement failed.
    #[error("failed to write to `{table}`")]
    Write {
        table: &'static str,
        #[source]
        source: sqlx::Error,
    },
    /// A row holds a code with no matching domain variant.
    #[error("invalid row in `{table}`")]
    InvalidRow {
        table: &'static str,
        #[source]
        source: CodeError,
    },
}
