mod config;
mod error;
mod models;
mod store;

pub use config::MySqlConfig;
pub use error::MySqlDaoError;
pub use store::MySqlScoreStore;

use crate::dao::storage::StorageError;

impl From<MySqlDaoError> for StorageError {
    fn from(err: MySqlDaoError) -> Self {
        match err {
            MySqlDaoError::InvalidRow { table, source } => {
                StorageError::invalid(format!("row in `{table}`"), source)
            }
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
