use sqlx::mysql::MySqlConnectOptions;

use super::error::{MySqlDaoError, MySqlResult};

const DEFAULT_PORT: u16 = 3306;
const DEFAULT_MAX_CONNECTIONS: u32 = 16;

/// Runtime configuration describing how to connect to MySQL.
#[derive(Debug, Clone)]
pub struct MySqlConfig {
    /// Server host name.
    pub host: String,
    /// Server port, `3306` unless `DB_PORT` is set.
    pub port: u16,
    /// Login user.
    pub username: String,
    /// Login password.
    pub password: String,
    /// Schema holding the Akatsuki tables.
    pub database: String,
    /// Upper bound of the connection pool.
    pub max_connections: u32,
}

impl MySqlConfig {
    /// Build a configuration by reading the expected environment variables.
    pub fn from_env() -> MySqlResult<Self> {
        let host = required("DB_HOST")?;
        let username = required("DB_USER")?;
        let password = required("DB_PASS")?;
        let database = required("DB_NAME")?;
        let port = match std::env::var("DB_PORT") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| MySqlDaoError::InvalidEnvVar { var: "DB_PORT", value: raw })?,
            Err(_) => DEFAULT_PORT,
        };

        Ok(Self {
            host,
            port,
            username,
            password,
            database,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        })
    }

    pub(super) fn connect_options(&self) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .password(&self.password)
            .database(&self.database)
    }
}

fn required(var: &'static str) -> MySqlResult<String> {
    std::env::var(var).map_err(|_| MySqlDaoError::MissingEnvVar { var })
}
