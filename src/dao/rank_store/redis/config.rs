use super::error::{RedisDaoError, RedisResult};

const DEFAULT_PORT: u16 = 6379;

/// Runtime configuration describing how to reach Redis.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Server host name.
    pub host: String,
    /// Server port, `6379` unless `REDIS_PORT` is set.
    pub port: u16,
    /// `AUTH` password, if any.
    pub password: Option<String>,
}

impl RedisConfig {
    /// Build a configuration by reading the expected environment variables.
    pub fn from_env() -> RedisResult<Self> {
        let host = std::env::var("REDIS_HOST")
            .map_err(|_| RedisDaoError::MissingEnvVar { var: "REDIS_HOST" })?;
        let port = match std::env::var("REDIS_PORT") {
            Ok(raw) => raw.parse().map_err(|_| RedisDaoError::InvalidEnvVar {
                var: "REDIS_PORT",
                value: raw,
            })?,
            Err(_) => DEFAULT_PORT,
        };
        let password = std::env::var("REDIS_PASS").ok().filter(|pass| !pass.is_empty());

        Ok(Self {
            host,
            port,
            password,
        })
    }

    pub(super) fn url(&self) -> String {
        match &self.password {
            Some(password) => format!("redis://:{}@{}:{}/", password, self.host, self.port),
            None => format!("redis://{}:{}/", self.host, self.port),
        }
    }
}
