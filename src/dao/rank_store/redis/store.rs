use futures::future::BoxFuture;
use redis::{AsyncCommands, Client, aio::MultiplexedConnection};

use super::{
    config::RedisConfig,
    error::{RedisDaoError, RedisResult},
};
use crate::dao::{rank_store::RankStore, storage::StorageResult};

/// [`RankStore`] backed by Redis sorted sets.
#[derive(Clone)]
pub struct RedisRankStore {
    connection: MultiplexedConnection,
}

impl RedisRankStore {
    /// Open a multiplexed connection and make sure the server answers.
    pub async fn connect(config: RedisConfig) -> RedisResult<Self> {
        let client =
            Client::open(config.url()).map_err(|source| RedisDaoError::Connect { source })?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|source| RedisDaoError::Connect { source })?;

        let store = Self { connection };
        store.ping().await?;
        Ok(store)
    }

    async fn ping(&self) -> RedisResult<()> {
        let mut connection = self.connection.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut connection)
            .await
            .map_err(|source| RedisDaoError::Ping { source })?;
        Ok(())
    }

    async fn reverse_rank(&self, key: String, user_id: i32) -> RedisResult<Option<u64>> {
        let mut connection = self.connection.clone();
        connection
            .zrevrank(&key, user_id)
            .await
            .map_err(|source| RedisDaoError::Command {
                command: "ZREVRANK",
                key,
                source,
            })
    }

    async fn set_score(&self, key: String, user_id: i32, score: f64) -> RedisResult<()> {
        let mut connection = self.connection.clone();
        let _: () = connection
            .zadd(&key, user_id, score)
            .await
            .map_err(|source| RedisDaoError::Command {
                command: "ZADD",
                key,
                source,
            })?;
        Ok(())
    }

    async fn publish(&self, channel: &'static str, payload: String) -> RedisResult<()> {
        let mut connection = self.connection.clone();
        let _: () = connection
            .publish(channel, payload)
            .await
            .map_err(|source| RedisDaoError::Command {
                command: "PUBLISH",
                key: channel.to_owned(),
                source,
            })?;
        Ok(())
    }
}

impl RankStore for RedisRankStore {
    fn reverse_rank(
        &self,
        key: String,
        user_id: i32,
    ) -> BoxFuture<'static, StorageResult<Option<u64>>> {
        let store = self.clone();
        Box::pin(async move { store.reverse_rank(key, user_id).await.map_err(Into::into) })
    }

    fn set_score(
        &self,
        key: String,
        user_id: i32,
        score: f64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.set_score(key, user_id, score).await.map_err(Into::into) })
    }

    fn publish(
        &self,
        channel: &'static str,
        payload: String,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.publish(channel, payload).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ping().await.map_err(Into::into) })
    }
}
