use redis::aio::ConnectionManager;
use redis::AsyncCommands;

/// Thin wrapper over a Redis connection manager. Used for the two
/// optional caches (compatibility score, accountability score) and for
/// the matching-pass / scheduled-job leases described in §5 — never as
/// the authoritative store for anything in §3.
#[derive(Clone)]
pub struct RedisClient {
    conn: ConnectionManager,
}

impl RedisClient {
    pub async fn connect(url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        tracing::info!(url = %url, "connected to Redis");
        Ok(Self { conn })
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, redis::RedisError> {
        let mut conn = self.conn.clone();
        conn.get(key).await
    }

    pub async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), redis::RedisError> {
        let mut conn = self.conn.clone();
        conn.set_ex(key, value, ttl_secs).await
    }

    pub async fn del(&self, key: &str) -> Result<(), redis::RedisError> {
        let mut conn = self.conn.clone();
        conn.del(key).await
    }

    pub async fn exists(&self, key: &str) -> Result<bool, redis::RedisError> {
        let mut conn = self.conn.clone();
        conn.exists(key).await
    }

    /// Acquire a named lease for `ttl_secs`. Used to give scheduled
    /// jobs (and the matching pass) single-flight semantics across a
    /// replicated deployment without holding an in-process lock across
    /// I/O (§5).
    pub async fn acquire_lease(&self, name: &str, ttl_secs: u64) -> Result<bool, redis::RedisError> {
        let mut conn = self.conn.clone();
        let key = format!("lease:{name}");
        let acquired: bool = redis::cmd("SET")
            .arg(&key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await
            .unwrap_or(false);
        Ok(acquired)
    }

    pub async fn release_lease(&self, name: &str) -> Result<(), redis::RedisError> {
        self.del(&format!("lease:{name}")).await
    }

    pub fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }
}
