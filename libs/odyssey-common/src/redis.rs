use async_trait::async_trait;
use redis::AsyncCommands;
use uuid::Uuid;

use crate::error::Result;
use crate::store::DocumentStore;
use crate::types::{RunOutcome, RunRequest};

// Redis key semantics - the API, the CLI and any external executor
// must agree on these, so they live in one place only.

pub const DOC_PREFIX: &str = "odyssey:doc";
pub const RUNNER_QUEUE_PREFIX: &str = "odyssey:runner:queue";
pub const RUNNER_RESULT_PREFIX: &str = "odyssey:runner:result";

/// Replies nobody collected expire after this many seconds
pub const RESULT_TTL_SECONDS: i64 = 3600;

/// Hash holding every document of a collection
pub fn collection_key(collection: &str) -> String {
    format!("{}:{}", DOC_PREFIX, collection)
}

/// Queue an executor for `language` consumes from
pub fn runner_queue(language: &str) -> String {
    format!("{}:{}", RUNNER_QUEUE_PREFIX, language.to_lowercase())
}

/// List the executor pushes its reply for `job_id` onto
pub fn runner_result_key(job_id: &Uuid) -> String {
    format!("{}:{}", RUNNER_RESULT_PREFIX, job_id)
}

/// Push a run request to its language queue
/// Uses RPUSH for FIFO semantics
pub async fn push_run_request<C>(conn: &mut C, request: &RunRequest) -> Result<()>
where
    C: redis::aio::ConnectionLike + Send,
{
    let queue = runner_queue(&request.language);
    let payload = serde_json::to_string(request)?;
    let _: () = conn.rpush(&queue, payload).await?;
    Ok(())
}

/// Wait for the executor's reply
/// Uses BLPOP; `None` when nothing arrived within `timeout_seconds`.
/// BLPOP holds the connection for the whole wait, so callers pass one
/// that nothing else is using.
pub async fn wait_run_outcome<C>(
    conn: &mut C,
    job_id: &Uuid,
    timeout_seconds: f64,
) -> Result<Option<RunOutcome>>
where
    C: redis::aio::ConnectionLike + Send,
{
    let key = runner_result_key(job_id);
    let reply: Option<(String, String)> = conn.blpop(&key, timeout_seconds).await?;

    match reply {
        Some((_key, payload)) => Ok(Some(serde_json::from_str(&payload)?)),
        None => Ok(None),
    }
}

/// Executor side of the protocol: publish the reply for a job
pub async fn publish_run_outcome<C>(conn: &mut C, outcome: &RunOutcome) -> Result<()>
where
    C: redis::aio::ConnectionLike + Send,
{
    let key = runner_result_key(&outcome.job_id);
    let payload = serde_json::to_string(outcome)?;
    let _: () = conn.rpush(&key, payload).await?;
    let _: () = conn.expire(&key, RESULT_TTL_SECONDS).await?;
    Ok(())
}

/// Redis-backed document store: one hash per collection, JSON values
#[derive(Clone)]
pub struct RedisStore {
    conn: redis::aio::ConnectionManager,
}

impl RedisStore {
    pub fn new(conn: redis::aio::ConnectionManager) -> Self {
        Self { conn }
    }

    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = redis::aio::ConnectionManager::new(client).await?;
        Ok(Self::new(conn))
    }
}

#[async_trait]
impl DocumentStore for RedisStore {
    async fn put(&self, collection: &str, id: &str, body: String) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.hset(collection_key(collection), id, body).await?;
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.hget(collection_key(collection), id).await?)
    }

    async fn scan(&self, collection: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.hvals(collection_key(collection)).await?)
    }
}
