use crate::config::Config;
use crate::error::AppResult;
use crate::models::{CandidateSet, ScoreEntry};
use async_trait::async_trait;
use redis::AsyncCommands;
use std::sync::Arc;
use tracing::warn;

/// The scoring contract against the score store.
///
/// All mutation goes through `increment`, an atomic commutative operation:
/// the delta is a pure function of the action, never of the current score,
/// so concurrent workers can fold events for the same (movie, user) pair
/// without coordination.
#[async_trait]
pub trait ScoreStore: Send + Sync {
    /// Atomically adds `delta` to the `(movie, user)` entry, creating it on
    /// first touch. Returns the score after the increment.
    async fn increment(&self, movie_id: u64, user_id: &str, delta: f64) -> AppResult<f64>;

    /// Full-range read of every score entry, ascending by score. Moderate
    /// scale only; a sharded deployment would index by user instead.
    async fn all_scores(&self) -> AppResult<Vec<ScoreEntry>>;

    /// Claims a request id for processing. Returns false when the id was
    /// already claimed, i.e. the event is a redelivery that must not be
    /// folded again. Claims expire after a bounded retention period.
    async fn try_claim_request(&self, req_id: &str) -> AppResult<bool>;

    /// Releases a claim so a redelivery can reapply the fold. Used when the
    /// increment fails after the claim was taken.
    async fn release_request(&self, req_id: &str) -> AppResult<()>;

    /// Materializes a precomputed candidate set for downstream consumers.
    async fn store_candidates(&self, set: &CandidateSet) -> AppResult<()>;
}

pub struct RedisScoreStore {
    client: Arc<redis::Client>,
    config: Arc<Config>,
}

impl RedisScoreStore {
    pub fn new(client: Arc<redis::Client>, config: Arc<Config>) -> Self {
        Self { client, config }
    }

    fn dedup_key(req_id: &str) -> String {
        format!("dedupe:{}", req_id)
    }

    fn candidates_key(user_id: &str) -> String {
        format!("reco:candidates:{}", user_id)
    }
}

#[async_trait]
impl ScoreStore for RedisScoreStore {
    async fn increment(&self, movie_id: u64, user_id: &str, delta: f64) -> AppResult<f64> {
        let mut conn = self.client.get_async_connection().await?;
        let member = format!("{}:{}", movie_id, user_id);
        let score: f64 = conn
            .zincr(&self.config.redis.score_set_key, member, delta)
            .await?;
        Ok(score)
    }

    async fn all_scores(&self) -> AppResult<Vec<ScoreEntry>> {
        let mut conn = self.client.get_async_connection().await?;
        let rows: Vec<(String, f64)> = conn
            .zrange_withscores(&self.config.redis.score_set_key, 0, -1)
            .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for (member, score) in rows {
            match ScoreEntry::parse(&member, score) {
                Some(entry) => entries.push(entry),
                None => warn!("Skipping malformed score member '{}'", member),
            }
        }

        Ok(entries)
    }

    async fn try_claim_request(&self, req_id: &str) -> AppResult<bool> {
        let mut conn = self.client.get_async_connection().await?;
        let claimed: Option<String> = redis::cmd("SET")
            .arg(Self::dedup_key(req_id))
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(self.config.redis.dedup_ttl_seconds)
            .query_async(&mut conn)
            .await?;

        Ok(claimed.is_some())
    }

    async fn release_request(&self, req_id: &str) -> AppResult<()> {
        let mut conn = self.client.get_async_connection().await?;
        let _: () = conn.del(Self::dedup_key(req_id)).await?;
        Ok(())
    }

    async fn store_candidates(&self, set: &CandidateSet) -> AppResult<()> {
        let mut conn = self.client.get_async_connection().await?;
        let payload = serde_json::to_string(set)?;
        let _: () = redis::cmd("SET")
            .arg(Self::candidates_key(&set.user_id))
            .arg(payload)
            .arg("EX")
            .arg(self.config.redis.candidate_ttl_seconds)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}
