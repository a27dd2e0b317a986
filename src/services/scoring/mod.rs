use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::*;
use crate::services::assembly::rank_for_user;
use crate::services::queue::QueueProducer;
use crate::services::store::ScoreStore;
use crate::utils::{retry_with_backoff, validation};
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Weighted increment contributed by a queued action.
///
/// The delta is a pure function of the action so that concurrent folds for
/// the same (movie, user) pair commute. The `% 6` on ratings reproduces the
/// established scoring rule; validation already rejects ratings above 5, so
/// for accepted events the modulus is the identity.
pub fn action_delta(action: Action, rating: Option<u8>) -> f64 {
    match action {
        Action::View => 0.0,
        Action::Like => 3.0,
        Action::Rate => f64::from(rating.unwrap_or(0) % 6),
    }
}

/// Weighted increment contributed by a direct item interaction.
pub fn interaction_delta(kind: ItemInteraction, rating: Option<u8>) -> f64 {
    match kind {
        ItemInteraction::Like => 3.0,
        ItemInteraction::Rate => f64::from(rating.unwrap_or(0) % 6),
        ItemInteraction::Comment => 2.0,
    }
}

enum FoldOutcome {
    Applied(f64),
    Duplicate,
    ViewRecorded,
}

/// Consumes the action queue and folds each event into the score store.
///
/// Tolerates at-least-once delivery: a request id is claimed before its
/// increment is applied, so a redelivered event changes the score by the
/// same total delta as a single delivery.
pub struct ScoringWorker {
    store: Arc<dyn ScoreStore>,
    config: Arc<Config>,
    stats: DashMap<&'static str, u64>,
}

impl ScoringWorker {
    pub fn new(store: Arc<dyn ScoreStore>, config: Arc<Config>) -> Self {
        Self {
            store,
            config,
            stats: DashMap::new(),
        }
    }

    /// Processes one delivery to completion. Always resolves `Ok` so the
    /// consumer can acknowledge: transient store failures are retried up to
    /// the delivery bound, and events that still fail (or fail validation)
    /// are quarantined rather than redelivered forever.
    pub async fn process_event(&self, event: InteractionEvent) -> AppResult<()> {
        self.bump("received");

        if let Err(e) = validation::validate_event(&event) {
            self.quarantine(&event, &e);
            return Ok(());
        }

        let retries = self.config.worker.max_delivery_attempts.saturating_sub(1);
        let event_ref = &event;
        let result = retry_with_backoff(
            move || self.fold(event_ref),
            retries,
            self.config.worker.retry_initial_delay(),
        )
        .await;

        match result {
            Ok(FoldOutcome::Applied(score)) => {
                self.bump("applied");
                info!(
                    "Folded {:?} for user {} on movie {} (score now {})",
                    event.action, event.user_id, event.movie_id, score
                );
            }
            Ok(FoldOutcome::Duplicate) => {
                self.bump("duplicates");
                debug!("Request {} already folded, acknowledging", event.req_id);
            }
            Ok(FoldOutcome::ViewRecorded) => {
                self.bump("views");
                debug!(
                    "Recorded view of movie {} by user {}",
                    event.movie_id, event.user_id
                );
            }
            Err(e) => self.quarantine(&event, &e),
        }

        Ok(())
    }

    async fn fold(&self, event: &InteractionEvent) -> AppResult<FoldOutcome> {
        let req_id = event.req_id.to_string();

        if !self.store.try_claim_request(&req_id).await? {
            return Ok(FoldOutcome::Duplicate);
        }

        let delta = action_delta(event.action, event.rating);
        if delta == 0.0 {
            // Views carry no ranking weight; applying a zero increment would
            // still materialize an entry and pollute cold-start detection.
            return Ok(FoldOutcome::ViewRecorded);
        }

        match self
            .store
            .increment(event.movie_id, &event.user_id, delta)
            .await
        {
            Ok(score) => Ok(FoldOutcome::Applied(score)),
            Err(e) => {
                if let Err(release_err) = self.store.release_request(&req_id).await {
                    warn!(
                        "Failed to release claim for {} after increment failure: {}",
                        req_id, release_err
                    );
                }
                Err(e)
            }
        }
    }

    fn quarantine(&self, event: &InteractionEvent, cause: &AppError) {
        self.bump("quarantined");
        let poison = AppError::Poison {
            req_id: event.req_id.to_string(),
            reason: cause.to_string(),
        };
        error!(
            "Quarantining event ({:?} on movie {} by {}): {}",
            event.action, event.movie_id, event.user_id, poison
        );
    }

    fn bump(&self, key: &'static str) {
        *self.stats.entry(key).or_insert(0) += 1;
    }

    pub fn stats(&self) -> Vec<(&'static str, u64)> {
        self.stats
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect()
    }
}

/// Consumes the recommendation-request queue and materializes each user's
/// current ranked candidates: stored for fast downstream reads and published
/// to the embeddings queue for the training pipeline join.
pub struct RecommendWorker {
    store: Arc<dyn ScoreStore>,
    producer: Arc<QueueProducer>,
    config: Arc<Config>,
}

impl RecommendWorker {
    pub fn new(
        store: Arc<dyn ScoreStore>,
        producer: Arc<QueueProducer>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            store,
            producer,
            config,
        }
    }

    pub async fn process_request(&self, request: RecommendationRequest) -> AppResult<()> {
        let retries = self.config.worker.max_delivery_attempts.saturating_sub(1);
        let request_ref = &request;
        let result = retry_with_backoff(
            move || self.materialize(request_ref),
            retries,
            self.config.worker.retry_initial_delay(),
        )
        .await;

        if let Err(e) = result {
            error!(
                "Dropping recommendation request {} for user {} after retries: {}",
                request.req_id, request.user_id, e
            );
        }

        Ok(())
    }

    async fn materialize(&self, request: &RecommendationRequest) -> AppResult<()> {
        let entries = self.store.all_scores().await?;
        let ranked = rank_for_user(&entries, &request.user_id);

        let candidates: Vec<RankedCandidate> = ranked
            .iter()
            .map(|entry| RankedCandidate {
                movie_id: entry.movie_id,
                score: entry.score,
                source: CandidateSource::Explicit,
            })
            .collect();

        let set = CandidateSet {
            req_id: request.req_id,
            user_id: request.user_id.clone(),
            candidates,
            generated_at: Utc::now(),
        };

        self.store.store_candidates(&set).await?;
        self.producer.publish_candidate_set(&set).await?;

        info!(
            "Materialized {} candidates for request {} (user {})",
            set.candidates.len(),
            set.req_id,
            set.user_id
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_carries_no_weight() {
        assert_eq!(action_delta(Action::View, None), 0.0);
    }

    #[test]
    fn like_contributes_three() {
        assert_eq!(action_delta(Action::Like, None), 3.0);
    }

    #[test]
    fn rating_contributes_its_value_mod_six() {
        assert_eq!(action_delta(Action::Rate, Some(0)), 0.0);
        assert_eq!(action_delta(Action::Rate, Some(4)), 4.0);
        assert_eq!(action_delta(Action::Rate, Some(5)), 5.0);
        // Never reachable through validation, but the formula is fixed.
        assert_eq!(action_delta(Action::Rate, Some(6)), 0.0);
    }

    #[test]
    fn comment_contributes_two() {
        assert_eq!(interaction_delta(ItemInteraction::Comment, None), 2.0);
        assert_eq!(interaction_delta(ItemInteraction::Like, None), 3.0);
        assert_eq!(interaction_delta(ItemInteraction::Rate, Some(5)), 5.0);
    }
}
