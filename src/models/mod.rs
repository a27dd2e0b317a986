use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single user action flowing through the `user_actions` queue.
///
/// Created once by the ingestion API, never mutated, consumed
/// effectively-once by the scoring worker (idempotent under redelivery).
/// Field names follow the wire format shared with the other pipeline
/// consumers (`reqId`, `userId`, `movieId`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionEvent {
    pub req_id: Uuid,
    pub user_id: String,
    pub action: Action,
    pub movie_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    View,
    Like,
    Rate,
}

/// Direct item-interaction kinds accepted by the interactions surface.
/// Unlike queued actions these are folded synchronously; comments arrive
/// only through this path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemInteraction {
    Like,
    Rate,
    Comment,
}

/// Ephemeral query envelope on the `recommendation_requests` queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationRequest {
    pub req_id: Uuid,
    pub user_id: String,
}

/// Accumulated affinity between one user and one movie.
///
/// Lives as one member of the score store's sorted set; created implicitly
/// on first increment and never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub movie_id: u64,
    pub user_id: String,
    pub score: f64,
}

impl ScoreEntry {
    /// Sorted-set member encoding, `"<movieId>:<userId>"`.
    pub fn member(&self) -> String {
        format!("{}:{}", self.movie_id, self.user_id)
    }

    /// Parses a sorted-set member back into an entry. Members that do not
    /// follow the `"<movieId>:<userId>"` encoding are skipped by callers.
    pub fn parse(member: &str, score: f64) -> Option<Self> {
        let (movie, user) = member.split_once(':')?;
        let movie_id = movie.parse().ok()?;
        Some(Self {
            movie_id,
            user_id: user.to_string(),
            score,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CandidateSource {
    Explicit,
    SimilarityExpansion,
    PopularityFallback,
}

/// Transient ranked candidate, recomputed per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedCandidate {
    pub movie_id: u64,
    pub score: f64,
    pub source: CandidateSource,
}

/// Materialized candidate set published to the `embeddings` queue by the
/// recommend worker, keyed by the originating request for downstream joins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateSet {
    pub req_id: Uuid,
    pub user_id: String,
    pub candidates: Vec<RankedCandidate>,
    pub generated_at: DateTime<Utc>,
}

/// Joined action/candidate record published to `training_data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingRecord {
    pub req_id: Uuid,
    pub user_id: String,
    pub action: Action,
    pub movie_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    pub candidates: Vec<RankedCandidate>,
}

/// Subset of the metadata collaborator's movie payload that the pipeline
/// forwards to clients. Field names match the collaborator's JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovieSummary {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub popularity: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Genre {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovieDetails {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub popularity: Option<f64>,
    #[serde(default)]
    pub genres: Vec<Genre>,
    #[serde(default)]
    pub runtime: Option<u32>,
}

impl MovieDetails {
    pub fn summary(&self) -> MovieSummary {
        MovieSummary {
            id: self.id,
            title: self.title.clone(),
            overview: self.overview.clone(),
            poster_path: self.poster_path.clone(),
            release_date: self.release_date.clone(),
            vote_average: self.vote_average,
            popularity: self.popularity,
        }
    }
}

/// One page of movies as returned by the metadata collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoviePage {
    pub page: u32,
    pub results: Vec<MovieSummary>,
    pub total_pages: u32,
    #[serde(default)]
    pub total_results: Option<u64>,
}

/// Blended read-path response: the user's explicit affinities followed by
/// one page of similarity expansion, plus the popular fallback with any
/// already-seen movie filtered out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationPage {
    pub personalized: Vec<MovieSummary>,
    pub popular: Vec<MovieSummary>,
    pub page: u32,
    pub total_pages: u32,
    pub has_more_personalized: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResponse {
    pub message: String,
    pub req_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendResponse {
    pub req_id: Uuid,
    pub recommendations: RecommendationPage,
}

impl InteractionEvent {
    pub fn new(user_id: String, action: Action, movie_id: u64, rating: Option<u8>) -> Self {
        Self {
            req_id: Uuid::new_v4(),
            user_id,
            action,
            movie_id,
            rating,
            timestamp: Utc::now(),
        }
    }
}

impl RecommendationRequest {
    pub fn new(user_id: String) -> Self {
        Self {
            req_id: Uuid::new_v4(),
            user_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_entry_member_round_trip() {
        let entry = ScoreEntry {
            movie_id: 603,
            user_id: "neo".to_string(),
            score: 7.0,
        };
        assert_eq!(entry.member(), "603:neo");
        assert_eq!(ScoreEntry::parse("603:neo", 7.0), Some(entry));
    }

    #[test]
    fn score_entry_parse_rejects_malformed_members() {
        assert_eq!(ScoreEntry::parse("garbage", 1.0), None);
        assert_eq!(ScoreEntry::parse("not-a-number:neo", 1.0), None);
    }

    #[test]
    fn event_wire_format_is_camel_case() {
        let event = InteractionEvent::new("alice".to_string(), Action::Rate, 42, Some(4));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["userId"], "alice");
        assert_eq!(json["movieId"], 42);
        assert_eq!(json["action"], "rate");
        assert_eq!(json["rating"], 4);
        assert!(json.get("reqId").is_some());
    }

    #[test]
    fn fresh_events_get_unique_request_ids() {
        let a = InteractionEvent::new("u".to_string(), Action::View, 1, None);
        let b = InteractionEvent::new("u".to_string(), Action::View, 1, None);
        assert_ne!(a.req_id, b.req_id);
    }
}
