use crate::config::Config;
use crate::error::AppResult;
use crate::models::*;
use crate::services::metadata::MovieCatalog;
use crate::services::store::ScoreStore;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::{timeout_at, Instant};
use tracing::{info, warn};

/// Filters the full score scan down to one user's entries, ranked by
/// descending score. The sort is stable so equal scores keep their store
/// order, which keeps pagination deterministic across requests.
pub fn rank_for_user(entries: &[ScoreEntry], user_id: &str) -> Vec<ScoreEntry> {
    let mut mine: Vec<ScoreEntry> = entries
        .iter()
        .filter(|entry| entry.user_id == user_id)
        .cloned()
        .collect();

    mine.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    mine
}

/// Fixed-size pagination over the expansion list. `has_more` is true iff
/// candidates remain beyond the end of the requested page.
pub fn paginate<T: Clone>(items: &[T], page: u32, page_size: usize) -> (Vec<T>, bool) {
    let page = page.max(1) as usize;
    let start = (page - 1) * page_size;
    let end = page * page_size;

    let slice = if start >= items.len() {
        Vec::new()
    } else {
        items[start..items.len().min(end)].to_vec()
    };

    (slice, items.len() > end)
}

/// The read path: blends a user's explicit affinities with similarity
/// expansion and the generic popular page, deduplicated and paginated.
pub struct RecommendationAssembler {
    store: Arc<dyn ScoreStore>,
    catalog: Arc<dyn MovieCatalog>,
    config: Arc<Config>,
}

impl RecommendationAssembler {
    pub fn new(
        store: Arc<dyn ScoreStore>,
        catalog: Arc<dyn MovieCatalog>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            store,
            catalog,
            config,
        }
    }

    /// Assembles one page of recommendations from current score state.
    ///
    /// A score-store failure is fatal for the request; a single title that
    /// fails to resolve is skipped. Metadata fan-out runs concurrently
    /// under one deadline, and when the deadline elapses whatever resolved
    /// in time is returned rather than failing the request.
    pub async fn assemble(&self, user_id: &str, page: u32) -> AppResult<RecommendationPage> {
        let page = page.max(1);
        let page_size = self.config.recommendation.page_size;

        let entries = self.store.all_scores().await?;
        let ranked = rank_for_user(&entries, user_id);

        if ranked.is_empty() {
            // Cold start: nothing personalized to build on.
            let popular = self.catalog.popular(page).await?;
            return Ok(RecommendationPage {
                personalized: Vec::new(),
                popular: popular.results,
                page: popular.page,
                total_pages: popular.total_pages,
                has_more_personalized: false,
            });
        }

        let deadline = Instant::now() + self.config.recommendation.assembly_deadline();

        // Resolve the user's top-scored titles concurrently; misses and
        // late responses are skipped, not fatal.
        let detail_futures = ranked.iter().map(|entry| {
            let catalog = Arc::clone(&self.catalog);
            let movie_id = entry.movie_id;
            async move {
                match timeout_at(deadline, catalog.movie_details(movie_id)).await {
                    Ok(Ok(Some(details))) => Some(details.summary()),
                    Ok(Ok(None)) => {
                        warn!("Movie {} unknown to metadata collaborator, skipping", movie_id);
                        None
                    }
                    Ok(Err(e)) => {
                        warn!("Failed to resolve movie {}, skipping: {}", movie_id, e);
                        None
                    }
                    Err(_) => {
                        warn!("Deadline elapsed resolving movie {}", movie_id);
                        None
                    }
                }
            }
        });

        let mut seen: HashSet<u64> = HashSet::new();
        let mut explicit: Vec<MovieSummary> = Vec::new();
        for summary in join_all(detail_futures).await.into_iter().flatten() {
            if seen.insert(summary.id) {
                explicit.push(summary);
            }
        }

        // Similarity expansion per resolved title, same deadline. Merge in
        // rank order; the first occurrence of a movie wins and later
        // duplicates are dropped.
        let expansion_futures = explicit.iter().map(|movie| {
            let catalog = Arc::clone(&self.catalog);
            let movie_id = movie.id;
            async move {
                match timeout_at(deadline, catalog.similar(movie_id)).await {
                    Ok(Ok(similar)) => similar.results,
                    Ok(Err(e)) => {
                        warn!("Similarity expansion failed for movie {}: {}", movie_id, e);
                        Vec::new()
                    }
                    Err(_) => {
                        warn!("Deadline elapsed expanding movie {}", movie_id);
                        Vec::new()
                    }
                }
            }
        });

        let mut expansion: Vec<MovieSummary> = Vec::new();
        for batch in join_all(expansion_futures).await {
            for movie in batch {
                if seen.insert(movie.id) {
                    expansion.push(movie);
                }
            }
        }

        let (paginated, has_more_personalized) = paginate(&expansion, page, page_size);

        // The popular page is independent; anything already surfaced in the
        // personalized blend is filtered out so the two lists never overlap.
        let popular_page = match timeout_at(deadline, self.catalog.popular(page)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!("Deadline elapsed fetching popular page, returning partial result");
                MoviePage {
                    page,
                    results: Vec::new(),
                    total_pages: 0,
                    total_results: None,
                }
            }
        };

        let popular: Vec<MovieSummary> = popular_page
            .results
            .into_iter()
            .filter(|movie| !seen.contains(&movie.id))
            .collect();

        let mut personalized = explicit;
        personalized.extend(paginated);

        info!(
            "Assembled {} personalized and {} popular titles for user {} (page {})",
            personalized.len(),
            popular.len(),
            user_id,
            page
        );

        Ok(RecommendationPage {
            personalized,
            popular,
            page: popular_page.page,
            total_pages: popular_page.total_pages,
            has_more_personalized,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(movie_id: u64, user_id: &str, score: f64) -> ScoreEntry {
        ScoreEntry {
            movie_id,
            user_id: user_id.to_string(),
            score,
        }
    }

    #[test]
    fn rank_filters_to_the_requesting_user() {
        let entries = vec![
            entry(1, "alice", 3.0),
            entry(2, "bob", 9.0),
            entry(3, "alice", 7.0),
        ];

        let ranked = rank_for_user(&entries, "alice");
        let ids: Vec<u64> = ranked.iter().map(|e| e.movie_id).collect();
        assert_eq!(ids, vec![3, 1]);
    }

    #[test]
    fn rank_breaks_ties_by_store_order() {
        let entries = vec![
            entry(5, "alice", 2.0),
            entry(9, "alice", 4.0),
            entry(7, "alice", 2.0),
        ];

        let ranked = rank_for_user(&entries, "alice");
        let ids: Vec<u64> = ranked.iter().map(|e| e.movie_id).collect();
        // 5 and 7 tie on score; 5 appeared first in the scan.
        assert_eq!(ids, vec![9, 5, 7]);
    }

    #[test]
    fn paginate_slices_fixed_pages() {
        let items: Vec<u64> = (0..45).collect();

        let (first, more) = paginate(&items, 1, 20);
        assert_eq!(first.len(), 20);
        assert_eq!(first[0], 0);
        assert!(more);

        let (third, more) = paginate(&items, 3, 20);
        assert_eq!(third.len(), 5);
        assert!(!more);

        let (beyond, more) = paginate(&items, 4, 20);
        assert!(beyond.is_empty());
        assert!(!more);
    }

    #[test]
    fn has_more_tracks_the_page_boundary_exactly() {
        let items: Vec<u64> = (0..40).collect();
        let (_, more) = paginate(&items, 2, 20);
        // 40 candidates and page 2 ends at index 40: nothing further.
        assert!(!more);

        let items: Vec<u64> = (0..41).collect();
        let (_, more) = paginate(&items, 2, 20);
        assert!(more);
    }

    #[test]
    fn page_zero_is_treated_as_page_one() {
        let items: Vec<u64> = (0..5).collect();
        let (zeroth, _) = paginate(&items, 0, 20);
        assert_eq!(zeroth.len(), 5);
    }
}
