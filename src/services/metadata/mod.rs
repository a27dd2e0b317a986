use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{MovieDetails, MoviePage};
use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};

/// The external movie-metadata collaborator.
///
/// Every call is a network round trip that may be slow, rate-limited, or
/// down; callers decide whether a failure is fatal (the popular page on the
/// read path) or skippable (a single title lookup).
#[async_trait]
pub trait MovieCatalog: Send + Sync {
    /// Full details for one movie; `None` when the collaborator does not
    /// know the id.
    async fn movie_details(&self, movie_id: u64) -> AppResult<Option<MovieDetails>>;

    /// One page of generally popular movies.
    async fn popular(&self, page: u32) -> AppResult<MoviePage>;

    /// Movies similar to the given one, for similarity expansion.
    async fn similar(&self, movie_id: u64) -> AppResult<MoviePage>;

    /// Text search over the catalog.
    async fn search(&self, query: &str, page: u32) -> AppResult<MoviePage>;
}

pub struct TmdbCatalog {
    http_client: HttpClient,
    base_url: String,
    api_key: String,
}

impl TmdbCatalog {
    pub fn new(config: &Config) -> AppResult<Self> {
        let http_client = HttpClient::builder()
            .timeout(config.tmdb.request_timeout())
            .build()?;

        Ok(Self {
            http_client,
            base_url: config.tmdb.base_url.clone(),
            api_key: config.tmdb.api_key.clone(),
        })
    }

    async fn get_page(&self, path: &str, query: &[(&str, String)]) -> AppResult<MoviePage> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.api_key)
            .query(query)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::DependencyUnavailable(format!(
                "metadata collaborator returned status {} for {}",
                status, path
            )));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl MovieCatalog for TmdbCatalog {
    async fn movie_details(&self, movie_id: u64) -> AppResult<Option<MovieDetails>> {
        let url = format!("{}/movie/{}", self.base_url, movie_id);
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::DependencyUnavailable(format!(
                "metadata collaborator returned status {} for movie {}",
                status, movie_id
            )));
        }

        Ok(Some(response.json().await?))
    }

    async fn popular(&self, page: u32) -> AppResult<MoviePage> {
        self.get_page(
            "/movie/popular",
            &[
                ("page", page.to_string()),
                ("include_adult", "false".to_string()),
            ],
        )
        .await
    }

    async fn similar(&self, movie_id: u64) -> AppResult<MoviePage> {
        self.get_page(
            &format!("/movie/{}/similar", movie_id),
            &[("include_adult", "false".to_string())],
        )
        .await
    }

    async fn search(&self, query: &str, page: u32) -> AppResult<MoviePage> {
        if query.trim().is_empty() {
            return Err(AppError::InvalidRequest(
                "search query cannot be empty".to_string(),
            ));
        }

        self.get_page(
            "/search/movie",
            &[
                ("query", query.to_string()),
                ("page", page.to_string()),
                ("include_adult", "false".to_string()),
            ],
        )
        .await
    }
}
