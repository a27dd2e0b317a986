pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::*;

use services::assembly::RecommendationAssembler;
use services::metadata::{MovieCatalog, TmdbCatalog};
use services::queue::QueueProducer;
use services::store::{RedisScoreStore, ScoreStore};
use std::sync::Arc;

/// Explicitly constructed client graph, owned by the process that starts it.
/// Both binaries build one of these at startup and hand it to their loops;
/// nothing connects lazily behind a module-level global.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub queue_producer: Arc<QueueProducer>,
    pub score_store: Arc<dyn ScoreStore>,
    pub catalog: Arc<dyn MovieCatalog>,
    pub assembler: Arc<RecommendationAssembler>,
}

impl AppState {
    pub fn new(config: Config) -> AppResult<Self> {
        let config = Arc::new(config);

        let queue_producer = Arc::new(QueueProducer::new(&config)?);

        let redis_client = Arc::new(redis::Client::open(config.redis.url.as_str())?);
        let score_store: Arc<dyn ScoreStore> =
            Arc::new(RedisScoreStore::new(redis_client, config.clone()));

        let catalog: Arc<dyn MovieCatalog> = Arc::new(TmdbCatalog::new(&config)?);

        let assembler = Arc::new(RecommendationAssembler::new(
            score_store.clone(),
            catalog.clone(),
            config.clone(),
        ));

        Ok(Self {
            config,
            queue_producer,
            score_store,
            catalog,
            assembler,
        })
    }
}

pub async fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}
