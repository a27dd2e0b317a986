use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub kafka: KafkaConfig,
    pub redis: RedisConfig,
    pub tmdb: TmdbConfig,
    pub recommendation: RecommendationConfig,
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        format!("{}:{}", self.host, self.port).parse().unwrap()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaConfig {
    pub brokers: String,
    pub action_topic: String,
    pub recommend_topic: String,
    pub embedding_topic: String,
    pub training_topic: String,
    pub group_id: String,
    pub auto_offset_reset: String,
    pub send_timeout_ms: u64,
}

impl KafkaConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    pub score_set_key: String,
    pub dedup_ttl_seconds: u64,
    pub candidate_ttl_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmdbConfig {
    pub base_url: String,
    pub api_key: String,
    pub request_timeout_ms: u64,
}

impl TmdbConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationConfig {
    pub page_size: usize,
    pub assembly_deadline_ms: u64,
}

impl RecommendationConfig {
    pub fn assembly_deadline(&self) -> Duration {
        Duration::from_millis(self.assembly_deadline_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub max_delivery_attempts: usize,
    pub retry_initial_delay_ms: u64,
    pub channel_capacity: usize,
    pub joiner_flush_interval_secs: u64,
    pub joiner_buffer_size: usize,
}

impl WorkerConfig {
    pub fn retry_initial_delay(&self) -> Duration {
        Duration::from_millis(self.retry_initial_delay_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
            },
            kafka: KafkaConfig {
                brokers: "localhost:9092".to_string(),
                action_topic: "user_actions".to_string(),
                recommend_topic: "recommendation_requests".to_string(),
                embedding_topic: "embeddings".to_string(),
                training_topic: "training_data".to_string(),
                group_id: "cinerec_workers".to_string(),
                auto_offset_reset: "earliest".to_string(),
                send_timeout_ms: 5000,
            },
            redis: RedisConfig {
                url: "redis://localhost:6379".to_string(),
                score_set_key: "movie:recommendations".to_string(),
                dedup_ttl_seconds: 3600,
                candidate_ttl_seconds: 600,
            },
            tmdb: TmdbConfig {
                base_url: "https://api.themoviedb.org/3".to_string(),
                api_key: String::new(),
                request_timeout_ms: 3000,
            },
            recommendation: RecommendationConfig {
                page_size: 20,
                assembly_deadline_ms: 5000,
            },
            worker: WorkerConfig {
                max_delivery_attempts: 5,
                retry_initial_delay_ms: 100,
                channel_capacity: 1000,
                joiner_flush_interval_secs: 30,
                joiner_buffer_size: 100,
            },
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("CINEREC"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
