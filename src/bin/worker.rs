use anyhow::Result;
use cinerec::services::queue::QueueConsumer;
use cinerec::services::scoring::{RecommendWorker, ScoringWorker};
use cinerec::{init_tracing, AppState, Config};
use clap::Parser;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Joined candidate sets kept in memory while waiting for actions to pair
/// with; cleared wholesale once it grows past this.
const MAX_PENDING_CANDIDATE_SETS: usize = 1024;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,

    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Worker role: scoring, recommend, or joiner
    #[arg(short, long, default_value = "scoring")]
    role: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    std::env::set_var("RUST_LOG", &args.log_level);
    init_tracing().await;

    info!("Starting cinerec worker: {}", args.role);

    let config = if std::path::Path::new(&args.config).exists() {
        Config::from_file(&args.config)?
    } else {
        info!("Config file not found, using default configuration");
        Config::default()
    };

    let state = AppState::new(config)?;

    match args.role.as_str() {
        "scoring" => {
            start_scoring_worker(state).await?;
        }
        "recommend" => {
            start_recommend_worker(state).await?;
        }
        "joiner" => {
            start_joiner_worker(state).await?;
        }
        _ => {
            error!("Unknown worker role: {}", args.role);
            return Err(anyhow::anyhow!("Invalid worker role"));
        }
    }

    Ok(())
}

/// Folds queued interaction events into the score store. Instances compete
/// on the consumer group; each message is delivered to exactly one of them
/// and acknowledged only after its fold resolves.
async fn start_scoring_worker(state: AppState) -> Result<()> {
    info!("Starting scoring worker");

    let consumer = QueueConsumer::new(&state.config)?;
    let worker = Arc::new(ScoringWorker::new(
        state.score_store.clone(),
        state.config.clone(),
    ));

    let topic = state.config.kafka.action_topic.clone();
    consumer
        .run(&topic, move |event: cinerec::InteractionEvent| {
            let worker = worker.clone();
            async move { worker.process_event(event).await }
        })
        .await?;

    Ok(())
}

/// Materializes candidate sets for queued recommendation requests.
async fn start_recommend_worker(state: AppState) -> Result<()> {
    info!("Starting recommend worker");

    let consumer = QueueConsumer::new(&state.config)?;
    let worker = Arc::new(RecommendWorker::new(
        state.score_store.clone(),
        state.queue_producer.clone(),
        state.config.clone(),
    ));

    let topic = state.config.kafka.recommend_topic.clone();
    consumer
        .run(&topic, move |request: cinerec::RecommendationRequest| {
            let worker = worker.clone();
            async move { worker.process_request(request).await }
        })
        .await?;

    Ok(())
}

/// Pairs interaction events with the acting user's most recent candidate
/// set and publishes the joined records to the training-data queue.
async fn start_joiner_worker(state: AppState) -> Result<()> {
    info!("Starting joiner worker");

    let capacity = state.config.worker.channel_capacity;
    let (action_tx, mut action_rx) = mpsc::channel::<cinerec::InteractionEvent>(capacity);
    let (set_tx, mut set_rx) = mpsc::channel::<cinerec::CandidateSet>(capacity);

    let action_consumer = QueueConsumer::new(&state.config)?;
    let action_topic = state.config.kafka.action_topic.clone();
    tokio::spawn(async move {
        if let Err(e) = action_consumer.forward(&action_topic, action_tx).await {
            error!("Action consumer error: {}", e);
        }
    });

    let set_consumer = QueueConsumer::new(&state.config)?;
    let embedding_topic = state.config.kafka.embedding_topic.clone();
    tokio::spawn(async move {
        if let Err(e) = set_consumer.forward(&embedding_topic, set_tx).await {
            error!("Candidate set consumer error: {}", e);
        }
    });

    let flush_interval = Duration::from_secs(state.config.worker.joiner_flush_interval_secs);
    let buffer_size = state.config.worker.joiner_buffer_size;

    let mut action_buffer: Vec<cinerec::InteractionEvent> = Vec::new();
    let mut pending_sets: HashMap<String, cinerec::CandidateSet> = HashMap::new();

    loop {
        tokio::select! {
            action = action_rx.recv() => {
                if let Some(action) = action {
                    action_buffer.push(action);
                    if action_buffer.len() >= buffer_size {
                        flush_joined(&state, &mut action_buffer, &pending_sets).await;
                    }
                }
            }
            set = set_rx.recv() => {
                if let Some(set) = set {
                    pending_sets.insert(set.user_id.clone(), set);
                    if pending_sets.len() >= MAX_PENDING_CANDIDATE_SETS {
                        pending_sets.clear();
                    }
                }
            }
            _ = tokio::time::sleep(flush_interval) => {
                if !action_buffer.is_empty() {
                    flush_joined(&state, &mut action_buffer, &pending_sets).await;
                }
            }
        }
    }
}

async fn flush_joined(
    state: &AppState,
    actions: &mut Vec<cinerec::InteractionEvent>,
    pending_sets: &HashMap<String, cinerec::CandidateSet>,
) {
    let mut published = 0;

    for event in actions.drain(..) {
        let Some(set) = pending_sets.get(&event.user_id) else {
            debug!(
                "No candidate set pending for user {}, skipping event {}",
                event.user_id, event.req_id
            );
            continue;
        };

        let record = cinerec::TrainingRecord {
            req_id: event.req_id,
            user_id: event.user_id.clone(),
            action: event.action,
            movie_id: event.movie_id,
            rating: event.rating,
            candidates: set.candidates.clone(),
        };

        match state.queue_producer.publish_training_record(&record).await {
            Ok(()) => published += 1,
            Err(e) => error!("Failed to publish training record {}: {}", record.req_id, e),
        }
    }

    info!("Joined and published {} training records", published);
}
