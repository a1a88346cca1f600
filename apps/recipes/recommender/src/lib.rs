//! Recipe Recommender Service
//!
//! Consumes ingredient lists from a Redis stream, finds recipes that use
//! them, and publishes generated recommendations.
//!
//! ## Architecture
//!
//! ```text
//! Redis Stream (recommendation.queue)
//!   ↓ (Consumer Group: recommendation_workers, one job in flight)
//! StreamWorker<RecommendationJob, RecommendationProcessor>
//!   ↓ search: EmbeddingGateway (fastembed) + IndexGateway (Qdrant)
//!   ↓ generate: OpenAI chat completions
//! Redis Stream (response.queue)
//! ```
//!
//! ## Commands
//!
//! - `worker` (default): message pipeline plus the health/admin HTTP server
//! - `index --file <path>`: load source recipes into the index
//! - `search --query <q>`: one-shot search, printed as JSON

pub mod cli;
pub mod config;
pub mod routes;

use axum::Router;
use clap::Parser;
use core_config::tracing::{init_tracing, install_color_eyre};
use core_config::FromEnv;
use domain_recipes::{
    GeneratorConfig, OpenAiRecipeGenerator, RecipeIndexer, RecipeMetadata, RecommendationJob,
    RecommendationProcessor, RecommendationStream, SearchFilterEngine,
};
use domain_vector::{
    Embedder, EmbeddingConfig, EmbeddingGateway, FastEmbedLoader, IndexGateway, QdrantConfig,
    QdrantConnector, QdrantRepository, VectorIndex,
};
use eyre::{Result, WrapErr};
use resource_lifecycle::{ManagedResource, TracingObserver};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use stream_worker::{
    HealthState, ProcessorProbe, RedisBroker, StreamDef, StreamProducer, StreamWorker,
    admin_router, connect_with_retry, init_metrics,
};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::cli::{Cli, Command};
use crate::config::{Config, consumer_id};
use crate::routes::{RecipesState, recipes_router};

const REDIS_CONNECT_RETRIES: u32 = 5;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

pub async fn run() -> Result<()> {
    install_color_eyre();

    let cli = Cli::parse();
    let config = Config::from_env().wrap_err("Failed to load configuration")?;
    init_tracing(&config.environment);

    match cli.command.unwrap_or_default() {
        Command::Worker => run_worker(config).await,
        Command::Index { file, batch_size } => run_index(config, &file, batch_size).await,
        Command::Search { query } => run_search(config, &query).await,
    }
}

fn embedder(config: &EmbeddingConfig) -> Arc<dyn Embedder> {
    let model = ManagedResource::with_observer(
        FastEmbedLoader::new(config.clone()),
        Arc::new(TracingObserver),
    );
    Arc::new(EmbeddingGateway::new(model, config.dimension))
}

fn index(config: &QdrantConfig) -> Arc<dyn VectorIndex<RecipeMetadata>> {
    let connection = ManagedResource::with_observer(
        QdrantConnector::new(config.clone()),
        Arc::new(TracingObserver),
    );
    Arc::new(IndexGateway::<QdrantRepository, RecipeMetadata>::new(
        connection,
        config.dimension,
    ))
}

fn search_engine(config: &Config) -> Arc<SearchFilterEngine> {
    Arc::new(SearchFilterEngine::new(
        embedder(&config.embedding),
        index(&config.qdrant),
        config.search.clone(),
    ))
}

/// Run the message pipeline and the HTTP server until SIGINT/SIGTERM
async fn run_worker(config: Config) -> Result<()> {
    init_metrics();

    let app_name = env!("CARGO_PKG_NAME");
    let app_version = env!("CARGO_PKG_VERSION");
    info!(name = %app_name, version = %app_version, "Starting recommender worker");

    let generator_config =
        GeneratorConfig::from_env().wrap_err("Failed to load generator configuration")?;
    let generator =
        OpenAiRecipeGenerator::new(generator_config).wrap_err("Failed to build generator")?;

    let queue = &config.queue;

    info!("Connecting to Redis...");
    let redis = connect_with_retry(&queue.url, REDIS_CONNECT_RETRIES)
        .await
        .wrap_err("Failed to connect to Redis")?;

    let mut worker_config = queue.worker_config(RecommendationStream::CONSUMER_GROUP);
    if let Some(id) = consumer_id() {
        worker_config = worker_config.with_consumer_id(id);
    }
    info!(
        stream = %worker_config.stream_name,
        consumer_group = %worker_config.consumer_group,
        consumer_id = %worker_config.consumer_id,
        dlq = %worker_config.dlq_stream,
        max_deliveries = worker_config.max_deliveries,
        "Worker configuration loaded"
    );

    let broker = Arc::new(RedisBroker::new(redis.clone(), worker_config));
    let publisher = Arc::new(
        StreamProducer::new(redis, &queue.response_queue).with_max_length(queue.max_length),
    );

    let engine = search_engine(&config);
    let processor = Arc::new(RecommendationProcessor::new(
        engine.clone(),
        Arc::new(generator),
        publisher,
    ));
    let worker = StreamWorker::<RecommendationJob, _>::new(
        broker.clone(),
        processor.clone(),
        &queue.job_queue,
    );

    let health = HealthState::new(broker, app_name, app_version)
        .with_slot_state(worker.slot_state())
        .with_probe(Arc::new(ProcessorProbe::<RecommendationJob, _>::new(
            processor.clone(),
        )));

    let app = admin_router(health)
        .merge(recipes_router(RecipesState { engine, processor }))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        let _ = shutdown_tx.send(true);
    });

    let listener = TcpListener::bind(config.server.address())
        .await
        .wrap_err_with(|| format!("Failed to bind HTTP server to {}", config.server.address()))?;
    info!(address = %config.server.address(), "HTTP server listening");

    let server = tokio::spawn(serve(listener, app, shutdown_rx.clone()));

    worker
        .run(shutdown_rx)
        .await
        .wrap_err("Stream worker failed")?;

    match server.await {
        Ok(result) => result?,
        Err(e) => error!(error = %e, "HTTP server task panicked"),
    }

    info!("Recommender worker stopped");
    Ok(())
}

async fn serve(listener: TcpListener, app: Router, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
        .wrap_err("HTTP server failed")
}

async fn run_index(config: Config, file: &Path, batch_size: usize) -> Result<()> {
    let embedder = embedder(&config.embedding);
    let index = index(&config.qdrant);
    let indexer = RecipeIndexer::new(embedder.clone(), index.clone()).with_batch_size(batch_size);

    info!(file = %file.display(), batch_size, "Indexing recipes");
    let report = indexer
        .index_file(file)
        .await
        .wrap_err_with(|| format!("Failed to index {}", file.display()))?;

    embedder.unload().await;
    index.unload().await;

    info!(
        inserted = report.inserted,
        updated = report.updated,
        "Index populated"
    );
    println!("{}", serde_json::json!({ "inserted": report.inserted, "updated": report.updated }));
    Ok(())
}

async fn run_search(config: Config, query: &str) -> Result<()> {
    let engine = search_engine(&config);
    let results = engine.search(query).await.wrap_err("Search failed")?;
    engine.release().await;

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

/// Wait for SIGINT or SIGTERM
async fn shutdown_signal() -> Result<()> {
    let ctrl_c = async { signal::ctrl_c().await.wrap_err("Failed to listen for Ctrl+C") };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .wrap_err("Failed to install SIGTERM handler")?
            .recv()
            .await;
        Ok::<(), eyre::Report>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Result<()>>();

    tokio::select! {
        result = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
            result
        }
        result = terminate => {
            info!("Received SIGTERM, shutting down");
            result
        }
    }
}
