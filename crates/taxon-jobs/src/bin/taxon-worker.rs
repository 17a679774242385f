//! taxon background worker.
//!
//! Connects to PostgreSQL, seeds the foundation ontology on first start, and
//! runs the job processor until Ctrl-C.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use taxon_core::defaults::{
    ENV_DATABASE_URL, ENV_ONTOLOGY_PATH, ENV_STORAGE_PATH, EVENT_QUEUE_CAPACITY, STORAGE_PATH,
};
use taxon_core::{EventBus, JobRepository, OntologyRepository, ResourceRepository};
use taxon_db::{spawn_pool_monitor, Database, FilesystemStorage, PoolConfig};
use taxon_inference::{build_llm_client, LlmConfig};
use taxon_jobs::{
    CompositeTextExtractor, JobDispatcher, JobProcessor, PipelineConfig, ProcessingPipeline,
    ProcessorConfig,
};
use taxon_ontology::{load_ontology_file, parse_ontology_yaml, OntologyService, FOUNDATION_YAML};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, daily rotation)
    //   LOG_ANSI    - "true"/"false" override ANSI colors
    //   RUST_LOG    - env filter (default: "taxon=info")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "taxon=info,taxon_jobs=info".into());
    let registry = tracing_subscriber::registry().with(env_filter);

    let _file_guard = if let Some(ref path) = log_file {
        let path = Path::new(path);
        let dir = path.parent().unwrap_or(Path::new("."));
        let name = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("taxon-worker.log");
        let (writer, guard) =
            tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, name));
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
                .init();
        } else {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(log_ansi.unwrap_or(false)),
                )
                .init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    let database_url = std::env::var(ENV_DATABASE_URL)
        .unwrap_or_else(|_| "postgres://localhost/taxon".to_string());
    let storage_path =
        std::env::var(ENV_STORAGE_PATH).unwrap_or_else(|_| STORAGE_PATH.to_string());

    let db = Database::connect_with_config(&database_url, PoolConfig::from_env())
        .await
        .context("connecting to database")?;
    db.migrate().await.context("running migrations")?;
    let pool_monitor = spawn_pool_monitor(db.pool.clone(), Duration::from_secs(60));

    let Database {
        ontology: ontology_repo,
        resources,
        jobs,
        ..
    } = db;
    let ontology_repo: Arc<dyn OntologyRepository> = Arc::new(ontology_repo);
    let resources: Arc<dyn ResourceRepository> = Arc::new(resources);
    let jobs: Arc<dyn JobRepository> = Arc::new(jobs);

    let ontology = OntologyService::new(ontology_repo);
    if ontology.snapshot().await?.is_empty() {
        let seeded = ontology.seed(&parse_ontology_yaml(FOUNDATION_YAML)?).await?;
        info!(concepts = seeded, "Seeded foundation ontology");
    }
    if let Ok(path) = std::env::var(ENV_ONTOLOGY_PATH) {
        let doc = load_ontology_file(&path)
            .with_context(|| format!("loading ontology from {}", path))?;
        let seeded = ontology.seed(&doc).await?;
        info!(path = %path, concepts = seeded, "Loaded ontology file");
    }

    let storage = Arc::new(FilesystemStorage::new(&storage_path));
    let mut pipeline = ProcessingPipeline::new(
        PipelineConfig::from_env(),
        ontology,
        resources,
        storage,
        Arc::new(CompositeTextExtractor::standard()),
    );
    if let Some(llm) = build_llm_client(LlmConfig::from_env()) {
        info!(provider = llm.provider_name(), "LLM provider enabled");
        pipeline = pipeline.with_llm(llm);
    }

    let dispatcher = Arc::new(JobDispatcher::new(Arc::new(pipeline)));
    let events = Arc::new(EventBus::new(EVENT_QUEUE_CAPACITY));
    let handle = JobProcessor::new(ProcessorConfig::from_env(), jobs, dispatcher, events).start();

    info!(storage_path = %storage_path, "taxon worker running, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;

    info!("Shutting down");
    handle.shutdown().await?;
    pool_monitor.abort();
    Ok(())
}
