//! # taxon-db
//!
//! Persistence layer for taxon.
//!
//! This crate provides:
//! - Connection pool management
//! - PostgreSQL repositories for concepts, resources, and processing jobs
//! - Filesystem storage for uploaded and captured files
//! - In-memory repositories with the same semantics, for tests and local runs
//!
//! ## Example
//!
//! ```rust,ignore
//! use taxon_db::{Database, JobRepository, ProcessingJob, ResourceType};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/taxon").await?;
//!     db.migrate().await?;
//!
//!     let job = ProcessingJob::new(data_source_id, "https://example.com", ResourceType::Url);
//!     db.jobs.insert(&job).await?;
//!     Ok(())
//! }
//! ```
pub mod file_storage;
pub mod jobs;
pub mod memory;
pub mod ontology;
pub mod pool;
pub mod resources;

// Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

// Re-export core types
pub use taxon_core::*;

pub use file_storage::{compute_content_hash, sanitize_filename, FilesystemStorage};
pub use jobs::PgJobRepository;
pub use memory::{MemoryJobRepository, MemoryOntologyRepository, MemoryResourceRepository};
pub use ontology::PgOntologyRepository;
pub use pool::{connect_pool, spawn_pool_monitor, PoolConfig, PoolHealth};
pub use resources::PgResourceRepository;

/// Repositories sharing one connection pool.
pub struct Database {
    pub pool: sqlx::Pool<sqlx::Postgres>,
    pub ontology: PgOntologyRepository,
    pub resources: PgResourceRepository,
    pub jobs: PgJobRepository,
}

impl Database {
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            ontology: PgOntologyRepository::new(pool.clone()),
            resources: PgResourceRepository::new(pool.clone()),
            jobs: PgJobRepository::new(pool.clone()),
            pool,
        }
    }

    pub async fn connect(url: &str) -> Result<Self> {
        let pool = connect_pool(url, &PoolConfig::default()).await?;
        Ok(Self::new(pool))
    }

    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = connect_pool(url, &config).await?;
        Ok(Self::new(pool))
    }

    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self::new(self.pool.clone())
    }
}
