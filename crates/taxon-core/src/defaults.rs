//! Centralized default constants for taxon.
//!
//! All crates reference these constants instead of defining their own magic
//! numbers. Organized by domain area.

// =============================================================================
// CLASSIFICATION
// =============================================================================

/// Weight of the file/path pattern signal.
pub const PATTERN_WEIGHT: f32 = 0.25;

/// Weight of the hint/synonym signal.
pub const HINT_WEIGHT: f32 = 0.35;

/// Weight of the LLM content-analysis signal.
pub const LLM_WEIGHT: f32 = 0.40;

/// Fixed raw score for a file/path pattern hit.
pub const PATTERN_RAW_SCORE: f32 = 0.8;

/// Raw score added per distinct hint/synonym matched.
pub const HINT_STEP: f32 = 0.3;

/// Characters of text scanned for hints.
pub const HINT_WINDOW_CHARS: usize = 5_000;

/// Characters of text handed to the LLM for classification.
pub const CLASSIFY_EXCERPT_CHARS: usize = 4_000;

// =============================================================================
// EXTRACTION
// =============================================================================

/// Confidence assigned to values found by the line-pattern fallback.
pub const FALLBACK_CONFIDENCE: f32 = 0.4;

/// Confidence used when the model omits one.
pub const LLM_DEFAULT_CONFIDENCE: f32 = 0.8;

/// Characters of text handed to the LLM for extraction.
pub const EXTRACT_TEXT_CHARS: usize = 12_000;

/// Values treated as "no value" and dropped (compared lowercase, trimmed).
pub const NULL_SENTINELS: &[&str] = &["null", "none", "n/a", "-"];

// =============================================================================
// PIPELINE
// =============================================================================

/// Maximum model turns in one tool-calling round.
pub const TOOL_LOOP_MAX_ITERATIONS: usize = 10;

/// Confidence of the synthesized classification when a URL capture yields
/// no submissions.
pub const URL_FALLBACK_CONFIDENCE: f32 = 0.3;

/// Concept id used for the synthesized URL classification.
pub const URL_FALLBACK_CONCEPT: &str = "Document";

// =============================================================================
// JOB QUEUE
// =============================================================================

/// Processor poll interval in milliseconds.
pub const JOB_POLL_INTERVAL_MS: u64 = 5_000;

/// Queued jobs fetched per poll cycle.
pub const JOB_BATCH_SIZE: i64 = 5;

/// Maximum stored length of a job error message (characters).
pub const JOB_ERROR_MAX_CHARS: usize = 1_000;

/// Default page size for job listings.
pub const JOB_LIST_LIMIT: i64 = 50;

/// Per-subscriber event queue capacity.
pub const EVENT_QUEUE_CAPACITY: usize = 64;

/// Timeout for external extraction commands (pdftotext).
pub const EXTRACTION_CMD_TIMEOUT_SECS: u64 = 60;

// =============================================================================
// INFERENCE
// =============================================================================

/// Default OpenAI-compatible endpoint.
pub const LLM_BASE_URL: &str = "https://api.openai.com/v1";

/// Default chat model.
pub const LLM_MODEL: &str = "gpt-4o-mini";

/// Default request timeout in seconds.
pub const LLM_TIMEOUT_SECS: u64 = 120;

// =============================================================================
// ENVIRONMENT VARIABLES
// =============================================================================

pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_STORAGE_PATH: &str = "TAXON_STORAGE_PATH";
pub const ENV_ONTOLOGY_PATH: &str = "TAXON_ONTOLOGY_PATH";
pub const ENV_PROCESSOR_ENABLED: &str = "TAXON_PROCESSOR_ENABLED";
pub const ENV_POLL_INTERVAL_MS: &str = "TAXON_POLL_INTERVAL_MS";
pub const ENV_BATCH_SIZE: &str = "TAXON_BATCH_SIZE";
pub const ENV_TOOL_MAX_ITERATIONS: &str = "TAXON_TOOL_MAX_ITERATIONS";
pub const ENV_LLM_BASE_URL: &str = "LLM_BASE_URL";
pub const ENV_LLM_API_KEY: &str = "LLM_API_KEY";
pub const ENV_LLM_MODEL: &str = "LLM_MODEL";
pub const ENV_LLM_TIMEOUT_SECS: &str = "LLM_TIMEOUT_SECS";
pub const ENV_LLM_PROVIDER: &str = "LLM_PROVIDER";

/// Default storage directory.
pub const STORAGE_PATH: &str = "./data/files";
