//! Structured logging field names.
//!
//! All crates use these constants for structured `tracing` fields so log
//! aggregation can query by the same names across subsystems.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Job or resource failed, requires operator attention |
//! | WARN  | Recoverable issue, fallback applied (LLM failure, extraction degradation) |
//! | INFO  | Lifecycle events (startup, shutdown), job completions |
//! | DEBUG | Decision points, signal scores, config choices |
//! | TRACE | Per-item iteration (tool calls, individual fields) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "ontology", "classify", "inference", "db", "jobs"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "classifier", "extractor", "pipeline", "processor", "openai"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "classify", "extract", "process", "fetch_queued"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

pub const JOB_ID: &str = "job_id";
pub const RESOURCE_ID: &str = "resource_id";
pub const RESOURCE_TYPE: &str = "resource_type";
pub const CONCEPT_ID: &str = "concept_id";
pub const DATA_SOURCE_ID: &str = "data_source_id";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Classification confidence.
pub const CONFIDENCE: &str = "confidence";

/// Number of documents submitted in a tool-calling round.
pub const SUBMISSION_COUNT: &str = "submission_count";

/// Number of model turns in a tool-calling round.
pub const ITERATIONS: &str = "iterations";

// ─── Inference fields ──────────────────────────────────────────────────────

pub const MODEL: &str = "model";
pub const PROVIDER: &str = "provider";
pub const TOOL_NAME: &str = "tool";

// ─── Outcome fields ────────────────────────────────────────────────────────

pub const SUCCESS: &str = "success";
pub const ERROR_MSG: &str = "error";
