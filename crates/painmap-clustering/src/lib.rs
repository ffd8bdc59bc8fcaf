//! LLM-driven pain-theme clustering.
//!
//! A full run partitions every post into batches, asks the LLM to discover
//! themes per batch, consolidates them per product area and persists the
//! result, sending anything left over to an "Uncategorized posts" theme. An
//! incremental run places only unmapped posts into the active theme set,
//! proposing new themes where nothing fits. Severity is derived from the
//! latest sentiment of each mapped post.
//!
//! Posts are always shown to the LLM by batch index and resolved back to IDs
//! through [`resolver::IndexRefs`]; the LLM never echoes raw IDs.

pub mod assign;
pub mod consolidate;
pub mod discovery;
pub mod error;
pub mod persist;
pub mod prompts;
pub mod resolver;
pub mod service;
pub mod severity;
pub mod store;
pub mod types;

mod reply;

pub use error::{ClusteringError, StoreError};
pub use resolver::IndexRefs;
pub use service::{ClusteringService, CANCELLED_MESSAGE};
pub use severity::{compute_theme_severity, severity_from_sentiments, DEFAULT_SEVERITY};
pub use store::{ClusteringStore, MemoryStore, PgStore};
pub use types::{
    CandidateTheme, ClusteringRun, Document, NewMapping, NewTheme, PipelineSettings,
    ProductArea, RunTotals, Theme, FALLBACK_CONFIDENCE, UNCATEGORIZED_THEME_NAME,
};
