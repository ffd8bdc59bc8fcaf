use chrono::{DateTime, Utc};
use painmap_core::{AppConfig, RunStatus, RunType};
use uuid::Uuid;

/// Name of the fallback theme that collects documents no other theme claimed.
pub const UNCATEGORIZED_THEME_NAME: &str = "Uncategorized posts";
pub const UNCATEGORIZED_THEME_DESCRIPTION: &str =
    "Posts that couldn't be confidently assigned to a specific theme";

/// Confidence recorded for documents placed by the fallback, not the LLM.
pub const FALLBACK_CONFIDENCE: f64 = 0.5;
/// Confidence recorded for discovery mappings and for assignments that
/// report none.
pub const DEFAULT_CONFIDENCE: f64 = 1.0;

/// A document as the pipeline sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductArea {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

/// A theme proposed by the LLM that has not been persisted yet, with its
/// documents already resolved from batch indices to real IDs.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateTheme {
    pub name: String,
    pub description: String,
    pub product_area_id: Option<i64>,
    pub post_ids: Vec<String>,
}

/// A persisted theme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Theme {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub severity: u8,
    pub product_area_id: Option<i64>,
    pub is_active: bool,
    pub clustering_run_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTheme {
    pub name: String,
    pub description: Option<String>,
    pub product_area_id: Option<i64>,
    pub severity: u8,
    pub clustering_run_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewMapping {
    pub post_id: String,
    pub theme_id: i64,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusteringRun {
    pub id: i64,
    pub public_id: Uuid,
    pub run_type: RunType,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub posts_processed: usize,
    pub themes_created: usize,
    pub themes_updated: usize,
    pub error_message: Option<String>,
}

/// Counters written on completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTotals {
    pub posts_processed: usize,
    pub themes_created: usize,
    pub themes_updated: usize,
}

/// Tunables for batching and consolidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Documents per LLM call.
    pub batch_size: usize,
    /// Consolidation target per product area.
    pub max_themes_per_area: usize,
    /// Consolidation rounds per product area before accepting the result.
    pub max_consolidation_rounds: u32,
    /// Emit coverage and set-equality diagnostics.
    pub debug: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            batch_size: 20,
            max_themes_per_area: 5,
            max_consolidation_rounds: 3,
            debug: false,
        }
    }
}

impl PipelineSettings {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            batch_size: config.clustering_batch_size.max(1),
            max_themes_per_area: config.clustering_max_themes_per_area.max(1),
            max_consolidation_rounds: config.clustering_max_consolidation_rounds,
            debug: config.clustering_debug,
        }
    }
}
