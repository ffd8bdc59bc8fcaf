use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use painmap_core::{RunStatus, RunType, Sentiment};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::ClusteringStore;
use crate::error::StoreError;
use crate::types::{
    ClusteringRun, Document, NewMapping, NewTheme, ProductArea, RunTotals, Theme,
};

/// In-process [`ClusteringStore`].
///
/// Mirrors the Postgres semantics the pipeline relies on: guarded run
/// transitions, the single running slot, cascading document deletes and
/// mapping inserts that skip unknown documents.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    post_seq: u64,
    posts: Vec<(u64, Document)>,
    areas: Vec<ProductArea>,
    analyses: Vec<(String, Sentiment)>,
    runs: Vec<ClusteringRun>,
    themes: Vec<Theme>,
    mappings: Vec<NewMapping>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn run_mut(&mut self, id: i64) -> Result<&mut ClusteringRun, StoreError> {
        self.runs
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StoreError::NotFound)
    }

    fn running_run_mut(&mut self, id: i64) -> Result<&mut ClusteringRun, StoreError> {
        let run = self.run_mut(id)?;
        if run.status != RunStatus::Running {
            return Err(StoreError::InvalidTransition {
                id,
                expected_status: "running",
            });
        }
        Ok(run)
    }

    fn has_post(&self, id: &str) -> bool {
        self.posts.iter().any(|(_, p)| p.id == id)
    }

    fn newest_first(&self) -> Vec<Document> {
        let mut posts: Vec<&(u64, Document)> = self.posts.iter().collect();
        posts.sort_by(|a, b| b.0.cmp(&a.0));
        posts.into_iter().map(|(_, d)| d.clone()).collect()
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a document. Each call is newer than the previous one.
    pub async fn add_post(&self, id: &str, title: &str, body: Option<&str>) {
        let mut state = self.state.lock().await;
        state.post_seq += 1;
        let seq = state.post_seq;
        state.posts.push((
            seq,
            Document {
                id: id.to_string(),
                title: title.to_string(),
                body: body.map(str::to_string),
            },
        ));
    }

    /// Deletes a document and its mappings.
    pub async fn remove_post(&self, id: &str) {
        let mut state = self.state.lock().await;
        state.posts.retain(|(_, p)| p.id != id);
        state.mappings.retain(|m| m.post_id != id);
    }

    /// Adds an active product area and returns its id.
    pub async fn add_product_area(&self, name: &str, description: Option<&str>) -> i64 {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        state.areas.push(ProductArea {
            id,
            name: name.to_string(),
            description: description.map(str::to_string),
        });
        id
    }

    /// Records an analysis; later calls for the same document supersede
    /// earlier ones.
    pub async fn add_analysis(&self, post_id: &str, label: &str) {
        let mut state = self.state.lock().await;
        state
            .analyses
            .push((post_id.to_string(), Sentiment::from_label(Some(label))));
    }

    pub async fn mappings(&self) -> Vec<NewMapping> {
        self.state.lock().await.mappings.clone()
    }

    pub async fn runs(&self) -> Vec<ClusteringRun> {
        self.state.lock().await.runs.clone()
    }

    pub async fn themes(&self) -> Vec<Theme> {
        self.state.lock().await.themes.clone()
    }
}

#[async_trait]
impl ClusteringStore for MemoryStore {
    async fn create_pending_run(&self, run_type: RunType) -> Result<ClusteringRun, StoreError> {
        let mut state = self.state.lock().await;
        let run = ClusteringRun {
            id: state.next_id(),
            public_id: Uuid::new_v4(),
            run_type,
            status: RunStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            posts_processed: 0,
            themes_created: 0,
            themes_updated: 0,
            error_message: None,
        };
        state.runs.push(run.clone());
        Ok(run)
    }

    async fn has_blocking_run(&self, run_id: i64) -> Result<bool, StoreError> {
        let state = self.state.lock().await;
        Ok(state.runs.iter().any(|r| {
            r.id != run_id
                && (r.status == RunStatus::Running
                    || (r.status == RunStatus::Pending && r.id < run_id))
        }))
    }

    async fn delete_run(&self, run_id: i64) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let before = state.runs.len();
        state
            .runs
            .retain(|r| !(r.id == run_id && r.status == RunStatus::Pending));
        if state.runs.len() == before {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn promote_run(&self, run_id: i64) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state
            .runs
            .iter()
            .any(|r| r.id != run_id && r.status == RunStatus::Running)
        {
            return Err(StoreError::ActiveRunConflict);
        }
        let run = state.run_mut(run_id)?;
        if run.status != RunStatus::Pending {
            return Err(StoreError::InvalidTransition {
                id: run_id,
                expected_status: "pending",
            });
        }
        run.status = RunStatus::Running;
        run.started_at = Utc::now();
        Ok(())
    }

    async fn get_run(&self, run_id: i64) -> Result<ClusteringRun, StoreError> {
        let mut state = self.state.lock().await;
        state.run_mut(run_id).map(|r| r.clone())
    }

    async fn record_progress(
        &self,
        run_id: i64,
        posts_processed: usize,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let run = state.running_run_mut(run_id)?;
        run.posts_processed = run.posts_processed.max(posts_processed);
        Ok(())
    }

    async fn complete_run(&self, run_id: i64, totals: RunTotals) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let run = state.running_run_mut(run_id)?;
        run.status = RunStatus::Completed;
        run.completed_at = Some(Utc::now());
        run.posts_processed = totals.posts_processed;
        run.themes_created = totals.themes_created;
        run.themes_updated = totals.themes_updated;
        Ok(())
    }

    async fn fail_run(&self, run_id: i64, error_message: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let run = state.running_run_mut(run_id)?;
        run.status = RunStatus::Failed;
        run.completed_at = Some(Utc::now());
        run.error_message = Some(error_message.to_string());
        Ok(())
    }

    async fn cancel_active_runs(&self, error_message: &str) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let mut changed = 0;
        for run in state.runs.iter_mut().filter(|r| r.status.is_active()) {
            run.status = RunStatus::Failed;
            run.completed_at = Some(now);
            run.error_message = Some(error_message.to_string());
            changed += 1;
        }
        Ok(changed)
    }

    async fn latest_run(&self) -> Result<Option<ClusteringRun>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .runs
            .iter()
            .max_by_key(|r| (r.started_at, r.id))
            .cloned())
    }

    async fn list_posts_newest_first(&self) -> Result<Vec<Document>, StoreError> {
        Ok(self.state.lock().await.newest_first())
    }

    async fn list_unmapped_posts(&self) -> Result<Vec<Document>, StoreError> {
        let state = self.state.lock().await;
        let mapped: HashSet<&str> = state.mappings.iter().map(|m| m.post_id.as_str()).collect();
        Ok(state
            .newest_first()
            .into_iter()
            .filter(|d| !mapped.contains(d.id.as_str()))
            .collect())
    }

    async fn post_exists(&self, post_id: &str) -> Result<bool, StoreError> {
        Ok(self.state.lock().await.has_post(post_id))
    }

    async fn list_active_product_areas(&self) -> Result<Vec<ProductArea>, StoreError> {
        Ok(self.state.lock().await.areas.clone())
    }

    async fn deactivate_all_themes(&self) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let mut changed = 0;
        for theme in state.themes.iter_mut().filter(|t| t.is_active) {
            theme.is_active = false;
            changed += 1;
        }
        Ok(changed)
    }

    async fn clear_all_mappings(&self) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let removed = state.mappings.len() as u64;
        state.mappings.clear();
        Ok(removed)
    }

    async fn list_active_themes(&self) -> Result<Vec<Theme>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.themes.iter().filter(|t| t.is_active).cloned().collect())
    }

    async fn find_active_theme_by_name(
        &self,
        name: &str,
        product_area_id: Option<i64>,
    ) -> Result<Option<Theme>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .themes
            .iter()
            .find(|t| t.is_active && t.name == name && t.product_area_id == product_area_id)
            .cloned())
    }

    async fn create_theme(&self, theme: NewTheme) -> Result<Theme, StoreError> {
        let mut state = self.state.lock().await;
        let created = Theme {
            id: state.next_id(),
            name: theme.name,
            description: theme.description,
            severity: theme.severity,
            product_area_id: theme.product_area_id,
            is_active: true,
            clustering_run_id: theme.clustering_run_id,
        };
        state.themes.push(created.clone());
        Ok(created)
    }

    async fn set_theme_severity(&self, theme_id: i64, severity: u8) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let theme = state
            .themes
            .iter_mut()
            .find(|t| t.id == theme_id)
            .ok_or(StoreError::NotFound)?;
        theme.severity = severity;
        Ok(())
    }

    async fn get_theme(&self, theme_id: i64) -> Result<Theme, StoreError> {
        let state = self.state.lock().await;
        state
            .themes
            .iter()
            .find(|t| t.id == theme_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn insert_mappings(&self, mappings: &[NewMapping]) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let mut inserted = 0;
        for mapping in mappings {
            if state.has_post(&mapping.post_id) {
                state.mappings.push(mapping.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn theme_post_ids(&self, theme_id: i64) -> Result<Vec<String>, StoreError> {
        let state = self.state.lock().await;
        let mut ids: Vec<String> = state
            .mappings
            .iter()
            .filter(|m| m.theme_id == theme_id)
            .map(|m| m.post_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn latest_sentiments(
        &self,
        post_ids: &[String],
    ) -> Result<HashMap<String, Sentiment>, StoreError> {
        let state = self.state.lock().await;
        let wanted: HashSet<&str> = post_ids.iter().map(String::as_str).collect();
        let mut latest = HashMap::new();
        for (post_id, sentiment) in &state.analyses {
            if wanted.contains(post_id.as_str()) {
                latest.insert(post_id.clone(), *sentiment);
            }
        }
        Ok(latest)
    }
}
