//! End-to-end pipeline scenarios over `MemoryStore` and a scripted LLM.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use painmap_clustering::{
    ClusteringError, ClusteringRun, ClusteringService, ClusteringStore, Document, MemoryStore,
    NewMapping, NewTheme, PipelineSettings, ProductArea, RunTotals, StoreError, Theme,
    CANCELLED_MESSAGE, FALLBACK_CONFIDENCE, UNCATEGORIZED_THEME_NAME,
};
use painmap_core::{RunStatus, RunType, Sentiment};
use painmap_llm::{LlmError, LlmGateway, LlmProvider};
use serde_json::json;

type Reply = Box<dyn FnOnce(&str) -> Result<String, LlmError> + Send>;

/// Answers prompts from a queue and records every prompt it saw.
#[derive(Default)]
struct Scripted {
    replies: Mutex<VecDeque<Reply>>,
    prompts: Mutex<Vec<String>>,
}

impl Scripted {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn reply(&self, value: serde_json::Value) {
        let text = value.to_string();
        self.push(Box::new(move |_| Ok(text)));
    }

    fn fail(&self) {
        self.push(Box::new(|_| Err(LlmError::EmptyResponse("scripted"))));
    }

    fn push(&self, reply: Reply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for Scripted {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(reply) => reply(prompt),
            None => Err(LlmError::EmptyResponse("scripted")),
        }
    }
}

fn settings(batch_size: usize, max_themes_per_area: usize) -> PipelineSettings {
    PipelineSettings {
        batch_size,
        max_themes_per_area,
        max_consolidation_rounds: 3,
        debug: true,
    }
}

fn service(
    store: &Arc<MemoryStore>,
    llm: &Arc<Scripted>,
    settings: PipelineSettings,
) -> ClusteringService {
    let provider: Arc<dyn LlmProvider> = llm.clone();
    let store: Arc<dyn ClusteringStore> = store.clone();
    ClusteringService::new(store, LlmGateway::new(provider, Duration::ZERO, false), settings)
}

async fn seed_posts(store: &MemoryStore, count: usize) {
    for i in 0..count {
        store
            .add_post(&format!("p{i:02}"), &format!("post {i}"), Some("body"))
            .await;
    }
}

async fn run_to_end(service: &ClusteringService, run_type: RunType) -> ClusteringRun {
    let run = service.start_run(run_type).await.expect("run should start");
    service.run(run.id).await;
    service.get_run(run.id).await.expect("run exists")
}

async fn theme_by_name(store: &MemoryStore, name: &str) -> Theme {
    store
        .themes()
        .await
        .into_iter()
        .find(|t| t.is_active && t.name == name)
        .unwrap_or_else(|| panic!("no active theme named {name}"))
}

/// Every post maps to exactly one active theme.
async fn assert_full_coverage(store: &MemoryStore) {
    let active: HashSet<i64> = store
        .themes()
        .await
        .into_iter()
        .filter(|t| t.is_active)
        .map(|t| t.id)
        .collect();
    let mut per_post: HashMap<String, usize> = HashMap::new();
    for mapping in store.mappings().await {
        assert!(
            active.contains(&mapping.theme_id),
            "{} mapped to inactive theme {}",
            mapping.post_id,
            mapping.theme_id
        );
        *per_post.entry(mapping.post_id).or_default() += 1;
    }
    for post in store.list_posts_newest_first().await.unwrap() {
        assert_eq!(per_post.get(&post.id), Some(&1), "post {} coverage", post.id);
    }
}

/// Pulls the id of `name` out of a rendered `[Theme ID: n] name: ...` line.
fn theme_id_in_prompt(prompt: &str, name: &str) -> i64 {
    let marker = format!("] {name}:");
    let line = prompt
        .lines()
        .find(|l| l.contains(&marker))
        .unwrap_or_else(|| panic!("theme {name} not in prompt"));
    let start = line.find("[Theme ID: ").expect("theme id marker") + "[Theme ID: ".len();
    let end = line[start..].find(']').expect("closing bracket") + start;
    line[start..end].parse().expect("numeric theme id")
}

#[tokio::test]
async fn omitted_indices_fall_back_to_uncategorized() {
    let store = Arc::new(MemoryStore::new());
    let area = store.add_product_area("Sync", Some("Syncing data")).await;
    seed_posts(&store, 25).await;

    let llm = Scripted::new();
    llm.reply(json!({"themes": [
        {"theme_name": "Sync conflicts", "description": "Edits lost", "product_area_id": area,
         "post_indices": (0..10).collect::<Vec<_>>()},
        {"theme_name": "Slow sync", "description": "Takes minutes", "product_area_id": area,
         "post_indices": (10..20).map(|i| format!("Post {i}")).collect::<Vec<_>>()}
    ]}));
    // Second batch holds p04..p00; indices 3 and 4 (p01, p00) are omitted.
    llm.reply(json!({"themes": [
        {"theme_name": "Offline mode", "description": "No offline edits", "product_area_id": area,
         "post_indices": [0, "1", "[2]"]}
    ]}));

    let svc = service(&store, &llm, settings(20, 5));
    let run = run_to_end(&svc, RunType::Full).await;

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.posts_processed, 25);
    assert_eq!(run.themes_created, 4);
    assert_eq!(llm.prompts().len(), 2);

    let fallback = theme_by_name(&store, UNCATEGORIZED_THEME_NAME).await;
    assert_eq!(fallback.product_area_id, None);
    let mut uncategorized: Vec<NewMapping> = store
        .mappings()
        .await
        .into_iter()
        .filter(|m| m.theme_id == fallback.id)
        .collect();
    uncategorized.sort_by(|a, b| a.post_id.cmp(&b.post_id));
    let ids: Vec<&str> = uncategorized.iter().map(|m| m.post_id.as_str()).collect();
    assert_eq!(ids, vec!["p00", "p01"]);
    assert!(uncategorized
        .iter()
        .all(|m| (m.confidence - FALLBACK_CONFIDENCE).abs() < f64::EPSILON));

    assert_full_coverage(&store).await;
}

#[tokio::test]
async fn consolidation_merges_and_keeps_unmentioned_themes() {
    let store = Arc::new(MemoryStore::new());
    let area = store.add_product_area("Billing", None).await;
    seed_posts(&store, 4).await;

    let llm = Scripted::new();
    llm.reply(json!({"themes": [
        {"theme_name": "Refunds", "product_area_id": area, "post_indices": [0]},
        {"theme_name": "Chargebacks", "product_area_id": area, "post_indices": [1]},
        {"theme_name": "Invoices", "product_area_id": area, "post_indices": [2]},
        {"theme_name": "Misc", "product_area_id": null, "post_indices": [3]}
    ]}));
    // Merges 0 and 1, never mentions 2.
    llm.reply(json!({"themes": [
        {"theme_name": "Money back", "description": "Refund pain", "merged_from": [0, "1"]}
    ]}));

    let svc = service(&store, &llm, settings(10, 2));
    let run = run_to_end(&svc, RunType::Full).await;
    assert_eq!(run.status, RunStatus::Completed);

    let prompts = llm.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(!prompts[1].contains("p03"), "consolidation never sees post ids");

    let merged = theme_by_name(&store, "Money back").await;
    assert_eq!(merged.product_area_id, Some(area));
    let kept = theme_by_name(&store, "Invoices").await;
    let fallback = theme_by_name(&store, UNCATEGORIZED_THEME_NAME).await;

    let mut merged_posts = store.theme_post_ids(merged.id).await.unwrap();
    merged_posts.sort();
    assert_eq!(merged_posts, vec!["p02", "p03"]);
    assert_eq!(store.theme_post_ids(kept.id).await.unwrap(), vec!["p01"]);
    assert_eq!(store.theme_post_ids(fallback.id).await.unwrap(), vec!["p00"]);
    assert_full_coverage(&store).await;
}

#[tokio::test]
async fn full_run_replaces_previous_themes() {
    let store = Arc::new(MemoryStore::new());
    seed_posts(&store, 2).await;
    let old = store
        .create_theme(NewTheme {
            name: "Old".into(),
            description: None,
            product_area_id: None,
            severity: 3,
            clustering_run_id: None,
        })
        .await
        .unwrap();
    store
        .insert_mappings(&[NewMapping {
            post_id: "p00".into(),
            theme_id: old.id,
            confidence: 1.0,
        }])
        .await
        .unwrap();

    let llm = Scripted::new();
    llm.fail();
    let svc = service(&store, &llm, settings(20, 5));
    let run = run_to_end(&svc, RunType::Full).await;

    assert_eq!(run.status, RunStatus::Completed);
    assert!(!store.get_theme(old.id).await.unwrap().is_active);
    assert_eq!(run.themes_created, 1);
    assert_full_coverage(&store).await;
}

#[tokio::test]
async fn unknown_product_area_is_treated_as_none() {
    let store = Arc::new(MemoryStore::new());
    store.add_product_area("Search", None).await;
    seed_posts(&store, 2).await;

    let llm = Scripted::new();
    llm.reply(json!({"themes": [
        {"theme_name": "Ranking", "product_area_id": 999, "post_indices": [0, 1]}
    ]}));
    let svc = service(&store, &llm, settings(20, 5));
    let run = run_to_end(&svc, RunType::Full).await;

    assert_eq!(run.status, RunStatus::Completed);
    let themes = store.themes().await;
    assert_eq!(themes.len(), 1);
    assert_eq!(themes[0].name, UNCATEGORIZED_THEME_NAME);
    assert_eq!(store.theme_post_ids(themes[0].id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn empty_store_completes_without_llm_calls() {
    let store = Arc::new(MemoryStore::new());
    let llm = Scripted::new();
    let svc = service(&store, &llm, settings(20, 5));

    let run = run_to_end(&svc, RunType::Full).await;

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.posts_processed, 0);
    assert!(run.completed_at.is_some());
    assert!(llm.prompts().is_empty());
}

#[tokio::test]
async fn incremental_run_threads_new_themes_into_later_batches() {
    let store = Arc::new(MemoryStore::new());
    let login = store
        .create_theme(NewTheme {
            name: "Login".into(),
            description: Some("Cannot sign in".into()),
            product_area_id: None,
            severity: 3,
            clustering_run_id: None,
        })
        .await
        .unwrap();
    seed_posts(&store, 3).await;
    store.add_analysis("p02", "negative").await;
    store.add_analysis("p01", "negative").await;

    let llm = Scripted::new();
    // Batch one: p02 -> Login, p01 -> new theme "Billing".
    let login_id = login.id;
    llm.reply(json!({
        "assignments": [{"post_index": 0, "theme_id": login_id, "confidence": 0.8}],
        "new_themes": [{"theme_name": "Billing", "description": "Double charges", "post_indices": [1]}]
    }));
    // Batch two: p00 -> whatever id "Billing" got.
    llm.push(Box::new(|prompt| {
        let billing = theme_id_in_prompt(prompt, "Billing");
        Ok(json!({"assignments": [{"post_index": "0", "theme_id": billing.to_string()}]}).to_string())
    }));

    let svc = service(&store, &llm, settings(2, 5));
    let run = run_to_end(&svc, RunType::Incremental).await;

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.posts_processed, 3);
    assert_eq!(run.themes_created, 1);
    assert_eq!(run.themes_updated, 1);

    let billing = theme_by_name(&store, "Billing").await;
    assert_eq!(billing.clustering_run_id, Some(run.id));
    let mut billing_posts = store.theme_post_ids(billing.id).await.unwrap();
    billing_posts.sort();
    assert_eq!(billing_posts, vec!["p00", "p01"]);
    assert_eq!(store.theme_post_ids(login.id).await.unwrap(), vec!["p02"]);

    let login_mapping = store
        .mappings()
        .await
        .into_iter()
        .find(|m| m.post_id == "p02")
        .unwrap();
    assert!((login_mapping.confidence - 0.8).abs() < f64::EPSILON);

    // One negative post, one post without analysis.
    assert_eq!(store.get_theme(billing.id).await.unwrap().severity, 5);
    assert_eq!(store.get_theme(login.id).await.unwrap().severity, 5);
    assert_full_coverage(&store).await;
}

#[tokio::test]
async fn incremental_run_ignores_already_mapped_posts() {
    let store = Arc::new(MemoryStore::new());
    let theme = store
        .create_theme(NewTheme {
            name: "Crashes".into(),
            description: None,
            product_area_id: None,
            severity: 3,
            clustering_run_id: None,
        })
        .await
        .unwrap();
    seed_posts(&store, 2).await;
    store
        .insert_mappings(&[NewMapping {
            post_id: "p00".into(),
            theme_id: theme.id,
            confidence: 1.0,
        }])
        .await
        .unwrap();

    let llm = Scripted::new();
    llm.fail();
    let svc = service(&store, &llm, settings(20, 5));
    let run = run_to_end(&svc, RunType::Incremental).await;

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.posts_processed, 1);
    let prompts = llm.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Title: post 1"));
    assert!(!prompts[0].contains("Title: post 0"));

    let fallback = theme_by_name(&store, UNCATEGORIZED_THEME_NAME).await;
    assert_eq!(store.theme_post_ids(fallback.id).await.unwrap(), vec!["p01"]);
    assert_eq!(store.theme_post_ids(theme.id).await.unwrap(), vec!["p00"]);
}

#[tokio::test]
async fn incremental_without_themes_runs_full_discovery() {
    let store = Arc::new(MemoryStore::new());
    let area = store.add_product_area("Search", None).await;
    seed_posts(&store, 2).await;

    let llm = Scripted::new();
    llm.reply(json!({"themes": [
        {"theme_name": "Ranking", "product_area_id": area, "post_indices": [0, 1]}
    ]}));
    let svc = service(&store, &llm, settings(20, 5));
    let run = run_to_end(&svc, RunType::Incremental).await;

    assert_eq!(run.run_type, RunType::Incremental);
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.themes_created, 1);
    theme_by_name(&store, "Ranking").await;
    assert_full_coverage(&store).await;
}

#[tokio::test]
async fn concurrent_starts_yield_one_running_run() {
    let store = Arc::new(MemoryStore::new());
    let llm = Scripted::new();
    let svc = service(&store, &llm, settings(20, 5));

    let (a, b) = tokio::join!(svc.start_run(RunType::Full), svc.start_run(RunType::Full));

    let started = [&a, &b].iter().filter(|r| r.is_ok()).count();
    let conflicts = [&a, &b]
        .iter()
        .filter(|r| matches!(r, Err(ClusteringError::Conflict)))
        .count();
    assert_eq!((started, conflicts), (1, 1));

    let runs = store.runs().await;
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Running);
}

#[tokio::test]
async fn start_while_running_is_a_conflict() {
    let store = Arc::new(MemoryStore::new());
    let llm = Scripted::new();
    let svc = service(&store, &llm, settings(20, 5));

    let first = svc.start_run(RunType::Full).await.unwrap();
    let second = svc.start_run(RunType::Incremental).await;
    assert!(matches!(second, Err(ClusteringError::Conflict)));

    svc.run(first.id).await;
    let third = svc.start_run(RunType::Incremental).await.unwrap();
    assert_eq!(third.status, RunStatus::Running);
}

#[tokio::test]
async fn cancel_marks_run_failed_and_run_becomes_a_no_op() {
    let store = Arc::new(MemoryStore::new());
    seed_posts(&store, 1).await;
    let llm = Scripted::new();
    let svc = service(&store, &llm, settings(20, 5));

    let run = svc.start_run(RunType::Full).await.unwrap();
    assert_eq!(svc.cancel_stuck_runs().await.unwrap(), 1);
    svc.run(run.id).await;

    let run = svc.get_run(run.id).await.unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.error_message.as_deref(), Some(CANCELLED_MESSAGE));
    assert!(llm.prompts().is_empty());
    assert_eq!(svc.cancel_stuck_runs().await.unwrap(), 0);
}

/// Cancels every active run on its first call, then answers from `inner`.
struct CancelsOnFirstCall {
    store: Arc<MemoryStore>,
    inner: Arc<Scripted>,
    fired: AtomicBool,
}

#[async_trait]
impl LlmProvider for CancelsOnFirstCall {
    fn name(&self) -> &'static str {
        "cancels-on-first-call"
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        if !self.fired.swap(true, Ordering::SeqCst) {
            let cancelled = self
                .store
                .cancel_active_runs(CANCELLED_MESSAGE)
                .await
                .expect("cancel succeeds");
            assert_eq!(cancelled, 1);
        }
        self.inner.complete(prompt).await
    }
}

#[tokio::test]
async fn cancel_mid_run_still_writes_themes_and_coverage() {
    let store = Arc::new(MemoryStore::new());
    let area = store.add_product_area("Sync", None).await;
    seed_posts(&store, 4).await;

    let inner = Scripted::new();
    inner.reply(json!({"themes": [
        {"theme_name": "Sync conflicts", "product_area_id": area, "post_indices": [0, 1]}
    ]}));
    let provider: Arc<dyn LlmProvider> = Arc::new(CancelsOnFirstCall {
        store: store.clone(),
        inner: inner.clone(),
        fired: AtomicBool::new(false),
    });
    let dyn_store: Arc<dyn ClusteringStore> = store.clone();
    let svc = ClusteringService::new(
        dyn_store,
        LlmGateway::new(provider, Duration::ZERO, false),
        settings(2, 5),
    );

    let run = run_to_end(&svc, RunType::Full).await;

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.error_message.as_deref(), Some(CANCELLED_MESSAGE));
    assert_eq!(inner.prompts().len(), 2, "both batches still go to the LLM");
    let sync = theme_by_name(&store, "Sync conflicts").await;
    assert_eq!(sync.product_area_id, Some(area));
    theme_by_name(&store, UNCATEGORIZED_THEME_NAME).await;
    assert_eq!(store.mappings().await.len(), 4);
    assert_full_coverage(&store).await;
}

#[tokio::test]
async fn over_cap_area_keeps_leftovers_after_last_round() {
    let store = Arc::new(MemoryStore::new());
    let area = store.add_product_area("Search", None).await;
    seed_posts(&store, 7).await;

    let llm = Scripted::new();
    llm.reply(json!({"themes": (0..7)
        .map(|i| json!({"theme_name": format!("t{i}"), "product_area_id": area, "post_indices": [i]}))
        .collect::<Vec<_>>()}));
    for round in 1..=3 {
        llm.reply(json!({"themes": [
            {"theme_name": format!("round {round}"), "merged_from": [0, 1]}
        ]}));
    }

    let svc = service(&store, &llm, settings(20, 2));
    let run = run_to_end(&svc, RunType::Full).await;

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(llm.prompts().len(), 4, "one discovery call and three rounds");
    assert_eq!(run.themes_created, 4);
    let merged = theme_by_name(&store, "round 3").await;
    let merged_posts = store
        .mappings()
        .await
        .into_iter()
        .filter(|m| m.theme_id == merged.id)
        .count();
    assert_eq!(merged_posts, 4);
    assert_eq!(store.mappings().await.len(), 7);
    assert_full_coverage(&store).await;
}

#[tokio::test]
async fn spawned_run_completes_in_background() {
    let store = Arc::new(MemoryStore::new());
    seed_posts(&store, 1).await;
    let llm = Scripted::new();
    llm.fail();
    let svc = service(&store, &llm, settings(20, 5));

    let run = svc.start_run(RunType::Full).await.unwrap();
    svc.spawn(run.id).await.unwrap();

    let latest = svc.latest_run().await.unwrap().unwrap();
    assert_eq!(latest.id, run.id);
    assert_eq!(latest.status, RunStatus::Completed);
}

#[tokio::test]
async fn unknown_run_and_theme_are_reported() {
    let store = Arc::new(MemoryStore::new());
    let llm = Scripted::new();
    let svc = service(&store, &llm, settings(20, 5));

    assert!(matches!(
        svc.get_run(404).await,
        Err(ClusteringError::RunNotFound(404))
    ));
    assert!(matches!(
        svc.recalculate_severity(404).await,
        Err(ClusteringError::ThemeNotFound(404))
    ));
}

#[tokio::test]
async fn severity_recalculation_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    seed_posts(&store, 4).await;
    let theme = store
        .create_theme(NewTheme {
            name: "Exports".into(),
            description: None,
            product_area_id: None,
            severity: 3,
            clustering_run_id: None,
        })
        .await
        .unwrap();
    let mappings: Vec<NewMapping> = ["p00", "p01", "p02", "p03"]
        .iter()
        .map(|id| NewMapping {
            post_id: (*id).to_string(),
            theme_id: theme.id,
            confidence: 1.0,
        })
        .collect();
    store.insert_mappings(&mappings).await.unwrap();
    store.add_analysis("p00", "negative").await;
    store.add_analysis("p01", "negative").await;
    store.add_analysis("p02", "positive").await;
    store.add_analysis("p03", "neutral").await;

    let llm = Scripted::new();
    let svc = service(&store, &llm, settings(20, 5));

    let first = svc.recalculate_severity(theme.id).await.unwrap();
    let second = svc.recalculate_severity(theme.id).await.unwrap();
    assert_eq!(first, 4);
    assert_eq!(first, second);
    assert_eq!(store.get_theme(theme.id).await.unwrap().severity, 4);
}

#[tokio::test]
async fn recalculate_all_counts_changed_themes() {
    let store = Arc::new(MemoryStore::new());
    seed_posts(&store, 2).await;
    let mut ids = Vec::new();
    for name in ["Angry", "Quiet"] {
        let theme = store
            .create_theme(NewTheme {
                name: name.into(),
                description: None,
                product_area_id: None,
                severity: 3,
                clustering_run_id: None,
            })
            .await
            .unwrap();
        ids.push(theme.id);
    }
    store
        .insert_mappings(&[
            NewMapping {
                post_id: "p00".into(),
                theme_id: ids[0],
                confidence: 1.0,
            },
            NewMapping {
                post_id: "p01".into(),
                theme_id: ids[1],
                confidence: 1.0,
            },
        ])
        .await
        .unwrap();
    store.add_analysis("p00", "negative").await;
    store.add_analysis("p01", "neutral").await;

    let llm = Scripted::new();
    let svc = service(&store, &llm, settings(20, 5));

    assert_eq!(svc.recalculate_all_severities().await.unwrap(), 1);
    assert_eq!(svc.recalculate_all_severities().await.unwrap(), 0);
}

/// Delegates to `MemoryStore` but refuses to create themes.
struct BrokenThemes(MemoryStore);

#[async_trait]
impl ClusteringStore for BrokenThemes {
    async fn create_pending_run(&self, run_type: RunType) -> Result<ClusteringRun, StoreError> {
        self.0.create_pending_run(run_type).await
    }
    async fn has_blocking_run(&self, run_id: i64) -> Result<bool, StoreError> {
        self.0.has_blocking_run(run_id).await
    }
    async fn delete_run(&self, run_id: i64) -> Result<(), StoreError> {
        self.0.delete_run(run_id).await
    }
    async fn promote_run(&self, run_id: i64) -> Result<(), StoreError> {
        self.0.promote_run(run_id).await
    }
    async fn get_run(&self, run_id: i64) -> Result<ClusteringRun, StoreError> {
        self.0.get_run(run_id).await
    }
    async fn record_progress(&self, run_id: i64, posts: usize) -> Result<(), StoreError> {
        self.0.record_progress(run_id, posts).await
    }
    async fn complete_run(&self, run_id: i64, totals: RunTotals) -> Result<(), StoreError> {
        self.0.complete_run(run_id, totals).await
    }
    async fn fail_run(&self, run_id: i64, message: &str) -> Result<(), StoreError> {
        self.0.fail_run(run_id, message).await
    }
    async fn cancel_active_runs(&self, message: &str) -> Result<u64, StoreError> {
        self.0.cancel_active_runs(message).await
    }
    async fn latest_run(&self) -> Result<Option<ClusteringRun>, StoreError> {
        self.0.latest_run().await
    }
    async fn list_posts_newest_first(&self) -> Result<Vec<Document>, StoreError> {
        self.0.list_posts_newest_first().await
    }
    async fn list_unmapped_posts(&self) -> Result<Vec<Document>, StoreError> {
        self.0.list_unmapped_posts().await
    }
    async fn post_exists(&self, post_id: &str) -> Result<bool, StoreError> {
        self.0.post_exists(post_id).await
    }
    async fn list_active_product_areas(&self) -> Result<Vec<ProductArea>, StoreError> {
        self.0.list_active_product_areas().await
    }
    async fn deactivate_all_themes(&self) -> Result<u64, StoreError> {
        self.0.deactivate_all_themes().await
    }
    async fn clear_all_mappings(&self) -> Result<u64, StoreError> {
        self.0.clear_all_mappings().await
    }
    async fn list_active_themes(&self) -> Result<Vec<Theme>, StoreError> {
        self.0.list_active_themes().await
    }
    async fn find_active_theme_by_name(
        &self,
        name: &str,
        product_area_id: Option<i64>,
    ) -> Result<Option<Theme>, StoreError> {
        self.0.find_active_theme_by_name(name, product_area_id).await
    }
    async fn create_theme(&self, _theme: NewTheme) -> Result<Theme, StoreError> {
        Err(StoreError::Decode("disk full".into()))
    }
    async fn set_theme_severity(&self, theme_id: i64, severity: u8) -> Result<(), StoreError> {
        self.0.set_theme_severity(theme_id, severity).await
    }
    async fn get_theme(&self, theme_id: i64) -> Result<Theme, StoreError> {
        self.0.get_theme(theme_id).await
    }
    async fn insert_mappings(&self, mappings: &[NewMapping]) -> Result<u64, StoreError> {
        self.0.insert_mappings(mappings).await
    }
    async fn theme_post_ids(&self, theme_id: i64) -> Result<Vec<String>, StoreError> {
        self.0.theme_post_ids(theme_id).await
    }
    async fn latest_sentiments(
        &self,
        post_ids: &[String],
    ) -> Result<HashMap<String, Sentiment>, StoreError> {
        self.0.latest_sentiments(post_ids).await
    }
}

#[tokio::test]
async fn storage_failure_marks_run_failed_and_keeps_progress() {
    let inner = MemoryStore::new();
    seed_posts(&inner, 3).await;
    let store = Arc::new(BrokenThemes(inner));
    let llm = Scripted::new();
    llm.fail();
    let provider: Arc<dyn LlmProvider> = llm.clone();
    let svc = ClusteringService::new(
        store.clone(),
        LlmGateway::new(provider, Duration::ZERO, false),
        settings(2, 5),
    );

    let run = svc.start_run(RunType::Full).await.unwrap();
    svc.run(run.id).await;

    let run = svc.get_run(run.id).await.unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.error_message.unwrap().contains("disk full"));
    assert!(run.completed_at.is_some());
    assert_eq!(run.posts_processed, 3);
}
