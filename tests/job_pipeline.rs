// tests/job_pipeline.rs
//
// End-to-end runs of the batch scraping job over the in-memory store.
// Pauses and retry delays are zero/near-zero so runs finish immediately.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};

use relevance_scraper::domains::DomainSets;
use relevance_scraper::extract::{Article, ArticleExtractor, ExtractError, StaticExtractor};
use relevance_scraper::job::{JobSettings, RunReport, ScrapeJob, StopReason};
use relevance_scraper::model::{RunLog, RunStatus};
use relevance_scraper::store::memory::InMemoryStore;
use relevance_scraper::store::retry::{ResilientStore, RetryPolicy};
use relevance_scraper::store::{
    DocumentStore, DocumentStream, FieldValue, Fields, StoreError, StoreResult,
};

const RECORDS: &str = "monitor_results";
const LOGS: &str = "system_logs";

fn settings() -> JobSettings {
    JobSettings {
        collection: RECORDS.into(),
        log_collection: LOGS.into(),
        task: "url_scraping".into(),
        batch_size: 5,
        max_per_run: 5,
        batch_pause: Duration::ZERO,
        threshold: 0.5,
        language: "pt".into(),
        extraction_timeout: Some(Duration::from_secs(5)),
        max_content_chars: 50_000,
        max_authors: 10,
        max_error_chars: 500,
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
    }
}

fn record(term: &str, title: &str, snippet: &str, link: Option<&str>) -> Fields {
    let mut f = Fields::new();
    f.insert("term".into(), term.into());
    f.insert("title".into(), title.into());
    f.insert("snippet".into(), snippet.into());
    if let Some(l) = link {
        f.insert("link".into(), l.into());
    }
    f.insert("status".into(), "pending".into());
    f
}

/// Scores 1.0 with the seed domain sets.
fn strong(link: &str) -> Fields {
    record(
        "eleição",
        "Eleição 2024 é tema de debate nacional",
        "A eleição...",
        Some(link),
    )
}

/// Scores exactly 0.50 (term in title + snippet only).
fn borderline(link: &str) -> Fields {
    record("copa", "copa", "copa", Some(link))
}

fn article(days_old: Option<i64>) -> Article {
    Article {
        text: "Corpo da matéria.".into(),
        title: "Título extraído".into(),
        authors: vec!["Ana".into()],
        publish_date: days_old.map(|d| Utc::now() - ChronoDuration::days(d)),
    }
}

fn text(fields: &Fields, name: &str) -> String {
    fields
        .get(name)
        .and_then(FieldValue::as_str)
        .unwrap_or_default()
        .to_string()
}

fn status_of(store: &InMemoryStore, id: &str) -> String {
    text(&store.snapshot(RECORDS, id).expect("record exists"), "status")
}

async fn run_job(
    store: Arc<dyn DocumentStore>,
    extractor: Arc<dyn ArticleExtractor>,
    settings: JobSettings,
) -> (RunReport, String) {
    let job = ScrapeJob::new(
        ResilientStore::new(store, fast_retry()),
        extractor,
        Arc::new(DomainSets::default_seed()),
        settings,
    );
    let run_id = job.create_run_log().await.expect("create run log");
    let report = job.run(&run_id).await;
    (report, run_id)
}

fn run_log(store: &InMemoryStore, run_id: &str) -> RunLog {
    RunLog::from_fields(&store.snapshot(LOGS, run_id).expect("run log exists"))
        .expect("run log parses")
}

#[tokio::test]
async fn cap_limits_a_run_to_five_records() {
    let store = Arc::new(InMemoryStore::new());
    let mut ex = StaticExtractor::new();
    for i in 0..7 {
        let link = format!("https://g1.globo.com/n{i}");
        store.insert(RECORDS, &format!("r{i}"), strong(&link));
        ex = ex.with_article(&link, article(Some(10)));
    }

    let (report, run_id) = run_job(store.clone(), Arc::new(ex), settings()).await;

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.stop, Some(StopReason::CapReached));
    assert_eq!(report.summary.processed, 5);
    assert_eq!(report.summary.scraped, 5);

    let still_pending = (0..7)
        .filter(|i| status_of(&store, &format!("r{i}")) == "pending")
        .count();
    assert_eq!(still_pending, 2);

    let log = run_log(&store, &run_id);
    assert_eq!(log.status, RunStatus::Completed);
    assert_eq!(log.processed_count, 5);
    assert_eq!(log.failed_count, 0);
    assert!(log.end_time.is_some());
    assert!(log.message.unwrap_or_default().starts_with("Processed 5 URL(s)"));
}

#[tokio::test]
async fn every_branch_of_the_state_machine() {
    let store = Arc::new(InMemoryStore::new());
    store.insert(RECORDS, "a_missing", record("copa", "copa", "copa", None));
    store.insert(RECORDS, "b_social", strong("https://youtube.com/watch?v=1"));
    store.insert(
        RECORDS,
        "c_irrelevant",
        record("xyz", "Short", "nothing", Some("http://unknown.com/a?x=1")),
    );
    store.insert(RECORDS, "d_fresh", borderline("https://x.example/d?p=1"));
    store.insert(RECORDS, "e_stale", borderline("https://x.example/e?p=1"));
    store.insert(RECORDS, "f_boom", borderline("https://x.example/f?p=1"));
    store.insert(RECORDS, "g_empty", borderline("https://x.example/g?p=1"));

    let mut fresh = article(Some(100));
    fresh.authors = (0..12).map(|i| format!("autor {i}")).collect();
    let ex = StaticExtractor::new()
        .with_article("https://x.example/d?p=1", fresh)
        .with_article("https://x.example/e?p=1", article(Some(800)))
        .with_failure("https://x.example/f?p=1", "boom");
    let ex = Arc::new(ex);

    let s = JobSettings {
        max_per_run: 10,
        ..settings()
    };
    let (report, run_id) = run_job(store.clone(), ex.clone(), s).await;

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.stop, Some(StopReason::Exhausted));
    assert_eq!(report.summary.processed, 7);
    assert_eq!(report.summary.failed, 3);
    assert_eq!(report.summary.scraped, 2);
    assert_eq!(report.summary.skipped, 1);
    assert_eq!(report.summary.relevance_failed, 1);

    let a = store.snapshot(RECORDS, "a_missing").unwrap();
    assert_eq!(text(&a, "status"), "scraper_failed");
    assert_eq!(text(&a, "error_message"), "URL not found in document.");

    let b = store.snapshot(RECORDS, "b_social").unwrap();
    assert_eq!(text(&b, "status"), "scraper_skipped");
    assert_eq!(text(&b, "reason"), "Social media domain");

    let c = store.snapshot(RECORDS, "c_irrelevant").unwrap();
    assert_eq!(text(&c, "status"), "relevance_failed");
    assert_eq!(c.get("relevance_score").and_then(FieldValue::as_f64), Some(0.0));

    let d = store.snapshot(RECORDS, "d_fresh").unwrap();
    assert_eq!(text(&d, "status"), "scraper_ok");
    let boosted = d.get("relevance_score").and_then(FieldValue::as_f64).unwrap();
    assert!((boosted - 0.6).abs() < 1e-12, "got {boosted}");
    assert_eq!(text(&d, "scraped_title"), "Título extraído");
    assert_eq!(text(&d, "scraped_content"), "Corpo da matéria.");
    match d.get("authors") {
        Some(FieldValue::Array(v)) => assert_eq!(v.len(), 10),
        other => panic!("authors not an array: {other:?}"),
    }
    assert!(d.get("last_processed_at").and_then(FieldValue::as_timestamp).is_some());

    let e = store.snapshot(RECORDS, "e_stale").unwrap();
    assert_eq!(e.get("relevance_score").and_then(FieldValue::as_f64), Some(0.5));

    let f = store.snapshot(RECORDS, "f_boom").unwrap();
    assert_eq!(text(&f, "status"), "scraper_failed");
    assert_eq!(text(&f, "error_message"), "unexpected error: boom");

    let g = store.snapshot(RECORDS, "g_empty").unwrap();
    assert_eq!(text(&g, "status"), "scraper_failed");
    assert!(text(&g, "error_message").starts_with("article extraction error: "));

    // Only records that passed the gate reached the extractor.
    let asked: HashSet<String> = ex.requested().into_iter().collect();
    assert_eq!(asked.len(), 4);
    assert!(!asked.iter().any(|u| u.contains("youtube")));

    let log = run_log(&store, &run_id);
    assert_eq!(log.processed_count, 7);
    assert_eq!(log.failed_count, 3);
}

#[tokio::test]
async fn empty_store_completes_with_zero_counts() {
    let store = Arc::new(InMemoryStore::new());
    let (report, run_id) = run_job(store.clone(), Arc::new(StaticExtractor::new()), settings()).await;
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.stop, Some(StopReason::Exhausted));
    let log = run_log(&store, &run_id);
    assert_eq!(log.processed_count, 0);
    assert_eq!(log.failed_count, 0);
}

#[tokio::test]
async fn long_error_messages_are_truncated() {
    let store = Arc::new(InMemoryStore::new());
    store.insert(RECORDS, "r", borderline("https://x.example/r?p=1"));
    let long = "x".repeat(2_000);
    let ex = StaticExtractor::new().with_failure("https://x.example/r?p=1", &long);

    let (_, _) = run_job(store.clone(), Arc::new(ex), settings()).await;

    let msg = text(&store.snapshot(RECORDS, "r").unwrap(), "error_message");
    assert_eq!(msg.chars().count(), 500);
    assert!(msg.starts_with("unexpected error: xxx"));
}

struct SlowExtractor;

#[async_trait]
impl ArticleExtractor for SlowExtractor {
    async fn extract(&self, _url: &str, _language: &str) -> Result<Article, ExtractError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Article::default())
    }

    fn name(&self) -> &'static str {
        "slow"
    }
}

#[tokio::test]
async fn slow_extraction_times_out_as_typed_failure() {
    let store = Arc::new(InMemoryStore::new());
    store.insert(RECORDS, "r", borderline("https://x.example/slow"));
    let s = JobSettings {
        extraction_timeout: Some(Duration::from_millis(20)),
        ..settings()
    };

    let (report, _) = run_job(store.clone(), Arc::new(SlowExtractor), s).await;

    assert_eq!(report.summary.failed, 1);
    let msg = text(&store.snapshot(RECORDS, "r").unwrap(), "error_message");
    assert!(
        msg.starts_with("article extraction error: extraction timed out"),
        "got {msg}"
    );
}

/// In-memory store with switchable failures.
struct ScriptedStore {
    inner: InMemoryStore,
    fail_queries: bool,
    fail_updates_for: HashSet<String>,
    /// Run-log updates allowed before every later one is denied.
    log_updates_allowed: Option<usize>,
    log_updates: AtomicUsize,
}

impl ScriptedStore {
    fn new(inner: InMemoryStore) -> Self {
        Self {
            inner,
            fail_queries: false,
            fail_updates_for: HashSet::new(),
            log_updates_allowed: None,
            log_updates: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl DocumentStore for ScriptedStore {
    async fn query_in(
        &self,
        collection: &str,
        field: &str,
        values: &[&str],
        limit: usize,
    ) -> StoreResult<DocumentStream> {
        if self.fail_queries {
            return Err(StoreError::Status {
                status: 400,
                body: "query rejected".into(),
            });
        }
        self.inner.query_in(collection, field, values, limit).await
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<()> {
        let log_denied = collection == LOGS
            && self
                .log_updates_allowed
                .is_some_and(|n| self.log_updates.fetch_add(1, Ordering::SeqCst) >= n);
        if log_denied || self.fail_updates_for.contains(id) {
            return Err(StoreError::Status {
                status: 403,
                body: "write denied".into(),
            });
        }
        self.inner.update(collection, id, fields).await
    }

    async fn create(&self, collection: &str, fields: Fields) -> StoreResult<String> {
        self.inner.create(collection, fields).await
    }

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Fields>> {
        self.inner.get(collection, id).await
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "scripted"
    }
}

#[tokio::test]
async fn batch_fetch_failure_marks_run_failed() {
    let inner = InMemoryStore::new();
    inner.insert(RECORDS, "r", strong("https://g1.globo.com/x"));
    let mut scripted = ScriptedStore::new(inner);
    scripted.fail_queries = true;
    let scripted = Arc::new(scripted);

    let (report, run_id) =
        run_job(scripted.clone(), Arc::new(StaticExtractor::new()), settings()).await;

    assert_eq!(report.status, RunStatus::Failed);
    assert!(report.error.as_deref().unwrap_or_default().contains("query rejected"));

    let log = RunLog::from_fields(&scripted.inner.snapshot(LOGS, &run_id).unwrap()).unwrap();
    assert_eq!(log.status, RunStatus::Failed);
    assert_eq!(log.processed_count, 0);
    assert!(log.error_message.unwrap_or_default().contains("query rejected"));
    assert_eq!(text(&scripted.inner.snapshot(RECORDS, "r").unwrap(), "status"), "pending");
}

#[tokio::test]
async fn unwritable_record_is_counted_and_does_not_block_later_ones() {
    let inner = InMemoryStore::new();
    inner.insert(RECORDS, "r1", strong("https://g1.globo.com/1"));
    inner.insert(RECORDS, "r2", strong("https://g1.globo.com/2"));
    let mut scripted = ScriptedStore::new(inner);
    scripted.fail_updates_for.insert("r1".into());
    let scripted = Arc::new(scripted);

    let ex = StaticExtractor::new()
        .with_article("https://g1.globo.com/1", article(None))
        .with_article("https://g1.globo.com/2", article(None));
    let ex = Arc::new(ex);
    let s = JobSettings {
        batch_size: 1,
        ..settings()
    };

    let (report, run_id) = run_job(scripted.clone(), ex.clone(), s).await;

    // r1 stays selectable and sorts first; it is skipped, not re-extracted.
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.stop, Some(StopReason::Exhausted));
    assert_eq!(report.summary.processed, 2);
    assert_eq!(report.summary.errored, 1);
    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.summary.scraped, 1);
    assert_eq!(
        ex.requested(),
        vec![
            "https://g1.globo.com/1".to_string(),
            "https://g1.globo.com/2".to_string()
        ]
    );
    assert_eq!(text(&scripted.inner.snapshot(RECORDS, "r1").unwrap(), "status"), "pending");
    assert_eq!(text(&scripted.inner.snapshot(RECORDS, "r2").unwrap(), "status"), "scraper_ok");

    let log = RunLog::from_fields(&scripted.inner.snapshot(LOGS, &run_id).unwrap()).unwrap();
    assert_eq!(log.processed_count, 2);
    assert_eq!(log.failed_count, 1);
}

#[tokio::test]
async fn unwritable_run_log_fails_the_run_without_undoing_record_writes() {
    let inner = InMemoryStore::new();
    inner.insert(RECORDS, "r1", strong("https://g1.globo.com/1"));
    inner.insert(RECORDS, "r2", borderline("https://x.example/2?p=1"));
    let mut scripted = ScriptedStore::new(inner);
    // The `processing` mark goes through; `completed` and `failed` do not.
    scripted.log_updates_allowed = Some(1);
    let scripted = Arc::new(scripted);

    let ex = StaticExtractor::new().with_article("https://g1.globo.com/1", article(None));

    let (report, run_id) = run_job(scripted.clone(), Arc::new(ex), settings()).await;

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.stop, None);
    assert!(report.error.as_deref().unwrap_or_default().contains("write denied"));
    assert_eq!(report.summary.processed, 2);
    assert_eq!(scripted.log_updates.load(Ordering::SeqCst), 3);

    assert_eq!(text(&scripted.inner.snapshot(RECORDS, "r1").unwrap(), "status"), "scraper_ok");
    assert_eq!(
        text(&scripted.inner.snapshot(RECORDS, "r2").unwrap(), "status"),
        "scraper_failed"
    );

    let log = RunLog::from_fields(&scripted.inner.snapshot(LOGS, &run_id).unwrap()).unwrap();
    assert_eq!(log.status, RunStatus::Processing);
}

#[tokio::test]
async fn long_article_text_is_capped_by_characters() {
    let store = Arc::new(InMemoryStore::new());
    store.insert(RECORDS, "r", strong("https://g1.globo.com/longa"));
    let mut long = article(Some(10));
    long.text = "ção".repeat(20_001);
    let ex = StaticExtractor::new().with_article("https://g1.globo.com/longa", long);

    let (report, _) = run_job(store.clone(), Arc::new(ex), settings()).await;

    assert_eq!(report.summary.scraped, 1);
    let content = text(&store.snapshot(RECORDS, "r").unwrap(), "scraped_content");
    assert_eq!(content.chars().count(), 50_000);
    assert!(content.starts_with("çãoçãoção"));
    assert!(content.ends_with("çã"), "cut lands after the second char of a triple");
}

#[tokio::test]
async fn transient_store_errors_are_retried() {
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        inner: InMemoryStore,
        query_failures_left: AtomicU32,
    }

    #[async_trait]
    impl DocumentStore for Flaky {
        async fn query_in(
            &self,
            collection: &str,
            field: &str,
            values: &[&str],
            limit: usize,
        ) -> StoreResult<DocumentStream> {
            let left = self.query_failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.query_failures_left.store(left - 1, Ordering::SeqCst);
                return Err(StoreError::Unavailable("warming up".into()));
            }
            self.inner.query_in(collection, field, values, limit).await
        }
        async fn update(&self, c: &str, id: &str, f: Fields) -> StoreResult<()> {
            self.inner.update(c, id, f).await
        }
        async fn create(&self, c: &str, f: Fields) -> StoreResult<String> {
            self.inner.create(c, f).await
        }
        async fn get(&self, c: &str, id: &str) -> StoreResult<Option<Fields>> {
            self.inner.get(c, id).await
        }
        async fn ping(&self) -> StoreResult<()> {
            Ok(())
        }
        fn backend_name(&self) -> &'static str {
            "flaky"
        }
    }

    let inner = InMemoryStore::new();
    inner.insert(RECORDS, "r", strong("https://g1.globo.com/x"));
    let flaky = Arc::new(Flaky {
        inner,
        query_failures_left: AtomicU32::new(2),
    });
    let ex = StaticExtractor::new().with_article("https://g1.globo.com/x", article(None));

    let (report, _) = run_job(flaky.clone(), Arc::new(ex), settings()).await;

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.summary.scraped, 1);
    assert_eq!(
        text(&flaky.inner.snapshot(RECORDS, "r").unwrap(), "status"),
        "scraper_ok"
    );
}
