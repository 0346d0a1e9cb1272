// src/job.rs
//! Batch scraping job.
//!
//! One run: mark the run log `processing`, pull candidate records
//! (`pending` | `reprocess`) in small batches, push each through
//!
//! ```text
//! link missing        -> scraper_failed
//! host is social      -> scraper_skipped
//! score < threshold   -> relevance_failed
//! extraction ok       -> scraper_ok
//! extraction fails    -> scraper_failed
//! ```
//!
//! and finalize the run log as `completed` or `failed`. Records are handled
//! strictly one at a time. A failing record never aborts the batch; a failing
//! batch fetch aborts the run.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::StreamExt;
use metrics::{counter, gauge, histogram};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::ServiceConfig;
use crate::domains::{host_of, DomainSets};
use crate::extract::{Article, ArticleExtractor, ExtractError};
use crate::model::{truncate_chars, RecordStatus, RecordUpdate, RunLog, RunStatus, UrlRecord};
use crate::relevance;
use crate::store::retry::ResilientStore;
use crate::store::{FieldValue, Fields, StoreResult};

pub const MISSING_LINK_MESSAGE: &str = "URL not found in document.";
pub const SOCIAL_MEDIA_REASON: &str = "Social media domain";

/// Knobs of a run, resolved from [`ServiceConfig`].
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub collection: String,
    pub log_collection: String,
    pub task: String,
    pub batch_size: usize,
    pub max_per_run: usize,
    pub batch_pause: Duration,
    pub threshold: f64,
    pub language: String,
    pub extraction_timeout: Option<Duration>,
    pub max_content_chars: usize,
    pub max_authors: usize,
    pub max_error_chars: usize,
}

impl From<&ServiceConfig> for JobSettings {
    fn from(c: &ServiceConfig) -> Self {
        Self {
            collection: c.collection.clone(),
            log_collection: c.log_collection.clone(),
            task: c.task.clone(),
            batch_size: c.batch_size.max(1),
            max_per_run: c.max_per_run,
            batch_pause: c.batch_pause(),
            threshold: c.relevance_threshold,
            language: c.language.clone(),
            extraction_timeout: c.extraction_timeout(),
            max_content_chars: c.max_content_chars,
            max_authors: c.max_authors,
            max_error_chars: c.max_error_chars,
        }
    }
}

/// Pre-extraction verdict for one record.
#[derive(Debug, Clone, PartialEq)]
pub enum Precheck {
    MissingLink,
    SocialMedia,
    BelowThreshold { score: f64 },
    Extract { link: String, score: f64 },
}

/// Steps (a)–(c) of record processing; pure.
pub fn precheck(record: &UrlRecord, domains: &DomainSets, threshold: f64) -> Precheck {
    let Some(link) = record.link.as_deref() else {
        return Precheck::MissingLink;
    };
    if domains.is_social(&host_of(link)) {
        return Precheck::SocialMedia;
    }
    let score = relevance::score(&record.term, &record.title, &record.snippet, link, domains);
    if !relevance::passes(score, threshold) {
        return Precheck::BelowThreshold { score };
    }
    Precheck::Extract {
        link: link.to_string(),
        score,
    }
}

/// Why the batch loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// A batch came back smaller than requested.
    Exhausted,
    /// The per-run cap was reached.
    CapReached,
    /// A full batch contained only records already handled in this run.
    /// Only a store returning duplicate ids can get here.
    NoNewCandidates,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Records taken through the pipeline (counts toward the cap).
    pub processed: usize,
    /// `scraper_failed` outcomes plus records whose status write failed.
    pub failed: usize,
    pub scraped: usize,
    pub skipped: usize,
    pub relevance_failed: usize,
    pub scraper_failed: usize,
    /// Records whose terminal status could not be written.
    pub errored: usize,
}

impl RunSummary {
    fn record(&mut self, status: RecordStatus) {
        self.processed += 1;
        match status {
            RecordStatus::ScraperOk => self.scraped += 1,
            RecordStatus::ScraperSkipped => self.skipped += 1,
            RecordStatus::RelevanceFailed => self.relevance_failed += 1,
            RecordStatus::ScraperFailed => {
                self.scraper_failed += 1;
                self.failed += 1;
            }
            RecordStatus::Pending | RecordStatus::Reprocess => {}
        }
    }

    fn record_error(&mut self) {
        self.processed += 1;
        self.errored += 1;
        self.failed += 1;
    }

    pub fn message(&self, stop: Option<StopReason>) -> String {
        let mut msg = format!(
            "Processed {} URL(s): {} scraped, {} skipped, {} below relevance, {} failed",
            self.processed, self.scraped, self.skipped, self.relevance_failed, self.scraper_failed
        );
        if self.errored > 0 {
            msg.push_str(&format!(", {} not persisted", self.errored));
        }
        match stop {
            Some(StopReason::Exhausted) => msg.push_str(". No more candidates."),
            Some(StopReason::CapReached) => msg.push_str(". Per-run cap reached."),
            Some(StopReason::NoNewCandidates) => {
                msg.push_str(". Only already-handled candidates remained.")
            }
            None => msg.push('.'),
        }
        msg
    }
}

/// What a finished run reports back (also what was written to the run log).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub status: RunStatus,
    pub summary: RunSummary,
    pub stop: Option<StopReason>,
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct ScrapeJob {
    store: ResilientStore,
    extractor: Arc<dyn ArticleExtractor>,
    domains: Arc<DomainSets>,
    settings: JobSettings,
}

impl ScrapeJob {
    pub fn new(
        store: ResilientStore,
        extractor: Arc<dyn ArticleExtractor>,
        domains: Arc<DomainSets>,
        settings: JobSettings,
    ) -> Self {
        Self {
            store,
            extractor,
            domains,
            settings,
        }
    }

    pub fn settings(&self) -> &JobSettings {
        &self.settings
    }

    /// Create the run log in `started` state and return its id.
    pub async fn create_run_log(&self) -> StoreResult<String> {
        let log = RunLog::started(&self.settings.task, Utc::now());
        self.store
            .create(&self.settings.log_collection, log.to_fields())
            .await
    }

    /// Run in the background. Nothing awaits the handle in the service; it is
    /// returned for callers (tests, one-shot tools) that want the report.
    pub fn spawn(&self, run_id: String) -> JoinHandle<RunReport> {
        let job = self.clone();
        tokio::spawn(async move { job.run(&run_id).await })
    }

    /// Full run body. Never fails: every outcome ends up in the run log
    /// (or, if even that write fails, in the operational log).
    pub async fn run(&self, run_id: &str) -> RunReport {
        counter!("scrape_runs_total").increment(1);
        info!(target: "scrape", run_id, "scrape run started");

        let mut summary = RunSummary::default();
        let outcome = self.execute(run_id, &mut summary).await;

        let report = match outcome {
            Ok(stop) => RunReport {
                run_id: run_id.to_string(),
                status: RunStatus::Completed,
                summary,
                stop: Some(stop),
                error: None,
            },
            Err(e) => {
                counter!("scrape_run_failures_total").increment(1);
                error!(target: "scrape", run_id, error = %e, "scrape run failed");
                let message = truncate_chars(&e.to_string(), self.settings.max_error_chars);
                RunReport {
                    run_id: run_id.to_string(),
                    status: RunStatus::Failed,
                    summary,
                    stop: None,
                    error: Some(message),
                }
            }
        };

        if report.status == RunStatus::Failed {
            let fields = final_fields(&report, Utc::now());
            if let Err(e) = self
                .store
                .update(&self.settings.log_collection, run_id, fields)
                .await
            {
                // Nowhere left to report this.
                error!(target: "scrape", run_id, error = %e, "could not mark run log as failed");
            }
        }

        gauge!("scrape_last_run_ts").set(Utc::now().timestamp() as f64);
        info!(
            target: "scrape",
            run_id,
            status = report.status.as_str(),
            processed = report.summary.processed,
            failed = report.summary.failed,
            "scrape run finished"
        );
        report
    }

    /// Everything that can fail the run as a whole, including the
    /// `completed` write itself.
    async fn execute(&self, run_id: &str, summary: &mut RunSummary) -> anyhow::Result<StopReason> {
        let s = &self.settings;

        let mut processing = Fields::new();
        processing.insert("status".into(), RunStatus::Processing.as_str().into());
        self.store.update(&s.log_collection, run_id, processing).await?;

        let stop = self.process_batches(summary).await?;

        let report = RunReport {
            run_id: run_id.to_string(),
            status: RunStatus::Completed,
            summary: summary.clone(),
            stop: Some(stop),
            error: None,
        };
        self.store
            .update(&s.log_collection, run_id, final_fields(&report, Utc::now()))
            .await?;
        Ok(stop)
    }

    async fn process_batches(&self, summary: &mut RunSummary) -> anyhow::Result<StopReason> {
        let s = &self.settings;
        let candidates = RecordStatus::candidate_literals();
        let mut seen: HashSet<String> = HashSet::new();

        loop {
            let remaining = s.max_per_run.saturating_sub(summary.processed);
            if remaining == 0 {
                return Ok(StopReason::CapReached);
            }
            let limit = s.batch_size.min(remaining);
            // A record whose status write failed is still a candidate and may
            // come back ahead of unseen ones; over-fetch by the seen count.
            let requested = limit + seen.len();

            let mut batch = self
                .store
                .query_in(&s.collection, "status", &candidates, requested)
                .await?;

            let mut fetched = 0usize;
            let mut fresh = 0usize;
            while let Some(doc) = batch.next().await {
                let doc = doc?;
                fetched += 1;
                if !seen.insert(doc.id.clone()) {
                    continue;
                }
                fresh += 1;
                let record = UrlRecord::from_document(&doc);
                self.handle_record(&record, summary).await;
                if fresh >= limit || summary.processed >= s.max_per_run {
                    break;
                }
            }

            if summary.processed >= s.max_per_run {
                return Ok(StopReason::CapReached);
            }
            if fresh < limit && fetched < requested {
                return Ok(StopReason::Exhausted);
            }
            if fresh == 0 {
                return Ok(StopReason::NoNewCandidates);
            }
            tokio::time::sleep(s.batch_pause).await;
        }
    }

    /// Process one record and persist its terminal status. Failures are
    /// logged and counted, never propagated.
    async fn handle_record(&self, record: &UrlRecord, summary: &mut RunSummary) {
        let update = self.process_record(record).await;
        let status = update.status();
        let fields = update.into_fields(Utc::now());

        match self
            .store
            .update(&self.settings.collection, &record.id, fields)
            .await
        {
            Ok(()) => {
                summary.record(status);
                counter!("scrape_records_total", "status" => status.as_str()).increment(1);
                info!(target: "scrape", record = %record.id, status = status.as_str(), "record processed");
            }
            Err(e) => {
                summary.record_error();
                counter!("scrape_records_total", "status" => "error").increment(1);
                error!(
                    target: "scrape",
                    record = %record.id,
                    status = status.as_str(),
                    error = %e,
                    "could not persist record outcome"
                );
            }
        }
    }

    /// Decide the terminal update for one record, extracting if relevant.
    pub async fn process_record(&self, record: &UrlRecord) -> RecordUpdate {
        let s = &self.settings;
        match precheck(record, &self.domains, s.threshold) {
            Precheck::MissingLink => RecordUpdate::MissingLink {
                message: MISSING_LINK_MESSAGE.to_string(),
            },
            Precheck::SocialMedia => RecordUpdate::Skipped {
                reason: SOCIAL_MEDIA_REASON.to_string(),
            },
            Precheck::BelowThreshold { score } => RecordUpdate::RelevanceFailed { score },
            Precheck::Extract { link, score } => match self.extract(&link).await {
                Ok(article) => self.scraped(article, score, Utc::now()),
                Err(e) => {
                    let message = if e.is_typed() {
                        format!("article extraction error: {e}")
                    } else {
                        format!("unexpected error: {e}")
                    };
                    warn!(target: "scrape", record = %record.id, error = %e, "extraction failed");
                    RecordUpdate::ScrapeFailed {
                        message: truncate_chars(&message, s.max_error_chars),
                    }
                }
            },
        }
    }

    fn scraped(&self, article: Article, score: f64, now: DateTime<Utc>) -> RecordUpdate {
        let s = &self.settings;
        RecordUpdate::Scraped {
            score: relevance::apply_recency_boost(score, article.publish_date, now),
            content: truncate_chars(&article.text, s.max_content_chars),
            title: article.title,
            authors: article.authors.into_iter().take(s.max_authors).collect(),
            publish_date: article.publish_date,
        }
    }

    async fn extract(&self, link: &str) -> Result<Article, ExtractError> {
        let t0 = Instant::now();
        let fut = self.extractor.extract(link, &self.settings.language);
        let res = match self.settings.extraction_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .unwrap_or_else(|_| Err(ExtractError::Timeout(limit))),
            None => fut.await,
        };
        histogram!("scrape_extract_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        res
    }
}

/// Terminal run-log fields for a report.
fn final_fields(report: &RunReport, now: DateTime<Utc>) -> Fields {
    let mut f = Fields::new();
    f.insert("status".into(), report.status.as_str().into());
    f.insert("end_time".into(), now.into());
    f.insert(
        "processed_count".into(),
        FieldValue::Integer(report.summary.processed as i64),
    );
    f.insert(
        "failed_count".into(),
        FieldValue::Integer(report.summary.failed as i64),
    );
    f.insert("message".into(), report.summary.message(report.stop).into());
    if let Some(err) = &report.error {
        f.insert("error_message".into(), err.as_str().into());
    }
    f
}
