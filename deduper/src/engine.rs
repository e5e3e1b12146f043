use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, warn};

use crate::cache::{SeenCache, SeenStatus};
use crate::category::Category;
use crate::error::DedupError;
use crate::fingerprint::fingerprint;
use crate::metrics_consts::{
    DUPLICATES_COUNTER, ERRORS_COUNTER, FAIL_OPEN_COUNTER, FORWARDED_COUNTER,
    PROCESSING_DURATION_HISTOGRAM,
};
use crate::normalizer::Normalizer;
use crate::transport::{IngestMessage, Publisher};

/// What happened to one inbound message.
#[derive(Debug, Default)]
pub struct ProcessReport {
    /// Payloads produced by normalization.
    pub produced: usize,
    /// Payloads published on the deduped topic.
    pub forwarded: usize,
    /// Payloads dropped as already seen.
    pub duplicates: usize,
    /// Payloads forwarded without a cache answer.
    pub fail_open: usize,
    /// Set when the message could not be normalized; nothing was forwarded.
    pub normalize_error: Option<DedupError>,
    pub cache_errors: Vec<DedupError>,
    pub publish_errors: Vec<DedupError>,
}

/// Normalize, fingerprint, check, forward: the dedup logic of one category.
pub struct DedupEngine {
    category: Category,
    deduped_topic: String,
    normalizer: Box<dyn Normalizer>,
    cache: SeenCache,
    publisher: Arc<dyn Publisher + Send + Sync>,
}

impl DedupEngine {
    pub fn new(
        category: Category,
        deduped_topic: impl Into<String>,
        normalizer: Box<dyn Normalizer>,
        cache: SeenCache,
        publisher: Arc<dyn Publisher + Send + Sync>,
    ) -> Self {
        Self {
            category,
            deduped_topic: deduped_topic.into(),
            normalizer,
            cache,
            publisher,
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn deduped_topic(&self) -> &str {
        &self.deduped_topic
    }

    pub async fn process(&self, message: &IngestMessage) -> ProcessReport {
        let start = Instant::now();
        let labels = [("category", self.category.as_str())];
        debug!(category = %self.category, subject = %message.subject, "Processing message");

        let mut report = ProcessReport::default();

        let payloads = match self.normalizer.normalize(&message.payload) {
            Ok(payloads) => payloads,
            Err(e) => {
                warn!(category = %self.category, error = ?e, "Dropping message that could not be normalized");
                metrics::counter!(ERRORS_COUNTER, &[("category", self.category.as_str()), ("kind", e.kind())])
                    .increment(1);
                report.normalize_error = Some(e);
                return report;
            }
        };
        report.produced = payloads.len();

        for payload in payloads {
            let key = fingerprint(&message.subject, &payload.fingerprint_payload);

            match self.cache.check_and_record(&key).await {
                SeenStatus::Duplicate => {
                    report.duplicates += 1;
                    continue;
                }
                SeenStatus::Recorded => {}
                SeenStatus::RecordFailed(write) => report.cache_errors.push(write),
                SeenStatus::ReadFailed { read, write } => {
                    report.fail_open += 1;
                    report.cache_errors.push(read);
                    report.cache_errors.extend(write);
                }
            }

            match self
                .publisher
                .publish(&self.deduped_topic, payload.forward_payload)
                .await
            {
                Ok(()) => report.forwarded += 1,
                Err(e) => {
                    error!(category = %self.category, topic = %self.deduped_topic, error = ?e, "Failed to forward message");
                    report.publish_errors.push(e);
                }
            }
        }

        metrics::counter!(FORWARDED_COUNTER, &labels).increment(report.forwarded as u64);
        metrics::counter!(DUPLICATES_COUNTER, &labels).increment(report.duplicates as u64);
        metrics::counter!(FAIL_OPEN_COUNTER, &labels).increment(report.fail_open as u64);
        for e in report.cache_errors.iter().chain(&report.publish_errors) {
            metrics::counter!(ERRORS_COUNTER, &[("category", self.category.as_str()), ("kind", e.kind())])
                .increment(1);
        }
        metrics::histogram!(PROCESSING_DURATION_HISTOGRAM, &labels)
            .record(start.elapsed().as_secs_f64());

        report
    }
}
