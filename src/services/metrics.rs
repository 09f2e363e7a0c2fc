use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

use crate::models::JobKind;

pub struct MetricsService {
    registry: Registry,
    jobs_submitted: IntCounterVec,
    quota_rejections: IntCounterVec,
    status_polls: IntCounterVec,
    ingestions: IntCounterVec,
    http_errors: IntCounterVec,
}

impl MetricsService {
    pub fn new() -> Self {
        let registry = Registry::new();

        let jobs_submitted = counter_vec(
            &registry,
            "jobs_submitted_total",
            "Jobs accepted by the job service",
            &["kind"],
        );
        let quota_rejections = counter_vec(
            &registry,
            "quota_rejections_total",
            "Submissions refused by the quota gate",
            &["kind"],
        );
        let status_polls = counter_vec(
            &registry,
            "status_polls_total",
            "Status checks by outcome",
            &["outcome"],
        );
        let ingestions = counter_vec(
            &registry,
            "ingestions_total",
            "Result ingestion calls by outcome",
            &["outcome"],
        );
        let http_errors = counter_vec(
            &registry,
            "http_errors_total",
            "HTTP responses with error status",
            &["class"],
        );

        Self {
            registry,
            jobs_submitted,
            quota_rejections,
            status_polls,
            ingestions,
            http_errors,
        }
    }

    pub fn record_submission(&self, kind: JobKind) {
        self.jobs_submitted.with_label_values(&[kind.as_str()]).inc();
    }

    pub fn record_quota_rejection(&self, kind: JobKind) {
        self.quota_rejections.with_label_values(&[kind.as_str()]).inc();
    }

    pub fn record_poll(&self, outcome: &str) {
        self.status_polls.with_label_values(&[outcome]).inc();
    }

    pub fn record_ingestion(&self, success: bool) {
        let outcome = if success { "ok" } else { "error" };
        self.ingestions.with_label_values(&[outcome]).inc();
    }

    pub fn record_error(&self, class: &str) {
        self.http_errors.with_label_values(&[class]).inc();
    }

    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for MetricsService {
    fn default() -> Self {
        Self::new()
    }
}

fn counter_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> IntCounterVec {
    let counter = IntCounterVec::new(Opts::new(name, help), labels)
        .unwrap_or_else(|e| panic!("invalid metric definition {}: {}", name, e));
    // Names are unique within this registry.
    registry
        .register(Box::new(counter.clone()))
        .unwrap_or_else(|e| panic!("duplicate metric {}: {}", name, e));
    counter
}
