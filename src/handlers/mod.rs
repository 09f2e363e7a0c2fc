use std::sync::Arc;

use crate::{
    api::JobApi,
    auth::SessionVerifier,
    config::Config,
    database::RecordStore,
    services::{
        artifacts::ArtifactFetcher,
        metrics::MetricsService,
        poller::{JobPoller, PollConfig},
        quota_gate::QuotaGate,
        registry::JobRegistry,
        submission::JobSubmitter,
    },
};

pub mod admin;
pub mod docs;
pub mod health;
pub mod images;
pub mod jobs;
pub mod metrics;
pub mod plans;
pub mod session;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn RecordStore>,
    pub quota: QuotaGate,
    pub submitter: JobSubmitter,
    pub registry: Arc<JobRegistry>,
    pub artifacts: ArtifactFetcher,
    pub sessions: Arc<SessionVerifier>,
    pub metrics: Arc<MetricsService>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn RecordStore>, api: Arc<dyn JobApi>) -> Self {
        let metrics = Arc::new(MetricsService::new());
        let quota = QuotaGate::new(store.clone());
        let artifacts = ArtifactFetcher::new(store.clone());

        let submitter =
            JobSubmitter::new(api.clone(), quota.clone(), store.clone()).with_metrics(metrics.clone());
        let poller = JobPoller::new(api, artifacts.clone(), PollConfig::from_config(&config))
            .with_progress_store(store.clone())
            .with_metrics(metrics.clone());
        let registry = Arc::new(JobRegistry::new(poller, store.clone()));
        let sessions = Arc::new(SessionVerifier::new(&config.jwt_secret, &config.jwt_audience));

        Self {
            config,
            store,
            quota,
            submitter,
            registry,
            artifacts,
            sessions,
            metrics,
        }
    }
}
