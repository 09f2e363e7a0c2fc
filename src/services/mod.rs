pub mod artifacts;
pub mod metrics;
pub mod poller;
pub mod quota_gate;
pub mod registry;
pub mod submission;

pub use artifacts::ArtifactFetcher;
pub use metrics::MetricsService;
pub use poller::{JobPoller, JobSnapshot, PollConfig, PollEvent, PollHandle, PollOutcome, PollPhase};
pub use quota_gate::QuotaGate;
pub use registry::JobRegistry;
pub use submission::JobSubmitter;
