use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    api::validate_request_id,
    database::RecordStore,
    errors::{AppError, Result},
    models::{JobKind, JobStatus},
    services::poller::{JobPoller, JobSnapshot, PollHandle, PollPhase},
};

/// Most jobs one user may have observed at a time.
pub const MAX_JOBS_PER_OWNER: usize = 8;

struct Tracked {
    owner: Uuid,
    handle: Arc<PollHandle>,
}

impl Tracked {
    /// Reached a terminal status and no timer is left running.
    fn is_finished(&self) -> bool {
        !self.handle.is_polling()
            && self
                .handle
                .snapshot()
                .status
                .as_ref()
                .map_or(false, JobStatus::is_terminal)
    }
}

/// Jobs currently observed on behalf of signed-in users, keyed by request id.
///
/// Each user has at most one interval-polled job per kind: tracking a new
/// submission cancels the previous one of the same kind. Finished jobs are
/// evicted when new ones are added.
pub struct JobRegistry {
    poller: JobPoller,
    store: Arc<dyn RecordStore>,
    jobs: RwLock<HashMap<String, Tracked>>,
}

impl JobRegistry {
    pub fn new(poller: JobPoller, store: Arc<dyn RecordStore>) -> Self {
        Self {
            poller,
            store,
            jobs: RwLock::new(HashMap::new()),
        }
    }

    pub fn poller(&self) -> &JobPoller {
        &self.poller
    }

    /// Takes over a submitted handle, replacing the owner's earlier job of the same kind.
    pub async fn track(&self, owner: Uuid, handle: PollHandle) -> Result<Arc<PollHandle>> {
        let request_id = handle
            .request_id()
            .ok_or_else(|| AppError::Validation("Job has not been submitted yet".to_string()))?
            .to_string();
        let kind = handle.kind();
        let handle = Arc::new(handle);

        let mut jobs = self.jobs.write().await;
        if jobs.get(&request_id).map_or(false, |t| t.owner != owner) {
            return Err(AppError::NotFound);
        }
        evict_finished(&mut jobs);

        let replaced: Vec<String> = jobs
            .iter()
            .filter(|(id, t)| t.owner == owner && t.handle.kind() == kind && **id != request_id)
            .map(|(id, _)| id.clone())
            .collect();

        for id in replaced {
            if let Some(old) = jobs.remove(&id) {
                old.handle.cancel();
                tracing::debug!(request_id = %id, user_id = %owner, "Stopped observing replaced job");
            }
        }

        jobs.insert(
            request_id.clone(),
            Tracked {
                owner,
                handle: handle.clone(),
            },
        );
        tracing::info!(request_id = %request_id, user_id = %owner, kind = kind.as_str(), "Tracking job");
        Ok(handle)
    }

    /// Starts interval polling of a job submitted elsewhere.
    pub async fn watch(&self, owner: Uuid, kind: JobKind, request_id: String) -> Result<Arc<PollHandle>> {
        self.track(owner, self.poller.watch(kind, request_id)).await
    }

    pub async fn get(&self, owner: Uuid, request_id: &str) -> Result<Arc<PollHandle>> {
        match self.jobs.read().await.get(request_id) {
            Some(tracked) if tracked.owner == owner => Ok(tracked.handle.clone()),
            _ => Err(AppError::NotFound),
        }
    }

    /// Kind of a job `owner` submitted, from the stored training or generation
    /// record. Jobs of other users and unknown ids are `NotFound`.
    pub async fn owned_kind(&self, owner: Uuid, request_id: &str) -> Result<JobKind> {
        validate_request_id(request_id)?;

        if let Some(request) = self.store.find_training_request(request_id).await? {
            return if request.user_id == owner {
                Ok(JobKind::Training)
            } else {
                Err(AppError::NotFound)
            };
        }
        match self.store.find_generation_job(request_id).await? {
            Some(job) if job.user_id == owner => Ok(JobKind::Generation),
            _ => Err(AppError::NotFound),
        }
    }

    /// Manual status check. Jobs not yet tracked (e.g. after a restart) are
    /// attached for manual refresh only. A submitted job whose interval
    /// stopped on errors is resumed while it is still running.
    pub async fn refresh(&self, owner: Uuid, request_id: &str) -> Result<JobSnapshot> {
        let (handle, attached) = match self.get(owner, request_id).await {
            Ok(handle) => (handle, false),
            Err(AppError::NotFound) => (self.attach(owner, request_id).await?, true),
            Err(e) => return Err(e),
        };

        let snapshot = handle.refresh().await?;
        if !attached && snapshot.phase == PollPhase::Polling && handle.resume() {
            tracing::debug!(request_id = %request_id, "Resumed interval polling");
        }
        Ok(snapshot)
    }

    async fn attach(&self, owner: Uuid, request_id: &str) -> Result<Arc<PollHandle>> {
        let kind = self.owned_kind(owner, request_id).await?;

        let mut jobs = self.jobs.write().await;
        if let Some(tracked) = jobs.get(request_id) {
            return if tracked.owner == owner {
                Ok(tracked.handle.clone())
            } else {
                Err(AppError::NotFound)
            };
        }

        evict_finished(&mut jobs);
        let owned = jobs.values().filter(|t| t.owner == owner).count();
        if owned >= MAX_JOBS_PER_OWNER {
            tracing::warn!(user_id = %owner, owned, "Too many observed jobs");
            return Err(AppError::Validation(
                "Too many jobs are being followed. Stop one before refreshing another.".to_string(),
            ));
        }

        let handle = Arc::new(self.poller.attach(kind, request_id.to_string()));
        jobs.insert(
            request_id.to_string(),
            Tracked {
                owner,
                handle: handle.clone(),
            },
        );
        Ok(handle)
    }

    pub async fn stop(&self, owner: Uuid, request_id: &str) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        match jobs.get(request_id) {
            Some(tracked) if tracked.owner == owner => {
                if let Some(tracked) = jobs.remove(request_id) {
                    tracked.handle.cancel();
                }
                tracing::debug!(request_id = %request_id, "Stopped observing job");
                Ok(())
            }
            _ => Err(AppError::NotFound),
        }
    }

    /// Stops every job observed for `owner`; returns how many were stopped.
    pub async fn stop_all_for(&self, owner: Uuid) -> usize {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, tracked| {
            let keep = tracked.owner != owner;
            if !keep {
                tracked.handle.cancel();
            }
            keep
        });
        before - jobs.len()
    }

    pub async fn shutdown(&self) {
        let mut jobs = self.jobs.write().await;
        for (_, tracked) in jobs.drain() {
            tracked.handle.cancel();
        }
        tracing::info!("Stopped all job polling");
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }
}

fn evict_finished(jobs: &mut HashMap<String, Tracked>) {
    jobs.retain(|request_id, tracked| {
        let finished = tracked.is_finished();
        if finished {
            tracing::debug!(request_id = %request_id, "Evicted finished job");
        }
        !finished
    });
}
