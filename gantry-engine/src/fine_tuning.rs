//! Fine-tuning job service.
//!
//! A storage collaborator, not part of the scheduling kernel: it shares the
//! lock manager and the tenancy model. All transitions are serialized under
//! `finetuning:{id}`.

use crate::tenancy::RequestContext;
use gantry_core::{
    FineTuningJob, GantryResult, JobId, NotFoundError, OrchestratorConfig, TrainingMetrics,
};
use gantry_locks::{AcquireOptions, LockManager};
use gantry_storage::FineTuningStore;
use std::sync::Arc;

/// Lifecycle service for fine-tuning jobs.
pub struct FineTuningService {
    jobs: Arc<dyn FineTuningStore>,
    locks: Arc<LockManager>,
    config: OrchestratorConfig,
    owner: String,
}

impl FineTuningService {
    pub fn new(
        jobs: Arc<dyn FineTuningStore>,
        locks: Arc<LockManager>,
        config: OrchestratorConfig,
    ) -> Self {
        let owner = format!("fine-tuning-{}", uuid::Uuid::now_v7().simple());
        Self {
            jobs,
            locks,
            config,
            owner,
        }
    }

    fn lock_options(&self) -> AcquireOptions {
        AcquireOptions::default().with_timeout(self.config.lock_acquire_timeout)
    }

    pub async fn create_job(
        &self,
        ctx: &RequestContext,
        base_model: &str,
        target_model_name: &str,
    ) -> GantryResult<FineTuningJob> {
        let tenant_id = ctx.require_tenant("create_fine_tuning_job")?;
        let job = FineTuningJob::new(tenant_id, base_model, target_model_name)?;
        self.jobs.insert(&job).await?;
        tracing::info!(job_id = %job.id, base_model, "fine-tuning job created");
        Ok(job)
    }

    pub async fn get_job(
        &self,
        ctx: &RequestContext,
        job_id: JobId,
    ) -> GantryResult<Option<FineTuningJob>> {
        let Some(tenant_id) = ctx.tenant_id() else {
            return Ok(None);
        };
        self.jobs.get(job_id, tenant_id).await
    }

    /// Queue the job for training with its dataset.
    pub async fn start_job(
        &self,
        ctx: &RequestContext,
        job_id: JobId,
        dataset_path: &str,
        sample_count: u64,
    ) -> GantryResult<FineTuningJob> {
        let dataset_path = dataset_path.to_string();
        self.mutate(ctx, job_id, move |job| {
            job.start_training(&dataset_path, sample_count)?;
            Ok(())
        })
        .await
    }

    pub async fn complete_job(
        &self,
        ctx: &RequestContext,
        job_id: JobId,
        metrics: TrainingMetrics,
    ) -> GantryResult<FineTuningJob> {
        self.mutate(ctx, job_id, move |job| {
            job.complete(metrics)?;
            Ok(())
        })
        .await
    }

    pub async fn fail_job(
        &self,
        ctx: &RequestContext,
        job_id: JobId,
        reason: &str,
    ) -> GantryResult<FineTuningJob> {
        let reason = reason.to_string();
        self.mutate(ctx, job_id, move |job| {
            job.fail(&reason)?;
            Ok(())
        })
        .await
    }

    /// Reset a terminal failed/cancelled job back to `pending`.
    pub async fn retry_job(&self, ctx: &RequestContext, job_id: JobId) -> GantryResult<FineTuningJob> {
        self.mutate(ctx, job_id, |job| {
            job.retry()?;
            Ok(())
        })
        .await
    }

    async fn mutate<F>(
        &self,
        ctx: &RequestContext,
        job_id: JobId,
        apply: F,
    ) -> GantryResult<FineTuningJob>
    where
        F: FnOnce(&mut FineTuningJob) -> GantryResult<()> + Send,
    {
        let tenant_id = ctx.require_tenant("mutate_fine_tuning_job")?;
        let jobs = Arc::clone(&self.jobs);
        let resource = format!("finetuning:{job_id}");

        self.locks
            .with_lock(&resource, &self.owner, self.lock_options(), || async move {
                let Some(mut job) = jobs.get(job_id, tenant_id).await? else {
                    return Err(NotFoundError::Entity {
                        entity: "fine_tuning_job".into(),
                        id: job_id.to_string(),
                    }
                    .into());
                };
                apply(&mut job)?;
                jobs.update(&job).await?;
                Ok(job)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::{FineTuningStatus, TenantId};
    use gantry_core::EntityIdType;
    use gantry_locks::MemoryLeaseStore;
    use gantry_storage::MemoryStore;

    fn service() -> (FineTuningService, RequestContext) {
        let store = Arc::new(MemoryStore::new());
        let locks = Arc::new(LockManager::new(Arc::new(MemoryLeaseStore::new())));
        let service = FineTuningService::new(
            store as Arc<dyn FineTuningStore>,
            locks,
            OrchestratorConfig::default(),
        );
        (service, RequestContext::for_tenant(TenantId::now_v7()))
    }

    #[tokio::test]
    async fn test_job_lifecycle_under_locks() {
        let (service, ctx) = service();
        let job = service
            .create_job(&ctx, "base/model-7b", "tuned-model")
            .await
            .expect("create");

        let queued = service
            .start_job(&ctx, job.id, "/data/set.jsonl", 500)
            .await
            .expect("start");
        assert_eq!(queued.status, FineTuningStatus::Queued);

        let failed = service
            .fail_job(&ctx, job.id, "spot instance reclaimed")
            .await
            .expect("fail");
        assert_eq!(failed.status, FineTuningStatus::Failed);

        let retried = service.retry_job(&ctx, job.id).await.expect("retry");
        assert_eq!(retried.status, FineTuningStatus::Pending);
    }

    #[tokio::test]
    async fn test_invalid_transition_surfaces_state_error() {
        let (service, ctx) = service();
        let job = service
            .create_job(&ctx, "base/model-7b", "tuned-model")
            .await
            .expect("create");

        let err = service
            .complete_job(&ctx, job.id, TrainingMetrics::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "state");
    }
}
