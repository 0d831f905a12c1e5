//! Tenant and fine-tuning entities.

use crate::error::{StateError, ValidationError};
use crate::identity::{EntityIdType, JobId, TenantId, Timestamp};
use crate::FineTuningStatus;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// ============================================================================
// TENANT
// ============================================================================

/// An organization or team using the orchestrator. Isolation boundary for
/// every other entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    /// URL-safe unique identifier, `[a-z0-9-]+`
    pub slug: String,

    // Quotas
    pub max_concurrent_sessions: i64,
    pub max_tokens_per_month: i64,

    // Operational state
    pub is_active: bool,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    pub created_at: Timestamp,
}

impl Tenant {
    /// Create a tenant with default quotas after validating name and slug.
    pub fn new(name: &str, slug: &str) -> Result<Self, ValidationError> {
        let name = name.trim();
        if name.len() < 2 || name.len() > 100 {
            return Err(ValidationError::InvalidValue {
                field: "name".into(),
                reason: "must be 2-100 characters".into(),
            });
        }
        validate_slug(slug)?;

        Ok(Self {
            id: TenantId::now_v7(),
            name: name.to_string(),
            slug: slug.to_string(),
            max_concurrent_sessions: 10,
            max_tokens_per_month: 1_000_000,
            is_active: true,
            metadata: BTreeMap::new(),
            created_at: Utc::now(),
        })
    }

    pub fn with_max_concurrent_sessions(mut self, max: i64) -> Self {
        self.max_concurrent_sessions = max;
        self
    }

    pub fn with_max_tokens_per_month(mut self, max: i64) -> Self {
        self.max_tokens_per_month = max;
        self
    }
}

fn validate_slug(slug: &str) -> Result<(), ValidationError> {
    if slug.is_empty()
        || !slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(ValidationError::InvalidValue {
            field: "slug".into(),
            reason: format!("'{slug}' must match [a-z0-9-]+"),
        });
    }
    Ok(())
}

// ============================================================================
// FINE-TUNING JOB
// ============================================================================

/// Configuration for a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingParameters {
    pub epochs: u32,
    pub learning_rate: f64,
    pub batch_size: u32,
    pub lora_rank: u32,
    pub lora_alpha: u32,
    pub target_modules: Vec<String>,
}

impl Default for TrainingParameters {
    fn default() -> Self {
        Self {
            epochs: 3,
            learning_rate: 5e-5,
            batch_size: 4,
            lora_rank: 8,
            lora_alpha: 16,
            target_modules: vec!["q_proj".to_string(), "v_proj".to_string()],
        }
    }
}

/// Metrics collected during training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TrainingMetrics {
    pub final_loss: Option<f64>,
    pub eval_loss: Option<f64>,
    pub accuracy: Option<f64>,
    pub training_duration_seconds: Option<f64>,
    pub tokens_processed: u64,
}

/// A fine-tuning job. Shares the lock manager and tenancy model with the
/// scheduling kernel but adds no scheduling logic of its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FineTuningJob {
    pub id: JobId,
    pub tenant_id: TenantId,
    pub base_model: String,
    pub target_model_name: String,
    pub status: FineTuningStatus,

    /// Provider-side job identifier
    pub external_job_id: Option<String>,

    // Dataset details
    pub dataset_path: Option<String>,
    pub sample_count: u64,

    pub parameters: TrainingParameters,
    pub metrics: TrainingMetrics,

    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub error_message: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl FineTuningJob {
    pub fn new(
        tenant_id: TenantId,
        base_model: &str,
        target_model_name: &str,
    ) -> Result<Self, ValidationError> {
        if base_model.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "base_model".into(),
            });
        }
        if target_model_name.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "target_model_name".into(),
            });
        }

        Ok(Self {
            id: JobId::now_v7(),
            tenant_id,
            base_model: base_model.trim().to_string(),
            target_model_name: target_model_name.trim().to_string(),
            status: FineTuningStatus::Pending,
            external_job_id: None,
            dataset_path: None,
            sample_count: 0,
            parameters: TrainingParameters::default(),
            metrics: TrainingMetrics::default(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error_message: None,
            metadata: BTreeMap::new(),
        })
    }

    /// Validated state transition with lifecycle timestamp stamping.
    pub fn transition_to(&mut self, target: FineTuningStatus) -> Result<(), StateError> {
        if !self.status.can_transition_to(target) {
            return Err(StateError::InvalidFineTuningTransition {
                current: self.status,
                target,
            });
        }

        self.status = target;
        match target {
            FineTuningStatus::Running => self.started_at = Some(Utc::now()),
            FineTuningStatus::Completed
            | FineTuningStatus::Failed
            | FineTuningStatus::Cancelled => self.completed_at = Some(Utc::now()),
            _ => {}
        }
        Ok(())
    }

    /// Record the dataset and queue the job for training.
    pub fn start_training(&mut self, dataset_path: &str, sample_count: u64) -> Result<(), StateError> {
        if self.status != FineTuningStatus::Pending {
            return Err(StateError::InvalidFineTuningTransition {
                current: self.status,
                target: FineTuningStatus::Queued,
            });
        }
        self.dataset_path = Some(dataset_path.to_string());
        self.sample_count = sample_count;
        self.transition_to(FineTuningStatus::Queued)
    }

    /// Finalize with success.
    pub fn complete(&mut self, metrics: TrainingMetrics) -> Result<(), StateError> {
        self.metrics = metrics;
        self.transition_to(FineTuningStatus::Completed)
    }

    /// Mark as failed with a reason.
    pub fn fail(&mut self, reason: &str) -> Result<(), StateError> {
        self.error_message = Some(reason.to_string());
        self.transition_to(FineTuningStatus::Failed)
    }

    /// Reset a terminal failed/cancelled job back to pending for retry.
    pub fn retry(&mut self) -> Result<(), StateError> {
        self.error_message = None;
        self.transition_to(FineTuningStatus::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::EntityIdType;

    #[test]
    fn test_tenant_slug_validation() {
        assert!(Tenant::new("Acme Corp", "acme-corp").is_ok());
        assert!(Tenant::new("Acme Corp", "Acme Corp").is_err());
        assert!(Tenant::new("Acme Corp", "").is_err());
        assert!(Tenant::new("A", "acme").is_err());
    }

    #[test]
    fn test_job_lifecycle() {
        let mut job =
            FineTuningJob::new(TenantId::now_v7(), "base/model-7b", "tuned-model").unwrap();
        job.start_training("/data/set.jsonl", 1200).expect("queue");
        assert_eq!(job.status, FineTuningStatus::Queued);
        assert_eq!(job.sample_count, 1200);

        job.transition_to(FineTuningStatus::Running).expect("run");
        assert!(job.started_at.is_some());

        job.complete(TrainingMetrics::default()).expect("complete");
        assert_eq!(job.status, FineTuningStatus::Completed);
        assert!(job.completed_at.is_some());

        // Completed is strictly terminal
        assert!(job.retry().is_err());
    }

    #[test]
    fn test_job_retry_from_failed() {
        let mut job =
            FineTuningJob::new(TenantId::now_v7(), "base/model-7b", "tuned-model").unwrap();
        job.start_training("/data/set.jsonl", 10).expect("queue");
        job.transition_to(FineTuningStatus::Running).expect("run");
        job.fail("out of memory").expect("fail");
        assert_eq!(job.error_message.as_deref(), Some("out of memory"));

        job.retry().expect("retry");
        assert_eq!(job.status, FineTuningStatus::Pending);
        assert!(job.error_message.is_none());
    }
}
