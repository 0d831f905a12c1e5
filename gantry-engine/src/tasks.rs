//! Task orchestration service.
//!
//! Persists tasks, runs the decomposition engine against stored tasks, and
//! bridges routing to assignment. Decomposition failures leave the stored
//! task in its pre-decomposition state: the engine mutates a working copy
//! and only a validated result is written back.

use crate::agents::AgentService;
use crate::tenancy::RequestContext;
use gantry_core::{
    GantryResult, NotFoundError, SessionId, Task, TaskId, TaskPriority, TaskStatus,
};
use gantry_registry::RouteRequest;
use gantry_storage::TaskStore;
use gantry_tasks::{estimate_from_task_description, DecompositionEngine, DecompositionOptions};
use std::sync::Arc;

/// Parameters for creating a task.
#[derive(Debug, Clone)]
pub struct CreateTask {
    pub session_id: SessionId,
    pub title: String,
    pub description: Option<String>,
    pub task_type: String,
    pub priority: TaskPriority,
    pub auto_estimate: bool,
}

impl CreateTask {
    pub fn new(session_id: SessionId, title: &str) -> Self {
        Self {
            session_id,
            title: title.to_string(),
            description: None,
            task_type: "implementation".to_string(),
            priority: TaskPriority::Normal,
            auto_estimate: true,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
}

/// Task persistence plus decomposition and assignment orchestration.
pub struct TaskService {
    tasks: Arc<dyn TaskStore>,
    engine: DecompositionEngine,
}

impl TaskService {
    pub fn new(tasks: Arc<dyn TaskStore>) -> Self {
        Self {
            tasks,
            engine: DecompositionEngine::new(),
        }
    }

    pub fn with_engine(mut self, engine: DecompositionEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Create and persist a task, optionally auto-estimating from its
    /// description.
    pub async fn create_task(
        &self,
        ctx: &RequestContext,
        request: CreateTask,
    ) -> GantryResult<Task> {
        let tenant_id = ctx.require_tenant("create_task")?;

        let mut task = Task::new(tenant_id, request.session_id, &request.title)?
            .with_task_type(&request.task_type)
            .with_priority(request.priority);
        if let Some(description) = &request.description {
            task.description = Some(description.clone());
        }
        if request.auto_estimate {
            task.estimate = estimate_from_task_description(&task);
        }

        self.tasks.insert(&task).await?;
        tracing::info!(task_id = %task.id, title = task.title.as_str(), "task created");
        Ok(task)
    }

    pub async fn get_task(
        &self,
        ctx: &RequestContext,
        task_id: TaskId,
    ) -> GantryResult<Option<Task>> {
        let Some(tenant_id) = ctx.tenant_id() else {
            return Ok(None);
        };
        self.tasks.get(task_id, tenant_id).await
    }

    pub async fn list_by_session(
        &self,
        ctx: &RequestContext,
        session_id: SessionId,
    ) -> GantryResult<Vec<Task>> {
        let tenant_id = ctx.require_tenant("list_tasks")?;
        self.tasks.list_by_session(session_id, tenant_id).await
    }

    /// Run the decomposition engine against a stored task. On any cycle or
    /// depth violation the stored task is untouched and the error surfaces.
    pub async fn decompose_task(
        &self,
        ctx: &RequestContext,
        task_id: TaskId,
        options: &DecompositionOptions,
    ) -> GantryResult<Task> {
        let tenant_id = ctx.require_tenant("decompose_task")?;
        let Some(stored) = self.tasks.get(task_id, tenant_id).await? else {
            return Err(NotFoundError::Task(task_id).into());
        };

        // Work on a copy; only a validated expansion is persisted.
        let mut working = stored.clone();
        self.engine.analyze_and_decompose(&mut working, options)?;

        self.tasks.update(&working).await?;
        tracing::info!(
            task_id = %task_id,
            subtasks = working.count_subtasks(None),
            "task decomposed"
        );
        Ok(working)
    }

    /// Route the task by its required capabilities and assign the winner.
    pub async fn route_and_assign(
        &self,
        ctx: &RequestContext,
        task_id: TaskId,
        agents: &AgentService,
    ) -> GantryResult<Task> {
        let tenant_id = ctx.require_tenant("assign_task")?;
        let Some(mut task) = self.tasks.get(task_id, tenant_id).await? else {
            return Err(NotFoundError::Task(task_id).into());
        };

        let mut request =
            RouteRequest::for_capabilities(&task.estimate.required_capabilities);
        request.estimated_complexity = task.estimate.expected_hours().max(1.0);
        let decision = agents.route_task(ctx, &request).await?;

        task.assign_to_agent(decision.selected.id)?;
        agents.registry().increment_task_count(decision.selected.id);
        self.tasks.update(&task).await?;

        tracing::info!(
            task_id = %task_id,
            agent = decision.selected.name.as_str(),
            reason = decision.reason.as_str(),
            "task assigned"
        );
        Ok(task)
    }

    /// Validated status transition on a stored task.
    pub async fn update_status(
        &self,
        ctx: &RequestContext,
        task_id: TaskId,
        target: TaskStatus,
    ) -> GantryResult<Task> {
        let tenant_id = ctx.require_tenant("update_task_status")?;
        let Some(mut task) = self.tasks.get(task_id, tenant_id).await? else {
            return Err(NotFoundError::Task(task_id).into());
        };
        task.update_status(target)?;
        self.tasks.update(&task).await?;
        Ok(task)
    }
}
