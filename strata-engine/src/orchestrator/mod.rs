//! Deployment orchestrator
//!
//! Composes the template store, deployment store, workspace materializer and
//! pipeline runner into the two deployment pipelines:
//! - provision: `pending -> running(init) -> running(plan) -> running(apply) -> success`
//! - destroy: `success | failed -> destroying -> destroyed`
//!
//! Entry points validate preconditions, take the deployment's lease, persist the
//! first status change and return; the remaining steps run on a background task.

mod pipeline;


use std::sync::Arc;
use strata_core::domain::deployment::{Deployment, DeploymentStatus, PipelineStep};
use strata_core::domain::template::Template;
use strata_core::dto::deployment::CreateDeployment;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::process::PipelineRunner;
use crate::store::{DeploymentStore, TemplateStore};
use crate::workspace::{WorkspaceMaterializer, resolve_bindings};
use pipeline::PipelineRun;

/// Shared dependencies of the orchestrator and its pipeline tasks
pub(crate) struct Inner {
    pub(crate) templates: Arc<dyn TemplateStore>,
    pub(crate) deployments: Arc<dyn DeploymentStore>,
    pub(crate) runner: Arc<dyn PipelineRunner>,
    pub(crate) materializer: WorkspaceMaterializer,
    pub(crate) config: EngineConfig,
}

/// A pipeline that has been launched
///
/// Dropping the handle detaches the pipeline; it keeps running to completion.
pub struct PipelineHandle {
    /// The deployment as persisted after the pipeline's first status write
    pub deployment: Deployment,
    task: JoinHandle<()>,
}

impl PipelineHandle {
    /// Waits for the background pipeline to settle
    pub async fn wait(self) {
        if let Err(e) = self.task.await {
            warn!(
                "Pipeline task for deployment {} ended abnormally: {}",
                self.deployment.id, e
            );
        }
    }
}

/// Entry point for deployment lifecycle operations
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(
        templates: Arc<dyn TemplateStore>,
        deployments: Arc<dyn DeploymentStore>,
        runner: Arc<dyn PipelineRunner>,
        config: EngineConfig,
    ) -> Self {
        let materializer = WorkspaceMaterializer::new(config.workspace_root.clone());
        Self {
            inner: Arc::new(Inner {
                templates,
                deployments,
                runner,
                materializer,
                config,
            }),
        }
    }

    /// Records a new deployment in `pending`
    ///
    /// The template must exist and the supplied variables must resolve against
    /// its schema; nothing is written otherwise.
    pub async fn create_deployment(&self, req: CreateDeployment) -> Result<Deployment> {
        validate_create_request(&req)?;

        let template = self.lookup_template(&req.template_id).await?;
        resolve_bindings(&template, &req.variables)?;

        let id = Uuid::new_v4();
        let now = chrono::Utc::now();

        let deployment = Deployment {
            id,
            name: req.name.trim().to_string(),
            template_id: req.template_id,
            environment: req.environment,
            variables: req.variables,
            status: DeploymentStatus::Pending,
            workspace_path: self.inner.materializer.path_for(id),
            log: String::new(),
            state_snapshot: None,
            last_action: None,
            created_at: now,
            updated_at: now,
        };

        self.inner.deployments.insert(&deployment).await?;

        info!(
            "Deployment created: {} ({}) from template {}",
            deployment.name, deployment.id, deployment.template_id
        );

        Ok(deployment)
    }

    /// Creates a deployment and immediately launches its provision pipeline
    pub async fn create_and_provision(&self, req: CreateDeployment) -> Result<PipelineHandle> {
        let deployment = self.create_deployment(req).await?;
        self.launch_provision(deployment.id).await
    }

    pub async fn get_deployment(&self, id: Uuid) -> Result<Deployment> {
        self.inner
            .deployments
            .find_by_id(id)
            .await?
            .ok_or(EngineError::NotFound(id))
    }

    pub async fn list_deployments(&self) -> Result<Vec<Deployment>> {
        Ok(self.inner.deployments.list_all().await?)
    }

    pub async fn list_templates(&self) -> Result<Vec<Template>> {
        Ok(self.inner.templates.list().await?)
    }

    /// Launches the provision pipeline (init, plan, apply)
    ///
    /// Allowed from `pending`, `failed` and `destroyed`. Template lookup and
    /// variable resolution happen before any write, so a precondition failure
    /// leaves the status untouched and creates no workspace.
    pub async fn launch_provision(&self, id: Uuid) -> Result<PipelineHandle> {
        let deployment = self.get_deployment(id).await?;
        ensure_status(&deployment, DeploymentStatus::can_provision, "provision")?;

        let template = self.lookup_template(&deployment.template_id).await?;
        resolve_bindings(&template, &deployment.variables)?;

        let mut run = self.begin(&deployment, DeploymentStatus::can_provision, "provision").await?;

        if let Err(e) = run
            .enter_step(DeploymentStatus::Running, PipelineStep::Init)
            .await
        {
            run.release().await;
            return Err(e);
        }

        let deployment = match self.get_deployment(id).await {
            Ok(deployment) => deployment,
            Err(e) => {
                run.release().await;
                return Err(e);
            }
        };
        let task = tokio::spawn(run.provision(template));

        info!("Provision launched for deployment {}", id);

        Ok(PipelineHandle { deployment, task })
    }

    /// Launches the destroy pipeline
    ///
    /// Allowed from `success`, `failed` and `destroy_failed`; in particular it is
    /// rejected while a provision is still running. The workspace must exist.
    pub async fn launch_destroy(&self, id: Uuid) -> Result<PipelineHandle> {
        let deployment = self.get_deployment(id).await?;
        ensure_status(&deployment, DeploymentStatus::can_destroy, "destroy")?;

        let workspace = deployment.workspace_path.clone();
        if !workspace.is_dir() {
            return Err(EngineError::precondition(format!(
                "workspace {} for deployment {} does not exist",
                workspace.display(),
                id
            )));
        }

        let mut run = self.begin(&deployment, DeploymentStatus::can_destroy, "destroy").await?;

        if let Err(e) = run
            .enter_step(DeploymentStatus::Destroying, PipelineStep::Destroy)
            .await
        {
            run.release().await;
            return Err(e);
        }

        let deployment = match self.get_deployment(id).await {
            Ok(deployment) => deployment,
            Err(e) => {
                run.release().await;
                return Err(e);
            }
        };
        let task = tokio::spawn(run.destroy(workspace));

        info!("Destroy launched for deployment {}", id);

        Ok(PipelineHandle { deployment, task })
    }

    /// Removes a settled deployment record
    ///
    /// Only `destroyed` and `failed` records may be removed. The workspace of a
    /// destroyed deployment is deleted with it; a failed one keeps its workspace
    /// because it may still hold state for partially created resources.
    pub async fn delete_deployment(&self, id: Uuid) -> Result<()> {
        let deployment = self.get_deployment(id).await?;
        ensure_status(&deployment, DeploymentStatus::can_delete, "delete")?;

        let holder = format!("delete-{}", Uuid::new_v4());
        let acquired = self
            .inner
            .deployments
            .try_acquire_lease(id, &holder, self.inner.config.lease_ttl)
            .await?;
        if !acquired {
            return Err(EngineError::PipelineInProgress(id));
        }

        let result = self.delete_leased(id).await;

        if result.is_err() {
            if let Err(e) = self.inner.deployments.release_lease(id, &holder).await {
                warn!("Failed to release lease on deployment {}: {}", id, e);
            }
        }

        result
    }

    /// Deletes the record once the caller holds its lease
    async fn delete_leased(&self, id: Uuid) -> Result<()> {
        // Status may have moved between the first check and taking the lease
        let deployment = self.get_deployment(id).await?;
        ensure_status(&deployment, DeploymentStatus::can_delete, "delete")?;

        if !self.inner.deployments.delete(id).await? {
            return Err(EngineError::NotFound(id));
        }

        if deployment.status == DeploymentStatus::Destroyed {
            if let Err(e) = self.inner.materializer.remove(&deployment.workspace_path) {
                warn!(
                    "Failed to remove workspace {}: {}",
                    deployment.workspace_path.display(),
                    e
                );
            }
        }

        info!("Deployment deleted: {}", id);
        Ok(())
    }

    async fn lookup_template(&self, template_id: &str) -> Result<Template> {
        self.inner
            .templates
            .lookup(template_id)
            .await?
            .ok_or_else(|| EngineError::precondition(format!("template '{}' not found", template_id)))
    }

    /// Takes the deployment's lease and re-checks its status under it
    async fn begin(
        &self,
        deployment: &Deployment,
        allowed: fn(DeploymentStatus) -> bool,
        action: &'static str,
    ) -> Result<PipelineRun> {
        let id = deployment.id;
        let holder = format!("pipeline-{}", Uuid::new_v4());

        let acquired = self
            .inner
            .deployments
            .try_acquire_lease(id, &holder, self.inner.config.lease_ttl)
            .await?;
        if !acquired {
            return Err(EngineError::PipelineInProgress(id));
        }

        let run = |status| PipelineRun::new(Arc::clone(&self.inner), id, holder.clone(), status);

        match self.inner.deployments.find_by_id(id).await {
            Ok(Some(current)) if allowed(current.status) => Ok(run(current.status)),
            Ok(Some(current)) => {
                run(current.status).release().await;
                Err(EngineError::InvalidState {
                    id,
                    status: current.status,
                    action,
                })
            }
            Ok(None) => Err(EngineError::NotFound(id)),
            Err(e) => {
                run(deployment.status).release().await;
                Err(e.into())
            }
        }
    }
}

fn ensure_status(
    deployment: &Deployment,
    allowed: fn(DeploymentStatus) -> bool,
    action: &'static str,
) -> Result<()> {
    if allowed(deployment.status) {
        Ok(())
    } else {
        Err(EngineError::InvalidState {
            id: deployment.id,
            status: deployment.status,
            action,
        })
    }
}

// =============================================================================
// Validation
// =============================================================================

fn validate_create_request(req: &CreateDeployment) -> Result<()> {
    if req.name.trim().is_empty() {
        return Err(EngineError::Validation(
            "Deployment name cannot be empty".to_string(),
        ));
    }

    if req.name.len() > 255 {
        return Err(EngineError::Validation(
            "Deployment name is too long (max 255 characters)".to_string(),
        ));
    }

    if req.environment.trim().is_empty() {
        return Err(EngineError::Validation(
            "Environment cannot be empty".to_string(),
        ));
    }

    Ok(())
}
