//! Pipeline execution
//!
//! A [`PipelineRun`] drives one provision or destroy invocation for a single
//! deployment. Every step follows the same protocol:
//! 1. transition status and append a section header
//! 2. persist before the external process starts
//! 3. invoke the runner
//! 4. append the captured output
//! 5. on failure persist the failed terminal state and stop
//!
//! The run owns the deployment's lease for its whole lifetime. If a step ends
//! in an error rather than a tool failure (a store write failed, say), the run
//! still moves the deployment to a failed status before giving up the lease.

use chrono::SecondsFormat;
use std::path::Path;
use std::sync::Arc;
use strata_core::domain::deployment::{DeploymentStatus, PipelineStep};
use strata_core::domain::template::Template;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::Inner;
use crate::error::{EngineError, Result};
use crate::process::StepOutput;
use crate::store::{SnapshotChange, Transition};

pub(crate) struct PipelineRun {
    id: Uuid,
    holder: String,
    status: DeploymentStatus,
    /// Step most recently entered
    step: PipelineStep,
    inner: Arc<Inner>,
}

impl PipelineRun {
    /// Starts a run for a deployment whose stored status is `status`
    ///
    /// The caller must already hold the lease under `holder`.
    pub(crate) fn new(inner: Arc<Inner>, id: Uuid, holder: String, status: DeploymentStatus) -> Self {
        Self {
            id,
            holder,
            status,
            step: PipelineStep::Init,
            inner,
        }
    }

    /// Renews the lease, then moves into `step` and persists its header
    pub(crate) async fn enter_step(&mut self, to: DeploymentStatus, step: PipelineStep) -> Result<()> {
        let renewed = self
            .inner
            .deployments
            .try_acquire_lease(self.id, &self.holder, self.inner.config.lease_ttl)
            .await?;

        if !renewed {
            return Err(EngineError::PipelineInProgress(self.id));
        }

        self.step = step;
        self.transition(to, step.as_str(), section_header(step.as_str()), SnapshotChange::Keep)
            .await
    }

    /// Runs the provision steps after the init header has been persisted
    pub(crate) async fn provision(mut self, template: Template) {
        info!("Provision pipeline started for deployment {}", self.id);

        if let Err(e) = self.provision_steps(&template).await {
            error!("Provision pipeline for deployment {} aborted: {}", self.id, e);
            self.abort(&e).await;
        }

        self.release().await;
    }

    /// Runs the destroy step after the destroy header has been persisted
    pub(crate) async fn destroy(mut self, workspace: std::path::PathBuf) {
        info!("Destroy pipeline started for deployment {}", self.id);

        if let Err(e) = self.destroy_steps(&workspace).await {
            error!("Destroy pipeline for deployment {} aborted: {}", self.id, e);
            self.abort(&e).await;
        }

        self.release().await;
    }

    pub(crate) async fn release(&self) {
        if let Err(e) = self
            .inner
            .deployments
            .release_lease(self.id, &self.holder)
            .await
        {
            warn!("Failed to release lease on deployment {}: {}", self.id, e);
        }
    }

    /// Settles a run that ended in an error into the failed status of its step
    ///
    /// Best effort: the write is attempted twice, after which the record is left
    /// for lease expiry and manual recovery.
    async fn abort(&mut self, cause: &EngineError) {
        if !self.status.is_active() {
            return;
        }

        let to = match self.status {
            DeploymentStatus::Destroying => DeploymentStatus::DestroyFailed,
            _ => DeploymentStatus::Failed,
        };
        let step = self.step;
        let text = format!("!!! {} aborted: {}\n", step, cause);

        for attempt in 1..=2 {
            match self
                .transition(to, step.failed_action(), text.clone(), SnapshotChange::Keep)
                .await
            {
                Ok(()) => {
                    warn!("Deployment {} marked {} after {} aborted", self.id, to, step);
                    return;
                }
                Err(e) => error!(
                    "Deployment {}: could not record aborted {} (attempt {}): {}",
                    self.id, step, attempt, e
                ),
            }
        }
    }

    async fn provision_steps(&mut self, template: &Template) -> Result<()> {
        let deployment = self
            .inner
            .deployments
            .find_by_id(self.id)
            .await?
            .ok_or(EngineError::NotFound(self.id))?;

        // Materializing is part of init: a workspace failure fails that step
        let workspace = match self.inner.materializer.render(&deployment, template) {
            Ok(path) => path,
            Err(e) => {
                warn!("Workspace for deployment {} failed: {}", self.id, e);
                let result = StepOutput::failed(-1, format!("{}\n", e));
                return self.fail_step(PipelineStep::Init, &result).await;
            }
        };

        for (idx, step) in PipelineStep::PROVISION.into_iter().enumerate() {
            if idx > 0 {
                self.enter_step(DeploymentStatus::Running, step).await?;
            }

            info!(
                "Deployment {}: step {}/{} ({})",
                self.id,
                idx + 1,
                PipelineStep::PROVISION.len(),
                step
            );

            let result = self.inner.runner.run(&workspace, step).await;

            if !result.success {
                return self.fail_step(step, &result).await;
            }

            self.transition(
                DeploymentStatus::Running,
                step.as_str(),
                output_block(&result.output),
                SnapshotChange::Keep,
            )
            .await?;
        }

        let (snapshot, note) = self.capture_snapshot(&workspace).await;

        let mut text = note;
        text.push_str(&section_header("provision succeeded"));

        self.transition(
            DeploymentStatus::Success,
            PipelineStep::Apply.as_str(),
            text,
            snapshot,
        )
        .await?;

        info!("Deployment {} provisioned", self.id);
        Ok(())
    }

    async fn destroy_steps(&mut self, workspace: &Path) -> Result<()> {
        let step = PipelineStep::Destroy;
        let result = self.inner.runner.run(workspace, step).await;

        if !result.success {
            return self.fail_step(step, &result).await;
        }

        let mut text = output_block(&result.output);

        if let Err(warning) = self.inner.materializer.cleanup_tool_artifacts(workspace) {
            warn!("Deployment {}: {}", self.id, warning);
            text.push_str(&format!("warning: {}\n", warning));
        }

        text.push_str(&section_header("destroy succeeded"));

        self.transition(
            DeploymentStatus::Destroyed,
            step.as_str(),
            text,
            SnapshotChange::Clear,
        )
        .await?;

        info!("Deployment {} destroyed", self.id);
        Ok(())
    }

    /// Reads the resulting infrastructure state; problems only produce a note
    async fn capture_snapshot(&self, workspace: &Path) -> (SnapshotChange, String) {
        let result = self.inner.runner.snapshot(workspace).await;

        if !result.success {
            warn!("Deployment {}: state snapshot read failed", self.id);
            return (
                SnapshotChange::Keep,
                format!(
                    "warning: could not capture state snapshot\n{}",
                    output_block(&result.output)
                ),
            );
        }

        match serde_json::from_str::<serde_json::Value>(&result.output) {
            Ok(snapshot) => (SnapshotChange::Set(snapshot), String::new()),
            Err(e) => {
                warn!("Deployment {}: state snapshot is not JSON: {}", self.id, e);
                (
                    SnapshotChange::Keep,
                    format!("warning: state snapshot is not valid JSON: {}\n", e),
                )
            }
        }
    }

    async fn fail_step(&mut self, step: PipelineStep, result: &StepOutput) -> Result<()> {
        let to = match step {
            PipelineStep::Destroy => DeploymentStatus::DestroyFailed,
            _ => DeploymentStatus::Failed,
        };

        let (action, reason) = if result.timed_out {
            (step.timed_out_action(), "timed out".to_string())
        } else {
            let code = result
                .exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            (step.failed_action(), format!("failed (exit code {})", code))
        };

        let mut text = output_block(&result.output);
        text.push_str(&format!("!!! {} {}\n", step, reason));

        warn!("Deployment {}: {} {}", self.id, step, reason);

        self.transition(to, action, text, SnapshotChange::Keep).await
    }

    async fn transition(
        &mut self,
        to: DeploymentStatus,
        action: impl Into<String>,
        log: String,
        snapshot: SnapshotChange,
    ) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(EngineError::InvalidState {
                id: self.id,
                status: self.status,
                action: "transition",
            });
        }

        let transition = Transition::new(self.status, to, action)
            .with_log(log)
            .with_snapshot(snapshot);

        let applied = self
            .inner
            .deployments
            .record_transition(self.id, transition)
            .await?;

        if !applied {
            return Err(EngineError::StatusChanged {
                id: self.id,
                expected: self.status,
            });
        }

        self.status = to;
        Ok(())
    }
}

/// Log section header for a step or pipeline outcome
pub(crate) fn section_header(title: &str) -> String {
    format!(
        "=== {} @ {} ===\n",
        title,
        chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

/// Captured output, newline-terminated and never empty
fn output_block(output: &str) -> String {
    if output.trim().is_empty() {
        return "(no output)\n".to_string();
    }

    let mut block = output.to_string();
    if !block.ends_with('\n') {
        block.push('\n');
    }
    block
}
