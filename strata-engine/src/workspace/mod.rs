//! Workspace materialization
//!
//! Renders a deployment's template and variable bindings into a self-contained
//! directory the provisioning tool can run in:
//! - one directory per deployment, keyed by the deployment id
//! - `main.tf` holds the template body
//! - `terraform.tfvars` holds the literal variable bindings
//!
//! Rendering is idempotent: the same deployment and template always produce
//! byte-identical files, and existing files are overwritten rather than appended.

pub mod hcl;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use strata_core::domain::deployment::Deployment;
use strata_core::domain::template::Template;
use strata_core::domain::variable::VariableValue;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{EngineError, Result};

/// Generated configuration file
pub const CONFIG_FILE: &str = "main.tf";

/// Generated variable bindings file
pub const VARS_FILE: &str = "terraform.tfvars";

/// Tool-owned cache and lock artifacts removed after a destroy
const TOOL_ARTIFACTS: [&str; 3] = [".terraform", ".terraform.lock.hcl", "tfplan"];

/// Where a resolved binding's value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingSource {
    Supplied,
    Default,
}

/// A schema variable paired with the value that will be rendered for it
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub name: String,
    pub value: VariableValue,
    pub source: BindingSource,
}

/// Resolves the template's variable schema against caller-supplied values
///
/// Bindings come back in schema order. Supplied values win over defaults;
/// optional variables with neither are left out so the tool applies its own
/// default. Every problem found is reported in a single precondition error.
pub fn resolve_bindings(
    template: &Template,
    supplied: &BTreeMap<String, VariableValue>,
) -> Result<Vec<Binding>> {
    let mut bindings = Vec::with_capacity(template.variable_schema.len());
    let mut problems = Vec::new();

    for spec in &template.variable_schema {
        if !hcl::is_identifier(&spec.name) {
            problems.push(format!("'{}' is not a valid variable name", spec.name));
            continue;
        }

        let (value, source) = match (supplied.get(&spec.name), &spec.default) {
            (Some(value), _) => (value.clone(), BindingSource::Supplied),
            (None, Some(default)) => (default.clone(), BindingSource::Default),
            (None, None) if spec.required => {
                problems.push(format!("missing required variable '{}'", spec.name));
                continue;
            }
            (None, None) => continue,
        };

        if source == BindingSource::Supplied {
            if !value.conforms_to(spec.var_type) {
                problems.push(format!(
                    "variable '{}' expects {} but got {}",
                    spec.name,
                    spec.var_type,
                    value.kind()
                ));
                continue;
            }

            if let Some(allowed) = &spec.allowed_values {
                if !allowed.contains(&value) {
                    let choices: Vec<String> = allowed.iter().map(hcl::to_hcl_literal).collect();
                    problems.push(format!(
                        "variable '{}' must be one of [{}]",
                        spec.name,
                        choices.join(", ")
                    ));
                    continue;
                }
            }
        }

        bindings.push(Binding {
            name: spec.name.clone(),
            value,
            source,
        });
    }

    for name in supplied.keys() {
        if template.variable(name).is_none() {
            warn!(
                "Ignoring variable '{}' not declared by template {}",
                name, template.id
            );
        }
    }

    if !problems.is_empty() {
        return Err(EngineError::precondition(format!(
            "template {}: {}",
            template.id,
            problems.join("; ")
        )));
    }

    Ok(bindings)
}

/// Renders the configuration file contents
pub fn render_config(template: &Template) -> String {
    let mut out = format!(
        "# Generated from template '{}'. Changes are overwritten on the next run.\n\n",
        template.id
    );
    out.push_str(&template.code);
    if !template.code.ends_with('\n') {
        out.push('\n');
    }
    out
}

/// Renders the variable bindings file contents
pub fn render_bindings(deployment_id: Uuid, bindings: &[Binding]) -> String {
    let mut out = format!("# Variable bindings for deployment {}\n", deployment_id);
    for binding in bindings {
        out.push_str(&hcl::assignment(&binding.name, &binding.value));
        out.push('\n');
    }
    out
}

/// Failures left behind by a best-effort artifact cleanup
#[derive(Debug, Clone, PartialEq)]
pub struct CleanupWarning {
    pub failures: Vec<String>,
}

impl std::fmt::Display for CleanupWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cleanup incomplete: {}", self.failures.join("; "))
    }
}

/// Allocates and writes per-deployment workspaces under a root directory
#[derive(Debug, Clone)]
pub struct WorkspaceMaterializer {
    root: PathBuf,
}

impl WorkspaceMaterializer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Workspace path for a deployment; depends on nothing but the id
    pub fn path_for(&self, deployment_id: Uuid) -> PathBuf {
        self.root.join(format!("deployment-{}", deployment_id))
    }

    /// Materializes the deployment's workspace and returns its path
    pub fn render(&self, deployment: &Deployment, template: &Template) -> Result<PathBuf> {
        let bindings = resolve_bindings(template, &deployment.variables)?;
        let path = self.path_for(deployment.id);

        if deployment.workspace_path != path {
            return Err(EngineError::workspace(format!(
                "deployment {} is bound to {} but its workspace is {}",
                deployment.id,
                deployment.workspace_path.display(),
                path.display()
            )));
        }

        std::fs::create_dir_all(&path).map_err(|e| {
            EngineError::workspace(format!("failed to create {}: {}", path.display(), e))
        })?;

        write_file(&path.join(CONFIG_FILE), &render_config(template))?;
        write_file(
            &path.join(VARS_FILE),
            &render_bindings(deployment.id, &bindings),
        )?;

        debug!(
            "Rendered workspace {} ({} binding(s))",
            path.display(),
            bindings.len()
        );

        Ok(path)
    }

    /// Removes the tool's cache and lock artifacts from a workspace
    ///
    /// Best effort: every artifact is attempted and failures are collected.
    pub fn cleanup_tool_artifacts(&self, path: &Path) -> std::result::Result<(), CleanupWarning> {
        let mut failures = Vec::new();

        for artifact in TOOL_ARTIFACTS {
            let target = path.join(artifact);
            let removed = match std::fs::symlink_metadata(&target) {
                Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(&target),
                Ok(_) => std::fs::remove_file(&target),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => Err(e),
            };

            if let Err(e) = removed {
                failures.push(format!("{}: {}", target.display(), e));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(CleanupWarning { failures })
        }
    }

    /// Deletes a workspace directory entirely
    pub fn remove(&self, path: &Path) -> std::io::Result<()> {
        match std::fs::remove_dir_all(path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents)
        .map_err(|e| EngineError::workspace(format!("failed to write {}: {}", path.display(), e)))
}
