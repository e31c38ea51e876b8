//! In-memory store implementations
//!
//! Used by tests and by embedders that do not need durability. The deployment
//! store also keeps the sequence of applied transitions so callers can inspect
//! exactly which states a record passed through.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant};
use strata_core::domain::deployment::{Deployment, DeploymentStatus};
use strata_core::domain::template::Template;
use uuid::Uuid;

use super::{DeploymentStore, SnapshotChange, StoreResult, TemplateStore, Transition};
use crate::error::StoreError;

/// Template catalog backed by a map
#[derive(Default)]
pub struct InMemoryTemplateStore {
    templates: RwLock<HashMap<String, Template>>,
}

impl InMemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_templates(templates: impl IntoIterator<Item = Template>) -> Self {
        let store = Self::new();
        for template in templates {
            store.add(template);
        }
        store
    }

    pub fn add(&self, template: Template) {
        if let Ok(mut templates) = self.templates.write() {
            templates.insert(template.id.clone(), template);
        }
    }
}

#[async_trait]
impl TemplateStore for InMemoryTemplateStore {
    async fn lookup(&self, id: &str) -> StoreResult<Option<Template>> {
        let templates = self.templates.read().map_err(|_| poisoned())?;
        Ok(templates.get(id).cloned())
    }

    async fn list(&self) -> StoreResult<Vec<Template>> {
        let templates = self.templates.read().map_err(|_| poisoned())?;
        let mut all: Vec<Template> = templates.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }
}

/// A state a deployment record passed through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub status: DeploymentStatus,
    pub last_action: Option<String>,
    pub log_len: usize,
}

struct Lease {
    holder: String,
    expires_at: Instant,
}

#[derive(Default)]
struct MemoryState {
    records: HashMap<Uuid, Deployment>,
    leases: HashMap<Uuid, Lease>,
    history: HashMap<Uuid, Vec<HistoryEntry>>,
}

/// Deployment store backed by a mutex-guarded map
#[derive(Default)]
pub struct InMemoryDeploymentStore {
    state: Mutex<MemoryState>,
}

impl InMemoryDeploymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every state the deployment has been in, starting with its insertion
    pub fn history(&self, id: Uuid) -> Vec<HistoryEntry> {
        self.lock()
            .map(|state| state.history.get(&id).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    /// The status sequence recorded for a deployment
    pub fn status_history(&self, id: Uuid) -> Vec<DeploymentStatus> {
        self.history(id).into_iter().map(|e| e.status).collect()
    }

    /// Current lease holder, ignoring expiry
    pub fn lease_holder(&self, id: Uuid) -> Option<String> {
        self.lock()
            .ok()
            .and_then(|state| state.leases.get(&id).map(|l| l.holder.clone()))
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, MemoryState>> {
        self.state.lock().map_err(|_| poisoned())
    }
}

#[async_trait]
impl DeploymentStore for InMemoryDeploymentStore {
    async fn insert(&self, deployment: &Deployment) -> StoreResult<()> {
        let mut state = self.lock()?;

        if state.records.contains_key(&deployment.id) {
            return Err(StoreError::Database(format!(
                "deployment {} already exists",
                deployment.id
            )));
        }

        state.history.insert(
            deployment.id,
            vec![HistoryEntry {
                status: deployment.status,
                last_action: deployment.last_action.clone(),
                log_len: deployment.log.len(),
            }],
        );
        state.records.insert(deployment.id, deployment.clone());

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Deployment>> {
        Ok(self.lock()?.records.get(&id).cloned())
    }

    async fn list_all(&self) -> StoreResult<Vec<Deployment>> {
        let mut all: Vec<Deployment> = self.lock()?.records.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn record_transition(&self, id: Uuid, transition: Transition) -> StoreResult<bool> {
        let mut state = self.lock()?;

        let Some(record) = state.records.get_mut(&id) else {
            return Ok(false);
        };

        if record.status != transition.from {
            return Ok(false);
        }

        record.status = transition.to;
        record.last_action = Some(transition.last_action);
        record.log.push_str(&transition.log_append);
        match transition.snapshot {
            SnapshotChange::Keep => {}
            SnapshotChange::Set(snapshot) => record.state_snapshot = Some(snapshot),
            SnapshotChange::Clear => record.state_snapshot = None,
        }
        record.updated_at = chrono::Utc::now();

        let entry = HistoryEntry {
            status: record.status,
            last_action: record.last_action.clone(),
            log_len: record.log.len(),
        };
        state.history.entry(id).or_default().push(entry);

        Ok(true)
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        let mut state = self.lock()?;
        state.leases.remove(&id);
        state.history.remove(&id);
        Ok(state.records.remove(&id).is_some())
    }

    async fn try_acquire_lease(&self, id: Uuid, holder: &str, ttl: Duration) -> StoreResult<bool> {
        let mut state = self.lock()?;

        if !state.records.contains_key(&id) {
            return Ok(false);
        }

        let now = Instant::now();
        let available = match state.leases.get(&id) {
            None => true,
            Some(lease) => lease.holder == holder || lease.expires_at <= now,
        };

        if available {
            state.leases.insert(
                id,
                Lease {
                    holder: holder.to_string(),
                    expires_at: now + ttl,
                },
            );
        }

        Ok(available)
    }

    async fn release_lease(&self, id: Uuid, holder: &str) -> StoreResult<()> {
        let mut state = self.lock()?;

        if state.leases.get(&id).is_some_and(|lease| lease.holder == holder) {
            state.leases.remove(&id);
        }

        Ok(())
    }
}

fn poisoned() -> StoreError {
    StoreError::Database("in-memory store lock poisoned".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn deployment(status: DeploymentStatus) -> Deployment {
        let now = chrono::Utc::now();
        Deployment {
            id: Uuid::new_v4(),
            name: "demo".to_string(),
            template_id: "web".to_string(),
            environment: "dev".to_string(),
            variables: BTreeMap::new(),
            status,
            workspace_path: "/tmp/ws".into(),
            log: String::new(),
            state_snapshot: None,
            last_action: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_transition_is_compare_and_swap() {
        let store = InMemoryDeploymentStore::new();
        let record = deployment(DeploymentStatus::Pending);
        store.insert(&record).await.unwrap();

        let applied = store
            .record_transition(
                record.id,
                Transition::new(DeploymentStatus::Pending, DeploymentStatus::Running, "init")
                    .with_log("=== init ===\n"),
            )
            .await
            .unwrap();
        assert!(applied);

        // Stale `from` is rejected and changes nothing
        let stale = store
            .record_transition(
                record.id,
                Transition::new(DeploymentStatus::Pending, DeploymentStatus::Running, "init")
                    .with_log("duplicate\n"),
            )
            .await
            .unwrap();
        assert!(!stale);

        let stored = store.find_by_id(record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DeploymentStatus::Running);
        assert_eq!(stored.log, "=== init ===\n");
        assert_eq!(
            store.status_history(record.id),
            vec![DeploymentStatus::Pending, DeploymentStatus::Running]
        );
    }

    #[tokio::test]
    async fn test_transition_snapshot_changes() {
        let store = InMemoryDeploymentStore::new();
        let record = deployment(DeploymentStatus::Running);
        store.insert(&record).await.unwrap();

        store
            .record_transition(
                record.id,
                Transition::new(DeploymentStatus::Running, DeploymentStatus::Success, "apply")
                    .with_snapshot(SnapshotChange::Set(serde_json::json!({"values": {}}))),
            )
            .await
            .unwrap();
        let stored = store.find_by_id(record.id).await.unwrap().unwrap();
        assert!(stored.state_snapshot.is_some());

        store
            .record_transition(
                record.id,
                Transition::new(DeploymentStatus::Success, DeploymentStatus::Destroying, "destroy"),
            )
            .await
            .unwrap();
        let stored = store.find_by_id(record.id).await.unwrap().unwrap();
        assert!(stored.state_snapshot.is_some());

        store
            .record_transition(
                record.id,
                Transition::new(DeploymentStatus::Destroying, DeploymentStatus::Destroyed, "destroy")
                    .with_snapshot(SnapshotChange::Clear),
            )
            .await
            .unwrap();
        let stored = store.find_by_id(record.id).await.unwrap().unwrap();
        assert!(stored.state_snapshot.is_none());
    }

    #[tokio::test]
    async fn test_transition_on_missing_record() {
        let store = InMemoryDeploymentStore::new();
        let applied = store
            .record_transition(
                Uuid::new_v4(),
                Transition::new(DeploymentStatus::Pending, DeploymentStatus::Running, "init"),
            )
            .await
            .unwrap();
        assert!(!applied);
    }

    #[tokio::test]
    async fn test_lease_exclusion_and_renewal() {
        let store = InMemoryDeploymentStore::new();
        let record = deployment(DeploymentStatus::Success);
        store.insert(&record).await.unwrap();
        let ttl = Duration::from_secs(60);

        assert!(store.try_acquire_lease(record.id, "a", ttl).await.unwrap());
        assert!(!store.try_acquire_lease(record.id, "b", ttl).await.unwrap());
        assert!(store.try_acquire_lease(record.id, "a", ttl).await.unwrap());

        // Only the holder can release
        store.release_lease(record.id, "b").await.unwrap();
        assert_eq!(store.lease_holder(record.id), Some("a".to_string()));

        store.release_lease(record.id, "a").await.unwrap();
        assert!(store.try_acquire_lease(record.id, "b", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_lease_is_reclaimable() {
        let store = InMemoryDeploymentStore::new();
        let record = deployment(DeploymentStatus::Running);
        store.insert(&record).await.unwrap();

        assert!(
            store
                .try_acquire_lease(record.id, "crashed", Duration::ZERO)
                .await
                .unwrap()
        );
        assert!(
            store
                .try_acquire_lease(record.id, "next", Duration::from_secs(60))
                .await
                .unwrap()
        );
        assert_eq!(store.lease_holder(record.id), Some("next".to_string()));
    }

    #[tokio::test]
    async fn test_lease_requires_record() {
        let store = InMemoryDeploymentStore::new();
        let acquired = store
            .try_acquire_lease(Uuid::new_v4(), "a", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(!acquired);
    }

    #[tokio::test]
    async fn test_delete_and_duplicate_insert() {
        let store = InMemoryDeploymentStore::new();
        let record = deployment(DeploymentStatus::Failed);
        store.insert(&record).await.unwrap();

        assert!(store.insert(&record).await.is_err());
        assert!(store.delete(record.id).await.unwrap());
        assert!(!store.delete(record.id).await.unwrap());
        assert!(store.find_by_id(record.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_template_lookup() {
        let store = InMemoryTemplateStore::with_templates([Template {
            id: "web".to_string(),
            name: "Web".to_string(),
            code: String::new(),
            variable_schema: vec![],
        }]);

        assert!(store.lookup("web").await.unwrap().is_some());
        assert!(store.lookup("does-not-exist").await.unwrap().is_none());
        assert_eq!(store.list().await.unwrap().len(), 1);
    }
}
