//! core engine types and backend contracts.

use async_trait::async_trait;
use matlas_core::{DiscoveredDatabase, Identity, Kind, Resource, Result, Secret};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// control-plane contract implemented by the admin api adapter.
///
/// every call observes `cancel` and returns typed errors; retries happen
/// behind this seam and results are terminal for callers.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// look up a project by name; `metadata.id` carries its id.
    async fn find_project(&self, cancel: &CancellationToken, name: &str)
        -> Result<Option<Resource>>;

    async fn get_project(&self, cancel: &CancellationToken, project_id: &str) -> Result<Resource>;

    /// list live resources of one kind within a project.
    async fn list(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        kind: Kind,
    ) -> Result<Vec<Resource>>;

    /// create a resource. `project_id` is empty for projects.
    async fn create(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        desired: &Resource,
    ) -> Result<Resource>;

    async fn update(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        current: &Resource,
        desired: &Resource,
    ) -> Result<Resource>;

    async fn delete(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        current: &Resource,
    ) -> Result<()>;
}

/// connection details for one cluster to enumerate.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterTarget {
    pub cluster_name: String,
    /// connection string with credentials injected when supplied.
    pub uri: Secret,
}

/// data-plane contract implemented by the wire-protocol adapter.
#[async_trait]
pub trait DatabaseInspector: Send + Sync {
    /// list user databases with their collections and indexes.
    async fn inspect(
        &self,
        cancel: &CancellationToken,
        target: &ClusterTarget,
    ) -> Result<Vec<DiscoveredDatabase>>;
}

/// field-level change for an update op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    /// field name within the spec.
    pub field: String,
    /// previous value from live state.
    pub from: Value,
    /// desired value from the manifest.
    pub to: Value,
}

/// rfc-6902 style patch operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PatchOp {
    Add { path: String, value: Value },
    Remove { path: String },
    Replace { path: String, value: Value },
}

impl PatchOp {
    pub fn path(&self) -> &str {
        match self {
            PatchOp::Add { path, .. } | PatchOp::Remove { path } | PatchOp::Replace { path, .. } => {
                path
            }
        }
    }
}

/// operation verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Verb {
    Create,
    Update,
    Delete,
    NoOp,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Create => "create",
            Verb::Update => "update",
            Verb::Delete => "delete",
            Verb::NoOp => "noop",
        }
    }

    pub fn is_mutation(&self) -> bool {
        !matches!(self, Verb::NoOp)
    }
}

/// plan operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    /// unique id: `verb/Kind/parent/name`.
    pub id: String,
    pub kind: Kind,
    pub name: String,
    pub identity: Identity,
    pub verb: Verb,
    /// set on both halves of a delete-then-create replacement.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub replace: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_state: Option<Resource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_state: Option<Resource>,
    #[serde(default)]
    pub deps: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<FieldChange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patch: Vec<PatchOp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Operation {
    pub fn new(
        verb: Verb,
        identity: Identity,
        from_state: Option<Resource>,
        to_state: Option<Resource>,
    ) -> Self {
        Self {
            id: format!("{}/{identity}", verb.as_str()),
            kind: identity.kind,
            name: identity.name.clone(),
            identity,
            verb,
            replace: false,
            from_state,
            to_state,
            deps: Vec::new(),
            changes: Vec::new(),
            patch: Vec::new(),
            note: None,
        }
    }

    /// resource the operation acts on: desired side first.
    pub fn resource(&self) -> Option<&Resource> {
        self.to_state.as_ref().or(self.from_state.as_ref())
    }

    /// project name the operation is scoped to.
    pub fn project_name(&self) -> &str {
        self.identity.project()
    }
}

/// per-verb counts, each identity counted once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
    pub noops: usize,
    pub replaces: usize,
}

impl Summary {
    pub fn total(&self) -> usize {
        self.creates + self.updates + self.deletes + self.noops + self.replaces
    }

    pub fn has_changes(&self) -> bool {
        self.creates + self.updates + self.deletes + self.replaces > 0
    }
}

/// full plan document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// operations in dependency order.
    pub operations: Vec<Operation>,
    pub summary: Summary,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Plan {
    pub fn is_noop(&self) -> bool {
        !self.summary.has_changes()
    }

    pub fn get(&self, id: &str) -> Option<&Operation> {
        self.operations.iter().find(|op| op.id == id)
    }

    /// copy with every secret reduced to its digest, for rendering.
    pub fn redacted(&self) -> Plan {
        let mut plan = self.clone();
        for op in &mut plan.operations {
            for state in [op.from_state.as_mut(), op.to_state.as_mut()].into_iter().flatten() {
                for secret in state.spec.secrets_mut() {
                    *secret = secret.redacted();
                }
            }
        }
        plan
    }
}
