//! live project snapshot.

use matlas_core::{
    digest_hex, ApplyDocument, DiscoveredDatabase, Identity, Kind, Metadata, Resource,
    API_VERSION,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// canonical in-memory model of one live project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectState {
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<Resource>,
    #[serde(default)]
    pub clusters: Vec<Resource>,
    #[serde(default)]
    pub database_users: Vec<Resource>,
    #[serde(default)]
    pub network_access: Vec<Resource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub network_containers: Vec<Resource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub network_peerings: Vec<Resource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub search_indexes: Vec<Resource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vpc_endpoints: Vec<Resource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alert_configurations: Vec<Resource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub encryption: Vec<Resource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub databases: Vec<DiscoveredDatabase>,
    #[serde(default)]
    pub fingerprint: String,
}

impl ProjectState {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            ..Self::default()
        }
    }

    fn bucket_mut(&mut self, kind: Kind) -> Option<&mut Vec<Resource>> {
        match kind {
            Kind::Cluster => Some(&mut self.clusters),
            Kind::DatabaseUser => Some(&mut self.database_users),
            Kind::NetworkAccess => Some(&mut self.network_access),
            Kind::NetworkContainer => Some(&mut self.network_containers),
            Kind::NetworkPeering => Some(&mut self.network_peerings),
            Kind::SearchIndex => Some(&mut self.search_indexes),
            Kind::VpcEndpoint => Some(&mut self.vpc_endpoints),
            Kind::AlertConfiguration => Some(&mut self.alert_configurations),
            Kind::EncryptionAtRest => Some(&mut self.encryption),
            Kind::Project | Kind::DatabaseRole => None,
        }
    }

    /// file a resource under its kind. returns false when the kind has no slot.
    pub fn insert(&mut self, resource: Resource) -> bool {
        if resource.kind() == Kind::Project {
            self.project = Some(resource);
            return true;
        }
        match self.bucket_mut(resource.kind()) {
            Some(bucket) => {
                bucket.push(resource);
                true
            }
            None => false,
        }
    }

    /// every resource in the snapshot, project first.
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.project.iter().chain(
            [
                &self.network_containers,
                &self.network_access,
                &self.clusters,
                &self.alert_configurations,
                &self.encryption,
                &self.database_users,
                &self.search_indexes,
                &self.vpc_endpoints,
                &self.network_peerings,
            ]
            .into_iter()
            .flatten(),
        )
    }

    pub fn resources_mut(&mut self) -> impl Iterator<Item = &mut Resource> {
        self.project.iter_mut().chain(
            [
                &mut self.network_containers,
                &mut self.network_access,
                &mut self.clusters,
                &mut self.alert_configurations,
                &mut self.encryption,
                &mut self.database_users,
                &mut self.search_indexes,
                &mut self.vpc_endpoints,
                &mut self.network_peerings,
            ]
            .into_iter()
            .flatten(),
        )
    }

    pub fn len(&self) -> usize {
        self.resources().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn project_name(&self) -> Option<&str> {
        self.project.as_ref().map(|project| project.project_name())
    }

    /// replace every write-only value with the masked sentinel.
    pub fn mask_secrets(&mut self) {
        for resource in self.resources_mut() {
            resource.mask_secrets();
        }
    }

    /// sort every bucket by identity and databases by cluster and name.
    pub fn sort(&mut self) {
        for kind in Kind::ALL {
            if let Some(bucket) = self.bucket_mut(kind) {
                bucket.sort_by_key(|resource| resource.identity());
            }
        }
        self.databases.sort_by(|a, b| {
            (a.cluster_name.as_str(), a.name.as_str()).cmp(&(b.cluster_name.as_str(), b.name.as_str()))
        });
    }

    /// stable hash over identities and semantic fields, secrets masked.
    pub fn compute_fingerprint(&self) -> String {
        let mut entries: Vec<(Identity, Value)> = self
            .resources()
            .map(|resource| {
                let mut masked = resource.clone();
                masked.mask_secrets();
                (masked.identity(), masked.canonical_spec())
            })
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        let mut databases: Vec<Value> = self
            .databases
            .iter()
            .map(|db| serde_json::to_value(db).unwrap_or(Value::Null))
            .collect();
        databases.sort_by_key(|db| db.to_string());

        let mut canonical = String::new();
        for (identity, spec) in entries {
            canonical.push_str(&identity.to_string());
            canonical.push('\n');
            canonical.push_str(&spec.to_string());
            canonical.push('\n');
        }
        for db in databases {
            canonical.push_str(&db.to_string());
            canonical.push('\n');
        }
        digest_hex(canonical.as_bytes())
    }

    /// sort and stamp the fingerprint.
    pub fn seal(&mut self) {
        self.sort();
        self.fingerprint = self.compute_fingerprint();
    }

    /// convert the snapshot into an apply document of manifests.
    pub fn to_apply_document(&self) -> ApplyDocument {
        let name = self
            .project_name()
            .map(str::to_string)
            .unwrap_or_else(|| self.project_id.clone());
        let mut resources: Vec<Resource> = self.resources().cloned().collect();
        resources.sort_by_key(|resource| resource.identity());
        ApplyDocument::new(name, resources)
    }

    /// wrap the snapshot in its manifest envelope.
    pub fn to_document(&self) -> DiscoveredProjectDocument {
        DiscoveredProjectDocument {
            api_version: API_VERSION.to_string(),
            kind: DiscoveredProjectDocument::KIND.to_string(),
            metadata: Metadata {
                id: Some(self.project_id.clone()),
                ..Metadata::named(self.project_name().unwrap_or(&self.project_id))
            },
            spec: self.clone(),
        }
    }
}

/// `DiscoveredProject` envelope written by `discover`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredProjectDocument {
    pub api_version: String,
    pub kind: String,
    pub metadata: Metadata,
    pub spec: ProjectState,
}

impl DiscoveredProjectDocument {
    pub const KIND: &'static str = "DiscoveredProject";
}

#[cfg(test)]
mod tests {
    use super::*;
    use matlas_core::{
        DatabaseUserSpec, NetworkAccessSpec, ProjectSpec, ResourceSpec, RoleAssignment, Secret,
    };

    fn project() -> Resource {
        Resource::new(
            Metadata::named("p1"),
            ResourceSpec::Project(ProjectSpec {
                name: "p1".to_string(),
                organization_id: "org".to_string(),
                tags: Default::default(),
            }),
        )
    }

    fn access(ip: &str) -> Resource {
        Resource::new(
            Metadata::named(ip),
            ResourceSpec::NetworkAccess(NetworkAccessSpec {
                project_name: "p1".to_string(),
                ip_address: Some(ip.to_string()),
                cidr_block: None,
                aws_security_group: None,
                comment: None,
                delete_after_date: None,
            }),
        )
    }

    fn user(password: Secret) -> Resource {
        Resource::new(
            Metadata::named("app"),
            ResourceSpec::DatabaseUser(DatabaseUserSpec {
                project_name: "p1".to_string(),
                username: "app".to_string(),
                auth_database: "admin".to_string(),
                password: Some(password),
                roles: vec![RoleAssignment {
                    role_name: "read".to_string(),
                    database_name: "app".to_string(),
                    collection_name: None,
                }],
                scopes: Vec::new(),
            }),
        )
    }

    #[test]
    fn fingerprint_ignores_order_and_masking() {
        let mut a = ProjectState::new("id1");
        a.insert(project());
        a.insert(access("203.0.113.1"));
        a.insert(access("203.0.113.2"));
        a.insert(user(Secret::new("pw")));
        a.seal();

        let mut b = ProjectState::new("id1");
        b.insert(user(Secret::Masked));
        b.insert(access("203.0.113.2"));
        b.insert(access("203.0.113.1"));
        b.insert(project());
        b.seal();

        assert_eq!(a.fingerprint, b.fingerprint);
        b.network_access.pop();
        assert_ne!(a.fingerprint, b.compute_fingerprint());
    }

    #[test]
    fn apply_document_starts_with_project() {
        let mut state = ProjectState::new("id1");
        state.insert(access("203.0.113.1"));
        state.insert(project());
        let document = state.to_apply_document();
        assert_eq!(document.kind, "ApplyDocument");
        assert_eq!(document.metadata.name, "p1");
        assert_eq!(document.resources[0].kind(), Kind::Project);
        assert_eq!(document.resources.len(), 2);
    }

    #[test]
    fn roles_are_not_filed() {
        let mut state = ProjectState::new("id1");
        let role = Resource::new(
            Metadata::named("r"),
            ResourceSpec::DatabaseRole(matlas_core::DatabaseRoleSpec {
                project_name: "p1".to_string(),
                role_name: "r".to_string(),
                database_name: "app".to_string(),
                privileges: Vec::new(),
                inherited_roles: Vec::new(),
            }),
        );
        assert!(!state.insert(role));
        assert!(state.is_empty());
    }
}
