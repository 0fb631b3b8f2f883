//! canonical resource envelope, kinds and identities.

use crate::alert::AlertConfigurationSpec;
use crate::resources::{
    ClusterSpec, DatabaseRoleSpec, DatabaseUserSpec, EncryptionAtRestSpec, NetworkAccessSpec,
    NetworkContainerSpec, NetworkPeeringSpec, ProjectSpec, ScopeType, SearchIndexSpec,
    VpcEndpointSpec,
};
use crate::secret::{digest_hex, Secret};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// api version written on every manifest.
pub const API_VERSION: &str = "matlas.mongodb.com/v1";

/// label that protects a live resource from deletion.
pub const PRESERVE_LABEL: &str = "matlas.mongodb.com/preserve";

/// managed resource kind.
///
/// declaration order follows the dependency levels and is the tie-break
/// order used when sorting operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Kind {
    Project,
    NetworkContainer,
    NetworkAccess,
    Cluster,
    AlertConfiguration,
    EncryptionAtRest,
    DatabaseUser,
    SearchIndex,
    #[serde(rename = "VPCEndpoint")]
    VpcEndpoint,
    NetworkPeering,
    DatabaseRole,
}

impl Kind {
    pub const ALL: [Kind; 11] = [
        Kind::Project,
        Kind::NetworkContainer,
        Kind::NetworkAccess,
        Kind::Cluster,
        Kind::AlertConfiguration,
        Kind::EncryptionAtRest,
        Kind::DatabaseUser,
        Kind::SearchIndex,
        Kind::VpcEndpoint,
        Kind::NetworkPeering,
        Kind::DatabaseRole,
    ];

    /// return the canonical string form used in manifests.
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Project => "Project",
            Kind::NetworkContainer => "NetworkContainer",
            Kind::NetworkAccess => "NetworkAccess",
            Kind::Cluster => "Cluster",
            Kind::AlertConfiguration => "AlertConfiguration",
            Kind::EncryptionAtRest => "EncryptionAtRest",
            Kind::DatabaseUser => "DatabaseUser",
            Kind::SearchIndex => "SearchIndex",
            Kind::VpcEndpoint => "VPCEndpoint",
            Kind::NetworkPeering => "NetworkPeering",
            Kind::DatabaseRole => "DatabaseRole",
        }
    }

    /// depth in the kind dependency dag (parents first).
    pub fn level(&self) -> u8 {
        match self {
            Kind::Project => 0,
            Kind::NetworkContainer
            | Kind::NetworkAccess
            | Kind::Cluster
            | Kind::AlertConfiguration
            | Kind::EncryptionAtRest => 1,
            Kind::DatabaseUser | Kind::SearchIndex | Kind::VpcEndpoint | Kind::NetworkPeering => 2,
            Kind::DatabaseRole => 3,
        }
    }

    /// direct predecessors in the kind dag.
    pub fn dag_parents(&self) -> Vec<Kind> {
        let level = self.level();
        if level == 0 {
            return Vec::new();
        }
        Kind::ALL
            .iter()
            .copied()
            .filter(|kind| kind.level() + 1 == level)
            .collect()
    }

    /// true when `self` must exist before `other` can.
    pub fn is_ancestor_of(&self, other: Kind) -> bool {
        self.level() < other.level()
    }

    /// fields populated by the server and ignored when comparing.
    pub fn server_fields(&self) -> &'static [&'static str] {
        match self {
            Kind::Cluster => &["stateName", "connectionStrings"],
            Kind::NetworkContainer => &["vpcId", "provisioned"],
            Kind::NetworkPeering => &["statusName", "errorStateName"],
            Kind::SearchIndex => &["status"],
            Kind::VpcEndpoint => &["endpointServiceName", "status"],
            _ => &[],
        }
    }

    /// fields whose list values are compared as sets.
    pub fn set_fields(&self) -> &'static [&'static str] {
        match self {
            Kind::DatabaseUser => &["roles", "scopes"],
            Kind::DatabaseRole => &["privileges", "inheritedRoles"],
            Kind::AlertConfiguration => &["matchers", "notifications"],
            _ => &[],
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Kind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == raw)
            .ok_or_else(|| format!("unknown kind `{raw}`"))
    }
}

/// metadata envelope carried by every resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Metadata {
    /// user-chosen name, unique within kind and parent scope.
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// server-assigned opaque id once created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Metadata {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// true when the preserve label is set to `true`.
    pub fn is_preserved(&self) -> bool {
        self.labels
            .get(PRESERVE_LABEL)
            .is_some_and(|value| value.eq_ignore_ascii_case("true"))
    }
}

/// stable identity used to pair desired and live resources.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub kind: Kind,
    pub parent: String,
    pub name: String,
}

impl Identity {
    pub fn new(kind: Kind, parent: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            parent: parent.into(),
            name: name.into(),
        }
    }

    /// project name this identity lives under.
    pub fn project(&self) -> &str {
        if self.kind == Kind::Project {
            &self.name
        } else {
            self.parent.split('/').next().unwrap_or_default()
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.parent.is_empty() {
            write!(f, "{}/{}", self.kind, self.name)
        } else {
            write!(f, "{}/{}/{}", self.kind, self.parent, self.name)
        }
    }
}

/// typed spec for any resource kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceSpec {
    Project(ProjectSpec),
    Cluster(ClusterSpec),
    DatabaseUser(DatabaseUserSpec),
    DatabaseRole(DatabaseRoleSpec),
    NetworkAccess(NetworkAccessSpec),
    NetworkContainer(NetworkContainerSpec),
    NetworkPeering(NetworkPeeringSpec),
    SearchIndex(SearchIndexSpec),
    VpcEndpoint(VpcEndpointSpec),
    AlertConfiguration(AlertConfigurationSpec),
    EncryptionAtRest(EncryptionAtRestSpec),
}

impl ResourceSpec {
    /// return the kind implied by this spec variant.
    pub fn kind(&self) -> Kind {
        match self {
            ResourceSpec::Project(_) => Kind::Project,
            ResourceSpec::Cluster(_) => Kind::Cluster,
            ResourceSpec::DatabaseUser(_) => Kind::DatabaseUser,
            ResourceSpec::DatabaseRole(_) => Kind::DatabaseRole,
            ResourceSpec::NetworkAccess(_) => Kind::NetworkAccess,
            ResourceSpec::NetworkContainer(_) => Kind::NetworkContainer,
            ResourceSpec::NetworkPeering(_) => Kind::NetworkPeering,
            ResourceSpec::SearchIndex(_) => Kind::SearchIndex,
            ResourceSpec::VpcEndpoint(_) => Kind::VpcEndpoint,
            ResourceSpec::AlertConfiguration(_) => Kind::AlertConfiguration,
            ResourceSpec::EncryptionAtRest(_) => Kind::EncryptionAtRest,
        }
    }

    /// decode a spec body for the given kind.
    pub fn from_value(kind: Kind, value: Value) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            Kind::Project => ResourceSpec::Project(serde_json::from_value(value)?),
            Kind::Cluster => ResourceSpec::Cluster(serde_json::from_value(value)?),
            Kind::DatabaseUser => ResourceSpec::DatabaseUser(serde_json::from_value(value)?),
            Kind::DatabaseRole => ResourceSpec::DatabaseRole(serde_json::from_value(value)?),
            Kind::NetworkAccess => ResourceSpec::NetworkAccess(serde_json::from_value(value)?),
            Kind::NetworkContainer => {
                ResourceSpec::NetworkContainer(serde_json::from_value(value)?)
            }
            Kind::NetworkPeering => ResourceSpec::NetworkPeering(serde_json::from_value(value)?),
            Kind::SearchIndex => ResourceSpec::SearchIndex(serde_json::from_value(value)?),
            Kind::VpcEndpoint => ResourceSpec::VpcEndpoint(serde_json::from_value(value)?),
            Kind::AlertConfiguration => {
                ResourceSpec::AlertConfiguration(serde_json::from_value(value)?)
            }
            Kind::EncryptionAtRest => {
                ResourceSpec::EncryptionAtRest(serde_json::from_value(value)?)
            }
        })
    }

    /// encode the spec body as json.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        match self {
            ResourceSpec::Project(spec) => serde_json::to_value(spec),
            ResourceSpec::Cluster(spec) => serde_json::to_value(spec),
            ResourceSpec::DatabaseUser(spec) => serde_json::to_value(spec),
            ResourceSpec::DatabaseRole(spec) => serde_json::to_value(spec),
            ResourceSpec::NetworkAccess(spec) => serde_json::to_value(spec),
            ResourceSpec::NetworkContainer(spec) => serde_json::to_value(spec),
            ResourceSpec::NetworkPeering(spec) => serde_json::to_value(spec),
            ResourceSpec::SearchIndex(spec) => serde_json::to_value(spec),
            ResourceSpec::VpcEndpoint(spec) => serde_json::to_value(spec),
            ResourceSpec::AlertConfiguration(spec) => serde_json::to_value(spec),
            ResourceSpec::EncryptionAtRest(spec) => serde_json::to_value(spec),
        }
    }

    fn project_name_mut(&mut self) -> Option<&mut String> {
        match self {
            ResourceSpec::Project(_) => None,
            ResourceSpec::Cluster(spec) => Some(&mut spec.project_name),
            ResourceSpec::DatabaseUser(spec) => Some(&mut spec.project_name),
            ResourceSpec::DatabaseRole(spec) => Some(&mut spec.project_name),
            ResourceSpec::NetworkAccess(spec) => Some(&mut spec.project_name),
            ResourceSpec::NetworkContainer(spec) => Some(&mut spec.project_name),
            ResourceSpec::NetworkPeering(spec) => Some(&mut spec.project_name),
            ResourceSpec::SearchIndex(spec) => Some(&mut spec.project_name),
            ResourceSpec::VpcEndpoint(spec) => Some(&mut spec.project_name),
            ResourceSpec::AlertConfiguration(spec) => Some(&mut spec.project_name),
            ResourceSpec::EncryptionAtRest(spec) => Some(&mut spec.project_name),
        }
    }

    /// visit every write-only field of this spec.
    pub fn secrets_mut(&mut self) -> Vec<&mut Secret> {
        match self {
            ResourceSpec::DatabaseUser(spec) => spec.password.iter_mut().collect(),
            ResourceSpec::AlertConfiguration(spec) => spec
                .notifications
                .iter_mut()
                .flat_map(|notification| notification.secrets_mut())
                .collect(),
            ResourceSpec::EncryptionAtRest(spec) => {
                let mut secrets = Vec::new();
                if let Some(aws) = spec.aws_kms.as_mut() {
                    secrets.extend(aws.secret_access_key.as_mut());
                }
                if let Some(azure) = spec.azure_key_vault.as_mut() {
                    secrets.extend(azure.secret.as_mut());
                }
                if let Some(gcp) = spec.google_cloud_kms.as_mut() {
                    secrets.extend(gcp.service_account_key.as_mut());
                }
                secrets
            }
            _ => Vec::new(),
        }
    }
}

/// resource envelope: metadata plus typed spec.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub metadata: Metadata,
    pub spec: ResourceSpec,
}

impl Resource {
    pub fn new(metadata: Metadata, spec: ResourceSpec) -> Self {
        Self { metadata, spec }
    }

    pub fn kind(&self) -> Kind {
        self.spec.kind()
    }

    /// name of the project this resource belongs to.
    pub fn project_name(&self) -> &str {
        match &self.spec {
            ResourceSpec::Project(spec) => &spec.name,
            ResourceSpec::Cluster(spec) => &spec.project_name,
            ResourceSpec::DatabaseUser(spec) => &spec.project_name,
            ResourceSpec::DatabaseRole(spec) => &spec.project_name,
            ResourceSpec::NetworkAccess(spec) => &spec.project_name,
            ResourceSpec::NetworkContainer(spec) => &spec.project_name,
            ResourceSpec::NetworkPeering(spec) => &spec.project_name,
            ResourceSpec::SearchIndex(spec) => &spec.project_name,
            ResourceSpec::VpcEndpoint(spec) => &spec.project_name,
            ResourceSpec::AlertConfiguration(spec) => &spec.project_name,
            ResourceSpec::EncryptionAtRest(spec) => &spec.project_name,
        }
    }

    /// set the owning project when the manifest left it empty.
    pub fn default_project_name(&mut self, project: &str) {
        if let Some(name) = self.spec.project_name_mut() {
            if name.is_empty() {
                *name = project.to_string();
            }
        }
    }

    /// stable `(kind, parent, name)` identity.
    pub fn identity(&self) -> Identity {
        let project = self.project_name();
        let kind = self.kind();
        match &self.spec {
            ResourceSpec::Project(spec) => Identity::new(kind, "", &spec.name),
            ResourceSpec::Cluster(_) => Identity::new(kind, project, &self.metadata.name),
            ResourceSpec::DatabaseUser(spec) => Identity::new(
                kind,
                format!("{project}/{}", spec.auth_database),
                &spec.username,
            ),
            ResourceSpec::DatabaseRole(spec) => Identity::new(
                kind,
                format!("{project}/{}", spec.database_name),
                &spec.role_name,
            ),
            ResourceSpec::NetworkAccess(spec) => Identity::new(
                kind,
                project,
                spec.address().unwrap_or(self.metadata.name.as_str()),
            ),
            ResourceSpec::NetworkContainer(spec) => {
                Identity::new(kind, project, container_key(spec.provider.as_str(), spec.region.as_deref()))
            }
            ResourceSpec::NetworkPeering(spec) => Identity::new(
                kind,
                project,
                format!(
                    "{}:{}",
                    spec.provider,
                    spec.remote_network().unwrap_or(self.metadata.name.as_str())
                ),
            ),
            ResourceSpec::SearchIndex(spec) => {
                let name = if spec.index_name.is_empty() {
                    self.metadata.name.as_str()
                } else {
                    spec.index_name.as_str()
                };
                Identity::new(
                    kind,
                    format!(
                        "{project}/{}/{}.{}",
                        spec.cluster_name, spec.database_name, spec.collection_name
                    ),
                    name,
                )
            }
            ResourceSpec::VpcEndpoint(spec) => {
                let target = spec
                    .region
                    .as_deref()
                    .or(spec.endpoint_service_id.as_deref())
                    .unwrap_or(self.metadata.name.as_str());
                Identity::new(kind, project, format!("{}:{target}", spec.provider))
            }
            ResourceSpec::AlertConfiguration(spec) => {
                let mut matchers = spec.matchers.clone();
                matchers.sort();
                let raw = serde_json::to_string(&matchers).unwrap_or_default();
                let digest = digest_hex(raw.as_bytes());
                Identity::new(
                    kind,
                    project,
                    format!("{}#{}", spec.event_type_name, &digest[..8]),
                )
            }
            ResourceSpec::EncryptionAtRest(spec) => {
                Identity::new(kind, project, spec.provider.as_str())
            }
        }
    }

    /// identities of other resources this one must find at plan time.
    pub fn references(&self) -> Vec<Identity> {
        let project = self.project_name();
        match &self.spec {
            ResourceSpec::DatabaseUser(spec) => spec
                .scopes
                .iter()
                .filter(|scope| scope.scope_type == ScopeType::Cluster)
                .map(|scope| Identity::new(Kind::Cluster, project, &scope.name))
                .collect(),
            ResourceSpec::SearchIndex(spec) => {
                vec![Identity::new(Kind::Cluster, project, &spec.cluster_name)]
            }
            ResourceSpec::NetworkPeering(spec) => spec
                .container
                .iter()
                .map(|container| Identity::new(Kind::NetworkContainer, project, container))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// dependencies on `kind` narrowed to specific identities.
    ///
    /// `None` means the resource depends on every resource of that kind.
    pub fn narrowed_dependencies(&self, kind: Kind) -> Option<Vec<Identity>> {
        let references: Vec<Identity> = self
            .references()
            .into_iter()
            .filter(|identity| identity.kind == kind)
            .collect();
        if references.is_empty() {
            None
        } else {
            Some(references)
        }
    }

    /// replace every write-only value with the masked sentinel.
    pub fn mask_secrets(&mut self) {
        for secret in self.spec.secrets_mut() {
            *secret = Secret::Masked;
        }
    }

    /// true when a plaintext secret is carried.
    pub fn has_plaintext_secrets(&mut self) -> bool {
        self.spec
            .secrets_mut()
            .into_iter()
            .any(|secret| secret.expose().is_some())
    }

    /// json form used for semantic comparison.
    ///
    /// secrets are reduced to digests, server-populated fields dropped and
    /// set-valued lists sorted.
    pub fn canonical_spec(&self) -> Value {
        let mut spec = self.spec.clone();
        for secret in spec.secrets_mut() {
            *secret = secret.redacted();
        }
        let mut value = spec.to_value().unwrap_or(Value::Null);
        let kind = self.kind();
        if let Value::Object(map) = &mut value {
            for field in kind.server_fields() {
                map.remove(*field);
            }
            for field in kind.set_fields() {
                if let Some(Value::Array(items)) = map.get_mut(*field) {
                    for item in items.iter_mut() {
                        sort_nested_lists(item);
                    }
                    items.sort_by_key(set_sort_key);
                }
            }
        }
        value
    }
}

/// ordering key for set members that ignores secret material.
fn set_sort_key(item: &Value) -> String {
    fn scrub(value: &Value) -> Value {
        match value {
            Value::String(raw) if raw == crate::MASKED_SENTINEL || raw.starts_with("sha256:") => {
                Value::Null
            }
            Value::Array(items) => Value::Array(items.iter().map(scrub).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, inner)| (key.clone(), scrub(inner)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
    scrub(item).to_string()
}

fn sort_nested_lists(value: &mut Value) {
    if let Value::Object(map) = value {
        for (key, inner) in map.iter_mut() {
            if key == "actions" || key == "roles" {
                if let Value::Array(items) = inner {
                    items.sort_by_key(|item| item.to_string());
                }
            }
        }
    }
}

/// identity name of a container for a provider and optional region.
pub fn container_key(provider: &str, region: Option<&str>) -> String {
    match region {
        Some(region) if !region.is_empty() => format!("{provider}:{region}"),
        _ => provider.to_string(),
    }
}

impl Serialize for Resource {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;

        let spec = self.spec.to_value().map_err(serde::ser::Error::custom)?;
        let mut state = serializer.serialize_struct("Resource", 4)?;
        state.serialize_field("apiVersion", API_VERSION)?;
        state.serialize_field("kind", &self.kind())?;
        state.serialize_field("metadata", &self.metadata)?;
        state.serialize_field("spec", &spec)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for Resource {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase", deny_unknown_fields)]
        struct RawResource {
            #[serde(default)]
            api_version: Option<String>,
            kind: Kind,
            metadata: Metadata,
            #[serde(default)]
            spec: Value,
        }

        let raw = RawResource::deserialize(deserializer)?;
        if let Some(version) = &raw.api_version {
            if version != API_VERSION {
                return Err(de::Error::custom(format!(
                    "unsupported apiVersion `{version}` (expected {API_VERSION})"
                )));
            }
        }
        let spec = ResourceSpec::from_value(raw.kind, raw.spec)
            .map_err(|e| de::Error::custom(format!("{} spec: {e}", raw.kind)))?;
        Ok(Resource {
            metadata: raw.metadata,
            spec,
        })
    }
}

/// multi-resource container processed as one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyDocument {
    pub api_version: String,
    pub kind: String,
    pub metadata: Metadata,
    #[serde(default)]
    pub resources: Vec<Resource>,
}

impl ApplyDocument {
    pub const KIND: &'static str = "ApplyDocument";

    pub fn new(name: impl Into<String>, resources: Vec<Resource>) -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: Self::KIND.to_string(),
            metadata: Metadata::named(name),
            resources,
        }
    }
}

/// read-only index metadata from data-plane enumeration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredIndex {
    pub name: String,
    pub keys: Value,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub sparse: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_filter: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredCollection {
    pub name: String,
    #[serde(default)]
    pub document_count: u64,
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(default)]
    pub storage_size_bytes: u64,
    #[serde(default)]
    pub indexes: Vec<DiscoveredIndex>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredDatabase {
    pub cluster_name: String,
    pub name: String,
    #[serde(default)]
    pub size_on_disk: u64,
    #[serde(default)]
    pub empty: bool,
    #[serde(default)]
    pub collections: Vec<DiscoveredCollection>,
}
