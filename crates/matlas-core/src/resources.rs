//! typed specs for each managed resource kind.

use crate::secret::Secret;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// cloud provider backing a cluster, container, peering or endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CloudProvider {
    Aws,
    Gcp,
    Azure,
}

impl CloudProvider {
    pub const ALL: [CloudProvider; 3] = [CloudProvider::Aws, CloudProvider::Azure, CloudProvider::Gcp];

    pub fn as_str(&self) -> &'static str {
        match self {
            CloudProvider::Aws => "AWS",
            CloudProvider::Gcp => "GCP",
            CloudProvider::Azure => "AZURE",
        }
    }

    /// allowed prefix lengths for a network container cidr.
    pub fn container_prefix_bounds(&self) -> (u8, u8) {
        match self {
            CloudProvider::Aws => (16, 24),
            CloudProvider::Gcp => (16, 29),
            CloudProvider::Azure => (16, 24),
        }
    }
}

impl fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// attributes for `Project`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProjectSpec {
    /// project name.
    pub name: String,
    /// owning organization id.
    #[serde(alias = "orgId")]
    pub organization_id: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

/// replication topology of a cluster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ClusterType {
    #[default]
    Replicaset,
    Sharded,
    Geosharded,
}

/// server-populated connection strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStrings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard_srv: Option<String>,
}

/// attributes for `Cluster`. the cluster name is `metadata.name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClusterSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub project_name: String,
    pub provider: CloudProvider,
    /// provider region in atlas notation (e.g. `US_EAST_1`).
    pub region: String,
    /// instance tier (e.g. `M10`).
    #[serde(alias = "tier")]
    pub instance_size: String,
    #[serde(default)]
    pub cluster_type: ClusterType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_shards: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mongodb_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_size_gb: Option<u32>,
    #[serde(default)]
    pub backup_enabled: bool,
    #[serde(default)]
    pub pit_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_protection_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_strings: Option<ConnectionStrings>,
}

/// role granted to a database user.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RoleAssignment {
    pub role_name: String,
    pub database_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_name: Option<String>,
}

/// scope target type for a database user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScopeType {
    #[default]
    Cluster,
    DataLake,
}

/// resource a database user is restricted to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserScope {
    pub name: String,
    #[serde(rename = "type", default)]
    pub scope_type: ScopeType,
}

/// attributes for `DatabaseUser`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DatabaseUserSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub project_name: String,
    pub username: String,
    #[serde(default = "default_auth_database", alias = "databaseName")]
    pub auth_database: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<Secret>,
    #[serde(default)]
    pub roles: Vec<RoleAssignment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<UserScope>,
}

fn default_auth_database() -> String {
    "admin".to_string()
}

/// resource a custom role privilege applies to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PrivilegeResource {
    #[serde(alias = "db")]
    pub database: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Privilege {
    pub actions: Vec<String>,
    pub resource: PrivilegeResource,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InheritedRole {
    pub role_name: String,
    pub database_name: String,
}

/// attributes for `DatabaseRole` (custom role scoped to one database).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DatabaseRoleSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub project_name: String,
    pub role_name: String,
    pub database_name: String,
    #[serde(default)]
    pub privileges: Vec<Privilege>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inherited_roles: Vec<InheritedRole>,
}

/// attributes for `NetworkAccess`. exactly one address field is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NetworkAccessSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub project_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr_block: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_security_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_after_date: Option<String>,
}

impl NetworkAccessSpec {
    /// the single address this entry admits, if exactly one is set.
    pub fn address(&self) -> Option<&str> {
        match (&self.ip_address, &self.cidr_block, &self.aws_security_group) {
            (Some(ip), None, None) => Some(ip),
            (None, Some(cidr), None) => Some(cidr),
            (None, None, Some(group)) => Some(group),
            _ => None,
        }
    }
}

/// attributes for `NetworkContainer` (cidr reservation per provider/region).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NetworkContainerSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub project_name: String,
    pub provider: CloudProvider,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub atlas_cidr_block: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpc_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioned: Option<bool>,
}

/// lifecycle state of a peering connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeeringState {
    Initiating,
    PendingAcceptance,
    Available,
    Failed,
    Deleting,
    Deleted,
    #[serde(other)]
    Unknown,
}

/// attributes for `NetworkPeering`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NetworkPeeringSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub project_name: String,
    pub provider: CloudProvider,
    /// identity name of the container to peer from (e.g. `AWS:US_EAST_1`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepter_region_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_table_cidr_block: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpc_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gcp_project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_directory_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_subscription_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_group_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vnet_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_name: Option<PeeringState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_state_name: Option<String>,
}

impl NetworkPeeringSpec {
    /// provider-side network the peering targets.
    pub fn remote_network(&self) -> Option<&str> {
        match self.provider {
            CloudProvider::Aws => self.vpc_id.as_deref(),
            CloudProvider::Gcp => self.network_name.as_deref(),
            CloudProvider::Azure => self.vnet_name.as_deref(),
        }
    }
}

/// search index flavour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SearchIndexType {
    #[default]
    Search,
    VectorSearch,
}

/// attributes for `SearchIndex`.
///
/// analyzers, facets, fuzzy and highlight options live inside `definition`
/// and are compared structurally as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SearchIndexSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub project_name: String,
    pub cluster_name: String,
    pub database_name: String,
    pub collection_name: String,
    /// index name; defaults to `metadata.name`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub index_name: String,
    #[serde(default, rename = "type")]
    pub index_type: SearchIndexType,
    pub definition: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// attributes for `VPCEndpoint`.
///
/// exactly one of `region` (request a new endpoint service) or
/// `endpointServiceId` (adopt an existing one) is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VpcEndpointSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub project_name: String,
    #[serde(alias = "cloudProvider")]
    pub provider: CloudProvider,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_service_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_service_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// aws kms settings for encryption at rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AwsKmsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_master_key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_access_key: Option<Secret>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_id: Option<String>,
}

/// azure key vault settings for encryption at rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AzureKeyVaultConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_environment: Option<String>,
    pub client_id: String,
    pub key_identifier: String,
    pub key_vault_name: String,
    pub resource_group_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<Secret>,
    pub subscription_id: String,
    pub tenant_id: String,
}

/// google cloud kms settings for encryption at rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GoogleCloudKmsConfig {
    pub key_version_resource_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_key: Option<Secret>,
}

/// attributes for `EncryptionAtRest` (per project, per provider).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EncryptionAtRestSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub project_name: String,
    pub provider: CloudProvider,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_kms: Option<AwsKmsConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_key_vault: Option<AzureKeyVaultConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_cloud_kms: Option<GoogleCloudKmsConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn provider_serializes_uppercase() {
        assert_eq!(serde_json::to_value(CloudProvider::Azure).unwrap(), json!("AZURE"));
        let parsed: CloudProvider = serde_json::from_value(json!("GCP")).unwrap();
        assert_eq!(parsed, CloudProvider::Gcp);
    }

    #[test]
    fn cluster_spec_rejects_unknown_fields() {
        let err = serde_json::from_value::<ClusterSpec>(json!({
            "provider": "AWS",
            "region": "US_EAST_1",
            "instanceSize": "M10",
            "replicas": 3
        }))
        .unwrap_err();
        assert!(err.to_string().contains("replicas"));
    }

    #[test]
    fn cluster_spec_accepts_tier_alias() {
        let spec: ClusterSpec = serde_json::from_value(json!({
            "provider": "AWS",
            "region": "US_EAST_1",
            "tier": "M0"
        }))
        .unwrap();
        assert_eq!(spec.instance_size, "M0");
        assert!(!spec.backup_enabled);
        assert_eq!(spec.cluster_type, ClusterType::Replicaset);
    }

    #[test]
    fn network_access_address_requires_exactly_one() {
        let mut spec = NetworkAccessSpec {
            project_name: String::new(),
            ip_address: Some("203.0.113.1".to_string()),
            cidr_block: None,
            aws_security_group: None,
            comment: None,
            delete_after_date: None,
        };
        assert_eq!(spec.address(), Some("203.0.113.1"));
        spec.cidr_block = Some("10.0.0.0/8".to_string());
        assert_eq!(spec.address(), None);
    }

    #[test]
    fn peering_state_tolerates_unknown_values() {
        let state: PeeringState = serde_json::from_value(json!("WAITING_FOR_USER")).unwrap();
        assert_eq!(state, PeeringState::Unknown);
        let state: PeeringState = serde_json::from_value(json!("PENDING_ACCEPTANCE")).unwrap();
        assert_eq!(state, PeeringState::PendingAcceptance);
    }
}
