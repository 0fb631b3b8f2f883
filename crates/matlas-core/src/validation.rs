//! validation utilities for desired resources.

use crate::alert::AlertConfigurationSpec;
use crate::error::Error;
use crate::ir::{Identity, Kind, Resource, ResourceSpec};
use crate::resources::{
    CloudProvider, ClusterSpec, DatabaseRoleSpec, DatabaseUserSpec, EncryptionAtRestSpec,
    NetworkAccessSpec, NetworkContainerSpec, NetworkPeeringSpec, SearchIndexSpec, VpcEndpointSpec,
};
use ipnet::IpNet;
use regex::Regex;
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::OnceLock;
use thiserror::Error;

/// validation errors emitted for desired resources.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{message} ({resource})")]
    Invalid { resource: String, message: String },
    #[error("duplicate identity: {0}")]
    DuplicateIdentity(Identity),
    #[error("network containers {first} ({first_cidr}) and {second} ({second_cidr}) overlap")]
    CidrOverlap {
        first: String,
        first_cidr: String,
        second: String,
        second_cidr: String,
    },
}

impl ValidationError {
    fn invalid(resource: &Resource, message: impl Into<String>) -> Self {
        ValidationError::Invalid {
            resource: resource.identity().to_string(),
            message: message.into(),
        }
    }
}

/// aggregated validation report.
#[derive(Debug, Default, Clone)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// return true when no errors are present.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// return true when errors are present.
    pub fn is_err(&self) -> bool {
        !self.errors.is_empty()
    }

    /// fold the errors into one typed error, if any.
    pub fn into_error(self) -> Option<Error> {
        if self.errors.is_empty() {
            return None;
        }
        let message = self
            .errors
            .iter()
            .map(|err| err.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        Some(Error::Validation(message))
    }
}

fn cluster_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9-]{1,64}$").expect("valid cluster name regex"))
}

fn tier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(M[0-9]{1,3}|R[0-9]{2,3}|M[0-9]{2,3}_NVME|FLEX)$").expect("valid tier regex")
    })
}

/// validate a set of desired resources: per-resource rules, duplicate
/// identities and overlapping container ranges.
pub fn validate_resources(resources: &[Resource]) -> ValidationReport {
    let mut report = ValidationReport::default();
    let mut seen = BTreeSet::new();

    for resource in resources {
        validate_resource(resource, &mut report);
        let identity = resource.identity();
        if !seen.insert(identity.clone()) {
            report
                .errors
                .push(ValidationError::DuplicateIdentity(identity));
        }
    }

    let containers: Vec<(String, &NetworkContainerSpec)> = resources
        .iter()
        .filter_map(|resource| match &resource.spec {
            ResourceSpec::NetworkContainer(spec) => Some((resource.identity().to_string(), spec)),
            _ => None,
        })
        .collect();
    for (i, (first, a)) in containers.iter().enumerate() {
        for (second, b) in containers.iter().skip(i + 1) {
            if a.project_name == b.project_name && cidrs_overlap(&a.atlas_cidr_block, &b.atlas_cidr_block) {
                report.errors.push(ValidationError::CidrOverlap {
                    first: first.clone(),
                    first_cidr: a.atlas_cidr_block.clone(),
                    second: second.clone(),
                    second_cidr: b.atlas_cidr_block.clone(),
                });
            }
        }
    }

    report
}

/// validate one resource against its cross-field rules.
pub fn validate_resource(resource: &Resource, report: &mut ValidationReport) {
    if resource.metadata.name.trim().is_empty() {
        report
            .errors
            .push(ValidationError::invalid(resource, "metadata.name must not be empty"));
    }
    if resource.kind() != Kind::Project && resource.project_name().trim().is_empty() {
        report
            .errors
            .push(ValidationError::invalid(resource, "projectName must not be empty"));
    }
    let mut push = |message: String| {
        report
            .errors
            .push(ValidationError::invalid(resource, message));
    };
    match &resource.spec {
        ResourceSpec::Project(spec) => {
            if spec.name.trim().is_empty() {
                push("name must not be empty".to_string());
            }
            if spec.organization_id.trim().is_empty() {
                push("organizationId must not be empty".to_string());
            }
        }
        ResourceSpec::Cluster(spec) => check_cluster(&resource.metadata.name, spec, &mut push),
        ResourceSpec::DatabaseUser(spec) => check_user(spec, &mut push),
        ResourceSpec::DatabaseRole(spec) => check_role(spec, &mut push),
        ResourceSpec::NetworkAccess(spec) => check_network_access(spec, &mut push),
        ResourceSpec::NetworkContainer(spec) => check_container(spec, &mut push),
        ResourceSpec::NetworkPeering(spec) => check_peering(spec, &mut push),
        ResourceSpec::SearchIndex(spec) => check_search_index(spec, &mut push),
        ResourceSpec::VpcEndpoint(spec) => check_vpc_endpoint(spec, &mut push),
        ResourceSpec::AlertConfiguration(spec) => check_alert(spec, &mut push),
        ResourceSpec::EncryptionAtRest(spec) => check_encryption(spec, &mut push),
    }

    let mut copy = resource.clone();
    if copy.has_plaintext_secrets() {
        report.warnings.push(format!(
            "{} carries a plaintext secret; prefer ${{VAR}} interpolation",
            resource.identity()
        ));
    }
}

fn check_cluster(name: &str, spec: &ClusterSpec, push: &mut impl FnMut(String)) {
    if !cluster_name_pattern().is_match(name) {
        push(format!("cluster name `{name}` must match [A-Za-z0-9-]{{1,64}}"));
    }
    if spec.region.trim().is_empty() {
        push("region must not be empty".to_string());
    }
    if !tier_pattern().is_match(&spec.instance_size) {
        push(format!("unknown instance size `{}`", spec.instance_size));
    }
    if spec.pit_enabled && !spec.backup_enabled {
        push("pitEnabled requires backupEnabled".to_string());
    }
    if spec.node_count.is_some_and(|count| count == 0 || count > 50) {
        push("nodeCount must be between 1 and 50".to_string());
    }
    if spec.num_shards.is_some_and(|shards| shards == 0) {
        push("numShards must be at least 1".to_string());
    }
}

fn check_user(spec: &DatabaseUserSpec, push: &mut impl FnMut(String)) {
    if spec.username.trim().is_empty() {
        push("username must not be empty".to_string());
    }
    if spec.auth_database.trim().is_empty() {
        push("authDatabase must not be empty".to_string());
    }
    if spec.roles.is_empty() {
        push("at least one role is required".to_string());
    }
    for role in &spec.roles {
        if role.role_name.trim().is_empty() || role.database_name.trim().is_empty() {
            push("roles require roleName and databaseName".to_string());
        }
    }
    for scope in &spec.scopes {
        if scope.name.trim().is_empty() {
            push("scope name must not be empty".to_string());
        }
    }
}

fn check_role(spec: &DatabaseRoleSpec, push: &mut impl FnMut(String)) {
    if spec.role_name.trim().is_empty() {
        push("roleName must not be empty".to_string());
    }
    if spec.database_name.trim().is_empty() {
        push("databaseName must not be empty".to_string());
    }
    if spec.privileges.is_empty() && spec.inherited_roles.is_empty() {
        push("a custom role needs privileges or inheritedRoles".to_string());
    }
    for privilege in &spec.privileges {
        if privilege.actions.is_empty() {
            push("privilege actions must not be empty".to_string());
        }
        if privilege.resource.database != spec.database_name {
            push(format!(
                "privilege on `{}` is outside role database `{}`",
                privilege.resource.database, spec.database_name
            ));
        }
    }
}

fn check_network_access(spec: &NetworkAccessSpec, push: &mut impl FnMut(String)) {
    let set = [
        spec.ip_address.is_some(),
        spec.cidr_block.is_some(),
        spec.aws_security_group.is_some(),
    ]
    .into_iter()
    .filter(|present| *present)
    .count();
    if set != 1 {
        push("exactly one of ipAddress, cidrBlock, awsSecurityGroup must be set".to_string());
        return;
    }
    if let Some(ip) = &spec.ip_address {
        if ip.parse::<IpAddr>().is_err() {
            push(format!("invalid ipAddress `{ip}`"));
        }
    }
    if let Some(cidr) = &spec.cidr_block {
        if cidr.parse::<IpNet>().is_err() {
            push(format!("invalid cidrBlock `{cidr}`"));
        }
    }
    if let Some(group) = &spec.aws_security_group {
        if group.trim().is_empty() {
            push("awsSecurityGroup must not be empty".to_string());
        }
    }
}

/// check a container cidr against the provider prefix bounds.
pub fn check_container_cidr(provider: CloudProvider, cidr: &str) -> Result<IpNet, String> {
    let net = match cidr.parse::<IpNet>() {
        Ok(IpNet::V4(net)) => IpNet::V4(net),
        Ok(IpNet::V6(_)) => return Err(format!("atlasCidrBlock `{cidr}` must be IPv4")),
        Err(_) => return Err(format!("invalid atlasCidrBlock `{cidr}`")),
    };
    let (min, max) = provider.container_prefix_bounds();
    if net.prefix_len() < min || net.prefix_len() > max {
        return Err(format!(
            "{provider} container cidr must be between /{min} and /{max}, got /{}",
            net.prefix_len()
        ));
    }
    Ok(net)
}

fn check_container(spec: &NetworkContainerSpec, push: &mut impl FnMut(String)) {
    if let Err(message) = check_container_cidr(spec.provider, &spec.atlas_cidr_block) {
        push(message);
    }
    if spec.provider != CloudProvider::Gcp && spec.region.as_deref().map_or(true, str::is_empty) {
        push(format!("{} containers require a region", spec.provider));
    }
}

fn check_peering(spec: &NetworkPeeringSpec, push: &mut impl FnMut(String)) {
    let required: Vec<(&str, &Option<String>)> = match spec.provider {
        CloudProvider::Aws => vec![
            ("accepterRegionName", &spec.accepter_region_name),
            ("awsAccountId", &spec.aws_account_id),
            ("routeTableCidrBlock", &spec.route_table_cidr_block),
            ("vpcId", &spec.vpc_id),
        ],
        CloudProvider::Gcp => vec![
            ("gcpProjectId", &spec.gcp_project_id),
            ("networkName", &spec.network_name),
        ],
        CloudProvider::Azure => vec![
            ("azureDirectoryId", &spec.azure_directory_id),
            ("azureSubscriptionId", &spec.azure_subscription_id),
            ("resourceGroupName", &spec.resource_group_name),
            ("vnetName", &spec.vnet_name),
        ],
    };
    for (field, value) in required {
        if value.as_deref().map_or(true, |v| v.trim().is_empty()) {
            push(format!("{} peering requires {field}", spec.provider));
        }
    }
    if let Some(cidr) = &spec.route_table_cidr_block {
        if cidr.parse::<IpNet>().is_err() {
            push(format!("invalid routeTableCidrBlock `{cidr}`"));
        }
    }
}

fn check_search_index(spec: &SearchIndexSpec, push: &mut impl FnMut(String)) {
    for (field, value) in [
        ("clusterName", &spec.cluster_name),
        ("databaseName", &spec.database_name),
        ("collectionName", &spec.collection_name),
    ] {
        if value.trim().is_empty() {
            push(format!("{field} must not be empty"));
        }
    }
    if !spec.definition.is_object() {
        push("definition must be an object".to_string());
    }
}

fn check_vpc_endpoint(spec: &VpcEndpointSpec, push: &mut impl FnMut(String)) {
    match (&spec.region, &spec.endpoint_service_id) {
        (Some(region), None) => {
            if spec.provider == CloudProvider::Aws && !region.contains('-') {
                push(format!("AWS region `{region}` must look like `us-east-1`"));
            }
        }
        (None, Some(id)) if !id.trim().is_empty() => {}
        _ => push("exactly one of region, endpointServiceId must be set".to_string()),
    }
}

fn check_alert(spec: &AlertConfigurationSpec, push: &mut impl FnMut(String)) {
    if spec.event_type_name.trim().is_empty() {
        push("eventTypeName must not be empty".to_string());
    }
    if spec.notifications.is_empty() {
        push("at least one notification is required".to_string());
    }
    for (index, notification) in spec.notifications.iter().enumerate() {
        for field in notification.missing_fields() {
            push(format!(
                "notifications[{index}] of type {} requires {field}",
                notification.type_name.as_str()
            ));
        }
    }
    for matcher in &spec.matchers {
        if matcher.field_name.trim().is_empty() {
            push("matcher fieldName must not be empty".to_string());
        }
    }
    if spec.metric_threshold.is_some() && spec.threshold.is_some() {
        push("metricThreshold and threshold are mutually exclusive".to_string());
    }
    if let Some(metric) = &spec.metric_threshold {
        if metric.metric_name.trim().is_empty() {
            push("metricThreshold.metricName must not be empty".to_string());
        }
    }
}

fn check_encryption(spec: &EncryptionAtRestSpec, push: &mut impl FnMut(String)) {
    let configured = match spec.provider {
        CloudProvider::Aws => spec.aws_kms.is_some(),
        CloudProvider::Azure => spec.azure_key_vault.is_some(),
        CloudProvider::Gcp => spec.google_cloud_kms.is_some(),
    };
    if spec.enabled && !configured {
        push(format!("enabled {} encryption requires its key configuration", spec.provider));
    }
    let foreign = [
        (CloudProvider::Aws, spec.aws_kms.is_some()),
        (CloudProvider::Azure, spec.azure_key_vault.is_some()),
        (CloudProvider::Gcp, spec.google_cloud_kms.is_some()),
    ]
    .into_iter()
    .any(|(provider, set)| set && provider != spec.provider);
    if foreign {
        push(format!("only {} key configuration may be set", spec.provider));
    }
    if let Some(aws) = &spec.aws_kms {
        if aws.customer_master_key_id.as_deref().map_or(true, str::is_empty) {
            push("awsKms requires customerMasterKeyId".to_string());
        }
        match aws.region.as_deref() {
            Some(region) if region.contains('-') => {}
            Some(region) => push(format!("AWS region `{region}` must look like `us-east-1`")),
            None => push("awsKms requires region".to_string()),
        }
        if spec.enabled {
            let keys = aws.access_key_id.is_some() && aws.secret_access_key.is_some();
            let partial_keys = aws.access_key_id.is_some() != aws.secret_access_key.is_some();
            let role = aws.role_id.is_some();
            if partial_keys || keys == role {
                push(
                    "awsKms requires exactly one of accessKeyId+secretAccessKey or roleId"
                        .to_string(),
                );
            }
        }
    }
    if let Some(gcp) = &spec.google_cloud_kms {
        if gcp.key_version_resource_id.trim().is_empty() {
            push("googleCloudKms requires keyVersionResourceId".to_string());
        }
    }
}

/// true when two cidr strings describe overlapping ranges.
pub fn cidrs_overlap(a: &str, b: &str) -> bool {
    match (a.parse::<IpNet>(), b.parse::<IpNet>()) {
        (Ok(a), Ok(b)) => a.contains(&b.network()) || b.contains(&a.network()),
        _ => false,
    }
}

/// references of `resources` that are absent from `known`.
pub fn unresolved_references(
    resources: &[Resource],
    known: &BTreeSet<Identity>,
) -> Vec<(Identity, Identity)> {
    let mut missing = Vec::new();
    for resource in resources {
        for target in resource.references() {
            if !known.contains(&target) {
                missing.push((resource.identity(), target));
            }
        }
    }
    missing
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{Notification, NotificationType};
    use crate::ir::Metadata;
    use crate::resources::{AwsKmsConfig, ClusterType, RoleAssignment, ScopeType, UserScope};
    use crate::secret::Secret;

    fn cluster(name: &str, backup: bool, pit: bool) -> Resource {
        Resource::new(
            Metadata::named(name),
            ResourceSpec::Cluster(ClusterSpec {
                project_name: "p1".to_string(),
                provider: CloudProvider::Aws,
                region: "US_EAST_1".to_string(),
                instance_size: "M0".to_string(),
                cluster_type: ClusterType::Replicaset,
                node_count: None,
                num_shards: None,
                mongodb_version: None,
                disk_size_gb: None,
                backup_enabled: backup,
                pit_enabled: pit,
                termination_protection_enabled: None,
                state_name: None,
                connection_strings: None,
            }),
        )
    }

    fn container(name: &str, region: &str, cidr: &str) -> Resource {
        Resource::new(
            Metadata::named(name),
            ResourceSpec::NetworkContainer(NetworkContainerSpec {
                project_name: "p1".to_string(),
                provider: CloudProvider::Aws,
                region: Some(region.to_string()),
                atlas_cidr_block: cidr.to_string(),
                vpc_id: None,
                provisioned: None,
            }),
        )
    }

    fn access(ip: Option<&str>, cidr: Option<&str>) -> Resource {
        Resource::new(
            Metadata::named("rule"),
            ResourceSpec::NetworkAccess(NetworkAccessSpec {
                project_name: "p1".to_string(),
                ip_address: ip.map(str::to_string),
                cidr_block: cidr.map(str::to_string),
                aws_security_group: None,
                comment: None,
                delete_after_date: None,
            }),
        )
    }

    fn messages(report: &ValidationReport) -> Vec<String> {
        report.errors.iter().map(|err| err.to_string()).collect()
    }

    #[test]
    fn pit_requires_backup() {
        let report = validate_resources(&[cluster("c1", false, true)]);
        assert!(report.is_err());
        let err = report.into_error().unwrap();
        assert_eq!(
            err.to_string(),
            "ValidationError: pitEnabled requires backupEnabled (Cluster/p1/c1)"
        );
    }

    #[test]
    fn cluster_name_must_match_pattern() {
        let report = validate_resources(&[cluster("bad_name", false, false)]);
        assert!(messages(&report)
            .iter()
            .any(|m| m.contains("must match [A-Za-z0-9-]{1,64}")));
    }

    #[test]
    fn duplicate_identities_rejected() {
        let report = validate_resources(&[cluster("c1", false, false), cluster("c1", false, false)]);
        assert!(report
            .errors
            .iter()
            .any(|err| matches!(err, ValidationError::DuplicateIdentity(_))));
    }

    #[test]
    fn network_access_exactly_one() {
        let report = validate_resources(&[access(Some("203.0.113.1"), Some("10.0.0.0/8"))]);
        assert!(messages(&report)[0].contains("exactly one of"));
        let report = validate_resources(&[access(Some("203.0.113.999"), None)]);
        assert!(messages(&report)[0].contains("invalid ipAddress"));
        assert!(validate_resources(&[access(None, Some("10.0.0.0/8"))]).is_ok());
    }

    #[test]
    fn container_prefix_bounds_per_provider() {
        assert!(check_container_cidr(CloudProvider::Aws, "10.0.0.0/16").is_ok());
        assert!(check_container_cidr(CloudProvider::Aws, "10.0.0.0/28").is_err());
        assert!(check_container_cidr(CloudProvider::Gcp, "10.0.0.0/28").is_ok());
        assert!(check_container_cidr(CloudProvider::Azure, "10.0.0.0/15").is_err());
    }

    #[test]
    fn overlapping_containers_rejected() {
        let report = validate_resources(&[
            container("a", "US_EAST_1", "10.0.0.0/16"),
            container("b", "US_WEST_2", "10.0.5.0/24"),
        ]);
        assert!(report
            .errors
            .iter()
            .any(|err| matches!(err, ValidationError::CidrOverlap { .. })));
        assert!(!cidrs_overlap("10.0.0.0/16", "10.1.0.0/16"));
    }

    #[test]
    fn notification_required_fields_enforced() {
        let resource = Resource::new(
            Metadata::named("alert"),
            ResourceSpec::AlertConfiguration(AlertConfigurationSpec {
                project_name: "p1".to_string(),
                enabled: true,
                event_type_name: "HOST_DOWN".to_string(),
                matchers: Vec::new(),
                notifications: vec![Notification::new(NotificationType::Email)],
                metric_threshold: None,
                threshold: None,
            }),
        );
        let report = validate_resources(&[resource]);
        assert!(messages(&report)
            .iter()
            .any(|m| m.contains("type EMAIL requires emailAddress")));
    }

    #[test]
    fn aws_kms_requires_single_auth_method() {
        let spec = |access: bool, role: bool| EncryptionAtRestSpec {
            project_name: "p1".to_string(),
            provider: CloudProvider::Aws,
            enabled: true,
            aws_kms: Some(AwsKmsConfig {
                customer_master_key_id: Some("cmk".to_string()),
                region: Some("us-east-1".to_string()),
                access_key_id: access.then(|| "AKIA".to_string()),
                secret_access_key: access.then(|| Secret::new("s")),
                role_id: role.then(|| "role".to_string()),
            }),
            azure_key_vault: None,
            google_cloud_kms: None,
        };
        let wrap = |spec| {
            vec![Resource::new(
                Metadata::named("kms"),
                ResourceSpec::EncryptionAtRest(spec),
            )]
        };
        assert!(validate_resources(&wrap(spec(true, false))).is_ok());
        assert!(validate_resources(&wrap(spec(false, true))).is_ok());
        assert!(validate_resources(&wrap(spec(true, true))).is_err());
        assert!(validate_resources(&wrap(spec(false, false))).is_err());
    }

    #[test]
    fn plaintext_password_warns() {
        let user = Resource::new(
            Metadata::named("app"),
            ResourceSpec::DatabaseUser(DatabaseUserSpec {
                project_name: "p1".to_string(),
                username: "app".to_string(),
                auth_database: "admin".to_string(),
                password: Some(Secret::new("pw")),
                roles: vec![RoleAssignment {
                    role_name: "read".to_string(),
                    database_name: "app".to_string(),
                    collection_name: None,
                }],
                scopes: vec![UserScope {
                    name: "c9".to_string(),
                    scope_type: ScopeType::Cluster,
                }],
            }),
        );
        let report = validate_resources(std::slice::from_ref(&user));
        assert!(report.is_ok());
        assert_eq!(report.warnings.len(), 1);

        let known = BTreeSet::from([Identity::new(Kind::Cluster, "p1", "c1")]);
        let missing = unresolved_references(&[user], &known);
        assert_eq!(missing[0].1, Identity::new(Kind::Cluster, "p1", "c9"));
    }
}
