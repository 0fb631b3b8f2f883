//! conversion between manifests and admin api payloads.

use matlas_core::{
    AlertConfigurationSpec, AwsKmsConfig, AzureKeyVaultConfig, CloudProvider, ClusterSpec,
    ClusterType, ConnectionStrings, DatabaseUserSpec, EncryptionAtRestSpec, Error,
    GoogleCloudKmsConfig, Metadata, NetworkAccessSpec, NetworkContainerSpec, NetworkPeeringSpec,
    ProjectSpec, Resource, ResourceSpec, Result, RoleAssignment, ScopeType, SearchIndexSpec,
    SearchIndexType, Secret, UserScope, VpcEndpointSpec, MASKED_SENTINEL,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// tiers served from shared infrastructure.
const TENANT_TIERS: [&str; 3] = ["M0", "M2", "M5"];

fn text(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn required(value: &Value, key: &str, what: &str) -> Result<String> {
    text(value, key).ok_or_else(|| Error::Http(format!("{what} payload has no `{key}`")))
}

fn flag(value: &Value, key: &str) -> Option<bool> {
    value.get(key).and_then(Value::as_bool)
}

fn number(value: &Value, key: &str) -> Option<u32> {
    value
        .get(key)
        .and_then(Value::as_f64)
        .map(|number| number as u32)
}

fn parse<T: DeserializeOwned>(value: Option<&Value>) -> Option<T> {
    value.and_then(|value| serde_json::from_value(value.clone()).ok())
}

fn decode<T: DeserializeOwned>(value: Value, what: &str) -> Result<T> {
    serde_json::from_value(value).map_err(|err| Error::Http(format!("decode {what}: {err}")))
}

/// insert `key` only when the value is present.
fn put(body: &mut Map<String, Value>, key: &str, value: Option<impl Into<Value>>) {
    if let Some(value) = value {
        body.insert(key.to_string(), value.into());
    }
}

fn with_id(mut metadata: Metadata, value: &Value, key: &str) -> Metadata {
    metadata.id = text(value, key);
    metadata
}

pub(crate) fn project_to_wire(spec: &ProjectSpec) -> Value {
    let mut body = Map::new();
    body.insert("name".to_string(), json!(spec.name));
    body.insert("orgId".to_string(), json!(spec.organization_id));
    if !spec.tags.is_empty() {
        let tags: Vec<Value> = spec
            .tags
            .iter()
            .map(|(key, value)| json!({ "key": key, "value": value }))
            .collect();
        body.insert("tags".to_string(), Value::Array(tags));
    }
    Value::Object(body)
}

pub(crate) fn project_from_wire(value: &Value) -> Result<Resource> {
    let name = required(value, "name", "project")?;
    let tags: BTreeMap<String, String> = value
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(|tag| Some((text(tag, "key")?, text(tag, "value")?)))
                .collect()
        })
        .unwrap_or_default();
    Ok(Resource::new(
        with_id(Metadata::named(&name), value, "id"),
        ResourceSpec::Project(ProjectSpec {
            name,
            organization_id: text(value, "orgId").unwrap_or_default(),
            tags,
        }),
    ))
}

fn is_tenant(instance_size: &str) -> bool {
    TENANT_TIERS.contains(&instance_size)
}

pub(crate) fn cluster_to_wire(name: &str, spec: &ClusterSpec) -> Value {
    let provider = spec.provider.as_str();
    let mut electable = Map::new();
    electable.insert("instanceSize".to_string(), json!(spec.instance_size));
    let mut region = Map::new();
    if is_tenant(&spec.instance_size) {
        region.insert("providerName".to_string(), json!("TENANT"));
        region.insert("backingProviderName".to_string(), json!(provider));
    } else {
        region.insert("providerName".to_string(), json!(provider));
        electable.insert("nodeCount".to_string(), json!(spec.node_count.unwrap_or(3)));
        put(&mut electable, "diskSizeGB", spec.disk_size_gb);
    }
    region.insert("regionName".to_string(), json!(spec.region));
    region.insert("priority".to_string(), json!(7));
    region.insert("electableSpecs".to_string(), Value::Object(electable));

    let mut replication = Map::new();
    put(&mut replication, "numShards", spec.num_shards);
    replication.insert("regionConfigs".to_string(), json!([Value::Object(region)]));

    let mut body = Map::new();
    body.insert("name".to_string(), json!(name));
    body.insert("clusterType".to_string(), json!(spec.cluster_type));
    body.insert("replicationSpecs".to_string(), json!([Value::Object(replication)]));
    body.insert("backupEnabled".to_string(), json!(spec.backup_enabled));
    body.insert("pitEnabled".to_string(), json!(spec.pit_enabled));
    put(&mut body, "mongoDBMajorVersion", spec.mongodb_version.clone());
    put(
        &mut body,
        "terminationProtectionEnabled",
        spec.termination_protection_enabled,
    );
    Value::Object(body)
}

pub(crate) fn cluster_from_wire(value: &Value) -> Result<Resource> {
    let name = required(value, "name", "cluster")?;
    let replication = value
        .get("replicationSpecs")
        .and_then(|specs| specs.get(0))
        .cloned()
        .unwrap_or(Value::Null);
    let region = replication
        .get("regionConfigs")
        .and_then(|configs| configs.get(0))
        .cloned()
        .unwrap_or(Value::Null);
    let electable = region.get("electableSpecs").cloned().unwrap_or(Value::Null);
    let provider_name = match text(&region, "providerName").as_deref() {
        Some("TENANT") => text(&region, "backingProviderName"),
        other => other.map(str::to_string),
    };
    let provider: CloudProvider = parse(provider_name.map(Value::String).as_ref())
        .ok_or_else(|| Error::Http(format!("cluster {name} has no known provider")))?;
    let connection_strings = value.get("connectionStrings").map(|strings| ConnectionStrings {
        standard: text(strings, "standard"),
        standard_srv: text(strings, "standardSrv"),
    });

    Ok(Resource::new(
        with_id(Metadata::named(&name), value, "id"),
        ResourceSpec::Cluster(ClusterSpec {
            project_name: String::new(),
            provider,
            region: text(&region, "regionName").unwrap_or_default(),
            instance_size: text(&electable, "instanceSize").unwrap_or_default(),
            cluster_type: parse::<ClusterType>(value.get("clusterType")).unwrap_or_default(),
            node_count: number(&electable, "nodeCount"),
            num_shards: number(&replication, "numShards"),
            mongodb_version: text(value, "mongoDBMajorVersion"),
            disk_size_gb: number(&electable, "diskSizeGB").or_else(|| number(value, "diskSizeGB")),
            backup_enabled: flag(value, "backupEnabled").unwrap_or(false),
            pit_enabled: flag(value, "pitEnabled").unwrap_or(false),
            termination_protection_enabled: flag(value, "terminationProtectionEnabled"),
            state_name: text(value, "stateName"),
            connection_strings,
        }),
    ))
}

pub(crate) fn user_to_wire(project_id: &str, spec: &DatabaseUserSpec) -> Value {
    let roles: Vec<Value> = spec
        .roles
        .iter()
        .map(|role| {
            let mut entry = Map::new();
            entry.insert("roleName".to_string(), json!(role.role_name));
            entry.insert("databaseName".to_string(), json!(role.database_name));
            put(&mut entry, "collectionName", role.collection_name.clone());
            Value::Object(entry)
        })
        .collect();
    let mut body = Map::new();
    body.insert("groupId".to_string(), json!(project_id));
    body.insert("username".to_string(), json!(spec.username));
    body.insert("databaseName".to_string(), json!(spec.auth_database));
    body.insert("roles".to_string(), Value::Array(roles));
    if !spec.scopes.is_empty() {
        body.insert(
            "scopes".to_string(),
            json!(spec
                .scopes
                .iter()
                .map(|scope| json!({ "name": scope.name, "type": scope.scope_type }))
                .collect::<Vec<_>>()),
        );
    }
    put(
        &mut body,
        "password",
        spec.password
            .as_ref()
            .and_then(Secret::expose)
            .map(str::to_string),
    );
    Value::Object(body)
}

pub(crate) fn user_from_wire(value: &Value) -> Result<Resource> {
    let username = required(value, "username", "database user")?;
    let auth_database = text(value, "databaseName").unwrap_or_else(|| "admin".to_string());
    let roles = value
        .get("roles")
        .and_then(Value::as_array)
        .map(|roles| {
            roles
                .iter()
                .filter_map(|role| {
                    Some(RoleAssignment {
                        role_name: text(role, "roleName")?,
                        database_name: text(role, "databaseName")?,
                        collection_name: text(role, "collectionName"),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    let scopes = value
        .get("scopes")
        .and_then(Value::as_array)
        .map(|scopes| {
            scopes
                .iter()
                .filter_map(|scope| {
                    Some(UserScope {
                        name: text(scope, "name")?,
                        scope_type: parse::<ScopeType>(scope.get("type")).unwrap_or_default(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    // passwords are write-only; scram users always carry one.
    let password = (auth_database == "admin").then_some(Secret::Masked);
    Ok(Resource::new(
        Metadata::named(&username),
        ResourceSpec::DatabaseUser(DatabaseUserSpec {
            project_name: String::new(),
            username,
            auth_database,
            password,
            roles,
            scopes,
        }),
    ))
}

pub(crate) fn access_to_wire(spec: &NetworkAccessSpec) -> Value {
    let mut body = Map::new();
    put(&mut body, "ipAddress", spec.ip_address.clone());
    put(&mut body, "cidrBlock", spec.cidr_block.clone());
    put(&mut body, "awsSecurityGroup", spec.aws_security_group.clone());
    put(&mut body, "comment", spec.comment.clone());
    put(&mut body, "deleteAfterDate", spec.delete_after_date.clone());
    Value::Object(body)
}

pub(crate) fn access_from_wire(value: &Value) -> Result<Resource> {
    let ip = text(value, "ipAddress");
    let cidr = text(value, "cidrBlock");
    let group = text(value, "awsSecurityGroup");
    // single addresses come back with both fields set.
    let (ip_address, cidr_block, aws_security_group) = match (ip, cidr, group) {
        (_, _, Some(group)) => (None, None, Some(group)),
        (Some(ip), Some(cidr), None) if cidr.ends_with("/32") || cidr.ends_with("/128") => {
            (Some(ip), None, None)
        }
        (_, Some(cidr), None) => (None, Some(cidr), None),
        (Some(ip), None, None) => (Some(ip), None, None),
        (None, None, None) => {
            return Err(Error::Http("access list entry has no address".to_string()))
        }
    };
    let spec = NetworkAccessSpec {
        project_name: String::new(),
        ip_address,
        cidr_block,
        aws_security_group,
        comment: text(value, "comment"),
        delete_after_date: text(value, "deleteAfterDate"),
    };
    let name = spec.address().unwrap_or_default().to_string();
    Ok(Resource::new(
        Metadata::named(name),
        ResourceSpec::NetworkAccess(spec),
    ))
}

pub(crate) fn container_to_wire(spec: &NetworkContainerSpec) -> Value {
    let mut body = Map::new();
    body.insert("providerName".to_string(), json!(spec.provider));
    body.insert("atlasCidrBlock".to_string(), json!(spec.atlas_cidr_block));
    match spec.provider {
        CloudProvider::Aws => put(&mut body, "regionName", spec.region.clone()),
        CloudProvider::Azure => put(&mut body, "region", spec.region.clone()),
        CloudProvider::Gcp => {
            if let Some(region) = &spec.region {
                body.insert("regions".to_string(), json!([region]));
            }
        }
    }
    Value::Object(body)
}

pub(crate) fn container_from_wire(value: &Value) -> Result<Resource> {
    let provider: CloudProvider = parse(value.get("providerName"))
        .ok_or_else(|| Error::Http("network container has no known provider".to_string()))?;
    let region = text(value, "regionName").or_else(|| text(value, "region"));
    let spec = NetworkContainerSpec {
        project_name: String::new(),
        provider,
        region,
        atlas_cidr_block: required(value, "atlasCidrBlock", "network container")?,
        vpc_id: text(value, "vpcId").or_else(|| text(value, "vnetName")),
        provisioned: flag(value, "provisioned"),
    };
    let name = matlas_core::container_key(provider.as_str(), spec.region.as_deref());
    Ok(Resource::new(
        with_id(Metadata::named(name), value, "id"),
        ResourceSpec::NetworkContainer(spec),
    ))
}

pub(crate) fn peering_to_wire(spec: &NetworkPeeringSpec, container_id: &str) -> Value {
    let mut body = Map::new();
    body.insert("containerId".to_string(), json!(container_id));
    body.insert("providerName".to_string(), json!(spec.provider));
    put(&mut body, "accepterRegionName", spec.accepter_region_name.clone());
    put(&mut body, "awsAccountId", spec.aws_account_id.clone());
    put(&mut body, "routeTableCidrBlock", spec.route_table_cidr_block.clone());
    put(&mut body, "vpcId", spec.vpc_id.clone());
    put(&mut body, "gcpProjectId", spec.gcp_project_id.clone());
    put(&mut body, "networkName", spec.network_name.clone());
    put(&mut body, "azureDirectoryId", spec.azure_directory_id.clone());
    put(&mut body, "azureSubscriptionId", spec.azure_subscription_id.clone());
    put(&mut body, "resourceGroupName", spec.resource_group_name.clone());
    put(&mut body, "vnetName", spec.vnet_name.clone());
    Value::Object(body)
}

/// `container` is the identity name of the peering's container, when known.
pub(crate) fn peering_from_wire(value: &Value, container: Option<String>) -> Result<Resource> {
    let provider: CloudProvider = parse(value.get("providerName"))
        .ok_or_else(|| Error::Http("network peering has no known provider".to_string()))?;
    let spec = NetworkPeeringSpec {
        project_name: String::new(),
        provider,
        container,
        accepter_region_name: text(value, "accepterRegionName"),
        aws_account_id: text(value, "awsAccountId"),
        route_table_cidr_block: text(value, "routeTableCidrBlock"),
        vpc_id: text(value, "vpcId"),
        gcp_project_id: text(value, "gcpProjectId"),
        network_name: text(value, "networkName"),
        azure_directory_id: text(value, "azureDirectoryId"),
        azure_subscription_id: text(value, "azureSubscriptionId"),
        resource_group_name: text(value, "resourceGroupName"),
        vnet_name: text(value, "vnetName"),
        status_name: parse(value.get("statusName").or_else(|| value.get("status"))),
        error_state_name: text(value, "errorStateName").or_else(|| text(value, "errorState")),
    };
    let name = format!(
        "{}:{}",
        provider,
        spec.remote_network().unwrap_or_default()
    );
    Ok(Resource::new(
        with_id(Metadata::named(name), value, "id"),
        ResourceSpec::NetworkPeering(spec),
    ))
}

pub(crate) fn search_index_to_wire(name: &str, spec: &SearchIndexSpec) -> Value {
    json!({
        "name": name,
        "database": spec.database_name,
        "collectionName": spec.collection_name,
        "type": spec.index_type,
        "definition": spec.definition,
    })
}

pub(crate) fn search_index_from_wire(value: &Value, cluster_name: &str) -> Result<Resource> {
    let name = required(value, "name", "search index")?;
    let definition = value
        .get("latestDefinition")
        .or_else(|| value.get("definition"))
        .cloned()
        .unwrap_or_else(|| json!({}));
    Ok(Resource::new(
        with_id(Metadata::named(&name), value, "indexID"),
        ResourceSpec::SearchIndex(SearchIndexSpec {
            project_name: String::new(),
            cluster_name: cluster_name.to_string(),
            database_name: required(value, "database", "search index")?,
            collection_name: required(value, "collectionName", "search index")?,
            index_name: name,
            index_type: parse::<SearchIndexType>(value.get("type")).unwrap_or_default(),
            definition,
            status: text(value, "status"),
        }),
    ))
}

pub(crate) fn endpoint_service_from_wire(value: &Value, provider: CloudProvider) -> Result<Resource> {
    let id = required(value, "id", "private endpoint service")?;
    let region = text(value, "regionName");
    let spec = VpcEndpointSpec {
        project_name: String::new(),
        provider,
        endpoint_service_id: region.is_none().then(|| id.clone()),
        region,
        endpoint_service_name: text(value, "endpointServiceName")
            .or_else(|| text(value, "privateLinkServiceName")),
        status: text(value, "status"),
    };
    let target = spec
        .region
        .clone()
        .or_else(|| spec.endpoint_service_id.clone())
        .unwrap_or_default();
    let mut metadata = Metadata::named(format!("{provider}:{target}"));
    metadata.id = Some(id);
    Ok(Resource::new(metadata, ResourceSpec::VpcEndpoint(spec)))
}

/// keys of a notification that the api returns obfuscated.
const NOTIFICATION_SECRETS: [&str; 5] = [
    "apiToken",
    "serviceKey",
    "apiKey",
    "webhookSecret",
    "microsoftTeamsWebhookUrl",
];

const NOTIFICATION_FIELDS: [&str; 13] = [
    "typeName",
    "delayMin",
    "intervalMin",
    "emailAddress",
    "mobileNumber",
    "channelName",
    "routingKey",
    "region",
    "webhookUrl",
    "username",
    "roles",
    "emailEnabled",
    "smsEnabled",
];

fn pick(value: &Value, keys: &[&str]) -> Value {
    let mut picked = Map::new();
    for key in keys {
        if let Some(inner) = value.get(*key).filter(|inner| !inner.is_null()) {
            picked.insert(key.to_string(), inner.clone());
        }
    }
    Value::Object(picked)
}

/// drop masked and digested secrets so they are never written back.
fn strip_opaque(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, inner| {
                inner
                    .as_str()
                    .map_or(true, |text| text != MASKED_SENTINEL && !text.starts_with("sha256:"))
            });
            for inner in map.values_mut() {
                strip_opaque(inner);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(strip_opaque),
        _ => {}
    }
}

pub(crate) fn alert_to_wire(spec: &AlertConfigurationSpec) -> Result<Value> {
    let mut body = serde_json::to_value(spec)
        .map_err(|err| Error::Validation(format!("encode alert configuration: {err}")))?;
    if let Value::Object(map) = &mut body {
        map.remove("projectName");
    }
    strip_opaque(&mut body);
    Ok(body)
}

pub(crate) fn alert_from_wire(value: &Value) -> Result<Resource> {
    let notifications: Vec<Value> = value
        .get("notifications")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter(|item| parse::<matlas_core::NotificationType>(item.get("typeName")).is_some())
                .map(|item| {
                    let mut picked = pick(item, &NOTIFICATION_FIELDS);
                    for key in NOTIFICATION_SECRETS {
                        if item.get(key).is_some_and(|secret| !secret.is_null()) {
                            picked[key] = json!(MASKED_SENTINEL);
                        }
                    }
                    picked
                })
                .collect()
        })
        .unwrap_or_default();
    let matchers: Vec<Value> = value
        .get("matchers")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| pick(item, &["fieldName", "operator", "value"]))
                .collect()
        })
        .unwrap_or_default();

    let mut raw = Map::new();
    raw.insert("enabled".to_string(), json!(flag(value, "enabled").unwrap_or(true)));
    raw.insert(
        "eventTypeName".to_string(),
        json!(required(value, "eventTypeName", "alert configuration")?),
    );
    raw.insert("matchers".to_string(), Value::Array(matchers));
    raw.insert("notifications".to_string(), Value::Array(notifications));
    if let Some(metric) = value.get("metricThreshold").filter(|metric| !metric.is_null()) {
        raw.insert(
            "metricThreshold".to_string(),
            pick(metric, &["metricName", "operator", "threshold", "units", "mode"]),
        );
    }
    if let Some(threshold) = value.get("threshold").filter(|threshold| !threshold.is_null()) {
        raw.insert(
            "threshold".to_string(),
            pick(threshold, &["operator", "threshold", "units"]),
        );
    }
    let spec: AlertConfigurationSpec = decode(Value::Object(raw), "alert configuration")?;
    let name = text(value, "id").unwrap_or_else(|| spec.event_type_name.to_ascii_lowercase());
    Ok(Resource::new(
        with_id(Metadata::named(name), value, "id"),
        ResourceSpec::AlertConfiguration(spec),
    ))
}

/// payload key of a provider's encryption block.
pub(crate) fn encryption_key(provider: CloudProvider) -> &'static str {
    match provider {
        CloudProvider::Aws => "awsKms",
        CloudProvider::Azure => "azureKeyVault",
        CloudProvider::Gcp => "googleCloudKms",
    }
}

fn secret_value(secret: &Option<Secret>) -> Option<String> {
    secret.as_ref().and_then(Secret::expose).map(str::to_string)
}

pub(crate) fn encryption_to_wire(spec: &EncryptionAtRestSpec) -> Value {
    let mut block = Map::new();
    block.insert("enabled".to_string(), json!(spec.enabled));
    if let Some(aws) = &spec.aws_kms {
        put(&mut block, "customerMasterKeyID", aws.customer_master_key_id.clone());
        put(&mut block, "region", aws.region.clone());
        put(&mut block, "accessKeyID", aws.access_key_id.clone());
        put(&mut block, "secretAccessKey", secret_value(&aws.secret_access_key));
        put(&mut block, "roleId", aws.role_id.clone());
    }
    if let Some(azure) = &spec.azure_key_vault {
        put(&mut block, "azureEnvironment", azure.azure_environment.clone());
        block.insert("clientID".to_string(), json!(azure.client_id));
        block.insert("keyIdentifier".to_string(), json!(azure.key_identifier));
        block.insert("keyVaultName".to_string(), json!(azure.key_vault_name));
        block.insert("resourceGroupName".to_string(), json!(azure.resource_group_name));
        put(&mut block, "secret", secret_value(&azure.secret));
        block.insert("subscriptionID".to_string(), json!(azure.subscription_id));
        block.insert("tenantID".to_string(), json!(azure.tenant_id));
    }
    if let Some(gcp) = &spec.google_cloud_kms {
        block.insert(
            "keyVersionResourceID".to_string(),
            json!(gcp.key_version_resource_id),
        );
        put(&mut block, "serviceAccountKey", secret_value(&gcp.service_account_key));
    }
    json!({ encryption_key(spec.provider): Value::Object(block) })
}

/// one resource per provider block that is enabled.
pub(crate) fn encryption_from_wire(value: &Value) -> Vec<Resource> {
    let masked = |block: &Value, key: &str| block.get(key).filter(|v| !v.is_null()).map(|_| Secret::Masked);
    let mut resources = Vec::new();
    for provider in CloudProvider::ALL {
        let Some(block) = value.get(encryption_key(provider)) else {
            continue;
        };
        if flag(block, "enabled") != Some(true) {
            continue;
        }
        let mut spec = EncryptionAtRestSpec {
            project_name: String::new(),
            provider,
            enabled: true,
            aws_kms: None,
            azure_key_vault: None,
            google_cloud_kms: None,
        };
        match provider {
            CloudProvider::Aws => {
                spec.aws_kms = Some(AwsKmsConfig {
                    customer_master_key_id: text(block, "customerMasterKeyID"),
                    region: text(block, "region"),
                    access_key_id: text(block, "accessKeyID"),
                    secret_access_key: masked(block, "secretAccessKey"),
                    role_id: text(block, "roleId"),
                })
            }
            CloudProvider::Azure => {
                spec.azure_key_vault = Some(AzureKeyVaultConfig {
                    azure_environment: text(block, "azureEnvironment"),
                    client_id: text(block, "clientID").unwrap_or_default(),
                    key_identifier: text(block, "keyIdentifier").unwrap_or_default(),
                    key_vault_name: text(block, "keyVaultName").unwrap_or_default(),
                    resource_group_name: text(block, "resourceGroupName").unwrap_or_default(),
                    secret: masked(block, "secret"),
                    subscription_id: text(block, "subscriptionID").unwrap_or_default(),
                    tenant_id: text(block, "tenantID").unwrap_or_default(),
                })
            }
            CloudProvider::Gcp => {
                spec.google_cloud_kms = Some(GoogleCloudKmsConfig {
                    key_version_resource_id: text(block, "keyVersionResourceID").unwrap_or_default(),
                    service_account_key: masked(block, "serviceAccountKey"),
                })
            }
        }
        resources.push(Resource::new(
            Metadata::named(provider.as_str().to_ascii_lowercase()),
            ResourceSpec::EncryptionAtRest(spec),
        ));
    }
    resources
}
