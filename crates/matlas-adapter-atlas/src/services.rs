//! one service per managed resource kind.
//!
//! services check their inputs before touching the network and return
//! resources in manifest form with `metadata.id` set from the api.

use crate::client::{ApiRequest, AtlasClient, SEARCH_MEDIA_TYPE};
use crate::mapping;
use matlas_core::{
    validate_resource, CloudProvider, Error, Resource, ResourceSpec, Result,
    ValidationReport,
};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

/// validate a resource on its own before sending it.
fn check(resource: &Resource) -> Result<()> {
    let mut report = ValidationReport::default();
    validate_resource(resource, &mut report);
    match report.into_error() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

pub(crate) fn live_id(resource: &Resource) -> Result<&str> {
    resource
        .metadata
        .id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| Error::Validation(format!("{} has no live id", resource.identity())))
}

macro_rules! spec_of {
    ($resource:expr, $variant:ident) => {
        match &$resource.spec {
            ResourceSpec::$variant(spec) => spec,
            other => {
                return Err(Error::Validation(format!(
                    "expected {} resource, got {}",
                    stringify!($variant),
                    other.kind()
                )))
            }
        }
    };
}

#[derive(Clone)]
pub struct ProjectService {
    client: Arc<AtlasClient>,
}

impl ProjectService {
    pub fn new(client: Arc<AtlasClient>) -> Self {
        Self { client }
    }

    pub async fn list(&self, cancel: &CancellationToken) -> Result<Vec<Resource>> {
        self.client
            .list_all(cancel, ApiRequest::get(&["groups"]))
            .await?
            .iter()
            .map(mapping::project_from_wire)
            .collect()
    }

    pub async fn get(&self, cancel: &CancellationToken, project_id: &str) -> Result<Resource> {
        require("project id", project_id)?;
        let value = self
            .client
            .fetch(cancel, ApiRequest::get(&["groups", project_id]))
            .await?;
        mapping::project_from_wire(&value)
    }

    /// look a project up by name; `None` when it does not exist.
    pub async fn find_by_name(
        &self,
        cancel: &CancellationToken,
        name: &str,
    ) -> Result<Option<Resource>> {
        require("project name", name)?;
        match self
            .client
            .fetch(cancel, ApiRequest::get(&["groups", "byName", name]))
            .await
        {
            Ok(value) => mapping::project_from_wire(&value).map(Some),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub async fn create(&self, cancel: &CancellationToken, resource: &Resource) -> Result<Resource> {
        check(resource)?;
        let spec = spec_of!(resource, Project);
        let request =
            ApiRequest::new(Method::POST, &["groups"]).body(mapping::project_to_wire(spec));
        mapping::project_from_wire(&self.client.fetch(cancel, request).await?)
    }

    pub async fn update(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        resource: &Resource,
    ) -> Result<Resource> {
        require("project id", project_id)?;
        check(resource)?;
        let spec = spec_of!(resource, Project);
        let mut body = mapping::project_to_wire(spec);
        if let Value::Object(map) = &mut body {
            // ownership cannot move between organizations
            map.remove("orgId");
        }
        let request = ApiRequest::new(Method::PATCH, &["groups", project_id]).body(body);
        mapping::project_from_wire(&self.client.fetch(cancel, request).await?)
    }

    pub async fn delete(&self, cancel: &CancellationToken, project_id: &str) -> Result<()> {
        require("project id", project_id)?;
        self.client
            .call(cancel, ApiRequest::new(Method::DELETE, &["groups", project_id]))
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct ClusterService {
    client: Arc<AtlasClient>,
}

impl ClusterService {
    pub fn new(client: Arc<AtlasClient>) -> Self {
        Self { client }
    }

    pub async fn list(&self, cancel: &CancellationToken, project_id: &str) -> Result<Vec<Resource>> {
        require("project id", project_id)?;
        self.client
            .list_all(cancel, ApiRequest::get(&["groups", project_id, "clusters"]))
            .await?
            .iter()
            .map(mapping::cluster_from_wire)
            .collect()
    }

    pub async fn get(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        name: &str,
    ) -> Result<Resource> {
        require("project id", project_id)?;
        require("cluster name", name)?;
        let value = self
            .client
            .fetch(cancel, ApiRequest::get(&["groups", project_id, "clusters", name]))
            .await?;
        mapping::cluster_from_wire(&value)
    }

    pub async fn create(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        resource: &Resource,
    ) -> Result<Resource> {
        require("project id", project_id)?;
        check(resource)?;
        let spec = spec_of!(resource, Cluster);
        let request = ApiRequest::new(Method::POST, &["groups", project_id, "clusters"])
            .body(mapping::cluster_to_wire(&resource.metadata.name, spec));
        mapping::cluster_from_wire(&self.client.fetch(cancel, request).await?)
    }

    pub async fn update(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        resource: &Resource,
    ) -> Result<Resource> {
        require("project id", project_id)?;
        check(resource)?;
        let spec = spec_of!(resource, Cluster);
        let name = resource.metadata.name.as_str();
        let request = ApiRequest::new(Method::PATCH, &["groups", project_id, "clusters", name])
            .body(mapping::cluster_to_wire(name, spec));
        mapping::cluster_from_wire(&self.client.fetch(cancel, request).await?)
    }

    pub async fn delete(&self, cancel: &CancellationToken, project_id: &str, name: &str) -> Result<()> {
        require("project id", project_id)?;
        require("cluster name", name)?;
        self.client
            .call(
                cancel,
                ApiRequest::new(Method::DELETE, &["groups", project_id, "clusters", name]),
            )
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct DatabaseUserService {
    client: Arc<AtlasClient>,
}

impl DatabaseUserService {
    pub fn new(client: Arc<AtlasClient>) -> Self {
        Self { client }
    }

    pub async fn list(&self, cancel: &CancellationToken, project_id: &str) -> Result<Vec<Resource>> {
        require("project id", project_id)?;
        self.client
            .list_all(cancel, ApiRequest::get(&["groups", project_id, "databaseUsers"]))
            .await?
            .iter()
            .map(mapping::user_from_wire)
            .collect()
    }

    pub async fn get(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        auth_database: &str,
        username: &str,
    ) -> Result<Resource> {
        require("project id", project_id)?;
        require("username", username)?;
        let value = self
            .client
            .fetch(
                cancel,
                ApiRequest::get(&["groups", project_id, "databaseUsers", auth_database, username]),
            )
            .await?;
        mapping::user_from_wire(&value)
    }

    pub async fn create(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        resource: &Resource,
    ) -> Result<Resource> {
        require("project id", project_id)?;
        check(resource)?;
        let spec = spec_of!(resource, DatabaseUser);
        let request = ApiRequest::new(Method::POST, &["groups", project_id, "databaseUsers"])
            .body(mapping::user_to_wire(project_id, spec));
        mapping::user_from_wire(&self.client.fetch(cancel, request).await?)
    }

    pub async fn update(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        resource: &Resource,
    ) -> Result<Resource> {
        require("project id", project_id)?;
        check(resource)?;
        let spec = spec_of!(resource, DatabaseUser);
        let request = ApiRequest::new(
            Method::PATCH,
            &[
                "groups",
                project_id,
                "databaseUsers",
                &spec.auth_database,
                &spec.username,
            ],
        )
        .body(mapping::user_to_wire(project_id, spec));
        mapping::user_from_wire(&self.client.fetch(cancel, request).await?)
    }

    pub async fn delete(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        auth_database: &str,
        username: &str,
    ) -> Result<()> {
        require("project id", project_id)?;
        require("username", username)?;
        self.client
            .call(
                cancel,
                ApiRequest::new(
                    Method::DELETE,
                    &["groups", project_id, "databaseUsers", auth_database, username],
                ),
            )
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct NetworkAccessService {
    client: Arc<AtlasClient>,
}

impl NetworkAccessService {
    pub fn new(client: Arc<AtlasClient>) -> Self {
        Self { client }
    }

    pub async fn list(&self, cancel: &CancellationToken, project_id: &str) -> Result<Vec<Resource>> {
        require("project id", project_id)?;
        self.client
            .list_all(cancel, ApiRequest::get(&["groups", project_id, "accessList"]))
            .await?
            .iter()
            .map(mapping::access_from_wire)
            .collect()
    }

    /// add or replace one entry; the api takes a batch and answers with
    /// the whole list.
    pub async fn upsert(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        resource: &Resource,
    ) -> Result<Resource> {
        require("project id", project_id)?;
        check(resource)?;
        let spec = spec_of!(resource, NetworkAccess);
        let request = ApiRequest::new(Method::POST, &["groups", project_id, "accessList"])
            .body(json!([mapping::access_to_wire(spec)]));
        self.client.call(cancel, request).await?;
        let mut created = Resource::new(
            resource.metadata.clone(),
            ResourceSpec::NetworkAccess(spec.clone()),
        );
        created.metadata.id = spec.address().map(str::to_string);
        Ok(created)
    }

    pub async fn delete(&self, cancel: &CancellationToken, project_id: &str, entry: &str) -> Result<()> {
        require("project id", project_id)?;
        require("access list entry", entry)?;
        self.client
            .call(
                cancel,
                ApiRequest::new(Method::DELETE, &["groups", project_id, "accessList", entry]),
            )
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct NetworkContainerService {
    client: Arc<AtlasClient>,
}

impl NetworkContainerService {
    pub fn new(client: Arc<AtlasClient>) -> Self {
        Self { client }
    }

    /// containers of one provider; a provider with none answers 404.
    pub async fn list_for(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        provider: CloudProvider,
    ) -> Result<Vec<Resource>> {
        require("project id", project_id)?;
        let request = ApiRequest::get(&["groups", project_id, "containers"])
            .query("providerName", provider.as_str());
        match self.client.list_all(cancel, request).await {
            Ok(items) => items.iter().map(mapping::container_from_wire).collect(),
            Err(err) if err.is_not_found() => {
                debug!(provider = %provider, "no network containers");
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }

    pub async fn list(&self, cancel: &CancellationToken, project_id: &str) -> Result<Vec<Resource>> {
        let mut containers = Vec::new();
        for provider in CloudProvider::ALL {
            containers.extend(self.list_for(cancel, project_id, provider).await?);
        }
        Ok(containers)
    }

    pub async fn create(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        resource: &Resource,
    ) -> Result<Resource> {
        require("project id", project_id)?;
        check(resource)?;
        let spec = spec_of!(resource, NetworkContainer);
        let request = ApiRequest::new(Method::POST, &["groups", project_id, "containers"])
            .body(mapping::container_to_wire(spec));
        mapping::container_from_wire(&self.client.fetch(cancel, request).await?)
    }

    pub async fn update(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        container_id: &str,
        resource: &Resource,
    ) -> Result<Resource> {
        require("project id", project_id)?;
        require("container id", container_id)?;
        check(resource)?;
        let spec = spec_of!(resource, NetworkContainer);
        let request = ApiRequest::new(
            Method::PATCH,
            &["groups", project_id, "containers", container_id],
        )
        .body(mapping::container_to_wire(spec));
        mapping::container_from_wire(&self.client.fetch(cancel, request).await?)
    }

    pub async fn delete(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        container_id: &str,
    ) -> Result<()> {
        require("project id", project_id)?;
        require("container id", container_id)?;
        self.client
            .call(
                cancel,
                ApiRequest::new(
                    Method::DELETE,
                    &["groups", project_id, "containers", container_id],
                ),
            )
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct NetworkPeeringService {
    client: Arc<AtlasClient>,
    containers: NetworkContainerService,
}

impl NetworkPeeringService {
    pub fn new(client: Arc<AtlasClient>) -> Self {
        Self {
            containers: NetworkContainerService::new(client.clone()),
            client,
        }
    }

    /// container id and identity name pairs for a provider.
    async fn container_ids(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        provider: CloudProvider,
    ) -> Result<Vec<(String, String)>> {
        Ok(self
            .containers
            .list_for(cancel, project_id, provider)
            .await?
            .into_iter()
            .filter_map(|container| {
                let key = container.identity().name;
                container.metadata.id.map(|id| (id, key))
            })
            .collect())
    }

    pub async fn list(&self, cancel: &CancellationToken, project_id: &str) -> Result<Vec<Resource>> {
        require("project id", project_id)?;
        let mut peers = Vec::new();
        for provider in CloudProvider::ALL {
            let containers = self.container_ids(cancel, project_id, provider).await?;
            let request = ApiRequest::get(&["groups", project_id, "peers"])
                .query("providerName", provider.as_str());
            let items = match self.client.list_all(cancel, request).await {
                Ok(items) => items,
                Err(err) if err.is_not_found() => continue,
                Err(err) => return Err(err),
            };
            for item in &items {
                let container = item
                    .get("containerId")
                    .and_then(Value::as_str)
                    .and_then(|id| containers.iter().find(|(known, _)| known == id))
                    .map(|(_, key)| key.clone());
                peers.push(mapping::peering_from_wire(item, container)?);
            }
        }
        Ok(peers)
    }

    /// resolve the container a peering attaches to.
    async fn container_for(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        resource: &Resource,
    ) -> Result<String> {
        let spec = spec_of!(resource, NetworkPeering);
        let containers = self.container_ids(cancel, project_id, spec.provider).await?;
        let wanted = spec.container.as_deref();
        let mut matching = containers
            .iter()
            .filter(|(_, key)| wanted.map_or(true, |wanted| wanted == key));
        match (matching.next(), matching.next()) {
            (Some((id, _)), None) => Ok(id.clone()),
            (Some(_), Some(_)) => Err(Error::Validation(format!(
                "{}: several {} containers exist, set `container`",
                resource.identity(),
                spec.provider
            ))),
            (None, _) => Err(Error::NotFound(format!(
                "{}: no network container {}",
                resource.identity(),
                wanted.unwrap_or(spec.provider.as_str())
            ))),
        }
    }

    pub async fn create(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        resource: &Resource,
    ) -> Result<Resource> {
        require("project id", project_id)?;
        check(resource)?;
        let spec = spec_of!(resource, NetworkPeering);
        let container_id = self.container_for(cancel, project_id, resource).await?;
        let request = ApiRequest::new(Method::POST, &["groups", project_id, "peers"])
            .body(mapping::peering_to_wire(spec, &container_id));
        let value = self.client.fetch(cancel, request).await?;
        mapping::peering_from_wire(&value, spec.container.clone())
    }

    pub async fn update(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        peer_id: &str,
        resource: &Resource,
    ) -> Result<Resource> {
        require("project id", project_id)?;
        require("peer id", peer_id)?;
        check(resource)?;
        let spec = spec_of!(resource, NetworkPeering);
        let container_id = self.container_for(cancel, project_id, resource).await?;
        let request = ApiRequest::new(Method::PATCH, &["groups", project_id, "peers", peer_id])
            .body(mapping::peering_to_wire(spec, &container_id));
        let value = self.client.fetch(cancel, request).await?;
        mapping::peering_from_wire(&value, spec.container.clone())
    }

    pub async fn delete(&self, cancel: &CancellationToken, project_id: &str, peer_id: &str) -> Result<()> {
        require("project id", project_id)?;
        require("peer id", peer_id)?;
        self.client
            .call(
                cancel,
                ApiRequest::new(Method::DELETE, &["groups", project_id, "peers", peer_id]),
            )
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct SearchIndexService {
    client: Arc<AtlasClient>,
    clusters: ClusterService,
}

impl SearchIndexService {
    pub fn new(client: Arc<AtlasClient>) -> Self {
        Self {
            clusters: ClusterService::new(client.clone()),
            client,
        }
    }

    fn indexes(project_id: &str, cluster: &str, rest: &[&str]) -> Vec<String> {
        ["groups", project_id, "clusters", cluster, "search", "indexes"]
            .iter()
            .chain(rest)
            .map(|segment| segment.to_string())
            .collect()
    }

    fn request(method: Method, segments: &[String]) -> ApiRequest {
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
        ApiRequest::new(method, &segments).media_type(SEARCH_MEDIA_TYPE)
    }

    pub async fn list_for_cluster(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        cluster: &str,
    ) -> Result<Vec<Resource>> {
        require("project id", project_id)?;
        require("cluster name", cluster)?;
        let request = Self::request(Method::GET, &Self::indexes(project_id, cluster, &[]));
        let items = self.client.fetch(cancel, request).await?;
        items
            .as_array()
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(|item| mapping::search_index_from_wire(item, cluster))
            .collect()
    }

    /// indexes across every cluster of the project.
    pub async fn list(&self, cancel: &CancellationToken, project_id: &str) -> Result<Vec<Resource>> {
        let mut indexes = Vec::new();
        for cluster in self.clusters.list(cancel, project_id).await? {
            indexes.extend(
                self.list_for_cluster(cancel, project_id, &cluster.metadata.name)
                    .await?,
            );
        }
        Ok(indexes)
    }

    pub async fn get(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        cluster: &str,
        index_id: &str,
    ) -> Result<Resource> {
        require("index id", index_id)?;
        let request = Self::request(Method::GET, &Self::indexes(project_id, cluster, &[index_id]));
        mapping::search_index_from_wire(&self.client.fetch(cancel, request).await?, cluster)
    }

    pub async fn create(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        resource: &Resource,
    ) -> Result<Resource> {
        require("project id", project_id)?;
        check(resource)?;
        let spec = spec_of!(resource, SearchIndex);
        let name = resource.identity().name;
        let request = Self::request(
            Method::POST,
            &Self::indexes(project_id, &spec.cluster_name, &[]),
        )
        .body(mapping::search_index_to_wire(&name, spec));
        let value = self.client.fetch(cancel, request).await?;
        mapping::search_index_from_wire(&value, &spec.cluster_name)
    }

    pub async fn update(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        index_id: &str,
        resource: &Resource,
    ) -> Result<Resource> {
        require("project id", project_id)?;
        require("index id", index_id)?;
        check(resource)?;
        let spec = spec_of!(resource, SearchIndex);
        let request = Self::request(
            Method::PATCH,
            &Self::indexes(project_id, &spec.cluster_name, &[index_id]),
        )
        .body(json!({ "definition": spec.definition }));
        let value = self.client.fetch(cancel, request).await?;
        mapping::search_index_from_wire(&value, &spec.cluster_name)
    }

    pub async fn delete(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        cluster: &str,
        index_id: &str,
    ) -> Result<()> {
        require("project id", project_id)?;
        require("cluster name", cluster)?;
        require("index id", index_id)?;
        let request = Self::request(
            Method::DELETE,
            &Self::indexes(project_id, cluster, &[index_id]),
        );
        self.client.call(cancel, request).await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct VpcEndpointService {
    client: Arc<AtlasClient>,
}

impl VpcEndpointService {
    pub fn new(client: Arc<AtlasClient>) -> Self {
        Self { client }
    }

    pub async fn list(&self, cancel: &CancellationToken, project_id: &str) -> Result<Vec<Resource>> {
        require("project id", project_id)?;
        let mut services = Vec::new();
        for provider in CloudProvider::ALL {
            let request = ApiRequest::get(&[
                "groups",
                project_id,
                "privateEndpoint",
                provider.as_str(),
                "endpointService",
            ]);
            let items = match self.client.list_all(cancel, request).await {
                Ok(items) => items,
                Err(err) if err.is_not_found() => continue,
                Err(err) => return Err(err),
            };
            for item in &items {
                services.push(mapping::endpoint_service_from_wire(item, provider)?);
            }
        }
        Ok(services)
    }

    pub async fn get(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        provider: CloudProvider,
        service_id: &str,
    ) -> Result<Resource> {
        require("project id", project_id)?;
        require("endpoint service id", service_id)?;
        let request = ApiRequest::get(&[
            "groups",
            project_id,
            "privateEndpoint",
            provider.as_str(),
            "endpointService",
            service_id,
        ]);
        mapping::endpoint_service_from_wire(&self.client.fetch(cancel, request).await?, provider)
    }

    /// request an endpoint service, or adopt an existing one by id.
    pub async fn create(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        resource: &Resource,
    ) -> Result<Resource> {
        require("project id", project_id)?;
        check(resource)?;
        let spec = spec_of!(resource, VpcEndpoint);
        if let Some(service_id) = &spec.endpoint_service_id {
            return self.get(cancel, project_id, spec.provider, service_id).await;
        }
        let request = ApiRequest::new(
            Method::POST,
            &["groups", project_id, "privateEndpoint", "endpointService"],
        )
        .body(json!({ "providerName": spec.provider, "region": spec.region }));
        let value = self.client.fetch(cancel, request).await?;
        mapping::endpoint_service_from_wire(&value, spec.provider)
    }

    pub async fn delete(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        provider: CloudProvider,
        service_id: &str,
    ) -> Result<()> {
        require("project id", project_id)?;
        require("endpoint service id", service_id)?;
        self.client
            .call(
                cancel,
                ApiRequest::new(
                    Method::DELETE,
                    &[
                        "groups",
                        project_id,
                        "privateEndpoint",
                        provider.as_str(),
                        "endpointService",
                        service_id,
                    ],
                ),
            )
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct AlertConfigService {
    client: Arc<AtlasClient>,
}

impl AlertConfigService {
    pub fn new(client: Arc<AtlasClient>) -> Self {
        Self { client }
    }

    pub async fn list(&self, cancel: &CancellationToken, project_id: &str) -> Result<Vec<Resource>> {
        require("project id", project_id)?;
        self.client
            .list_all(cancel, ApiRequest::get(&["groups", project_id, "alertConfigs"]))
            .await?
            .iter()
            .map(mapping::alert_from_wire)
            .collect()
    }

    pub async fn get(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        alert_id: &str,
    ) -> Result<Resource> {
        require("project id", project_id)?;
        require("alert configuration id", alert_id)?;
        let value = self
            .client
            .fetch(
                cancel,
                ApiRequest::get(&["groups", project_id, "alertConfigs", alert_id]),
            )
            .await?;
        mapping::alert_from_wire(&value)
    }

    pub async fn create(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        resource: &Resource,
    ) -> Result<Resource> {
        require("project id", project_id)?;
        check(resource)?;
        let spec = spec_of!(resource, AlertConfiguration);
        let request = ApiRequest::new(Method::POST, &["groups", project_id, "alertConfigs"])
            .body(mapping::alert_to_wire(spec)?);
        mapping::alert_from_wire(&self.client.fetch(cancel, request).await?)
    }

    pub async fn update(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        alert_id: &str,
        resource: &Resource,
    ) -> Result<Resource> {
        require("project id", project_id)?;
        require("alert configuration id", alert_id)?;
        check(resource)?;
        let spec = spec_of!(resource, AlertConfiguration);
        let request = ApiRequest::new(
            Method::PUT,
            &["groups", project_id, "alertConfigs", alert_id],
        )
        .body(mapping::alert_to_wire(spec)?);
        mapping::alert_from_wire(&self.client.fetch(cancel, request).await?)
    }

    pub async fn delete(&self, cancel: &CancellationToken, project_id: &str, alert_id: &str) -> Result<()> {
        require("project id", project_id)?;
        require("alert configuration id", alert_id)?;
        self.client
            .call(
                cancel,
                ApiRequest::new(
                    Method::DELETE,
                    &["groups", project_id, "alertConfigs", alert_id],
                ),
            )
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct EncryptionService {
    client: Arc<AtlasClient>,
}

impl EncryptionService {
    pub fn new(client: Arc<AtlasClient>) -> Self {
        Self { client }
    }

    async fn current(&self, cancel: &CancellationToken, project_id: &str) -> Result<Value> {
        require("project id", project_id)?;
        self.client
            .fetch(
                cancel,
                ApiRequest::get(&["groups", project_id, "encryptionAtRest"]),
            )
            .await
    }

    /// one resource per provider with encryption enabled.
    pub async fn list(&self, cancel: &CancellationToken, project_id: &str) -> Result<Vec<Resource>> {
        Ok(mapping::encryption_from_wire(
            &self.current(cancel, project_id).await?,
        ))
    }

    /// write one provider block; create and update are the same call.
    pub async fn configure(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        resource: &Resource,
    ) -> Result<Resource> {
        require("project id", project_id)?;
        check(resource)?;
        let spec = spec_of!(resource, EncryptionAtRest);
        let request = ApiRequest::new(Method::PATCH, &["groups", project_id, "encryptionAtRest"])
            .body(mapping::encryption_to_wire(spec));
        let value = self.client.fetch(cancel, request).await?;
        let configured = mapping::encryption_from_wire(&value)
            .into_iter()
            .find(|configured| configured.identity().name == spec.provider.as_str());
        Ok(configured.unwrap_or_else(|| resource.clone()))
    }

    /// turn a provider block off, keeping the rest of it as is.
    pub async fn disable(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        provider: CloudProvider,
    ) -> Result<()> {
        let current = self.current(cancel, project_id).await?;
        let key = mapping::encryption_key(provider);
        let mut block = current.get(key).cloned().unwrap_or_else(|| json!({}));
        block["enabled"] = json!(false);
        let request = ApiRequest::new(Method::PATCH, &["groups", project_id, "encryptionAtRest"])
            .body(json!({ key: block }));
        self.client.call(cancel, request).await?;
        Ok(())
    }
}

/// every service over one shared client.
#[derive(Clone)]
pub struct AtlasServices {
    pub projects: ProjectService,
    pub clusters: ClusterService,
    pub users: DatabaseUserService,
    pub access: NetworkAccessService,
    pub containers: NetworkContainerService,
    pub peering: NetworkPeeringService,
    pub search: SearchIndexService,
    pub endpoints: VpcEndpointService,
    pub alerts: AlertConfigService,
    pub encryption: EncryptionService,
}

impl AtlasServices {
    pub fn new(client: Arc<AtlasClient>) -> Self {
        Self {
            projects: ProjectService::new(client.clone()),
            clusters: ClusterService::new(client.clone()),
            users: DatabaseUserService::new(client.clone()),
            access: NetworkAccessService::new(client.clone()),
            containers: NetworkContainerService::new(client.clone()),
            peering: NetworkPeeringService::new(client.clone()),
            search: SearchIndexService::new(client.clone()),
            endpoints: VpcEndpointService::new(client.clone()),
            alerts: AlertConfigService::new(client.clone()),
            encryption: EncryptionService::new(client),
        }
    }
}
