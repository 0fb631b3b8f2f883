//! `ControlPlane` over the admin api services.

use crate::client::{AtlasClient, AtlasConfig};
use crate::services::{live_id, AtlasServices};
use async_trait::async_trait;
use matlas_core::{Error, Kind, Resource, ResourceSpec, Result};
use matlas_engine::ControlPlane;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// admin api backed control plane.
#[derive(Clone)]
pub struct AtlasControlPlane {
    services: AtlasServices,
}

impl AtlasControlPlane {
    pub fn new(config: AtlasConfig) -> Result<Self> {
        Ok(Self::from_client(Arc::new(AtlasClient::new(config)?)))
    }

    pub fn from_client(client: Arc<AtlasClient>) -> Self {
        Self {
            services: AtlasServices::new(client),
        }
    }

    pub fn services(&self) -> &AtlasServices {
        &self.services
    }
}

/// carry manifest naming onto a resource returned by the api.
fn settle(desired: &Resource, mut live: Resource) -> Resource {
    live.default_project_name(desired.project_name());
    let id = live.metadata.id.take();
    live.metadata = desired.metadata.clone();
    live.metadata.id = id.or_else(|| desired.metadata.id.clone());
    live
}

fn unsupported(kind: Kind, verb: &str) -> Error {
    Error::Unsupported(format!("{kind} resources cannot be {verb} through the admin api"))
}

#[async_trait]
impl ControlPlane for AtlasControlPlane {
    async fn find_project(
        &self,
        cancel: &CancellationToken,
        name: &str,
    ) -> Result<Option<Resource>> {
        self.services.projects.find_by_name(cancel, name).await
    }

    async fn get_project(&self, cancel: &CancellationToken, project_id: &str) -> Result<Resource> {
        self.services.projects.get(cancel, project_id).await
    }

    async fn list(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        kind: Kind,
    ) -> Result<Vec<Resource>> {
        let services = &self.services;
        match kind {
            Kind::Project => Ok(vec![services.projects.get(cancel, project_id).await?]),
            Kind::Cluster => services.clusters.list(cancel, project_id).await,
            Kind::DatabaseUser => services.users.list(cancel, project_id).await,
            Kind::NetworkAccess => services.access.list(cancel, project_id).await,
            Kind::NetworkContainer => services.containers.list(cancel, project_id).await,
            Kind::NetworkPeering => services.peering.list(cancel, project_id).await,
            Kind::SearchIndex => services.search.list(cancel, project_id).await,
            Kind::VpcEndpoint => services.endpoints.list(cancel, project_id).await,
            Kind::AlertConfiguration => services.alerts.list(cancel, project_id).await,
            Kind::EncryptionAtRest => services.encryption.list(cancel, project_id).await,
            Kind::DatabaseRole => Err(unsupported(kind, "listed")),
        }
    }

    async fn create(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        desired: &Resource,
    ) -> Result<Resource> {
        let services = &self.services;
        let live = match desired.kind() {
            Kind::Project => services.projects.create(cancel, desired).await?,
            Kind::Cluster => services.clusters.create(cancel, project_id, desired).await?,
            Kind::DatabaseUser => services.users.create(cancel, project_id, desired).await?,
            Kind::NetworkAccess => services.access.upsert(cancel, project_id, desired).await?,
            Kind::NetworkContainer => {
                services.containers.create(cancel, project_id, desired).await?
            }
            Kind::NetworkPeering => services.peering.create(cancel, project_id, desired).await?,
            Kind::SearchIndex => services.search.create(cancel, project_id, desired).await?,
            Kind::VpcEndpoint => services.endpoints.create(cancel, project_id, desired).await?,
            Kind::AlertConfiguration => {
                services.alerts.create(cancel, project_id, desired).await?
            }
            Kind::EncryptionAtRest => {
                services.encryption.configure(cancel, project_id, desired).await?
            }
            kind @ Kind::DatabaseRole => return Err(unsupported(kind, "created")),
        };
        info!(identity = %desired.identity(), id = ?live.metadata.id, "created");
        Ok(settle(desired, live))
    }

    async fn update(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        current: &Resource,
        desired: &Resource,
    ) -> Result<Resource> {
        let services = &self.services;
        let live = match desired.kind() {
            Kind::Project => {
                services
                    .projects
                    .update(cancel, live_id(current)?, desired)
                    .await?
            }
            Kind::Cluster => services.clusters.update(cancel, project_id, desired).await?,
            Kind::DatabaseUser => services.users.update(cancel, project_id, desired).await?,
            Kind::NetworkAccess => services.access.upsert(cancel, project_id, desired).await?,
            Kind::NetworkContainer => {
                services
                    .containers
                    .update(cancel, project_id, live_id(current)?, desired)
                    .await?
            }
            Kind::NetworkPeering => {
                services
                    .peering
                    .update(cancel, project_id, live_id(current)?, desired)
                    .await?
            }
            Kind::SearchIndex => {
                services
                    .search
                    .update(cancel, project_id, live_id(current)?, desired)
                    .await?
            }
            Kind::AlertConfiguration => {
                services
                    .alerts
                    .update(cancel, project_id, live_id(current)?, desired)
                    .await?
            }
            Kind::EncryptionAtRest => {
                services.encryption.configure(cancel, project_id, desired).await?
            }
            kind @ (Kind::VpcEndpoint | Kind::DatabaseRole) => {
                return Err(unsupported(kind, "updated"))
            }
        };
        info!(identity = %desired.identity(), "updated");
        let mut settled = settle(desired, live);
        if settled.metadata.id.is_none() {
            settled.metadata.id = current.metadata.id.clone();
        }
        Ok(settled)
    }

    async fn delete(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        current: &Resource,
    ) -> Result<()> {
        let services = &self.services;
        match &current.spec {
            ResourceSpec::Project(_) => services.projects.delete(cancel, live_id(current)?).await?,
            ResourceSpec::Cluster(_) => {
                services
                    .clusters
                    .delete(cancel, project_id, &current.metadata.name)
                    .await?
            }
            ResourceSpec::DatabaseUser(spec) => {
                services
                    .users
                    .delete(cancel, project_id, &spec.auth_database, &spec.username)
                    .await?
            }
            ResourceSpec::NetworkAccess(spec) => {
                let entry = spec
                    .address()
                    .map(str::to_string)
                    .or_else(|| current.metadata.id.clone())
                    .unwrap_or_default();
                services.access.delete(cancel, project_id, &entry).await?
            }
            ResourceSpec::NetworkContainer(_) => {
                services
                    .containers
                    .delete(cancel, project_id, live_id(current)?)
                    .await?
            }
            ResourceSpec::NetworkPeering(_) => {
                services
                    .peering
                    .delete(cancel, project_id, live_id(current)?)
                    .await?
            }
            ResourceSpec::SearchIndex(spec) => {
                services
                    .search
                    .delete(cancel, project_id, &spec.cluster_name, live_id(current)?)
                    .await?
            }
            ResourceSpec::VpcEndpoint(spec) => {
                services
                    .endpoints
                    .delete(cancel, project_id, spec.provider, live_id(current)?)
                    .await?
            }
            ResourceSpec::AlertConfiguration(_) => {
                services
                    .alerts
                    .delete(cancel, project_id, live_id(current)?)
                    .await?
            }
            ResourceSpec::EncryptionAtRest(spec) => {
                services
                    .encryption
                    .disable(cancel, project_id, spec.provider)
                    .await?
            }
            ResourceSpec::DatabaseRole(_) => return Err(unsupported(Kind::DatabaseRole, "deleted")),
        }
        info!(identity = %current.identity(), "deleted");
        Ok(())
    }
}
