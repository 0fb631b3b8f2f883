//! mongodb atlas admin api adapter for matlas.

mod client;
mod control;
mod digest;
mod mapping;
mod services;

pub use client::{
    AtlasClient, AtlasConfig, API_MEDIA_TYPE, DEFAULT_BACKOFF, DEFAULT_BASE_URL,
    DEFAULT_MAX_ATTEMPTS, SEARCH_MEDIA_TYPE,
};
pub use control::AtlasControlPlane;
pub use services::{
    AlertConfigService, AtlasServices, ClusterService, DatabaseUserService, EncryptionService,
    NetworkAccessService, NetworkContainerService, NetworkPeeringService, ProjectService,
    SearchIndexService, VpcEndpointService,
};
