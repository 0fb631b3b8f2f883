//! project discovery: control-plane listing plus optional data-plane enumeration.

use crate::cache::DiscoveryCache;
use crate::enumerate::{EnumerationError, EnumerationOptions, Enumerator};
use crate::state::ProjectState;
use crate::types::{ControlPlane, DatabaseInspector};
use futures::future::join_all;
use matlas_core::{digest_hex, Error, ErrorKind, Kind, Resource, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// filterable slice of a project snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    Project,
    Clusters,
    Users,
    Network,
    Databases,
    SearchIndexes,
    VpcEndpoints,
    Alerts,
    Encryption,
}

impl Category {
    /// control-plane categories, i.e. everything but `databases`.
    pub const CONTROL_PLANE: [Category; 8] = [
        Category::Project,
        Category::Clusters,
        Category::Users,
        Category::Network,
        Category::SearchIndexes,
        Category::VpcEndpoints,
        Category::Alerts,
        Category::Encryption,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Project => "project",
            Category::Clusters => "clusters",
            Category::Users => "users",
            Category::Network => "network",
            Category::Databases => "databases",
            Category::SearchIndexes => "searchIndexes",
            Category::VpcEndpoints => "vpcEndpoints",
            Category::Alerts => "alerts",
            Category::Encryption => "encryption",
        }
    }

    /// resource kinds listed for this category.
    pub fn kinds(&self) -> &'static [Kind] {
        match self {
            Category::Project => &[Kind::Project],
            Category::Clusters => &[Kind::Cluster],
            Category::Users => &[Kind::DatabaseUser],
            Category::Network => &[
                Kind::NetworkAccess,
                Kind::NetworkContainer,
                Kind::NetworkPeering,
            ],
            Category::Databases => &[],
            Category::SearchIndexes => &[Kind::SearchIndex],
            Category::VpcEndpoints => &[Kind::VpcEndpoint],
            Category::Alerts => &[Kind::AlertConfiguration],
            Category::Encryption => &[Kind::EncryptionAtRest],
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase().replace(['-', '_'], "");
        let category = match normalized.as_str() {
            "project" => Category::Project,
            "clusters" | "cluster" => Category::Clusters,
            "users" | "user" | "databaseusers" => Category::Users,
            "network" | "networkaccess" => Category::Network,
            "databases" | "database" => Category::Databases,
            "searchindexes" | "search" => Category::SearchIndexes,
            "vpcendpoints" | "privateendpoints" => Category::VpcEndpoints,
            "alerts" | "alertconfigurations" => Category::Alerts,
            "encryption" | "encryptionatrest" => Category::Encryption,
            _ => return Err(format!("unknown discovery category `{raw}`")),
        };
        Ok(category)
    }
}

/// what to discover and how to present it.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOptions {
    /// empty means every control-plane category.
    pub include: BTreeSet<Category>,
    /// always wins over `include`.
    pub exclude: BTreeSet<Category>,
    pub include_databases: bool,
    pub mask_secrets: bool,
    pub enumeration: EnumerationOptions,
}

impl DiscoveryOptions {
    pub fn includes(&self, category: Category) -> bool {
        if self.exclude.contains(&category) {
            return false;
        }
        if category == Category::Databases {
            return self.include_databases
                && (self.include.is_empty() || self.include.contains(&category));
        }
        self.include.is_empty() || self.include.contains(&category)
    }

    /// kinds to list from the control plane.
    pub fn kinds(&self) -> Vec<Kind> {
        Category::CONTROL_PLANE
            .iter()
            .filter(|category| self.includes(**category))
            .flat_map(|category| category.kinds().iter().copied())
            .collect()
    }

    /// digest of everything that changes the snapshot's content.
    pub fn fingerprint(&self) -> String {
        let categories: Vec<&str> = Category::CONTROL_PLANE
            .iter()
            .chain(std::iter::once(&Category::Databases))
            .filter(|category| self.includes(**category))
            .map(Category::as_str)
            .collect();
        let raw = format!("{}|mask={}", categories.join(","), self.mask_secrets);
        digest_hex(raw.as_bytes())[..16].to_string()
    }
}

/// counters reported alongside a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryStats {
    pub cache_hit: bool,
    pub duration_ms: u64,
    pub clusters_found: usize,
    pub databases_found: usize,
    pub resources_found: usize,
}

#[derive(Debug, Clone)]
pub struct DiscoveryOutcome {
    pub state: ProjectState,
    pub stats: DiscoveryStats,
    /// per-cluster enumeration failures; the snapshot is still returned.
    pub enumeration_error: Option<EnumerationError>,
}

/// composes the control plane, the inspector and the cache.
pub struct Discovery {
    control: Arc<dyn ControlPlane>,
    inspector: Option<Arc<dyn DatabaseInspector>>,
    cache: Option<Arc<DiscoveryCache>>,
}

impl Discovery {
    pub fn new(control: Arc<dyn ControlPlane>) -> Self {
        Self {
            control,
            inspector: None,
            cache: None,
        }
    }

    pub fn with_inspector(mut self, inspector: Arc<dyn DatabaseInspector>) -> Self {
        self.inspector = Some(inspector);
        self
    }

    pub fn with_cache(mut self, cache: Arc<DiscoveryCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn control(&self) -> &Arc<dyn ControlPlane> {
        &self.control
    }

    /// drop cached snapshots of a project that was just changed.
    pub fn invalidate(&self, project_id: &str) {
        if let Some(cache) = &self.cache {
            let dropped = cache.invalidate_project(project_id);
            debug!(project_id, dropped, "invalidated cached snapshots");
        }
    }

    pub async fn discover_project(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        options: &DiscoveryOptions,
    ) -> Result<DiscoveryOutcome> {
        if project_id.is_empty() {
            return Err(Error::Validation("project id is required".to_string()));
        }
        let started = Instant::now();
        let cache_key = format!("{project_id}:{}", options.fingerprint());
        if let Some(state) = self.cache.as_ref().and_then(|cache| cache.get(&cache_key)) {
            debug!(project_id, "discovery cache hit");
            let stats = stats_for(&state, true, started);
            return Ok(DiscoveryOutcome {
                state,
                stats,
                enumeration_error: None,
            });
        }

        let mut state = observe(self.control.as_ref(), cancel, project_id, &options.kinds()).await?;
        let project_name = state.project_name().unwrap_or_default().to_string();
        if !options.includes(Category::Project) {
            state.project = None;
        }

        let mut enumeration_error = None;
        if options.includes(Category::Databases) {
            match &self.inspector {
                Some(inspector) => {
                    let clusters = if options.includes(Category::Clusters) {
                        state.clusters.clone()
                    } else {
                        observe(self.control.as_ref(), cancel, project_id, &[Kind::Cluster])
                            .await?
                            .clusters
                    };
                    let enumerator = Enumerator::new(self.control.clone(), inspector.clone());
                    let enumeration = enumerator
                        .enumerate(cancel, project_id, &project_name, &clusters, &options.enumeration)
                        .await?;
                    state.databases = enumeration.databases;
                    enumeration_error = enumeration.error;
                }
                None => warn!(project_id, "database enumeration requested without an inspector"),
            }
        }

        if options.mask_secrets {
            state.mask_secrets();
        }
        state.seal();

        if enumeration_error.is_none() {
            if let Some(cache) = &self.cache {
                cache.insert(cache_key, state.clone());
            }
        }
        let stats = stats_for(&state, false, started);
        info!(
            project_id,
            resources = stats.resources_found,
            clusters = stats.clusters_found,
            databases = stats.databases_found,
            duration_ms = stats.duration_ms,
            "discovered project"
        );
        Ok(DiscoveryOutcome {
            state,
            stats,
            enumeration_error,
        })
    }
}

fn stats_for(state: &ProjectState, cache_hit: bool, started: Instant) -> DiscoveryStats {
    DiscoveryStats {
        cache_hit,
        duration_ms: started.elapsed().as_millis() as u64,
        clusters_found: state.clusters.len(),
        databases_found: state.databases.len(),
        resources_found: state.len(),
    }
}

/// list the given kinds of one project into a snapshot.
///
/// the project itself is always read so children carry its name. kinds the
/// api does not expose for the project come back empty.
pub async fn observe(
    control: &dyn ControlPlane,
    cancel: &CancellationToken,
    project_id: &str,
    kinds: &[Kind],
) -> Result<ProjectState> {
    let project = control
        .get_project(cancel, project_id)
        .await
        .map_err(|err| err.context(format!("read project {project_id}")))?;
    let project_name = project.project_name().to_string();

    let listed = join_all(
        kinds
            .iter()
            .filter(|kind| **kind != Kind::Project)
            .map(|kind| async move { (*kind, control.list(cancel, project_id, *kind).await) }),
    )
    .await;

    let mut state = ProjectState::new(project_id);
    state.project = Some(project);
    for (kind, result) in listed {
        let resources: Vec<Resource> = match result {
            Ok(resources) => resources,
            Err(err) if err.is_not_found() || err.kind() == ErrorKind::Unsupported => {
                debug!(project_id, kind = %kind, error = %err, "kind not available");
                Vec::new()
            }
            Err(err) => return Err(err.context(format!("list {kind}"))),
        };
        for mut resource in resources {
            resource.default_project_name(&project_name);
            state.insert(resource);
        }
    }
    state.sort();
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclude_wins_over_include() {
        let options = DiscoveryOptions {
            include: [Category::Clusters, Category::Users].into_iter().collect(),
            exclude: [Category::Users].into_iter().collect(),
            ..DiscoveryOptions::default()
        };
        assert_eq!(options.kinds(), vec![Kind::Cluster]);
    }

    #[test]
    fn databases_need_explicit_flag() {
        let mut options = DiscoveryOptions::default();
        assert!(!options.includes(Category::Databases));
        options.include_databases = true;
        assert!(options.includes(Category::Databases));
        options.exclude.insert(Category::Databases);
        assert!(!options.includes(Category::Databases));
    }

    #[test]
    fn empty_include_lists_every_control_plane_kind() {
        let kinds = DiscoveryOptions::default().kinds();
        for kind in Kind::ALL {
            if kind != Kind::DatabaseRole {
                assert!(kinds.contains(&kind), "{kind} missing");
            }
        }
    }

    #[test]
    fn masking_changes_cache_key() {
        let plain = DiscoveryOptions::default();
        let masked = DiscoveryOptions {
            mask_secrets: true,
            ..DiscoveryOptions::default()
        };
        assert_ne!(plain.fingerprint(), masked.fingerprint());
    }

    #[test]
    fn categories_parse_loosely() {
        assert_eq!("search-indexes".parse::<Category>(), Ok(Category::SearchIndexes));
        assert_eq!("Users".parse::<Category>(), Ok(Category::Users));
        assert!("widgets".parse::<Category>().is_err());
    }
}
