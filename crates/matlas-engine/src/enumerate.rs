//! data-plane enumeration of databases, collections and indexes.

use crate::types::{ClusterTarget, ControlPlane, DatabaseInspector};
use futures::future::join_all;
use matlas_core::{
    DatabaseUserSpec, DiscoveredDatabase, Error, Metadata, Resource, ResourceSpec, Result,
    RoleAssignment, ScopeType, Secret, UserScope,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const TEMP_USER_PREFIX: &str = "matlas-discovery-";
pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_CLUSTER_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_PROPAGATION_DELAY: Duration = Duration::from_secs(5);

const SYSTEM_DATABASES: [&str; 3] = ["admin", "local", "config"];

/// knobs for a single enumeration run.
#[derive(Debug, Clone)]
pub struct EnumerationOptions {
    /// clusters inspected at once.
    pub concurrency: usize,
    /// budget for one cluster, connect to last index listing.
    pub timeout: Duration,
    /// connection string used for every cluster instead of the api's.
    pub uri: Option<Secret>,
    pub username: Option<String>,
    pub password: Option<Secret>,
    /// create a short-lived read-only user for the run.
    pub use_temp_user: bool,
    pub propagation_delay: Duration,
}

impl Default for EnumerationOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            timeout: DEFAULT_CLUSTER_TIMEOUT,
            uri: None,
            username: None,
            password: None,
            use_temp_user: false,
            propagation_delay: DEFAULT_PROPAGATION_DELAY,
        }
    }
}

/// one cluster that could not be enumerated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterFailure {
    pub cluster_name: String,
    pub error: Error,
}

/// composite error carrying every per-cluster failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumerationError {
    pub failures: Vec<ClusterFailure>,
}

impl fmt::Display for EnumerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "enumeration failed for {} cluster(s)", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "; {}: {}", failure.cluster_name, failure.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for EnumerationError {}

/// databases found plus any per-cluster failures.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Enumeration {
    pub databases: Vec<DiscoveredDatabase>,
    pub error: Option<EnumerationError>,
}

pub fn is_system_database(name: &str) -> bool {
    SYSTEM_DATABASES.contains(&name)
}

pub fn is_system_collection(name: &str) -> bool {
    name.starts_with("system.") || name == "fs.files" || name == "fs.chunks"
}

/// enumerates user data across clusters through a [`DatabaseInspector`].
pub struct Enumerator {
    control: Arc<dyn ControlPlane>,
    inspector: Arc<dyn DatabaseInspector>,
}

impl Enumerator {
    pub fn new(control: Arc<dyn ControlPlane>, inspector: Arc<dyn DatabaseInspector>) -> Self {
        Self { control, inspector }
    }

    /// enumerate every cluster; failures are collected, not propagated.
    ///
    /// only temp-user setup and cancellation fail the whole run. the temp
    /// user is deleted on every exit path once created. `project_name`
    /// names the owning project of that user; when empty it is taken from
    /// the clusters.
    pub async fn enumerate(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        project_name: &str,
        clusters: &[Resource],
        options: &EnumerationOptions,
    ) -> Result<Enumeration> {
        if clusters.is_empty() {
            return Ok(Enumeration::default());
        }
        if !options.use_temp_user {
            let credentials = external_credentials(options);
            return self.run(cancel, clusters, credentials, options).await;
        }

        let project_name = match project_name {
            "" => clusters
                .iter()
                .map(Resource::project_name)
                .find(|name| !name.is_empty())
                .unwrap_or_default(),
            name => name,
        };
        if project_name.is_empty() {
            return Err(Error::Validation(format!(
                "project {project_id} has no name to own a temporary user"
            )));
        }
        let user = temp_user(project_id, project_name, clusters);
        let Some(password) = temp_password(&user) else {
            return Err(Error::Other("temporary user carries no password".to_string()));
        };
        let username = user_name(&user);
        info!(project_id, username = %username, "creating temporary discovery user");
        let created = self.control.create(cancel, project_id, &user).await?;

        let outcome = async {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(Error::Cancelled("enumeration cancelled while waiting for user propagation".to_string()));
                }
                _ = tokio::time::sleep(options.propagation_delay) => {}
            }
            self.run(cancel, clusters, Some((username.clone(), password)), options)
                .await
        }
        .await;

        // a fresh token keeps the cleanup alive after the caller cancels.
        let cleanup = CancellationToken::new();
        if let Err(err) = self.control.delete(&cleanup, project_id, &created).await {
            warn!(project_id, username = %username, error = %err, "failed to delete temporary discovery user");
        } else {
            debug!(project_id, username = %username, "deleted temporary discovery user");
        }
        outcome
    }

    async fn run(
        &self,
        cancel: &CancellationToken,
        clusters: &[Resource],
        credentials: Option<(String, Secret)>,
        options: &EnumerationOptions,
    ) -> Result<Enumeration> {
        let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
        let mut tasks = Vec::new();
        for cluster in clusters {
            let cluster_name = cluster.metadata.name.clone();
            let target = match cluster_target(cluster, options.uri.as_ref(), credentials.as_ref()) {
                Ok(target) => target,
                Err(err) => {
                    tasks.push(tokio::spawn(async move { (cluster_name, Err(err)) }));
                    continue;
                }
            };
            let inspector = self.inspector.clone();
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            let timeout = options.timeout;
            tasks.push(tokio::spawn(async move {
                let result = inspect_one(inspector, semaphore, &cancel, &target, timeout).await;
                (cluster_name, result)
            }));
        }

        let mut databases = Vec::new();
        let mut failures = Vec::new();
        for joined in join_all(tasks).await {
            let (cluster_name, result) = match joined {
                Ok(pair) => pair,
                Err(err) => {
                    failures.push(ClusterFailure {
                        cluster_name: "<unknown>".to_string(),
                        error: Error::Execution(format!("enumeration task failed: {err}")),
                    });
                    continue;
                }
            };
            match result {
                Ok(found) => {
                    debug!(cluster = %cluster_name, databases = found.len(), "enumerated cluster");
                    databases.extend(found);
                }
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => {
                    warn!(cluster = %cluster_name, error = %err, "cluster enumeration failed");
                    failures.push(ClusterFailure {
                        cluster_name,
                        error: err,
                    });
                }
            }
        }

        failures.sort_by(|a, b| a.cluster_name.cmp(&b.cluster_name));
        Ok(Enumeration {
            databases: normalize(databases),
            error: (!failures.is_empty()).then_some(EnumerationError { failures }),
        })
    }
}

async fn inspect_one(
    inspector: Arc<dyn DatabaseInspector>,
    semaphore: Arc<Semaphore>,
    cancel: &CancellationToken,
    target: &ClusterTarget,
    timeout: Duration,
) -> Result<Vec<DiscoveredDatabase>> {
    let _permit = tokio::select! {
        _ = cancel.cancelled() => return Err(Error::Cancelled("enumeration cancelled".to_string())),
        permit = semaphore.acquire() => permit.map_err(|_| Error::Cancelled("enumeration pool closed".to_string()))?,
    };
    tokio::select! {
        _ = cancel.cancelled() => Err(Error::Cancelled("enumeration cancelled".to_string())),
        result = tokio::time::timeout(timeout, inspector.inspect(cancel, target)) => match result {
            Ok(inner) => inner,
            Err(_) => Err(Error::Transient(format!(
                "cluster {} did not answer within {}s",
                target.cluster_name,
                timeout.as_secs()
            ))),
        },
    }
}

/// drop system namespaces and sort databases, collections and indexes.
fn normalize(databases: Vec<DiscoveredDatabase>) -> Vec<DiscoveredDatabase> {
    let mut databases: Vec<DiscoveredDatabase> = databases
        .into_iter()
        .filter(|db| !is_system_database(&db.name))
        .map(|mut db| {
            db.collections.retain(|coll| !is_system_collection(&coll.name));
            db.collections.sort_by(|a, b| a.name.cmp(&b.name));
            for coll in &mut db.collections {
                coll.indexes.sort_by(|a, b| a.name.cmp(&b.name));
            }
            db
        })
        .collect();
    databases.sort_by(|a, b| {
        (a.cluster_name.as_str(), a.name.as_str()).cmp(&(b.cluster_name.as_str(), b.name.as_str()))
    });
    databases
}

fn external_credentials(options: &EnumerationOptions) -> Option<(String, Secret)> {
    match (&options.username, &options.password) {
        (Some(username), Some(password)) if !username.is_empty() => {
            Some((username.clone(), password.clone()))
        }
        _ => None,
    }
}

/// resolve the connection string for one cluster.
///
/// override > `connectionStrings.standardSrv` > srv template on the cluster
/// name. credentials are injected only when the uri carries none.
pub fn cluster_target(
    cluster: &Resource,
    override_uri: Option<&Secret>,
    credentials: Option<&(String, Secret)>,
) -> Result<ClusterTarget> {
    let cluster_name = cluster.metadata.name.clone();
    if cluster_name.is_empty() {
        return Err(Error::Validation("cluster name is required".to_string()));
    }
    let base = match override_uri.and_then(Secret::expose) {
        Some(uri) => uri.to_string(),
        None => match &cluster.spec {
            ResourceSpec::Cluster(spec) => spec
                .connection_strings
                .as_ref()
                .and_then(|strings| strings.standard_srv.clone())
                .unwrap_or_else(|| format!("mongodb+srv://{cluster_name}.mongodb.net/")),
            _ => {
                return Err(Error::Validation(format!(
                    "{} is not a cluster",
                    cluster.identity()
                )))
            }
        },
    };
    let uri = match credentials {
        Some((username, password)) => {
            let password = password.expose().ok_or_else(|| {
                Error::Validation("enumeration password must be supplied in plaintext".to_string())
            })?;
            inject_credentials(&base, username, password)?
        }
        None => base,
    };
    Ok(ClusterTarget {
        cluster_name,
        uri: Secret::new(uri),
    })
}

/// insert `user:password@` into the uri authority unless one is present.
pub fn inject_credentials(uri: &str, username: &str, password: &str) -> Result<String> {
    let Some((scheme, rest)) = uri.split_once("://") else {
        return Err(Error::Validation("connection string has no scheme".to_string()));
    };
    let authority = rest.split(['/', '?']).next().unwrap_or_default();
    if authority.contains('@') {
        return Ok(uri.to_string());
    }
    // let url do the userinfo percent-encoding; multi-host authorities
    // do not parse as urls so only the encoded parts are reused.
    let mut placeholder = url::Url::parse("mongodb://placeholder/")
        .map_err(|err| Error::Other(format!("build placeholder uri: {err}")))?;
    placeholder
        .set_username(username)
        .map_err(|_| Error::Validation("invalid enumeration username".to_string()))?;
    placeholder
        .set_password(Some(password))
        .map_err(|_| Error::Validation("invalid enumeration password".to_string()))?;
    Ok(format!(
        "{scheme}://{}:{}@{rest}",
        placeholder.username(),
        placeholder.password().unwrap_or_default()
    ))
}

fn temp_user(project_id: &str, project_name: &str, clusters: &[Resource]) -> Resource {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let username = format!("{TEMP_USER_PREFIX}{}", &suffix[..8]);
    let password = uuid::Uuid::new_v4().simple().to_string();
    let mut scopes: Vec<UserScope> = clusters
        .iter()
        .map(|cluster| UserScope {
            name: cluster.metadata.name.clone(),
            scope_type: ScopeType::Cluster,
        })
        .collect();
    scopes.sort();
    scopes.dedup();
    let mut metadata = Metadata::named(&username);
    metadata
        .annotations
        .insert("matlas.mongodb.com/project-id".to_string(), project_id.to_string());
    Resource::new(
        metadata,
        ResourceSpec::DatabaseUser(DatabaseUserSpec {
            project_name: project_name.to_string(),
            username,
            auth_database: "admin".to_string(),
            password: Some(Secret::new(password)),
            roles: vec![RoleAssignment {
                role_name: "readAnyDatabase".to_string(),
                database_name: "admin".to_string(),
                collection_name: None,
            }],
            scopes,
        }),
    )
}

fn temp_password(user: &Resource) -> Option<Secret> {
    match &user.spec {
        ResourceSpec::DatabaseUser(spec) => spec.password.clone(),
        _ => None,
    }
}

fn user_name(user: &Resource) -> String {
    match &user.spec {
        ResourceSpec::DatabaseUser(spec) => spec.username.clone(),
        _ => user.metadata.name.clone(),
    }
}
