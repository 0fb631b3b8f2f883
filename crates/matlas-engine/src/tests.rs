use super::*;
use async_trait::async_trait;
use matlas_core::{
    ClusterSpec, ClusterType, CloudProvider, DatabaseUserSpec, DiscoveredDatabase, Error,
    Identity, Kind, Metadata, NetworkAccessSpec, NetworkContainerSpec, ProjectSpec, ResourceSpec,
    Result as CoreResult, RoleAssignment, PRESERVE_LABEL,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const PROJECT_ID: &str = "5f0000000000000000000001";

#[derive(Default)]
struct Counters {
    calls: Vec<String>,
    mutations: usize,
    calls_after_cancel: usize,
    running: usize,
    max_running: usize,
    running_kind: HashMap<Kind, usize>,
    max_running_kind: HashMap<Kind, usize>,
}

/// in-memory control plane that counts every call.
#[derive(Default)]
struct MockControl {
    projects: Mutex<BTreeMap<String, Resource>>,
    resources: Mutex<BTreeMap<(String, Identity), Resource>>,
    counters: Mutex<Counters>,
    failures: Mutex<HashMap<String, Error>>,
    panics: Mutex<Option<String>>,
    delay: Duration,
    next_id: Mutex<u64>,
}

impl MockControl {
    fn with_project(name: &str) -> Self {
        let control = MockControl::default();
        let mut project = project(name);
        project.metadata.id = Some(PROJECT_ID.to_string());
        control
            .projects
            .lock()
            .unwrap()
            .insert(PROJECT_ID.to_string(), project);
        control
    }

    fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn seed(&self, resource: Resource) {
        self.resources
            .lock()
            .unwrap()
            .insert((PROJECT_ID.to_string(), resource.identity()), resource);
    }

    fn fail(&self, call: &str, err: Error) {
        self.failures.lock().unwrap().insert(call.to_string(), err);
    }

    fn panic_on(&self, call: &str) {
        *self.panics.lock().unwrap() = Some(call.to_string());
    }

    fn mutations(&self) -> usize {
        self.counters.lock().unwrap().mutations
    }

    fn calls(&self) -> Vec<String> {
        self.counters.lock().unwrap().calls.clone()
    }

    fn allocate_id(&self) -> String {
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        format!("id-{next}")
    }

    /// record a mutating call and hold a running slot for `delay`.
    async fn mutate(&self, cancel: &CancellationToken, call: String, kind: Kind) -> CoreResult<()> {
        let panics = self.panics.lock().unwrap().clone();
        if panics.as_deref() == Some(call.as_str()) {
            panic!("worker blew up on {call}");
        }
        {
            let mut counters = self.counters.lock().unwrap();
            if cancel.is_cancelled() {
                counters.calls_after_cancel += 1;
            }
            counters.calls.push(call.clone());
            counters.running += 1;
            counters.max_running = counters.max_running.max(counters.running);
            let running = {
                let slot = counters.running_kind.entry(kind).or_default();
                *slot += 1;
                *slot
            };
            let peak = counters.max_running_kind.entry(kind).or_default();
            *peak = (*peak).max(running);
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let failure = self.failures.lock().unwrap().get(&call).cloned();
        let mut counters = self.counters.lock().unwrap();
        counters.running -= 1;
        if let Some(slot) = counters.running_kind.get_mut(&kind) {
            *slot -= 1;
        }
        match failure {
            Some(err) => Err(err),
            None => {
                counters.mutations += 1;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl ControlPlane for MockControl {
    async fn find_project(
        &self,
        _cancel: &CancellationToken,
        name: &str,
    ) -> CoreResult<Option<Resource>> {
        Ok(self
            .projects
            .lock()
            .unwrap()
            .values()
            .find(|project| project.project_name() == name)
            .cloned())
    }

    async fn get_project(&self, _cancel: &CancellationToken, project_id: &str) -> CoreResult<Resource> {
        self.projects
            .lock()
            .unwrap()
            .get(project_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("project {project_id}")))
    }

    async fn list(
        &self,
        _cancel: &CancellationToken,
        project_id: &str,
        kind: Kind,
    ) -> CoreResult<Vec<Resource>> {
        Ok(self
            .resources
            .lock()
            .unwrap()
            .iter()
            .filter(|((id, identity), _)| id == project_id && identity.kind == kind)
            .map(|(_, resource)| resource.clone())
            .collect())
    }

    async fn create(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        desired: &Resource,
    ) -> CoreResult<Resource> {
        self.mutate(cancel, format!("create {}", desired.identity()), desired.kind())
            .await?;
        let mut created = desired.clone();
        created.metadata.id = Some(self.allocate_id());
        if desired.kind() == Kind::Project {
            let id = created.metadata.id.clone().unwrap_or_default();
            self.projects.lock().unwrap().insert(id, created.clone());
        } else {
            self.resources.lock().unwrap().insert(
                (project_id.to_string(), created.identity()),
                created.clone(),
            );
        }
        Ok(created)
    }

    async fn update(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        current: &Resource,
        desired: &Resource,
    ) -> CoreResult<Resource> {
        self.mutate(cancel, format!("update {}", desired.identity()), desired.kind())
            .await?;
        let mut updated = desired.clone();
        updated.metadata.id = current.metadata.id.clone();
        self.resources.lock().unwrap().insert(
            (project_id.to_string(), updated.identity()),
            updated.clone(),
        );
        Ok(updated)
    }

    async fn delete(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        current: &Resource,
    ) -> CoreResult<()> {
        self.mutate(cancel, format!("delete {}", current.identity()), current.kind())
            .await?;
        self.resources
            .lock()
            .unwrap()
            .remove(&(project_id.to_string(), current.identity()))
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(current.identity().to_string()))
    }
}

fn project(name: &str) -> Resource {
    Resource::new(
        Metadata::named(name),
        ResourceSpec::Project(ProjectSpec {
            name: name.to_string(),
            organization_id: "org1".to_string(),
            tags: BTreeMap::new(),
        }),
    )
}

fn cluster(name: &str) -> Resource {
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
            backup_enabled: false,
            pit_enabled: false,
            termination_protection_enabled: None,
            state_name: None,
            connection_strings: None,
        }),
    )
}

fn user(name: &str) -> Resource {
    Resource::new(
        Metadata::named(name),
        ResourceSpec::DatabaseUser(DatabaseUserSpec {
            project_name: "p1".to_string(),
            username: name.to_string(),
            auth_database: "admin".to_string(),
            password: None,
            roles: vec![RoleAssignment {
                role_name: "readWrite".to_string(),
                database_name: "app".to_string(),
                collection_name: None,
            }],
            scopes: Vec::new(),
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

fn container(region: &str, cidr: &str) -> Resource {
    Resource::new(
        Metadata::named(format!("aws-{region}")),
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

fn desired(resources: Vec<Resource>) -> DesiredState {
    DesiredState {
        resources,
        ..DesiredState::default()
    }
}

fn auto() -> ExecutorOptions {
    ExecutorOptions {
        auto_approve: true,
        ..ExecutorOptions::default()
    }
}

async fn plan_for(control: &Arc<MockControl>, state: &DesiredState, options: &PlanOptions) -> PlannedChange {
    build_plan_for(&Discovery::new(control.clone()), &CancellationToken::new(), state, None, options)
        .await
        .unwrap()
}

#[tokio::test]
async fn create_cluster_in_existing_project() {
    let control = Arc::new(MockControl::with_project("p1"));
    let state = desired(vec![project("p1"), cluster("c1")]);

    let planned = plan_for(&control, &state, &PlanOptions::default()).await;
    let changes: Vec<&Operation> = planned
        .plan
        .operations
        .iter()
        .filter(|op| op.verb.is_mutation())
        .collect();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].verb, Verb::Create);
    assert_eq!(changes[0].kind, Kind::Cluster);

    let dry = apply_plan(
        &Discovery::new(control.clone()),
        &planned,
        ExecutorOptions {
            dry_run: true,
            ..auto()
        },
        &CancellationToken::new(),
        &AutoApprove,
    )
    .await
    .unwrap();
    assert!(dry
        .operations
        .iter()
        .all(|op| op.status == OpStatus::PlannedOnly));
    let rendered = render_plan(&planned.plan, OutputFormat::Table).unwrap();
    assert!(rendered.contains("1 create, 0 update, 0 delete"));
    assert_eq!(control.mutations(), 0);

    let report = apply_plan(
        &Discovery::new(control.clone()),
        &planned,
        auto(),
        &CancellationToken::new(),
        &AutoApprove,
    )
    .await
    .unwrap();
    assert_eq!(report.outcome, Outcome::Success);
    assert_eq!(control.calls(), vec!["create Cluster/p1/c1".to_string()]);

    let replanned = plan_for(&control, &state, &PlanOptions::default()).await;
    assert!(replanned.plan.is_noop());
}

#[tokio::test]
async fn second_apply_is_idempotent() {
    let control = Arc::new(MockControl::with_project("p1"));
    let state = desired(vec![project("p1"), cluster("c1"), user("u1"), access("198.51.100.7")]);

    let first = plan_for(&control, &state, &PlanOptions::default()).await;
    apply_plan(&Discovery::new(control.clone()), &first, auto(), &CancellationToken::new(), &AutoApprove)
        .await
        .unwrap();
    let after_first = control.mutations();
    assert_eq!(after_first, 3);

    let second = plan_for(&control, &state, &PlanOptions::default()).await;
    assert!(second.plan.operations.iter().all(|op| op.verb == Verb::NoOp));
    let report = apply_plan(&Discovery::new(control.clone()), &second, auto(), &CancellationToken::new(), &AutoApprove)
        .await
        .unwrap();
    assert_eq!(report.count(OpStatus::Unchanged), report.operations.len());
    assert_eq!(control.mutations(), after_first);
}

#[tokio::test]
async fn summary_counts_every_identity_once() {
    let control = Arc::new(MockControl::with_project("p1"));
    control.seed(cluster("c1"));
    control.seed(access("203.0.113.9"));
    let mut bigger = cluster("c1");
    if let ResourceSpec::Cluster(spec) = &mut bigger.spec {
        spec.instance_size = "M10".to_string();
    }
    let state = desired(vec![project("p1"), bigger, cluster("c2"), user("u1")]);
    let planned = plan_for(
        &control,
        &state,
        &PlanOptions {
            mode: PlanMode::Reconcile { prune: true },
            ..PlanOptions::default()
        },
    )
    .await;
    let summary = &planned.plan.summary;
    assert_eq!(summary.creates, 2);
    assert_eq!(summary.updates, 1);
    assert_eq!(summary.deletes, 1);
    assert_eq!(summary.noops, 1);
    // p1, c1, c2, u1 and the pruned access entry.
    assert_eq!(summary.total(), 5);
}

#[tokio::test]
async fn overlapping_container_names_live_id() {
    let control = Arc::new(MockControl::with_project("p1"));
    let mut live = container("US_EAST_1", "10.0.0.0/16");
    live.metadata.id = Some("cont-live-1".to_string());
    control.seed(live);
    let state = desired(vec![project("p1"), container("US_WEST_2", "10.0.5.0/24")]);

    let err = build_plan_for(
        &Discovery::new(control.clone()),
        &CancellationToken::new(),
        &state,
        None,
        &PlanOptions::default(),
    )
    .await
    .unwrap_err();
    let typed = err.downcast_ref::<Error>().unwrap();
    assert!(matches!(typed, Error::Consistency(_)));
    assert!(typed.to_string().contains("cont-live-1"));
    assert_eq!(control.mutations(), 0);
}

#[tokio::test]
async fn destroy_rolls_back_after_conflict() {
    let control = Arc::new(MockControl::with_project("p1"));
    control.seed(cluster("c1"));
    control.seed(user("u1"));
    control.fail(
        "delete Cluster/p1/c1",
        Error::Conflict("cluster c1 has an operation in progress".to_string()),
    );
    let state = desired(vec![cluster("c1"), user("u1")]);
    let planned = plan_for(
        &control,
        &state,
        &PlanOptions {
            mode: PlanMode::Destroy,
            ..PlanOptions::default()
        },
    )
    .await;

    let report = apply_plan(
        &Discovery::new(control.clone()),
        &planned,
        ExecutorOptions {
            rollback_on_error: true,
            ..auto()
        },
        &CancellationToken::new(),
        &AutoApprove,
    )
    .await
    .unwrap();

    assert_eq!(
        report.get("delete/DatabaseUser/p1/admin/u1").unwrap().status,
        OpStatus::RolledBack
    );
    let failed = report.get("delete/Cluster/p1/c1").unwrap();
    assert_eq!(failed.status, OpStatus::Failed);
    assert_eq!(failed.error_kind, Some(matlas_core::ErrorKind::Conflict));
    assert_eq!(report.outcome, Outcome::Partial);
    assert_eq!(report.outcome.exit_code(), 3);
    assert_eq!(
        control.calls(),
        vec![
            "delete DatabaseUser/p1/admin/u1".to_string(),
            "delete Cluster/p1/c1".to_string(),
            "create DatabaseUser/p1/admin/u1".to_string(),
        ]
    );
}

#[tokio::test]
async fn preserved_entry_is_not_pruned() {
    let control = Arc::new(MockControl::with_project("p1"));
    let mut kept = access("203.0.113.1");
    kept.metadata
        .labels
        .insert(PRESERVE_LABEL.to_string(), "true".to_string());
    control.seed(kept);
    let state = desired(vec![project("p1")]);
    let planned = plan_for(
        &control,
        &state,
        &PlanOptions {
            mode: PlanMode::Reconcile { prune: true },
            ..PlanOptions::default()
        },
    )
    .await;
    let op = planned
        .plan
        .operations
        .iter()
        .find(|op| op.kind == Kind::NetworkAccess)
        .unwrap();
    assert_eq!(op.verb, Verb::NoOp);
    assert_eq!(op.note.as_deref(), Some("preserved"));
    assert!(planned.plan.warnings.iter().any(|w| w.contains("preserve")));
}

#[tokio::test]
async fn failed_parent_blocks_children_only() {
    let control = Arc::new(MockControl::with_project("p1"));
    control.fail(
        "create Cluster/p1/c1",
        Error::Unauthorized("invalid api key".to_string()),
    );
    let mut scoped = user("u1");
    if let ResourceSpec::DatabaseUser(spec) = &mut scoped.spec {
        spec.scopes.push(matlas_core::UserScope {
            name: "c1".to_string(),
            scope_type: matlas_core::ScopeType::Cluster,
        });
    }
    let state = desired(vec![project("p1"), cluster("c1"), scoped, access("198.51.100.1")]);
    let planned = plan_for(&control, &state, &PlanOptions::default()).await;
    let report = apply_plan(&Discovery::new(control.clone()), &planned, auto(), &CancellationToken::new(), &AutoApprove)
        .await
        .unwrap();

    let cluster_op = report.get("create/Cluster/p1/c1").unwrap();
    assert_eq!(cluster_op.status, OpStatus::Failed);
    assert!(cluster_op.hint.as_deref().unwrap().contains("check credentials"));
    assert_eq!(
        report.get("create/DatabaseUser/p1/admin/u1").unwrap().status,
        OpStatus::Blocked
    );
    assert_eq!(
        report.get("create/NetworkAccess/p1/198.51.100.1").unwrap().status,
        OpStatus::Succeeded
    );
    assert_eq!(report.outcome, Outcome::Partial);
}

#[tokio::test(start_paused = true)]
async fn concurrency_caps_hold() {
    let control = Arc::new(MockControl::with_project("p1").delayed(Duration::from_millis(50)));
    let mut resources = vec![project("p1")];
    for i in 0..5 {
        resources.push(cluster(&format!("c{i}")));
    }
    for i in 0..8 {
        resources.push(access(&format!("198.51.100.{}", i + 10)));
    }
    let planned = plan_for(&control, &desired(resources), &PlanOptions::default()).await;
    let report = apply_plan(&Discovery::new(control.clone()), &planned, auto(), &CancellationToken::new(), &AutoApprove)
        .await
        .unwrap();
    assert_eq!(report.outcome, Outcome::Success);

    let counters = control.counters.lock().unwrap();
    assert_eq!(counters.mutations, 13);
    assert!(counters.max_running <= 5);
    assert!(counters.max_running > 1);
    assert!(counters.max_running_kind[&Kind::Cluster] <= 3);
}

#[tokio::test]
async fn panicked_worker_frees_its_slot() {
    let control = Arc::new(MockControl::with_project("p1"));
    control.panic_on("create Cluster/p1/c1");
    let mut scoped = user("u1");
    if let ResourceSpec::DatabaseUser(spec) = &mut scoped.spec {
        spec.scopes.push(matlas_core::UserScope {
            name: "c1".to_string(),
            scope_type: matlas_core::ScopeType::Cluster,
        });
    }
    let state = desired(vec![project("p1"), cluster("c1"), cluster("c2"), scoped]);
    let planned = plan_for(&control, &state, &PlanOptions::default()).await;
    let options = ExecutorOptions {
        max_concurrency: 1,
        ..auto()
    };
    let report = apply_plan(&Discovery::new(control.clone()), &planned, options, &CancellationToken::new(), &AutoApprove)
        .await
        .unwrap();

    let crashed = report.get("create/Cluster/p1/c1").unwrap();
    assert_eq!(crashed.status, OpStatus::Failed);
    assert!(crashed.error.as_deref().unwrap().contains("worker task failed"));
    assert!(crashed.finished_at.is_some());
    assert_eq!(report.get("create/Cluster/p1/c2").unwrap().status, OpStatus::Succeeded);
    assert_eq!(
        report.get("create/DatabaseUser/p1/admin/u1").unwrap().status,
        OpStatus::Blocked
    );
    assert_eq!(report.outcome, Outcome::Partial);
}

#[tokio::test(start_paused = true)]
async fn dependents_start_after_parents_finish() {
    let control = Arc::new(MockControl::default().delayed(Duration::from_millis(20)));
    let state = desired(vec![project("p1"), cluster("c1"), user("u1")]);
    let planned = plan_for(&control, &state, &PlanOptions::default()).await;
    assert!(planned.live.is_none());
    let report = apply_plan(&Discovery::new(control.clone()), &planned, auto(), &CancellationToken::new(), &AutoApprove)
        .await
        .unwrap();
    assert_eq!(report.outcome, Outcome::Success);

    for op in &planned.plan.operations {
        let started = report.get(&op.id).unwrap().started_at.unwrap();
        for dep in &op.deps {
            let finished = report.get(dep).unwrap().finished_at.unwrap();
            assert!(started >= finished, "{} started before {dep} finished", op.id);
        }
    }
    assert_eq!(control.calls()[0], "create Project/p1");
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_new_calls() {
    let control = Arc::new(MockControl::with_project("p1").delayed(Duration::from_secs(10)));
    let mut resources = vec![project("p1")];
    for i in 0..4 {
        resources.push(cluster(&format!("c{i}")));
    }
    let planned = plan_for(&control, &desired(resources), &PlanOptions::default()).await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });
    let report = apply_plan(&Discovery::new(control.clone()), &planned, auto(), &cancel, &AutoApprove)
        .await
        .unwrap();

    assert_eq!(report.count(OpStatus::Aborted), 3);
    assert_eq!(report.count(OpStatus::Skipped), 1);
    let counters = control.counters.lock().unwrap();
    assert_eq!(counters.calls_after_cancel, 0);
    assert_eq!(counters.calls.len(), 3);
    assert_eq!(counters.mutations, 0);
}

#[tokio::test]
async fn declined_plan_runs_nothing() {
    struct Refuse;

    #[async_trait]
    impl Approver for Refuse {
        async fn approve(&self, _plan: &Plan) -> anyhow::Result<bool> {
            Ok(false)
        }
    }

    let control = Arc::new(MockControl::with_project("p1"));
    let planned = plan_for(&control, &desired(vec![project("p1"), cluster("c1")]), &PlanOptions::default()).await;
    let report = apply_plan(
        &Discovery::new(control.clone()),
        &planned,
        ExecutorOptions::default(),
        &CancellationToken::new(),
        &Refuse,
    )
    .await
    .unwrap();
    assert_eq!(report.outcome, Outcome::Declined);
    assert_eq!(control.mutations(), 0);
}

struct SplitInspector;

#[async_trait]
impl DatabaseInspector for SplitInspector {
    async fn inspect(
        &self,
        _cancel: &CancellationToken,
        target: &ClusterTarget,
    ) -> CoreResult<Vec<DiscoveredDatabase>> {
        if target.cluster_name == "cB" {
            return Err(Error::Transient("connection refused".to_string()));
        }
        Ok(vec![DiscoveredDatabase {
            cluster_name: target.cluster_name.clone(),
            name: "orders".to_string(),
            size_on_disk: 4096,
            empty: false,
            collections: Vec::new(),
        }])
    }
}

#[tokio::test]
async fn discovery_reports_partial_enumeration() {
    let control = Arc::new(MockControl::with_project("p1"));
    control.seed(cluster("cA"));
    control.seed(cluster("cB"));
    let discovery = Discovery::new(control.clone())
        .with_inspector(Arc::new(SplitInspector))
        .with_cache(Arc::new(DiscoveryCache::default()));
    let options = DiscoveryOptions {
        include_databases: true,
        ..DiscoveryOptions::default()
    };

    let outcome = discovery
        .discover_project(&CancellationToken::new(), PROJECT_ID, &options)
        .await
        .unwrap();
    assert!(!outcome.stats.cache_hit);
    assert!(outcome.stats.databases_found >= 1);
    assert_eq!(outcome.stats.clusters_found, 2);
    assert_eq!(outcome.state.databases[0].cluster_name, "cA");
    let error = outcome.enumeration_error.unwrap();
    assert_eq!(error.failures[0].cluster_name, "cB");
    assert!(error.to_string().contains("connection refused"));
}

#[tokio::test]
async fn fingerprint_is_stable_and_cached() {
    let control = Arc::new(MockControl::with_project("p1"));
    control.seed(cluster("c1"));
    let mut secret_user = user("u1");
    if let ResourceSpec::DatabaseUser(spec) = &mut secret_user.spec {
        spec.password = Some(matlas_core::Secret::new("hunter2"));
    }
    control.seed(secret_user);
    let cache = Arc::new(DiscoveryCache::default());
    let discovery = Discovery::new(control.clone()).with_cache(cache.clone());
    let options = DiscoveryOptions {
        mask_secrets: true,
        ..DiscoveryOptions::default()
    };

    let first = discovery
        .discover_project(&CancellationToken::new(), PROJECT_ID, &options)
        .await
        .unwrap();
    let second = discovery
        .discover_project(&CancellationToken::new(), PROJECT_ID, &options)
        .await
        .unwrap();
    assert!(second.stats.cache_hit);
    assert_eq!(first.state.fingerprint, second.state.fingerprint);
    assert_eq!(cache.stats().hits, 1);

    let uncached = Discovery::new(control.clone())
        .discover_project(&CancellationToken::new(), PROJECT_ID, &DiscoveryOptions::default())
        .await
        .unwrap();
    assert_eq!(uncached.state.fingerprint, first.state.fingerprint);

    let rendered = render_state(&first.state, None, OutputFormat::Yaml).unwrap();
    assert!(rendered.contains("***MASKED***"));
    assert!(!rendered.contains("hunter2"));
}

#[tokio::test]
async fn planning_reads_through_shared_cache() {
    let control = Arc::new(MockControl::with_project("p1"));
    let cache = Arc::new(DiscoveryCache::default());
    let discovery = Discovery::new(control.clone()).with_cache(cache.clone());
    let state = desired(vec![project("p1"), cluster("c1")]);
    let cancel = CancellationToken::new();

    let first = build_plan_for(&discovery, &cancel, &state, None, &PlanOptions::default())
        .await
        .unwrap();
    let second = build_plan_for(&discovery, &cancel, &state, None, &PlanOptions::default())
        .await
        .unwrap();
    assert_eq!(cache.stats().misses, 1);
    assert_eq!(cache.stats().hits, 1);
    assert_eq!(first.plan.summary, second.plan.summary);

    let report = apply_plan(&discovery, &second, auto(), &cancel, &AutoApprove)
        .await
        .unwrap();
    assert_eq!(report.outcome, Outcome::Success);
    assert_eq!(cache.stats().size, 0);

    let replanned = build_plan_for(&discovery, &cancel, &state, None, &PlanOptions::default())
        .await
        .unwrap();
    assert!(replanned.plan.is_noop());
    assert_eq!(cache.stats().misses, 2);
}

#[tokio::test]
async fn discovered_snapshot_replans_as_noop() {
    let control = Arc::new(MockControl::with_project("p1"));
    control.seed(cluster("c1"));
    control.seed(access("198.51.100.3"));
    let outcome = Discovery::new(Arc::new(MockControl::default()))
        .discover_project(&CancellationToken::new(), "missing", &DiscoveryOptions::default())
        .await;
    assert!(outcome.unwrap_err().is_not_found());

    let live = observe(&*control, &CancellationToken::new(), PROJECT_ID, &[Kind::Cluster, Kind::NetworkAccess])
        .await
        .unwrap();
    let document = live.to_apply_document();
    let yaml = to_yaml(&document).unwrap();
    let reloaded = load_str(&yaml, "snapshot").unwrap();
    let planned = plan_for(&control, &reloaded, &PlanOptions::default()).await;
    assert!(planned.plan.is_noop());
}
