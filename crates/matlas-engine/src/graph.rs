//! dependency ordering for plan operations.

use crate::types::{Operation, Verb};
use matlas_core::{Error, Identity, Kind, Resource, Result};
use std::collections::{BTreeMap, BTreeSet};

/// true when `child` has to wait for `parent` to exist.
///
/// narrowed references (user scopes, search index cluster, peering
/// container) restrict the edge to the named parent; otherwise every
/// resource of an ancestor kind in the same project is a parent.
pub fn depends_on(child: &Resource, parent: &Identity) -> bool {
    if !parent.kind.is_ancestor_of(child.kind()) {
        return false;
    }
    if parent.kind == Kind::Project {
        return parent.name == child.project_name();
    }
    if parent.project() != child.project_name() {
        return false;
    }
    match child.narrowed_dependencies(parent.kind) {
        Some(targets) => targets.contains(parent),
        None => true,
    }
}

/// fill in `deps` for every operation.
///
/// creates and updates wait for creates and updates of their parents;
/// deletes wait for deletes of their children; the create half of a
/// replacement waits for its delete half.
pub fn link(operations: &mut [Operation]) {
    let snapshot: Vec<(String, Verb, Identity, Option<Resource>, bool)> = operations
        .iter()
        .map(|op| {
            (
                op.id.clone(),
                op.verb,
                op.identity.clone(),
                op.resource().cloned(),
                op.replace,
            )
        })
        .collect();

    for op in operations.iter_mut() {
        let Some(resource) = op.resource().cloned() else {
            continue;
        };
        let mut deps = BTreeSet::new();
        for (id, verb, identity, other, replace) in &snapshot {
            if *id == op.id {
                continue;
            }
            match (op.verb, *verb) {
                (Verb::Create | Verb::Update, Verb::Create | Verb::Update) => {
                    if depends_on(&resource, identity) {
                        deps.insert(id.clone());
                    }
                }
                (Verb::Delete, Verb::Delete) => {
                    if other
                        .as_ref()
                        .is_some_and(|child| depends_on(child, &op.identity))
                    {
                        deps.insert(id.clone());
                    }
                }
                (Verb::Create, Verb::Delete) if op.replace && *replace => {
                    if *identity == op.identity {
                        deps.insert(id.clone());
                    }
                }
                _ => {}
            }
        }
        op.deps.extend(deps);
        op.deps.sort();
        op.deps.dedup();
    }
}

/// dispatch priority: creates and updates parents first, deletes children
/// first, no-ops last; ties by kind then identity.
fn priority(op: &Operation) -> (u8, u8, Kind, Identity, Verb) {
    let level = op.kind.level();
    match op.verb {
        Verb::Create | Verb::Update => (0, level, op.kind, op.identity.clone(), op.verb),
        Verb::Delete => (1, 3 - level, op.kind, op.identity.clone(), op.verb),
        Verb::NoOp => (2, level, op.kind, op.identity.clone(), op.verb),
    }
}

/// topologically sort operations (kahn), failing on cycles or dangling deps.
pub fn sort(operations: Vec<Operation>) -> Result<Vec<Operation>> {
    let index: BTreeMap<String, usize> = operations
        .iter()
        .enumerate()
        .map(|(i, op)| (op.id.clone(), i))
        .collect();
    let mut indegree = vec![0usize; operations.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); operations.len()];
    for (i, op) in operations.iter().enumerate() {
        for dep in &op.deps {
            let Some(&j) = index.get(dep) else {
                return Err(Error::Consistency(format!(
                    "operation {} depends on unknown operation {dep}",
                    op.id
                )));
            };
            indegree[i] += 1;
            dependents[j].push(i);
        }
    }

    let mut ready: BTreeSet<(_, usize)> = operations
        .iter()
        .enumerate()
        .filter(|(i, _)| indegree[*i] == 0)
        .map(|(i, op)| (priority(op), i))
        .collect();
    let mut order = Vec::with_capacity(operations.len());
    while let Some(entry) = ready.pop_first() {
        let i = entry.1;
        order.push(i);
        for &next in &dependents[i] {
            indegree[next] -= 1;
            if indegree[next] == 0 {
                ready.insert((priority(&operations[next]), next));
            }
        }
    }

    if order.len() != operations.len() {
        let stuck: Vec<&str> = operations
            .iter()
            .enumerate()
            .filter(|(i, _)| indegree[*i] > 0)
            .map(|(_, op)| op.id.as_str())
            .collect();
        return Err(Error::Consistency(format!(
            "dependency cycle between operations: {}",
            stuck.join(", ")
        )));
    }

    let mut slots: Vec<Option<Operation>> = operations.into_iter().map(Some).collect();
    Ok(order
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use matlas_core::{
        ClusterSpec, ClusterType, CloudProvider, DatabaseUserSpec, Metadata, ProjectSpec,
        ResourceSpec, RoleAssignment, ScopeType, UserScope,
    };

    fn project() -> Resource {
        Resource::new(
            Metadata::named("p1"),
            ResourceSpec::Project(ProjectSpec {
                name: "p1".to_string(),
                organization_id: "org".to_string(),
                tags: Default::default(),
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
                instance_size: "M10".to_string(),
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

    fn user(scopes: &[&str]) -> Resource {
        Resource::new(
            Metadata::named("u1"),
            ResourceSpec::DatabaseUser(DatabaseUserSpec {
                project_name: "p1".to_string(),
                username: "u1".to_string(),
                auth_database: "admin".to_string(),
                password: None,
                roles: vec![RoleAssignment {
                    role_name: "read".to_string(),
                    database_name: "app".to_string(),
                    collection_name: None,
                }],
                scopes: scopes
                    .iter()
                    .map(|name| UserScope {
                        name: name.to_string(),
                        scope_type: ScopeType::Cluster,
                    })
                    .collect(),
            }),
        )
    }

    fn create(resource: Resource) -> Operation {
        Operation::new(Verb::Create, resource.identity(), None, Some(resource))
    }

    fn delete(resource: Resource) -> Operation {
        Operation::new(Verb::Delete, resource.identity(), Some(resource), None)
    }

    #[test]
    fn scoped_user_depends_only_on_its_cluster() {
        let user = user(&["c1"]);
        assert!(depends_on(&user, &cluster("c1").identity()));
        assert!(!depends_on(&user, &cluster("c2").identity()));
        assert!(depends_on(&user, &project().identity()));
        assert!(!depends_on(&cluster("c1"), &user.identity()));
    }

    #[test]
    fn creates_sort_parents_first() {
        let mut ops = vec![create(user(&[])), create(cluster("c1")), create(project())];
        link(&mut ops);
        let sorted = sort(ops).unwrap();
        let kinds: Vec<Kind> = sorted.iter().map(|op| op.kind).collect();
        assert_eq!(kinds, vec![Kind::Project, Kind::Cluster, Kind::DatabaseUser]);
        assert_eq!(sorted[2].deps.len(), 2);
    }

    #[test]
    fn deletes_sort_children_first() {
        let mut ops = vec![delete(cluster("c1")), delete(user(&["c1"]))];
        link(&mut ops);
        let sorted = sort(ops).unwrap();
        assert_eq!(sorted[0].kind, Kind::DatabaseUser);
        assert_eq!(sorted[1].deps, vec![sorted[0].id.clone()]);
    }

    #[test]
    fn cycle_is_consistency_error() {
        let mut a = create(cluster("c1"));
        let mut b = create(cluster("c2"));
        a.deps.push(b.id.clone());
        b.deps.push(a.id.clone());
        let err = sort(vec![a, b]).unwrap_err();
        assert!(matches!(err, Error::Consistency(_)));
        assert!(err.to_string().contains("dependency cycle"));
    }
}
