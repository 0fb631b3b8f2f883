//! diff and plan generation.

use crate::diff::{diff_fields, patch};
use crate::graph;
use crate::types::{FieldChange, Operation, Plan, Summary, Verb};
use matlas_core::{
    cidrs_overlap, unresolved_references, Error, Identity, Kind, Resource, ResourceSpec, Result,
};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// how live resources absent from the desired set are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanMode {
    /// create and update toward desired; delete unmanaged resources only
    /// when `prune` is set.
    Reconcile { prune: bool },
    /// delete the resources named by the desired set.
    Destroy,
}

impl Default for PlanMode {
    fn default() -> Self {
        PlanMode::Reconcile { prune: false }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanOptions {
    pub mode: PlanMode,
    /// never delete live resources in reconcile mode.
    pub preserve_existing: bool,
    /// permit replacements that change irrecoverable fields.
    pub allow_destructive: bool,
}

/// fields whose change cannot be applied in place.
fn replace_fields(kind: Kind) -> &'static [&'static str] {
    match kind {
        Kind::Cluster => &["region"],
        Kind::NetworkContainer => &["atlasCidrBlock"],
        Kind::SearchIndex => &["type"],
        _ => &[],
    }
}

/// fields whose change destroys the resource's data.
fn irrecoverable_fields(kind: Kind) -> &'static [&'static str] {
    match kind {
        Kind::Project => &["organizationId"],
        Kind::Cluster => &["provider"],
        _ => &[],
    }
}

fn requires_replace(kind: Kind, field: &str) -> bool {
    match kind {
        Kind::NetworkPeering => field != "routeTableCidrBlock",
        _ => replace_fields(kind).contains(&field) || irrecoverable_fields(kind).contains(&field),
    }
}

/// build a deterministic plan from desired and live resources.
pub fn plan(desired: &[Resource], live: &[Resource], options: &PlanOptions) -> Result<Plan> {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let mut desired_by_id: BTreeMap<Identity, &Resource> = BTreeMap::new();
    for resource in desired {
        if desired_by_id.insert(resource.identity(), resource).is_some() {
            errors.push(Error::Validation(format!(
                "duplicate identity: {}",
                resource.identity()
            )));
        }
    }
    let live_by_id: BTreeMap<Identity, &Resource> =
        live.iter().map(|resource| (resource.identity(), resource)).collect();

    if options.mode != PlanMode::Destroy {
        let known: BTreeSet<Identity> = desired_by_id
            .keys()
            .chain(live_by_id.keys())
            .cloned()
            .collect();
        for (source, target) in unresolved_references(desired, &known) {
            errors.push(Error::Unavailable(format!(
                "{source} references {target}, which is neither declared nor live"
            )));
        }
        check_container_overlap(&desired_by_id, &live_by_id, &mut errors);
    } else {
        check_project_destroy(&desired_by_id, &live_by_id, &mut errors);
    }

    let identities: BTreeSet<&Identity> = desired_by_id.keys().chain(live_by_id.keys()).collect();
    let mut operations = Vec::new();
    for identity in identities {
        let wanted = desired_by_id.get(identity).copied();
        let current = live_by_id.get(identity).copied();
        let result = match options.mode {
            PlanMode::Destroy => classify_destroy(identity, wanted, current, &mut warnings),
            PlanMode::Reconcile { prune } => classify_reconcile(
                identity,
                wanted,
                current,
                prune && !options.preserve_existing,
                options.allow_destructive,
                &mut warnings,
            ),
        };
        match result {
            Ok(ops) => operations.extend(ops),
            Err(err) => errors.push(err),
        }
    }

    if let Some(err) = aggregate(errors) {
        return Err(err);
    }

    graph::link(&mut operations);
    let operations = graph::sort(operations)?;
    let summary = summarize(&operations);
    Ok(Plan {
        operations,
        summary,
        warnings,
    })
}

fn classify_reconcile(
    identity: &Identity,
    wanted: Option<&Resource>,
    current: Option<&Resource>,
    prune: bool,
    allow_destructive: bool,
    warnings: &mut Vec<String>,
) -> Result<Vec<Operation>> {
    match (wanted, current) {
        (Some(wanted), None) => Ok(create_ops(identity, wanted)),
        (Some(wanted), Some(current)) => {
            let changes = diff_fields(&current.canonical_spec(), &wanted.canonical_spec());
            if changes.is_empty() {
                return Ok(vec![Operation::new(
                    Verb::NoOp,
                    identity.clone(),
                    Some(current.clone()),
                    Some(adopt_id(wanted, current)),
                )]);
            }
            let irrecoverable: Vec<&str> = changes
                .iter()
                .map(|change| change.field.as_str())
                .filter(|field| irrecoverable_fields(identity.kind).contains(field))
                .collect();
            if !irrecoverable.is_empty() && !allow_destructive {
                return Err(Error::Validation(format!(
                    "{identity}: changing {} destroys the resource; re-run with --allow-destructive",
                    irrecoverable.join(", ")
                )));
            }
            if changes
                .iter()
                .any(|change| requires_replace(identity.kind, &change.field))
            {
                let mut delete = Operation::new(
                    Verb::Delete,
                    identity.clone(),
                    Some(current.clone()),
                    None,
                );
                delete.replace = true;
                delete.changes = changes.clone();
                let mut create = Operation::new(
                    Verb::Create,
                    identity.clone(),
                    Some(current.clone()),
                    Some(wanted.clone()),
                );
                create.replace = true;
                create.changes = changes;
                return Ok(vec![delete, create]);
            }
            let mut update = Operation::new(
                Verb::Update,
                identity.clone(),
                Some(current.clone()),
                Some(adopt_id(wanted, current)),
            );
            update.patch = patch(&current.canonical_spec(), &wanted.canonical_spec());
            update.changes = changes;
            Ok(vec![update])
        }
        (None, Some(current)) => {
            if prune {
                if current.metadata.is_preserved() {
                    warnings.push(format!("{identity} is labelled preserve; not deleting"));
                    let mut op =
                        Operation::new(Verb::NoOp, identity.clone(), Some(current.clone()), None);
                    op.note = Some("preserved".to_string());
                    return Ok(vec![op]);
                }
                if identity.kind == Kind::Project {
                    let mut op =
                        Operation::new(Verb::NoOp, identity.clone(), Some(current.clone()), None);
                    op.note = Some("project deletion requires destroy".to_string());
                    return Ok(vec![op]);
                }
                return Ok(vec![Operation::new(
                    Verb::Delete,
                    identity.clone(),
                    Some(current.clone()),
                    None,
                )]);
            }
            let mut op = Operation::new(Verb::NoOp, identity.clone(), Some(current.clone()), None);
            op.note = Some("unmanaged".to_string());
            Ok(vec![op])
        }
        (None, None) => Ok(Vec::new()),
    }
}

fn classify_destroy(
    identity: &Identity,
    wanted: Option<&Resource>,
    current: Option<&Resource>,
    warnings: &mut Vec<String>,
) -> Result<Vec<Operation>> {
    match (wanted, current) {
        (Some(wanted), Some(current)) => {
            if wanted.metadata.is_preserved() || current.metadata.is_preserved() {
                warnings.push(format!("{identity} is labelled preserve; not deleting"));
                let mut op =
                    Operation::new(Verb::NoOp, identity.clone(), Some(current.clone()), None);
                op.note = Some("preserved".to_string());
                return Ok(vec![op]);
            }
            Ok(vec![Operation::new(
                Verb::Delete,
                identity.clone(),
                Some(current.clone()),
                None,
            )])
        }
        (Some(wanted), None) => {
            let mut op = Operation::new(Verb::NoOp, identity.clone(), None, Some(wanted.clone()));
            op.note = Some("already absent".to_string());
            Ok(vec![op])
        }
        (None, Some(current)) => Ok(vec![Operation::new(
            Verb::NoOp,
            identity.clone(),
            Some(current.clone()),
            None,
        )]),
        (None, None) => Ok(Vec::new()),
    }
}

/// creation ops; point-in-time recovery is enabled by a follow-up update.
fn create_ops(identity: &Identity, wanted: &Resource) -> Vec<Operation> {
    let ResourceSpec::Cluster(spec) = &wanted.spec else {
        return vec![Operation::new(
            Verb::Create,
            identity.clone(),
            None,
            Some(wanted.clone()),
        )];
    };
    if !spec.pit_enabled {
        return vec![Operation::new(
            Verb::Create,
            identity.clone(),
            None,
            Some(wanted.clone()),
        )];
    }

    let mut initial = wanted.clone();
    if let ResourceSpec::Cluster(spec) = &mut initial.spec {
        spec.pit_enabled = false;
    }
    let mut create = Operation::new(Verb::Create, identity.clone(), None, Some(initial.clone()));
    create.note = Some("pitEnabled applied after creation".to_string());
    let mut update = Operation::new(
        Verb::Update,
        identity.clone(),
        Some(initial),
        Some(wanted.clone()),
    );
    update.deps.push(create.id.clone());
    update.changes.push(FieldChange {
        field: "pitEnabled".to_string(),
        from: Value::Bool(false),
        to: Value::Bool(true),
    });
    vec![create, update]
}

/// desired resource carrying the live server id.
fn adopt_id(wanted: &Resource, current: &Resource) -> Resource {
    let mut resource = wanted.clone();
    if resource.metadata.id.is_none() {
        resource.metadata.id = current.metadata.id.clone();
    }
    resource
}

fn check_container_overlap(
    desired: &BTreeMap<Identity, &Resource>,
    live: &BTreeMap<Identity, &Resource>,
    errors: &mut Vec<Error>,
) {
    let cidr = |resource: &Resource| match &resource.spec {
        ResourceSpec::NetworkContainer(spec) => Some(spec.atlas_cidr_block.clone()),
        _ => None,
    };
    let wanted: Vec<(&Identity, String)> = desired
        .iter()
        .filter_map(|(identity, resource)| cidr(*resource).map(|block| (identity, block)))
        .collect();

    for (identity, block) in &wanted {
        for (live_identity, resource) in live {
            if live_identity == *identity || live_identity.project() != identity.project() {
                continue;
            }
            let Some(live_block) = cidr(*resource) else {
                continue;
            };
            if cidrs_overlap(block, &live_block) {
                let id = resource
                    .metadata
                    .id
                    .clone()
                    .unwrap_or_else(|| live_identity.to_string());
                errors.push(Error::Consistency(format!(
                    "{identity} ({block}) overlaps live network container {id} ({live_block})"
                )));
            }
        }
    }
    for (i, (a, block_a)) in wanted.iter().enumerate() {
        for (b, block_b) in wanted.iter().skip(i + 1) {
            if a.project() == b.project() && cidrs_overlap(block_a, block_b) {
                errors.push(Error::Consistency(format!(
                    "{a} ({block_a}) overlaps {b} ({block_b})"
                )));
            }
        }
    }
}

fn check_project_destroy(
    desired: &BTreeMap<Identity, &Resource>,
    live: &BTreeMap<Identity, &Resource>,
    errors: &mut Vec<Error>,
) {
    for identity in desired.keys().filter(|identity| identity.kind == Kind::Project) {
        if !live.contains_key(identity) {
            continue;
        }
        let remaining: Vec<String> = live
            .keys()
            .filter(|other| {
                other.kind == Kind::Cluster
                    && other.project() == identity.name
                    && !desired.contains_key(*other)
            })
            .map(|other| other.name.clone())
            .collect();
        if !remaining.is_empty() {
            errors.push(Error::Consistency(format!(
                "{identity} still has live clusters not being destroyed: {}",
                remaining.join(", ")
            )));
        }
    }
}

/// count each identity once, preferring the most significant verb.
pub fn summarize(operations: &[Operation]) -> Summary {
    #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    enum Bucket {
        NoOp,
        Delete,
        Update,
        Create,
        Replace,
    }

    let mut buckets: BTreeMap<&Identity, Bucket> = BTreeMap::new();
    for op in operations {
        let bucket = if op.replace {
            Bucket::Replace
        } else {
            match op.verb {
                Verb::Create => Bucket::Create,
                Verb::Update => Bucket::Update,
                Verb::Delete => Bucket::Delete,
                Verb::NoOp => Bucket::NoOp,
            }
        };
        let slot = buckets.entry(&op.identity).or_insert(bucket);
        *slot = (*slot).max(bucket);
    }

    let mut summary = Summary::default();
    for bucket in buckets.values() {
        match bucket {
            Bucket::Create => summary.creates += 1,
            Bucket::Update => summary.updates += 1,
            Bucket::Delete => summary.deletes += 1,
            Bucket::NoOp => summary.noops += 1,
            Bucket::Replace => summary.replaces += 1,
        }
    }
    summary
}

/// fold planner errors into one, keeping the first error's kind.
fn aggregate(errors: Vec<Error>) -> Option<Error> {
    let mut iter = errors.into_iter();
    let first = iter.next()?;
    let rest: Vec<String> = iter.map(|err| err.to_string()).collect();
    if rest.is_empty() {
        return Some(first);
    }
    Some(Error::new(
        first.kind(),
        format!("{}; {}", first.message(), rest.join("; ")),
    ))
}
