//! plan execution: bounded worker pool, dependency gating, rollback.

use crate::types::{ControlPlane, Operation, Plan, Verb};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use matlas_core::{Error, ErrorKind, Kind, Resource};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::task::{Id as TaskId, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_CONCURRENCY: usize = 5;
pub const DEFAULT_PROJECT_CONCURRENCY: usize = 1;
pub const DEFAULT_CLUSTER_CONCURRENCY: usize = 3;
pub const DEFAULT_KIND_CONCURRENCY: usize = 5;

/// per-operation lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Aborted,
    Blocked,
    Skipped,
    PlannedOnly,
    RolledBack,
    Unchanged,
}

impl OpStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpStatus::Pending => "Pending",
            OpStatus::Running => "Running",
            OpStatus::Succeeded => "Succeeded",
            OpStatus::Failed => "Failed",
            OpStatus::Aborted => "Aborted",
            OpStatus::Blocked => "Blocked",
            OpStatus::Skipped => "Skipped",
            OpStatus::PlannedOnly => "PlannedOnly",
            OpStatus::RolledBack => "RolledBack",
            OpStatus::Unchanged => "Unchanged",
        }
    }

    /// dependents may start once a dependency reaches one of these.
    fn satisfies_dependents(&self) -> bool {
        matches!(self, OpStatus::Succeeded | OpStatus::Unchanged)
    }

    fn blocks_dependents(&self) -> bool {
        matches!(
            self,
            OpStatus::Failed | OpStatus::Aborted | OpStatus::Blocked | OpStatus::Skipped
        )
    }
}

/// result row for one operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpResult {
    pub id: String,
    pub kind: Kind,
    pub name: String,
    pub verb: Verb,
    pub status: OpStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl OpResult {
    fn pending(op: &Operation) -> Self {
        Self {
            id: op.id.clone(),
            kind: op.kind,
            name: op.name.clone(),
            verb: op.verb,
            status: OpStatus::Pending,
            started_at: None,
            finished_at: None,
            error: None,
            error_kind: None,
            hint: None,
        }
    }

    fn fail(&mut self, status: OpStatus, err: &Error) {
        self.status = status;
        self.error = Some(err.to_string());
        self.error_kind = Some(err.kind());
        self.hint = err.hint().map(str::to_string);
    }
}

/// overall result of an apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Success,
    Partial,
    Failed,
    /// the approver refused; nothing ran.
    Declined,
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Success | Outcome::Declined => 0,
            Outcome::Failed => 1,
            Outcome::Partial => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyReport {
    /// one row per plan operation, in dispatch (plan) order.
    pub operations: Vec<OpResult>,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rollback_errors: Vec<String>,
    #[serde(default)]
    pub dry_run: bool,
}

impl ApplyReport {
    pub fn get(&self, id: &str) -> Option<&OpResult> {
        self.operations.iter().find(|op| op.id == id)
    }

    pub fn count(&self, status: OpStatus) -> usize {
        self.operations.iter().filter(|op| op.status == status).count()
    }
}

/// decides whether a plan may run.
#[async_trait]
pub trait Approver: Send + Sync {
    async fn approve(&self, plan: &Plan) -> Result<bool>;
}

/// approver that accepts every plan.
pub struct AutoApprove;

#[async_trait]
impl Approver for AutoApprove {
    async fn approve(&self, _plan: &Plan) -> Result<bool> {
        Ok(true)
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    pub max_concurrency: usize,
    pub project_concurrency: usize,
    pub cluster_concurrency: usize,
    pub kind_concurrency: usize,
    pub dry_run: bool,
    pub auto_approve: bool,
    /// undo applied operations after the first failure.
    pub rollback_on_error: bool,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            project_concurrency: DEFAULT_PROJECT_CONCURRENCY,
            cluster_concurrency: DEFAULT_CLUSTER_CONCURRENCY,
            kind_concurrency: DEFAULT_KIND_CONCURRENCY,
            dry_run: false,
            auto_approve: false,
            rollback_on_error: false,
        }
    }
}

impl ExecutorOptions {
    pub fn kind_cap(&self, kind: Kind) -> usize {
        let cap = match kind {
            Kind::Project => self.project_concurrency,
            Kind::Cluster => self.cluster_concurrency,
            _ => self.kind_concurrency,
        };
        cap.max(1)
    }
}

/// runs plans against a control plane.
pub struct Executor {
    control: Arc<dyn ControlPlane>,
    options: ExecutorOptions,
    /// project name to id, extended as projects are created.
    project_ids: BTreeMap<String, String>,
}

type WorkerResult = Result<Option<Resource>, Error>;

impl Executor {
    pub fn new(control: Arc<dyn ControlPlane>, options: ExecutorOptions) -> Self {
        Self {
            control,
            options,
            project_ids: BTreeMap::new(),
        }
    }

    pub fn with_project_ids(mut self, project_ids: BTreeMap<String, String>) -> Self {
        self.project_ids = project_ids;
        self
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    /// execute `plan`, consulting `approver` unless auto-approved.
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        plan: &Plan,
        approver: &dyn Approver,
    ) -> Result<ApplyReport> {
        let mut results: Vec<OpResult> = plan.operations.iter().map(OpResult::pending).collect();

        if self.options.dry_run {
            for result in &mut results {
                result.status = OpStatus::PlannedOnly;
            }
            return Ok(ApplyReport {
                operations: results,
                outcome: Outcome::Success,
                rollback_errors: Vec::new(),
                dry_run: true,
            });
        }

        if plan.summary.has_changes() && !self.options.auto_approve && !approver.approve(plan).await? {
            info!("plan declined");
            for result in &mut results {
                result.status = OpStatus::Skipped;
            }
            return Ok(ApplyReport {
                operations: results,
                outcome: Outcome::Declined,
                rollback_errors: Vec::new(),
                dry_run: false,
            });
        }

        let mut run = Run::new(plan, results, self.project_ids.clone());
        self.schedule(cancel, &mut run).await;

        let mut rollback_errors = Vec::new();
        if self.options.rollback_on_error && run.failed && !cancel.is_cancelled() {
            rollback_errors = self.rollback(cancel, &mut run).await;
        }

        let outcome = outcome(&run.results);
        info!(
            outcome = ?outcome,
            succeeded = run.results.iter().filter(|r| r.status == OpStatus::Succeeded).count(),
            failed = run.results.iter().filter(|r| r.status == OpStatus::Failed).count(),
            "apply finished"
        );
        Ok(ApplyReport {
            operations: run.results,
            outcome,
            rollback_errors,
            dry_run: false,
        })
    }

    async fn schedule(&self, cancel: &CancellationToken, run: &mut Run<'_>) {
        let plan: &Plan = run.plan;
        let ops = &plan.operations;
        let mut workers: JoinSet<WorkerResult> = JoinSet::new();
        let mut tasks: HashMap<TaskId, usize> = HashMap::new();
        let mut running_total = 0usize;
        let mut running_kind: HashMap<Kind, usize> = HashMap::new();

        for (i, op) in ops.iter().enumerate() {
            if !op.verb.is_mutation() {
                run.results[i].status = OpStatus::Unchanged;
            }
        }

        loop {
            run.block_dependents();
            let halted = cancel.is_cancelled() || (run.failed && self.options.rollback_on_error);
            if !halted {
                for i in 0..ops.len() {
                    if run.results[i].status != OpStatus::Pending || !run.ready(i) {
                        continue;
                    }
                    let op = &ops[i];
                    let kind_running = running_kind.get(&op.kind).copied().unwrap_or(0);
                    if running_total >= self.options.max_concurrency.max(1)
                        || kind_running >= self.options.kind_cap(op.kind)
                    {
                        continue;
                    }
                    let Some(project_id) = run.project_id(op) else {
                        let err = Error::Unavailable(format!(
                            "project {} has no id; create it first",
                            op.project_name()
                        ));
                        run.results[i].fail(OpStatus::Failed, &err);
                        run.failed = true;
                        continue;
                    };
                    debug!(op = %op.id, "dispatching");
                    run.results[i].status = OpStatus::Running;
                    run.results[i].started_at = Some(Utc::now());
                    running_total += 1;
                    *running_kind.entry(op.kind).or_default() += 1;
                    let control = self.control.clone();
                    let worker_cancel = cancel.clone();
                    let op = op.clone();
                    let handle = workers.spawn(async move {
                        perform(control.as_ref(), &worker_cancel, &project_id, &op).await
                    });
                    tasks.insert(handle.id(), i);
                }
            }

            let Some(joined) = workers.join_next_with_id().await else {
                break;
            };
            let (task, result) = match joined {
                Ok(pair) => pair,
                Err(err) => (
                    err.id(),
                    Err(Error::Execution(format!("worker task failed: {err}"))),
                ),
            };
            let Some(i) = tasks.remove(&task) else {
                continue;
            };
            let op = &ops[i];
            running_total -= 1;
            if let Some(count) = running_kind.get_mut(&op.kind) {
                *count -= 1;
            }
            run.results[i].finished_at = Some(Utc::now());
            match result {
                Ok(resource) => {
                    info!(op = %op.id, "operation succeeded");
                    run.results[i].status = OpStatus::Succeeded;
                    if op.kind == Kind::Project && op.verb == Verb::Create {
                        if let Some(id) = resource.as_ref().and_then(|r| r.metadata.id.clone()) {
                            run.project_ids.insert(op.name.clone(), id);
                        }
                    }
                    run.applied.push((i, resource));
                }
                Err(err) if err.is_cancelled() => {
                    warn!(op = %op.id, "operation aborted");
                    run.results[i].fail(OpStatus::Aborted, &err);
                }
                Err(err) => {
                    warn!(op = %op.id, error = %err, "operation failed");
                    run.results[i].fail(OpStatus::Failed, &err);
                    run.failed = true;
                }
            }
        }

        run.block_dependents();
        for result in &mut run.results {
            match result.status {
                OpStatus::Pending => result.status = OpStatus::Skipped,
                OpStatus::Running => {
                    result.status = OpStatus::Failed;
                    result.error = Some("worker task did not report back".to_string());
                }
                _ => {}
            }
        }
    }

    /// undo applied operations in reverse completion order. best effort.
    async fn rollback(&self, cancel: &CancellationToken, run: &mut Run<'_>) -> Vec<String> {
        let mut errors = Vec::new();
        let plan: &Plan = run.plan;
        let applied = std::mem::take(&mut run.applied);
        for (i, resource) in applied.into_iter().rev() {
            let op = &plan.operations[i];
            let Some(project_id) = run.project_id(op) else {
                errors.push(format!("{}: project id unknown", op.id));
                continue;
            };
            let result = match op.verb {
                Verb::Delete => match &op.from_state {
                    Some(previous) => self
                        .control
                        .create(cancel, &project_id, previous)
                        .await
                        .map(|_| ()),
                    None => Err(Error::Execution("no snapshot to restore".to_string())),
                },
                Verb::Create => match resource.as_ref().or(op.to_state.as_ref()) {
                    Some(created) => self.control.delete(cancel, &project_id, created).await,
                    None => Err(Error::Execution("nothing to delete".to_string())),
                },
                Verb::Update => match (resource.as_ref().or(op.to_state.as_ref()), &op.from_state) {
                    (Some(current), Some(previous)) => self
                        .control
                        .update(cancel, &project_id, current, previous)
                        .await
                        .map(|_| ()),
                    _ => Err(Error::Execution("no snapshot to restore".to_string())),
                },
                Verb::NoOp => continue,
            };
            match result {
                Ok(()) => {
                    info!(op = %op.id, "rolled back");
                    run.results[i].status = OpStatus::RolledBack;
                }
                Err(err) => {
                    warn!(op = %op.id, error = %err, "rollback failed");
                    errors.push(format!("{}: {err}", op.id));
                }
            }
        }
        errors
    }
}

/// mutable bookkeeping owned by the scheduler loop.
struct Run<'a> {
    plan: &'a Plan,
    results: Vec<OpResult>,
    deps: Vec<Vec<usize>>,
    project_ids: BTreeMap<String, String>,
    applied: Vec<(usize, Option<Resource>)>,
    failed: bool,
}

impl<'a> Run<'a> {
    fn new(plan: &'a Plan, results: Vec<OpResult>, project_ids: BTreeMap<String, String>) -> Self {
        let index: HashMap<&str, usize> = plan
            .operations
            .iter()
            .enumerate()
            .map(|(i, op)| (op.id.as_str(), i))
            .collect();
        let deps = plan
            .operations
            .iter()
            .map(|op| {
                op.deps
                    .iter()
                    .filter_map(|dep| index.get(dep.as_str()).copied())
                    .collect()
            })
            .collect();
        Self {
            plan,
            results,
            deps,
            project_ids,
            applied: Vec::new(),
            failed: false,
        }
    }

    fn ready(&self, i: usize) -> bool {
        self.deps[i]
            .iter()
            .all(|dep| self.results[*dep].status.satisfies_dependents())
    }

    /// mark pending ops behind a failed, aborted or blocked dependency.
    fn block_dependents(&mut self) {
        loop {
            let mut changed = false;
            for i in 0..self.results.len() {
                if self.results[i].status != OpStatus::Pending {
                    continue;
                }
                let blocker = self.deps[i]
                    .iter()
                    .find(|dep| self.results[**dep].status.blocks_dependents())
                    .map(|dep| self.results[*dep].id.clone());
                if let Some(blocker) = blocker {
                    self.results[i].status = OpStatus::Blocked;
                    self.results[i].error = Some(format!("blocked by {blocker}"));
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
    }

    fn project_id(&self, op: &Operation) -> Option<String> {
        if op.kind == Kind::Project {
            if op.verb == Verb::Create {
                return Some(String::new());
            }
            return op
                .from_state
                .as_ref()
                .and_then(|state| state.metadata.id.clone())
                .or_else(|| self.project_ids.get(&op.name).cloned());
        }
        self.project_ids.get(op.project_name()).cloned()
    }
}

async fn perform(
    control: &dyn ControlPlane,
    cancel: &CancellationToken,
    project_id: &str,
    op: &Operation,
) -> Result<Option<Resource>, Error> {
    let call = async {
        match op.verb {
            Verb::Create => {
                let desired = op
                    .to_state
                    .as_ref()
                    .ok_or_else(|| Error::Execution(format!("{} has no desired state", op.id)))?;
                control.create(cancel, project_id, desired).await.map(Some)
            }
            Verb::Update => {
                let desired = op
                    .to_state
                    .as_ref()
                    .ok_or_else(|| Error::Execution(format!("{} has no desired state", op.id)))?;
                let current = op.from_state.as_ref().unwrap_or(desired);
                control
                    .update(cancel, project_id, current, desired)
                    .await
                    .map(Some)
            }
            Verb::Delete => {
                let current = op
                    .from_state
                    .as_ref()
                    .ok_or_else(|| Error::Execution(format!("{} has no live state", op.id)))?;
                control.delete(cancel, project_id, current).await.map(|_| None)
            }
            Verb::NoOp => Ok(None),
        }
    };
    tokio::select! {
        _ = cancel.cancelled() => Err(Error::Cancelled(format!("{} cancelled", op.id))),
        result = call => result,
    }
}

fn outcome(results: &[OpResult]) -> Outcome {
    let applied = results
        .iter()
        .filter(|r| matches!(r.status, OpStatus::Succeeded | OpStatus::RolledBack))
        .count();
    let broken = results
        .iter()
        .filter(|r| r.status.blocks_dependents())
        .count();
    match (applied, broken) {
        (_, 0) => Outcome::Success,
        (0, _) => Outcome::Failed,
        _ => Outcome::Partial,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: OpStatus) -> OpResult {
        OpResult {
            id: "x".to_string(),
            kind: Kind::Cluster,
            name: "c1".to_string(),
            verb: Verb::Create,
            status,
            started_at: None,
            finished_at: None,
            error: None,
            error_kind: None,
            hint: None,
        }
    }

    #[test]
    fn outcome_codes() {
        assert_eq!(outcome(&[row(OpStatus::Succeeded)]).exit_code(), 0);
        assert_eq!(outcome(&[row(OpStatus::Unchanged)]).exit_code(), 0);
        assert_eq!(outcome(&[row(OpStatus::Failed)]).exit_code(), 1);
        assert_eq!(
            outcome(&[row(OpStatus::RolledBack), row(OpStatus::Failed)]).exit_code(),
            3
        );
        assert_eq!(
            outcome(&[row(OpStatus::Succeeded), row(OpStatus::Blocked)]),
            Outcome::Partial
        );
    }

    #[test]
    fn kind_caps_default() {
        let options = ExecutorOptions::default();
        assert_eq!(options.kind_cap(Kind::Project), 1);
        assert_eq!(options.kind_cap(Kind::Cluster), 3);
        assert_eq!(options.kind_cap(Kind::DatabaseUser), 5);
    }
}
