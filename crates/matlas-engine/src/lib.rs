//! engine orchestration: load, discover, plan, apply.

mod cache;
mod diff;
mod discovery;
mod enumerate;
mod executor;
mod graph;
mod loader;
mod pipeline;
mod planner;
mod report;
mod state;
mod types;

#[cfg(test)]
mod tests;

use anyhow::Result;
use matlas_core::{validate_resources, Resource, ValidationReport};
use std::path::Path;
use tokio_util::sync::CancellationToken;

pub use cache::{CacheStats, DiscoveryCache, DEFAULT_MAX_ENTRIES, DEFAULT_TTL};
pub use diff::{diff_fields, patch, values_equal};
pub use discovery::{
    observe, Category, Discovery, DiscoveryOptions, DiscoveryOutcome, DiscoveryStats,
};
pub use enumerate::{
    cluster_target, inject_credentials, is_system_collection, is_system_database,
    ClusterFailure, Enumeration, EnumerationError, EnumerationOptions, Enumerator,
    TEMP_USER_PREFIX,
};
pub use executor::{
    ApplyReport, Approver, AutoApprove, Executor, ExecutorOptions, OpResult, OpStatus, Outcome,
};
pub use graph::{depends_on, link, sort};
pub use loader::{load_files, load_str, parse_manifests, to_yaml, DesiredState};
use pipeline::{ApplyContext, LoadContext};
pub use pipeline::PlannedChange;
pub use planner::{plan, summarize, PlanMode, PlanOptions};
pub use report::{
    render_apply_report, render_diff, render_plan, render_state, summary_line, OutputFormat,
};
pub use state::{DiscoveredProjectDocument, ProjectState};
pub use types::{
    ClusterTarget, ControlPlane, DatabaseInspector, FieldChange, Operation, PatchOp, Plan,
    Summary, Verb,
};

/// validate resources and return the report.
pub fn validate(resources: &[Resource]) -> ValidationReport {
    validate_resources(resources)
}

/// load manifests, observe the targeted project and plan against it.
pub async fn build_plan<P: AsRef<Path>>(
    discovery: &Discovery,
    cancel: &CancellationToken,
    paths: &[P],
    project_id: Option<&str>,
    options: &PlanOptions,
) -> Result<PlannedChange> {
    LoadContext::from_files(paths)?
        .observe(discovery, cancel, project_id)
        .await?
        .plan(options)
}

/// plan an already loaded desired state.
pub async fn build_plan_for(
    discovery: &Discovery,
    cancel: &CancellationToken,
    desired: &DesiredState,
    project_id: Option<&str>,
    options: &PlanOptions,
) -> Result<PlannedChange> {
    LoadContext::from_ref(desired)
        .observe(discovery, cancel, project_id)
        .await?
        .plan(options)
}

/// execute a plan produced by [`build_plan`]; cached snapshots of the
/// touched projects are dropped afterwards.
pub async fn apply_plan(
    discovery: &Discovery,
    planned: &PlannedChange,
    options: ExecutorOptions,
    cancel: &CancellationToken,
    approver: &dyn Approver,
) -> Result<ApplyReport> {
    ApplyContext::new(planned)
        .apply(discovery, options, cancel, approver)
        .await
}
