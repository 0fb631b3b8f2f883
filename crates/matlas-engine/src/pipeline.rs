use crate::discovery::{Discovery, DiscoveryOptions};
use crate::executor::{ApplyReport, Approver, Executor, ExecutorOptions};
use crate::loader::{load_files, DesiredState};
use crate::planner::{plan, PlanOptions};
use crate::state::ProjectState;
use crate::types::Plan;
use anyhow::{anyhow, Context, Result};
use matlas_core::Resource;
use std::collections::BTreeMap;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub(crate) struct LoadContext {
    desired: DesiredState,
}

impl LoadContext {
    pub(crate) fn from_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        Ok(Self {
            desired: load_files(paths)?,
        })
    }

    pub(crate) fn from_ref(desired: &DesiredState) -> Self {
        Self {
            desired: desired.clone(),
        }
    }

    /// read the live project the desired state targets.
    ///
    /// without an explicit id the project is looked up by name; a project
    /// that does not exist yet yields an empty live state. snapshots go
    /// through the discovery cache when one is attached.
    pub(crate) async fn observe(
        self,
        discovery: &Discovery,
        cancel: &CancellationToken,
        project_id: Option<&str>,
    ) -> Result<PlanContext> {
        let project_name = self.desired.project_name()?;
        let project_id = match project_id.filter(|id| !id.is_empty()) {
            Some(id) => Some(id.to_string()),
            None => discovery
                .control()
                .find_project(cancel, &project_name)
                .await
                .with_context(|| format!("look up project {project_name}"))?
                .and_then(|project| project.metadata.id),
        };

        let Some(project_id) = project_id else {
            info!(project = %project_name, "project does not exist yet");
            return Ok(PlanContext {
                desired: self.desired,
                live: None,
                project_ids: BTreeMap::new(),
            });
        };

        let live = discovery
            .discover_project(cancel, &project_id, &DiscoveryOptions::default())
            .await
            .with_context(|| format!("observe project {project_id}"))?
            .state;
        let live_name = live.project_name().unwrap_or_default().to_string();
        if live_name != project_name {
            return Err(anyhow!(
                "project {project_id} is named `{live_name}`, manifests target `{project_name}`"
            ));
        }

        let mut project_ids = BTreeMap::new();
        project_ids.insert(project_name, project_id);
        Ok(PlanContext {
            desired: self.desired,
            live: Some(live),
            project_ids,
        })
    }
}

pub(crate) struct PlanContext {
    desired: DesiredState,
    live: Option<ProjectState>,
    project_ids: BTreeMap<String, String>,
}

impl PlanContext {
    pub(crate) fn plan(self, options: &PlanOptions) -> Result<PlannedChange> {
        let live: Vec<Resource> = self
            .live
            .as_ref()
            .map(|state| state.resources().cloned().collect())
            .unwrap_or_default();
        let mut plan = plan(&self.desired.resources, &live, options)?;
        for warning in &self.desired.warnings {
            if !plan.warnings.contains(warning) {
                plan.warnings.push(warning.clone());
            }
        }
        for warning in &plan.warnings {
            warn!("{warning}");
        }
        Ok(PlannedChange {
            plan,
            live: self.live,
            project_ids: self.project_ids,
        })
    }
}

/// a plan together with the live snapshot it was computed against.
#[derive(Debug, Clone)]
pub struct PlannedChange {
    pub plan: Plan,
    pub live: Option<ProjectState>,
    /// project name to id for every project that already exists.
    pub project_ids: BTreeMap<String, String>,
}

pub(crate) struct ApplyContext<'a> {
    planned: &'a PlannedChange,
}

impl<'a> ApplyContext<'a> {
    pub(crate) fn new(planned: &'a PlannedChange) -> Self {
        Self { planned }
    }

    pub(crate) async fn apply(
        self,
        discovery: &Discovery,
        options: ExecutorOptions,
        cancel: &CancellationToken,
        approver: &dyn Approver,
    ) -> Result<ApplyReport> {
        let dry_run = options.dry_run;
        let report = Executor::new(discovery.control().clone(), options)
            .with_project_ids(self.planned.project_ids.clone())
            .execute(cancel, &self.planned.plan, approver)
            .await;
        if !dry_run {
            for project_id in self.planned.project_ids.values() {
                discovery.invalidate(project_id);
            }
        }
        report
    }
}
