//! command dispatch for the matlas binary.

use crate::config::{GlobalFlags, Settings};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use clap::{Args, Parser, Subcommand};
use dialoguer::Confirm;
use matlas_adapter_atlas::AtlasControlPlane;
use matlas_adapter_mongodb::MongoInspector;
use matlas_engine::{
    apply_plan, build_plan_for, load_files, render_apply_report, render_diff, render_plan,
    render_state, summary_line, to_yaml, Approver, Category, ControlPlane, DesiredState,
    Discovery, DiscoveryCache, DiscoveryOptions, ExecutorOptions, OutputFormat, Plan, PlanMode, PlanOptions,
    PlannedChange,
};
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[cfg(test)]
mod test_support;

pub(crate) const EXIT_OK: i32 = 0;
pub(crate) const EXIT_DRIFT: i32 = 2;
pub(crate) const EXIT_PARTIAL: i32 = 3;

/// deadline for discovery and planning commands.
const READ_DEADLINE: Duration = Duration::from_secs(10 * 60);
/// deadline for apply and destroy.
const WRITE_DEADLINE: Duration = Duration::from_secs(30 * 60);

/// top-level cli definition.
#[derive(Parser)]
#[command(name = "matlas")]
#[command(about = "Declarative discover, plan and apply for MongoDB Atlas projects")]
pub(crate) struct Cli {
    /// table, json or yaml.
    #[arg(long, global = true)]
    output: Option<String>,
    /// overall deadline, e.g. `90s` or `15m`.
    #[arg(long, global = true, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,
    #[arg(short, long, global = true, default_value_t = false)]
    pub(crate) verbose: bool,
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

/// cli subcommands.
#[derive(Subcommand)]
enum Command {
    /// snapshot a live project.
    Discover(DiscoverArgs),
    /// manifest driven workflow.
    Infra {
        #[command(subcommand)]
        command: InfraCommand,
    },
}

#[derive(Args)]
struct DiscoverArgs {
    #[arg(long)]
    project_id: Option<String>,
    #[arg(long, default_value_t = false)]
    include_databases: bool,
    #[arg(long, default_value_t = false)]
    mask_secrets: bool,
    #[arg(long, default_value_t = false)]
    convert_to_apply: bool,
    #[arg(long, value_delimiter = ',')]
    include: Vec<String>,
    #[arg(long, value_delimiter = ',')]
    exclude: Vec<String>,
    #[arg(long, default_value_t = false)]
    use_temp_user: bool,
    /// write the snapshot to a file instead of stdout.
    #[arg(short = 'o', long = "out")]
    out: Option<PathBuf>,
}

/// infra subcommands.
#[derive(Subcommand)]
enum InfraCommand {
    Validate {
        #[arg(short = 'f', long = "file", required = true)]
        files: Vec<PathBuf>,
    },
    Plan {
        #[arg(short = 'f', long = "file", required = true)]
        files: Vec<PathBuf>,
        #[arg(long)]
        project_id: Option<String>,
        #[arg(long, default_value_t = false)]
        prune: bool,
        #[arg(long, default_value_t = false)]
        allow_destructive: bool,
    },
    Diff {
        #[arg(short = 'f', long = "file", required = true)]
        files: Vec<PathBuf>,
        #[arg(long)]
        project_id: Option<String>,
    },
    Apply {
        #[arg(short = 'f', long = "file", required = true)]
        files: Vec<PathBuf>,
        #[arg(long)]
        project_id: Option<String>,
        #[arg(long, default_value_t = false)]
        dry_run: bool,
        #[arg(long, default_value_t = false)]
        auto_approve: bool,
        #[arg(long, default_value_t = false)]
        preserve_existing: bool,
        #[arg(long, default_value_t = false)]
        prune: bool,
        #[arg(long, default_value_t = false)]
        allow_destructive: bool,
        #[arg(long)]
        max_concurrency: Option<usize>,
    },
    Destroy {
        #[arg(short = 'f', long = "file", required = true)]
        files: Vec<PathBuf>,
        #[arg(long)]
        project_id: Option<String>,
        #[arg(long, default_value_t = false)]
        rollback_on_error: bool,
        #[arg(long, default_value_t = false)]
        auto_approve: bool,
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    Show {
        #[arg(long)]
        project_id: Option<String>,
    },
}

/// run one command and return its exit code.
pub(crate) async fn run(cli: Cli) -> Result<i32> {
    let flags = GlobalFlags {
        output: cli.output,
        timeout: cli.timeout,
        config: cli.config,
    };
    let settings = Settings::load(&flags)?;
    export_interpolation_defaults(&settings);

    let root = CancellationToken::new();
    watch_interrupt(root.clone());
    let cache = Arc::new(DiscoveryCache::default());

    match cli.command {
        Command::Discover(args) => discover(&settings, &root, &cache, args).await,
        Command::Infra { command } => infra(&settings, &root, &cache, command).await,
    }
}

async fn infra(
    settings: &Settings,
    root: &CancellationToken,
    cache: &Arc<DiscoveryCache>,
    command: InfraCommand,
) -> Result<i32> {
    match command {
        InfraCommand::Validate { files } => {
            let desired = load(&files)?;
            println!(
                "ok: {} resources in {} files",
                desired.resources.len(),
                desired.sources.len()
            );
            Ok(EXIT_OK)
        }
        InfraCommand::Plan {
            files,
            project_id,
            prune,
            allow_destructive,
        } => {
            let options = PlanOptions {
                mode: PlanMode::Reconcile { prune },
                allow_destructive,
                ..PlanOptions::default()
            };
            let discovery = connect(settings, cache)?;
            let cancel = deadline(root, settings.timeout.unwrap_or(READ_DEADLINE));
            let planned = plan_files(settings, &discovery, &cancel, &files, project_id, &options).await?;
            emit(&render_plan(&planned.plan, settings.output)?);
            Ok(drift_code(&planned.plan))
        }
        InfraCommand::Diff { files, project_id } => {
            let discovery = connect(settings, cache)?;
            let cancel = deadline(root, settings.timeout.unwrap_or(READ_DEADLINE));
            let planned = plan_files(
                settings,
                &discovery,
                &cancel,
                &files,
                project_id,
                &PlanOptions::default(),
            )
            .await?;
            emit(&render_diff(&planned.plan, settings.output)?);
            Ok(drift_code(&planned.plan))
        }
        InfraCommand::Apply {
            files,
            project_id,
            dry_run,
            auto_approve,
            preserve_existing,
            prune,
            allow_destructive,
            max_concurrency,
        } => {
            let options = PlanOptions {
                mode: PlanMode::Reconcile { prune },
                preserve_existing,
                allow_destructive,
            };
            let mut executor = ExecutorOptions {
                dry_run,
                auto_approve,
                ..ExecutorOptions::default()
            };
            if let Some(limit) = max_concurrency {
                if limit == 0 {
                    bail!("--max-concurrency must be at least 1");
                }
                executor.max_concurrency = limit;
            }
            execute(settings, root, cache, &files, project_id, &options, executor).await
        }
        InfraCommand::Destroy {
            files,
            project_id,
            rollback_on_error,
            auto_approve,
            dry_run,
        } => {
            let options = PlanOptions {
                mode: PlanMode::Destroy,
                ..PlanOptions::default()
            };
            let executor = ExecutorOptions {
                dry_run,
                auto_approve,
                rollback_on_error,
                ..ExecutorOptions::default()
            };
            execute(settings, root, cache, &files, project_id, &options, executor).await
        }
        InfraCommand::Show { project_id } => {
            let project_id = require_project(settings, project_id)?;
            let cancel = deadline(root, settings.timeout.unwrap_or(READ_DEADLINE));
            let outcome = connect(settings, cache)?
                .discover_project(&cancel, &project_id, &DiscoveryOptions::default())
                .await
                .with_context(|| format!("show project {project_id}"))?;
            emit(&render_state(
                &outcome.state,
                Some(&outcome.stats),
                settings.output,
            )?);
            Ok(EXIT_OK)
        }
    }
}

async fn discover(
    settings: &Settings,
    root: &CancellationToken,
    cache: &Arc<DiscoveryCache>,
    args: DiscoverArgs,
) -> Result<i32> {
    let project_id = require_project(settings, args.project_id)?;
    let options = DiscoveryOptions {
        include: categories(&args.include)?,
        exclude: categories(&args.exclude)?,
        include_databases: args.include_databases,
        mask_secrets: args.mask_secrets,
        enumeration: settings.enumeration(args.use_temp_user),
    };
    let mut discovery = connect(settings, cache)?;
    if args.include_databases {
        discovery = discovery.with_inspector(Arc::new(MongoInspector::default()));
    }

    let cancel = deadline(root, settings.timeout.unwrap_or(READ_DEADLINE));
    let outcome = discovery
        .discover_project(&cancel, &project_id, &options)
        .await
        .with_context(|| format!("discover project {project_id}"))?;
    info!(
        project_id = %project_id,
        resources = outcome.stats.resources_found,
        duration_ms = outcome.stats.duration_ms,
        "discovery finished"
    );

    let rendered = if args.convert_to_apply {
        let document = outcome.state.to_apply_document();
        match settings.output {
            OutputFormat::Json => serde_json::to_string_pretty(&document)?,
            _ => to_yaml(&document)?,
        }
    } else if args.out.is_some() && settings.output == OutputFormat::Table {
        render_state(&outcome.state, None, OutputFormat::Yaml)?
    } else {
        render_state(&outcome.state, Some(&outcome.stats), settings.output)?
    };

    match &args.out {
        Some(path) => {
            fs::write(path, &rendered)
                .with_context(|| format!("write snapshot: {}", path.display()))?;
            eprintln!("snapshot written to {}", path.display());
        }
        None => emit(&rendered),
    }

    if let Some(err) = &outcome.enumeration_error {
        eprintln!("warning: {err}");
        return Ok(EXIT_PARTIAL);
    }
    Ok(EXIT_OK)
}

/// plan, confirm and execute.
async fn execute(
    settings: &Settings,
    root: &CancellationToken,
    cache: &Arc<DiscoveryCache>,
    files: &[PathBuf],
    project_id: Option<String>,
    options: &PlanOptions,
    executor: ExecutorOptions,
) -> Result<i32> {
    let discovery = connect(settings, cache)?;
    let cancel = deadline(root, settings.timeout.unwrap_or(WRITE_DEADLINE));
    let planned = plan_files(settings, &discovery, &cancel, files, project_id, options).await?;
    if settings.output == OutputFormat::Table {
        emit(&render_plan(&planned.plan, settings.output)?);
    }
    let report = apply_plan(&discovery, &planned, executor, &cancel, &PromptApprover).await?;
    emit(&render_apply_report(&report, settings.output)?);
    Ok(report.outcome.exit_code())
}

async fn plan_files(
    settings: &Settings,
    discovery: &Discovery,
    cancel: &CancellationToken,
    files: &[PathBuf],
    project_id: Option<String>,
    options: &PlanOptions,
) -> Result<PlannedChange> {
    let desired = load(files)?;
    let project_id = settings.project_id(project_id);
    debug!(project_id = ?project_id, resources = desired.resources.len(), "planning");
    build_plan_for(discovery, cancel, &desired, project_id.as_deref(), options).await
}

/// load manifests and surface validation warnings.
fn load(files: &[PathBuf]) -> Result<DesiredState> {
    let desired = load_files(files)?;
    for warning in &desired.warnings {
        eprintln!("warning: {warning}");
    }
    Ok(desired)
}

/// admin api reads and writes, sharing the invocation's snapshot cache.
fn connect(settings: &Settings, cache: &Arc<DiscoveryCache>) -> Result<Discovery> {
    let control: Arc<dyn ControlPlane> = Arc::new(AtlasControlPlane::new(settings.atlas_config())?);
    Ok(Discovery::new(control).with_cache(cache.clone()))
}

fn require_project(settings: &Settings, flag: Option<String>) -> Result<String> {
    settings
        .project_id(flag)
        .ok_or_else(|| anyhow!("missing --project-id or PROJECT_ID"))
}

fn categories(raw: &[String]) -> Result<BTreeSet<Category>> {
    raw.iter()
        .filter(|value| !value.trim().is_empty())
        .map(|value| value.parse::<Category>().map_err(|err| anyhow!(err)))
        .collect()
}

fn drift_code(plan: &Plan) -> i32 {
    if plan.is_noop() {
        EXIT_OK
    } else {
        EXIT_DRIFT
    }
}

fn emit(rendered: &str) {
    println!("{}", rendered.trim_end());
}

/// make file-only project and org ids visible to `${VAR}` manifest
/// interpolation without overriding the environment.
fn export_interpolation_defaults(settings: &Settings) {
    for (key, value) in settings.interpolation_defaults() {
        if std::env::var_os(key).is_none() {
            std::env::set_var(key, value);
        }
    }
}

/// child token cancelled once `limit` elapses.
fn deadline(root: &CancellationToken, limit: Duration) -> CancellationToken {
    let token = root.child_token();
    let timer = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(limit) => {
                debug!(limit_secs = limit.as_secs(), "deadline reached");
                timer.cancel();
            }
            _ = timer.cancelled() => {}
        }
    });
    token
}

/// cancel `root` on ctrl-c so in-flight work drains.
fn watch_interrupt(root: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("interrupted; cancelling");
            root.cancel();
        }
    });
}

/// interactive confirmation before any change is made.
struct PromptApprover;

#[async_trait]
impl Approver for PromptApprover {
    async fn approve(&self, plan: &Plan) -> Result<bool> {
        let prompt = format!("apply {}?", summary_line(&plan.summary));
        tokio::task::spawn_blocking(move || {
            Confirm::new()
                .with_prompt(prompt)
                .default(false)
                .interact()
                .context("confirmation prompt failed; pass --auto-approve when not attached to a terminal")
        })
        .await
        .context("confirmation prompt task")?
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{
        env_lock, project_json, write_config, write_manifest, EnvGuard, PROJECT_ID,
        PROJECT_MANIFEST,
    };
    use super::*;
    use crate::config::FileConfig;
    use httpmock::prelude::*;
    use tempfile::tempdir;

    const CLUSTER_MANIFEST: &str = r#"
---
kind: Cluster
metadata:
  name: c1
spec:
  provider: AWS
  region: US_EAST_1
  tier: M10
"#;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("matlas").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn parses_global_flags_after_subcommands() {
        let parsed = cli(&[
            "infra", "plan", "-f", "a.yaml", "-f", "b.yaml", "--output", "json", "--timeout",
            "90s", "--prune",
        ]);
        assert_eq!(parsed.output.as_deref(), Some("json"));
        assert_eq!(parsed.timeout, Some(Duration::from_secs(90)));
        match parsed.command {
            Command::Infra {
                command: InfraCommand::Plan { files, prune, .. },
            } => {
                assert_eq!(files.len(), 2);
                assert!(prune);
            }
            _ => panic!("expected infra plan"),
        }
    }

    #[test]
    fn discover_accepts_category_lists() {
        let parsed = cli(&[
            "discover",
            "--project-id",
            "p",
            "--include",
            "clusters,users",
            "--exclude",
            "alerts",
            "-o",
            "out.yaml",
        ]);
        let Command::Discover(args) = parsed.command else {
            panic!("expected discover");
        };
        let include = categories(&args.include).unwrap();
        assert!(include.contains(&Category::Clusters));
        assert!(include.contains(&Category::Users));
        assert_eq!(categories(&args.exclude).unwrap().len(), 1);
        assert_eq!(args.out, Some(PathBuf::from("out.yaml")));
    }

    #[test]
    fn unknown_category_is_an_error() {
        let err = categories(&["widgets".to_string()]).unwrap_err();
        assert!(err.to_string().contains("widgets"));
    }

    #[test]
    fn manifests_are_required() {
        assert!(Cli::try_parse_from(["matlas", "infra", "plan"]).is_err());
    }

    #[tokio::test]
    async fn deadline_cancels_child_only() {
        let root = CancellationToken::new();
        let child = deadline(&root, Duration::from_millis(10));
        child.cancelled().await;
        assert!(!root.is_cancelled());
    }

    #[tokio::test]
    async fn validate_reports_ok() {
        let _guard = env_lock().lock().await;
        let dir = tempdir().unwrap();
        let manifest = write_manifest(dir.path(), PROJECT_MANIFEST);
        let config = write_config(dir.path(), "http://127.0.0.1:1");
        let _env = EnvGuard::clear();

        let code = run(cli(&[
            "--config",
            config.to_str().unwrap(),
            "infra",
            "validate",
            "-f",
            manifest.to_str().unwrap(),
        ]))
        .await
        .unwrap();
        assert_eq!(code, EXIT_OK);
    }

    #[tokio::test]
    async fn validate_rejects_invalid_manifest() {
        let _guard = env_lock().lock().await;
        let dir = tempdir().unwrap();
        let manifest = write_manifest(
            dir.path(),
            "kind: Cluster\nmetadata:\n  name: c1\nspec:\n  provider: AWS\n  region: US_EAST_1\n  tier: ''\n",
        );
        let config = write_config(dir.path(), "http://127.0.0.1:1");
        let _env = EnvGuard::clear();

        let result = run(cli(&[
            "--config",
            config.to_str().unwrap(),
            "infra",
            "validate",
            "-f",
            manifest.to_str().unwrap(),
        ]))
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn plan_for_new_project_reports_drift() {
        let _guard = env_lock().lock().await;
        let server = MockServer::start();
        let lookup = server.mock(|when, then| {
            when.method(GET).path("/api/atlas/v2/groups/byName/p1");
            then.status(404)
                .header("content-type", "application/json")
                .json_body(serde_json::json!({ "errorCode": "GROUP_NAME_NOT_FOUND" }));
        });
        let dir = tempdir().unwrap();
        let manifest = write_manifest(dir.path(), &format!("{PROJECT_MANIFEST}{CLUSTER_MANIFEST}"));
        let config = write_config(dir.path(), &server.base_url());
        let _env = EnvGuard::clear();

        let code = run(cli(&[
            "--config",
            config.to_str().unwrap(),
            "--output",
            "json",
            "infra",
            "plan",
            "-f",
            manifest.to_str().unwrap(),
        ]))
        .await
        .unwrap();
        assert_eq!(code, EXIT_DRIFT);
        lookup.assert();
    }

    #[tokio::test]
    async fn converged_project_has_no_drift() {
        let _guard = env_lock().lock().await;
        let server = MockServer::start();
        let project = server.mock(|when, then| {
            when.method(GET).path(format!("/api/atlas/v2/groups/{PROJECT_ID}"));
            then.status(200)
                .header("content-type", "application/json")
                .json_body(project_json());
        });
        let dir = tempdir().unwrap();
        let manifest = write_manifest(dir.path(), PROJECT_MANIFEST);
        let config = write_config(dir.path(), &server.base_url());
        let _env = EnvGuard::clear();

        let code = run(cli(&[
            "--config",
            config.to_str().unwrap(),
            "infra",
            "diff",
            "-f",
            manifest.to_str().unwrap(),
            "--project-id",
            PROJECT_ID,
        ]))
        .await
        .unwrap();
        assert_eq!(code, EXIT_OK);
        assert!(project.hits() >= 1);
    }

    #[tokio::test]
    async fn dry_run_apply_sends_no_writes() {
        let _guard = env_lock().lock().await;
        let server = MockServer::start();
        let writes = server.mock(|when, then| {
            when.method(POST);
            then.status(201);
        });
        let dir = tempdir().unwrap();
        let manifest = write_manifest(dir.path(), &format!("{PROJECT_MANIFEST}{CLUSTER_MANIFEST}"));
        let config = write_config(dir.path(), &server.base_url());
        let _env = EnvGuard::clear();

        let code = run(cli(&[
            "--config",
            config.to_str().unwrap(),
            "infra",
            "apply",
            "-f",
            manifest.to_str().unwrap(),
            "--dry-run",
        ]))
        .await
        .unwrap();
        assert_eq!(code, EXIT_OK);
        writes.assert_hits(0);
    }

    #[tokio::test]
    async fn discover_writes_apply_document() {
        let _guard = env_lock().lock().await;
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path(format!("/api/atlas/v2/groups/{PROJECT_ID}"));
            then.status(200)
                .header("content-type", "application/json")
                .json_body(project_json());
        });
        let dir = tempdir().unwrap();
        let config = write_config(dir.path(), &server.base_url());
        let out = dir.path().join("snapshot.yaml");
        let _env = EnvGuard::clear();

        let code = run(cli(&[
            "--config",
            config.to_str().unwrap(),
            "discover",
            "--project-id",
            PROJECT_ID,
            "--convert-to-apply",
            "-o",
            out.to_str().unwrap(),
        ]))
        .await
        .unwrap();
        assert_eq!(code, EXIT_OK);

        let written = fs::read_to_string(&out).unwrap();
        assert!(written.contains("kind: ApplyDocument"));
        let reloaded = load_files(&[out]).unwrap();
        assert_eq!(reloaded.project_name().unwrap(), "p1");
    }

    #[tokio::test]
    async fn show_requires_a_project_id() {
        let _guard = env_lock().lock().await;
        let dir = tempdir().unwrap();
        let config = write_config(dir.path(), "http://127.0.0.1:1");
        let _env = EnvGuard::clear();

        let err = run(cli(&["--config", config.to_str().unwrap(), "infra", "show"]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("--project-id"));
    }

    #[tokio::test]
    async fn show_then_diff_reuse_one_snapshot() {
        let server = MockServer::start();
        let project = server.mock(|when, then| {
            when.method(GET).path(format!("/api/atlas/v2/groups/{PROJECT_ID}"));
            then.status(200)
                .header("content-type", "application/json")
                .json_body(project_json());
        });
        let dir = tempdir().unwrap();
        let manifest = write_manifest(dir.path(), PROJECT_MANIFEST);
        let file = FileConfig {
            public_key: Some("pub".to_string()),
            private_key: Some("priv".to_string()),
            base_url: Some(server.base_url()),
            ..FileConfig::default()
        };
        let settings = Settings::resolve(&GlobalFlags::default(), |_: &str| None, file).unwrap();
        let root = CancellationToken::new();
        let cache = Arc::new(DiscoveryCache::default());

        let show = InfraCommand::Show {
            project_id: Some(PROJECT_ID.to_string()),
        };
        assert_eq!(infra(&settings, &root, &cache, show).await.unwrap(), EXIT_OK);
        let diff = InfraCommand::Diff {
            files: vec![manifest],
            project_id: Some(PROJECT_ID.to_string()),
        };
        assert_eq!(infra(&settings, &root, &cache, diff).await.unwrap(), EXIT_OK);

        project.assert_hits(1);
        assert_eq!(cache.stats().hits, 1);
    }
}
