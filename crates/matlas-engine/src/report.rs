//! rendering for plans, diffs, apply reports and snapshots.

use crate::discovery::DiscoveryStats;
use crate::executor::{ApplyReport, OpStatus};
use crate::state::ProjectState;
use crate::types::{Operation, PatchOp, Plan, Summary, Verb};
use anyhow::{anyhow, Context, Result};
use console::style;
use matlas_core::API_VERSION;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt::{self, Write as _};
use std::str::FromStr;

/// output format selected by `--output`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Yaml,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "table" | "text" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "yaml" | "yml" => Ok(OutputFormat::Yaml),
            other => Err(anyhow!("unknown output format `{other}` (table, json, yaml)")),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputFormat::Table => "table",
            OutputFormat::Json => "json",
            OutputFormat::Yaml => "yaml",
        })
    }
}

/// `N create, N update, N delete`, with replacements when present.
pub fn summary_line(summary: &Summary) -> String {
    let mut line = format!(
        "{} create, {} update, {} delete",
        summary.creates, summary.updates, summary.deletes
    );
    if summary.replaces > 0 {
        let _ = write!(line, ", {} replace", summary.replaces);
    }
    let _ = write!(line, " ({} unchanged)", summary.noops);
    line
}

fn envelope(kind: &str, body: Value) -> Value {
    let mut document = json!({ "apiVersion": API_VERSION, "kind": kind });
    if let (Value::Object(target), Value::Object(fields)) = (&mut document, body) {
        target.extend(fields);
    }
    document
}

fn encode<T: Serialize>(value: &T, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => {
            let mut out = serde_json::to_string_pretty(value).context("encode json")?;
            out.push('\n');
            Ok(out)
        }
        OutputFormat::Yaml | OutputFormat::Table => {
            serde_yaml::to_string(value).context("encode yaml")
        }
    }
}

pub fn render_plan(plan: &Plan, format: OutputFormat) -> Result<String> {
    let plan = plan.redacted();
    if format != OutputFormat::Table {
        let body = serde_json::to_value(&plan).context("encode plan")?;
        return encode(&envelope("Plan", body), format);
    }

    let mut out = String::new();
    let _ = writeln!(out, "{}", style(format!("Plan: {}", summary_line(&plan.summary))).bold());
    for op in &plan.operations {
        let _ = write!(
            out,
            "  {} {:<20} {}",
            verb_marker(op),
            op.kind.as_str(),
            op.identity
        );
        if !op.changes.is_empty() {
            let fields: Vec<&str> = op.changes.iter().map(|change| change.field.as_str()).collect();
            let _ = write!(out, "  [{}]", fields.join(", "));
        }
        if let Some(note) = &op.note {
            let _ = write!(out, "  ({note})");
        }
        out.push('\n');
    }
    for warning in &plan.warnings {
        let _ = writeln!(out, "{} {warning}", style("warning:").yellow());
    }
    Ok(out)
}

fn verb_marker(op: &Operation) -> String {
    let marker = match (op.verb, op.replace) {
        (Verb::Create, true) | (Verb::Delete, true) => style("±").magenta(),
        (Verb::Create, false) => style("+").green(),
        (Verb::Update, _) => style("~").yellow(),
        (Verb::Delete, false) => style("-").red(),
        (Verb::NoOp, _) => style("=").dim(),
    };
    marker.to_string()
}

/// patch for any operation: updates carry theirs, creates add every
/// declared field and deletes remove every live one.
fn operation_patch(op: &Operation) -> Vec<PatchOp> {
    match op.verb {
        Verb::Update => op.patch.clone(),
        Verb::Create => top_level(op.to_state.as_ref().map(|r| r.canonical_spec()))
            .into_iter()
            .map(|(field, value)| PatchOp::Add {
                path: format!("/{field}"),
                value,
            })
            .collect(),
        Verb::Delete => top_level(op.from_state.as_ref().map(|r| r.canonical_spec()))
            .into_iter()
            .map(|(field, _)| PatchOp::Remove {
                path: format!("/{field}"),
            })
            .collect(),
        Verb::NoOp => Vec::new(),
    }
}

fn top_level(value: Option<Value>) -> Vec<(String, Value)> {
    match value {
        Some(Value::Object(map)) => map.into_iter().collect(),
        _ => Vec::new(),
    }
}

pub fn render_diff(plan: &Plan, format: OutputFormat) -> Result<String> {
    let plan = plan.redacted();
    let entries: Vec<Value> = plan
        .operations
        .iter()
        .filter(|op| op.verb.is_mutation())
        .map(|op| {
            json!({
                "id": op.id,
                "kind": op.kind,
                "name": op.name,
                "verb": op.verb,
                "replace": op.replace,
                "patch": operation_patch(op),
            })
        })
        .collect();
    if format != OutputFormat::Table {
        let body = json!({ "summary": plan.summary, "operations": entries });
        return encode(&envelope("Diff", body), format);
    }

    let mut out = String::new();
    if entries.is_empty() {
        let _ = writeln!(out, "No differences.");
        return Ok(out);
    }
    for op in plan.operations.iter().filter(|op| op.verb.is_mutation()) {
        let _ = writeln!(out, "{} {}", verb_marker(op), style(&op.identity).bold());
        for patch in operation_patch(op) {
            let line = match &patch {
                PatchOp::Add { path, value } => style(format!("    + {path}: {value}")).green(),
                PatchOp::Remove { path } => style(format!("    - {path}")).red(),
                PatchOp::Replace { path, value } => {
                    style(format!("    ~ {path}: {value}")).yellow()
                }
            };
            let _ = writeln!(out, "{line}");
        }
    }
    let _ = writeln!(out, "{}", summary_line(&plan.summary));
    Ok(out)
}

fn status_cell(status: OpStatus) -> String {
    let label = format!("{:<12}", status.as_str());
    let styled = match status {
        OpStatus::Succeeded => style(label).green(),
        OpStatus::Failed | OpStatus::Aborted => style(label).red(),
        OpStatus::Blocked | OpStatus::Skipped | OpStatus::RolledBack => style(label).yellow(),
        OpStatus::PlannedOnly | OpStatus::Pending | OpStatus::Running => style(label).cyan(),
        OpStatus::Unchanged => style(label).dim(),
    };
    styled.to_string()
}

pub fn render_apply_report(report: &ApplyReport, format: OutputFormat) -> Result<String> {
    if format != OutputFormat::Table {
        let body = serde_json::to_value(report).context("encode apply report")?;
        return encode(&envelope("ApplyReport", body), format);
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}",
        style(format!("{:<12} {:<20} {:<8} NAME", "STATUS", "KIND", "VERB")).bold()
    );
    for op in &report.operations {
        let _ = writeln!(
            out,
            "{} {:<20} {:<8} {}",
            status_cell(op.status),
            op.kind.as_str(),
            op.verb.as_str(),
            op.name
        );
        if let Some(error) = &op.error {
            let _ = writeln!(out, "    {}", style(error).red());
        }
        if let Some(hint) = &op.hint {
            let _ = writeln!(out, "    hint: {hint}");
        }
    }
    for error in &report.rollback_errors {
        let _ = writeln!(out, "{} {error}", style("rollback error:").red());
    }
    let _ = writeln!(
        out,
        "{} {:?} (exit {})",
        if report.dry_run { "Dry run:" } else { "Outcome:" },
        report.outcome,
        report.outcome.exit_code()
    );
    Ok(out)
}

/// render a discovered snapshot, optionally with discovery counters.
pub fn render_state(
    state: &ProjectState,
    stats: Option<&DiscoveryStats>,
    format: OutputFormat,
) -> Result<String> {
    if format != OutputFormat::Table {
        return encode(&state.to_document(), format);
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {} ({})",
        style("Project").bold(),
        state.project_name().unwrap_or("-"),
        state.project_id
    );
    for resource in state.resources() {
        let _ = writeln!(
            out,
            "  {:<20} {}",
            resource.kind().as_str(),
            resource.identity()
        );
    }
    for db in &state.databases {
        let _ = writeln!(
            out,
            "  {:<20} {}/{} ({} collections)",
            "Database",
            db.cluster_name,
            db.name,
            db.collections.len()
        );
    }
    if let Some(stats) = stats {
        let _ = writeln!(
            out,
            "{} resources, {} clusters, {} databases in {}ms{}",
            stats.resources_found,
            stats.clusters_found,
            stats.databases_found,
            stats.duration_ms,
            if stats.cache_hit { " (cached)" } else { "" }
        );
    }
    let _ = writeln!(out, "fingerprint: {}", state.fingerprint);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{OpResult, Outcome};
    use matlas_core::{Kind, ErrorKind};

    fn summary(creates: usize) -> Summary {
        Summary {
            creates,
            ..Summary::default()
        }
    }

    #[test]
    fn summary_line_counts() {
        assert_eq!(summary_line(&summary(1)), "1 create, 0 update, 0 delete (0 unchanged)");
    }

    #[test]
    fn json_plan_has_envelope() {
        let plan = Plan {
            operations: Vec::new(),
            summary: summary(0),
            warnings: Vec::new(),
        };
        let rendered = render_plan(&plan, OutputFormat::Json).unwrap();
        let value: Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value["apiVersion"], API_VERSION);
        assert_eq!(value["kind"], "Plan");
        assert_eq!(value["summary"]["creates"], 0);
    }

    #[test]
    fn apply_report_shows_hint() {
        let report = ApplyReport {
            operations: vec![OpResult {
                id: "create/Cluster/p1/c1".to_string(),
                kind: Kind::Cluster,
                name: "c1".to_string(),
                verb: Verb::Create,
                status: OpStatus::Failed,
                started_at: None,
                finished_at: None,
                error: Some("Unauthorized: bad key".to_string()),
                error_kind: Some(ErrorKind::Unauthorized),
                hint: Some("check credentials (API_PUB_KEY / API_PRIV_KEY)".to_string()),
            }],
            outcome: Outcome::Failed,
            rollback_errors: Vec::new(),
            dry_run: false,
        };
        let table = render_apply_report(&report, OutputFormat::Table).unwrap();
        assert!(table.contains("hint: check credentials"));
        assert!(table.contains("exit 1"));
        let yaml = render_apply_report(&report, OutputFormat::Yaml).unwrap();
        assert!(yaml.contains("kind: ApplyReport"));
    }

    #[test]
    fn output_format_parses() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("xml".parse::<OutputFormat>().is_err());
    }
}
