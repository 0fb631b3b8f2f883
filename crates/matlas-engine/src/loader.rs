//! manifest loading: single resources, apply documents and discovered projects.

use crate::state::DiscoveredProjectDocument;
use anyhow::{anyhow, Context, Result};
use matlas_core::{
    validate_resources, ApplyDocument, Kind, Metadata, Resource, ResourceSpec, API_VERSION,
};
use regex::Regex;
use serde::de::IgnoredAny;
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

/// typed desired state assembled from one or more manifest files.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DesiredState {
    pub resources: Vec<Resource>,
    pub warnings: Vec<String>,
    pub sources: Vec<PathBuf>,
}

impl DesiredState {
    /// distinct project names referenced by the resources.
    pub fn project_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .resources
            .iter()
            .map(|resource| resource.project_name().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// the single project this desired state targets.
    pub fn project_name(&self) -> Result<String> {
        let names = self.project_names();
        match names.as_slice() {
            [name] => Ok(name.clone()),
            [] => Err(anyhow!("manifests do not name a project")),
            _ => Err(anyhow!(
                "manifests span several projects ({}); apply them separately",
                names.join(", ")
            )),
        }
    }
}

/// load and validate manifests from the given files.
pub fn load_files<P: AsRef<Path>>(paths: &[P]) -> Result<DesiredState> {
    let mut state = DesiredState::default();
    for path in paths {
        let path = path.as_ref();
        let content =
            fs::read_to_string(path).with_context(|| format!("read manifest: {}", path.display()))?;
        let resources = parse_manifests(&content, &path.display().to_string())?;
        state.resources.extend(resources);
        state.sources.push(path.to_path_buf());
    }
    finish(state)
}

/// load and validate manifests from a string.
pub fn load_str(content: &str, origin: &str) -> Result<DesiredState> {
    let resources = parse_manifests(content, origin)?;
    finish(DesiredState {
        resources,
        ..DesiredState::default()
    })
}

fn finish(mut state: DesiredState) -> Result<DesiredState> {
    default_project_names(&mut state.resources);
    let report = validate_resources(&state.resources);
    state.warnings.extend(report.warnings.iter().cloned());
    if let Some(err) = report.into_error() {
        return Err(err.into());
    }
    Ok(state)
}

/// resources without `projectName` inherit the single declared project.
fn default_project_names(resources: &mut [Resource]) {
    let projects: Vec<String> = resources
        .iter()
        .filter_map(|resource| match &resource.spec {
            ResourceSpec::Project(spec) => Some(spec.name.clone()),
            _ => None,
        })
        .collect();
    if let [project] = projects.as_slice() {
        for resource in resources.iter_mut() {
            resource.default_project_name(project);
        }
    }
}

/// parse every yaml document in `content` into resources.
pub fn parse_manifests(content: &str, origin: &str) -> Result<Vec<Resource>> {
    let mut resources = Vec::new();
    for (index, document) in serde_yaml::Deserializer::from_str(content).enumerate() {
        let location = format!("{origin}: documents[{index}]");
        let raw = serde_yaml::Value::deserialize(document)
            .with_context(|| format!("parse yaml: {location}"))?;
        if raw.is_null() {
            continue;
        }
        let raw = interpolate(raw).with_context(|| format!("interpolate: {location}"))?;
        let value: Value =
            serde_json::to_value(raw).with_context(|| format!("convert yaml: {location}"))?;
        resources.extend(decode_document(value, &location)?);
    }
    Ok(resources)
}

/// apply document envelope; entries stay raw so each decodes with its path.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ApplyEnvelope {
    #[serde(rename = "apiVersion", default)]
    _api_version: Option<IgnoredAny>,
    #[serde(rename = "kind")]
    _kind: IgnoredAny,
    metadata: Metadata,
    resources: Vec<Value>,
}

fn decode_document(value: Value, location: &str) -> Result<Vec<Resource>> {
    let kind = value
        .get("kind")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("{location}: missing kind"))?
        .to_string();
    check_api_version(&value, location)?;

    match kind.as_str() {
        ApplyDocument::KIND => {
            let envelope: ApplyEnvelope = serde_json::from_value(value)
                .with_context(|| format!("{location}: decode {kind}"))?;
            debug!(
                document = %envelope.metadata.name,
                resources = envelope.resources.len(),
                "expanding apply document"
            );
            envelope
                .resources
                .into_iter()
                .enumerate()
                .map(|(index, entry)| decode_resource(entry, &format!("{location}.resources[{index}]")))
                .collect()
        }
        DiscoveredProjectDocument::KIND => {
            let document: DiscoveredProjectDocument = serde_json::from_value(value)
                .with_context(|| format!("{location}: decode {kind}"))?;
            Ok(document.spec.resources().cloned().collect())
        }
        _ => Ok(vec![decode_resource(value, location)?]),
    }
}

fn decode_resource(value: Value, location: &str) -> Result<Resource> {
    let kind = value
        .get("kind")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("{location}: missing kind"))?;
    let parsed: Kind = kind
        .parse()
        .map_err(|err: String| anyhow!("{location}: {err}"))?;
    check_api_version(&value, location)?;
    serde_json::from_value(value).with_context(|| format!("{location}: decode {parsed}"))
}

fn check_api_version(value: &Value, location: &str) -> Result<()> {
    match value.get("apiVersion").and_then(Value::as_str) {
        Some(API_VERSION) | None => Ok(()),
        Some(other) => Err(anyhow!(
            "{location}: unsupported apiVersion `{other}` (expected {API_VERSION})"
        )),
    }
}

fn variable_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex"))
}

/// expand `${VAR}` references in string scalars from the environment.
fn interpolate(value: serde_yaml::Value) -> Result<serde_yaml::Value> {
    use serde_yaml::Value as Yaml;
    Ok(match value {
        Yaml::String(raw) => Yaml::String(expand(&raw)?),
        Yaml::Sequence(items) => Yaml::Sequence(
            items
                .into_iter()
                .map(interpolate)
                .collect::<Result<Vec<_>>>()?,
        ),
        Yaml::Mapping(map) => {
            let mut out = serde_yaml::Mapping::new();
            for (key, inner) in map {
                out.insert(key, interpolate(inner)?);
            }
            Yaml::Mapping(out)
        }
        other => other,
    })
}

fn expand(raw: &str) -> Result<String> {
    let mut missing = Vec::new();
    let expanded = variable_pattern().replace_all(raw, |caps: &regex::Captures<'_>| {
        match std::env::var(&caps[1]) {
            Ok(value) => value,
            Err(_) => {
                missing.push(caps[1].to_string());
                String::new()
            }
        }
    });
    if !missing.is_empty() {
        return Err(anyhow!(
            "environment variable(s) not set: {}",
            missing.join(", ")
        ));
    }
    Ok(expanded.into_owned())
}

/// serialize resources back into an apply document.
pub fn to_yaml(document: &ApplyDocument) -> Result<String> {
    serde_yaml::to_string(document).context("serialize apply document")
}
