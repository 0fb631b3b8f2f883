//! layered cli settings: flags, then environment, then `~/.matlas/config.yaml`.

use anyhow::{anyhow, Context, Result};
use matlas_adapter_atlas::{AtlasConfig, DEFAULT_BASE_URL};
use matlas_core::Secret;
use matlas_engine::{EnumerationOptions, OutputFormat};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_DIR_NAME: &str = ".matlas";
const CONFIG_FILE_NAME: &str = "config.yaml";

pub(crate) const ENV_PUB_KEY: &str = "API_PUB_KEY";
pub(crate) const ENV_PRIV_KEY: &str = "API_PRIV_KEY";
pub(crate) const ENV_PROJECT_ID: &str = "PROJECT_ID";
pub(crate) const ENV_ORG_ID: &str = "ORG_ID";
pub(crate) const ENV_CONFIG_FILE: &str = "CONFIG_FILE";
pub(crate) const ENV_MONGODB_URI: &str = "MONGODB_URI";
pub(crate) const ENV_MONGODB_USERNAME: &str = "MONGODB_USERNAME";
pub(crate) const ENV_MONGODB_PASSWORD: &str = "MONGODB_PASSWORD";
pub(crate) const ENV_BASE_URL: &str = "ATLAS_BASE_URL";

/// contents of the optional config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct FileConfig {
    pub(crate) output: Option<String>,
    pub(crate) timeout: Option<String>,
    pub(crate) public_key: Option<String>,
    pub(crate) private_key: Option<String>,
    pub(crate) project_id: Option<String>,
    pub(crate) org_id: Option<String>,
    pub(crate) base_url: Option<String>,
    pub(crate) mongodb_uri: Option<String>,
    pub(crate) mongodb_username: Option<String>,
    pub(crate) mongodb_password: Option<String>,
}

impl FileConfig {
    /// read `path`; a missing default file is an empty config.
    pub(crate) fn load(path: &Path, explicit: bool) -> Result<Self> {
        if !path.exists() {
            if explicit {
                return Err(anyhow!("config file not found: {}", path.display()));
            }
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config: {}", path.display()))?;
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&raw).with_context(|| format!("parse config: {}", path.display()))
    }
}

/// `~/.matlas/config.yaml`, when a home directory exists.
pub(crate) fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// global flags as parsed by clap.
#[derive(Debug, Clone, Default)]
pub(crate) struct GlobalFlags {
    pub(crate) output: Option<String>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) config: Option<PathBuf>,
}

/// fully resolved settings for one invocation.
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(crate) output: OutputFormat,
    pub(crate) timeout: Option<Duration>,
    pub(crate) public_key: Option<String>,
    pub(crate) private_key: Option<String>,
    pub(crate) project_id: Option<String>,
    pub(crate) org_id: Option<String>,
    pub(crate) base_url: String,
    pub(crate) mongodb_uri: Option<String>,
    pub(crate) mongodb_username: Option<String>,
    pub(crate) mongodb_password: Option<String>,
}

impl Settings {
    /// resolve from the real process environment and config file.
    pub(crate) fn load(flags: &GlobalFlags) -> Result<Self> {
        let env = |key: &str| std::env::var(key).ok().filter(|value| !value.is_empty());
        let (path, explicit) = match flags.config.clone().or_else(|| env(ENV_CONFIG_FILE).map(PathBuf::from)) {
            Some(path) => (Some(path), true),
            None => (default_config_path(), false),
        };
        let file = match path {
            Some(path) => FileConfig::load(&path, explicit)?,
            None => FileConfig::default(),
        };
        Self::resolve(flags, env, file)
    }

    /// merge the three layers; `env` returns `None` for unset keys.
    pub(crate) fn resolve(
        flags: &GlobalFlags,
        env: impl Fn(&str) -> Option<String>,
        file: FileConfig,
    ) -> Result<Self> {
        let output = match flags.output.clone().or(file.output) {
            Some(raw) => raw.parse()?,
            None => OutputFormat::default(),
        };
        let timeout = match flags.timeout {
            Some(timeout) => Some(timeout),
            None => file
                .timeout
                .map(|raw| {
                    humantime::parse_duration(&raw)
                        .with_context(|| format!("parse timeout `{raw}`"))
                })
                .transpose()?,
        };
        Ok(Self {
            output,
            timeout,
            public_key: env(ENV_PUB_KEY).or(file.public_key),
            private_key: env(ENV_PRIV_KEY).or(file.private_key),
            project_id: env(ENV_PROJECT_ID).or(file.project_id),
            org_id: env(ENV_ORG_ID).or(file.org_id),
            base_url: env(ENV_BASE_URL)
                .or(file.base_url)
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            mongodb_uri: env(ENV_MONGODB_URI).or(file.mongodb_uri),
            mongodb_username: env(ENV_MONGODB_USERNAME).or(file.mongodb_username),
            mongodb_password: env(ENV_MONGODB_PASSWORD).or(file.mongodb_password),
        })
    }

    /// admin api connection settings; missing keys surface as unauthorized
    /// from the client.
    pub(crate) fn atlas_config(&self) -> AtlasConfig {
        AtlasConfig::new(
            self.public_key.clone().unwrap_or_default(),
            Secret::new(self.private_key.clone().unwrap_or_default()),
        )
        .with_base_url(self.base_url.clone())
    }

    /// `--project-id` first, then the configured default.
    pub(crate) fn project_id(&self, flag: Option<String>) -> Option<String> {
        flag.filter(|id| !id.is_empty())
            .or_else(|| self.project_id.clone())
    }

    /// data-plane credentials for database enumeration.
    pub(crate) fn enumeration(&self, use_temp_user: bool) -> EnumerationOptions {
        EnumerationOptions {
            uri: self.mongodb_uri.clone().map(Secret::new),
            username: self.mongodb_username.clone(),
            password: self.mongodb_password.clone().map(Secret::new),
            use_temp_user,
            ..EnumerationOptions::default()
        }
    }

    /// variables manifests may interpolate, for values that only came from
    /// the config file.
    pub(crate) fn interpolation_defaults(&self) -> Vec<(&'static str, String)> {
        [
            (ENV_PROJECT_ID, self.project_id.as_ref()),
            (ENV_ORG_ID, self.org_id.as_ref()),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.map(|value| (key, value.clone())))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn flags_beat_env_and_env_beats_file() {
        let flags = GlobalFlags {
            output: Some("json".to_string()),
            timeout: Some(Duration::from_secs(30)),
            config: None,
        };
        let file = FileConfig {
            output: Some("yaml".to_string()),
            timeout: Some("5m".to_string()),
            public_key: Some("file-pub".to_string()),
            project_id: Some("file-project".to_string()),
            org_id: Some("file-org".to_string()),
            ..FileConfig::default()
        };
        let env = env_of(&[(ENV_PUB_KEY, "env-pub"), (ENV_PRIV_KEY, "env-priv")]);
        let settings = Settings::resolve(&flags, env, file).unwrap();

        assert_eq!(settings.output, OutputFormat::Json);
        assert_eq!(settings.timeout, Some(Duration::from_secs(30)));
        assert_eq!(settings.public_key.as_deref(), Some("env-pub"));
        assert_eq!(settings.private_key.as_deref(), Some("env-priv"));
        assert_eq!(settings.project_id.as_deref(), Some("file-project"));
        assert_eq!(settings.base_url, DEFAULT_BASE_URL);
        assert_eq!(
            settings.project_id(Some("flag-project".to_string())).as_deref(),
            Some("flag-project")
        );
    }

    #[test]
    fn file_values_fill_gaps() {
        let file = FileConfig {
            output: Some("yaml".to_string()),
            timeout: Some("90s".to_string()),
            base_url: Some("http://localhost:8080".to_string()),
            ..FileConfig::default()
        };
        let settings = Settings::resolve(&GlobalFlags::default(), env_of(&[]), file).unwrap();
        assert_eq!(settings.output, OutputFormat::Yaml);
        assert_eq!(settings.timeout, Some(Duration::from_secs(90)));
        assert_eq!(settings.base_url, "http://localhost:8080");
        assert!(settings.project_id(None).is_none());
    }

    #[test]
    fn bad_output_format_is_rejected() {
        let flags = GlobalFlags {
            output: Some("xml".to_string()),
            ..GlobalFlags::default()
        };
        let err = Settings::resolve(&flags, env_of(&[]), FileConfig::default()).unwrap_err();
        assert!(err.to_string().contains("xml"));
    }

    #[test]
    fn loads_camel_case_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "publicKey: abc\nprivateKey: def\nprojectId: p1\nmongodbUri: mongodb+srv://c0.example.net\n",
        )
        .unwrap();
        let file = FileConfig::load(&path, true).unwrap();
        assert_eq!(file.public_key.as_deref(), Some("abc"));
        assert_eq!(file.project_id.as_deref(), Some("p1"));

        let settings = Settings::resolve(&GlobalFlags::default(), env_of(&[]), file).unwrap();
        let enumeration = settings.enumeration(true);
        assert!(enumeration.use_temp_user);
        assert_eq!(
            enumeration.uri.as_ref().and_then(Secret::expose),
            Some("mongodb+srv://c0.example.net")
        );
    }

    #[test]
    fn missing_default_file_is_empty_but_explicit_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        assert!(FileConfig::load(&path, false).unwrap().public_key.is_none());
        assert!(FileConfig::load(&path, true).is_err());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "apiKey: nope\n").unwrap();
        assert!(FileConfig::load(&path, true).is_err());
    }
}
