use crate::config::{
    ENV_BASE_URL, ENV_CONFIG_FILE, ENV_MONGODB_PASSWORD, ENV_MONGODB_URI, ENV_MONGODB_USERNAME,
    ENV_ORG_ID, ENV_PRIV_KEY, ENV_PROJECT_ID, ENV_PUB_KEY,
};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub(crate) const PROJECT_ID: &str = "5f0000000000000000000001";

pub(crate) const PROJECT_MANIFEST: &str = r#"
apiVersion: matlas.mongodb.com/v1
kind: Project
metadata:
  name: p1
spec:
  name: p1
  organizationId: 5f00000000000000000000aa
"#;

const MANAGED_VARS: [&str; 9] = [
    ENV_PUB_KEY,
    ENV_PRIV_KEY,
    ENV_PROJECT_ID,
    ENV_ORG_ID,
    ENV_CONFIG_FILE,
    ENV_MONGODB_URI,
    ENV_MONGODB_USERNAME,
    ENV_MONGODB_PASSWORD,
    ENV_BASE_URL,
];

pub(crate) fn project_json() -> Value {
    json!({
        "id": PROJECT_ID,
        "name": "p1",
        "orgId": "5f00000000000000000000aa",
        "clusterCount": 0
    })
}

pub(crate) fn write_manifest(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("manifest.yaml");
    std::fs::write(&path, content).unwrap();
    path
}

pub(crate) fn write_config(dir: &Path, base_url: &str) -> PathBuf {
    let path = dir.join("config.yaml");
    std::fs::write(
        &path,
        format!("publicKey: pub\nprivateKey: priv\nbaseUrl: {base_url}\n"),
    )
    .unwrap();
    path
}

/// clears every variable the cli reads and restores them on drop.
pub(crate) struct EnvGuard {
    saved: Vec<(&'static str, Option<String>)>,
}

impl EnvGuard {
    pub(crate) fn clear() -> Self {
        let saved = MANAGED_VARS
            .iter()
            .map(|key| (*key, std::env::var(key).ok()))
            .collect();
        for key in MANAGED_VARS {
            std::env::remove_var(key);
        }
        Self { saved }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.saved {
            match value {
                Some(value) => std::env::set_var(key, value),
                None => std::env::remove_var(key),
            }
        }
    }
}

pub(crate) fn env_lock() -> &'static tokio::sync::Mutex<()> {
    static LOCK: OnceLock<tokio::sync::Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| tokio::sync::Mutex::new(()))
}
