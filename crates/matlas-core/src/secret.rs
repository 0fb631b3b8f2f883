//! write-only values that must stay comparable without being revealed.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

/// sentinel written in place of a masked secret.
pub const MASKED_SENTINEL: &str = "***MASKED***";

const DIGEST_PREFIX: &str = "sha256:";

/// a write-only field (password, token, key).
///
/// `Plain` holds a user-supplied value, `Digest` keeps only its hash (used for
/// comparison output), `Masked` is "present but opaque" as discovered from
/// the remote API. A masked side never produces a difference.
#[derive(Clone)]
pub enum Secret {
    Plain { value: String, digest: String },
    Digest(String),
    Masked,
}

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        let digest = digest_hex(value.as_bytes());
        Secret::Plain { value, digest }
    }

    /// plaintext value when the caller supplied one.
    pub fn expose(&self) -> Option<&str> {
        match self {
            Secret::Plain { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn digest(&self) -> Option<&str> {
        match self {
            Secret::Plain { digest, .. } | Secret::Digest(digest) => Some(digest),
            Secret::Masked => None,
        }
    }

    pub fn is_masked(&self) -> bool {
        matches!(self, Secret::Masked)
    }

    /// the same secret with the plaintext dropped.
    pub fn redacted(&self) -> Secret {
        match self.digest() {
            Some(digest) => Secret::Digest(digest.to_string()),
            None => Secret::Masked,
        }
    }

    /// equality that treats a masked side as unknown-but-equal.
    pub fn matches(&self, other: &Secret) -> bool {
        match (self.digest(), other.digest()) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        match (self.digest(), other.digest()) {
            (Some(a), Some(b)) => a == b,
            (None, None) => true,
            _ => false,
        }
    }
}

impl Eq for Secret {}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Secret::Plain { .. } => f.write_str("Secret(<redacted>)"),
            Secret::Digest(digest) => write!(f, "Secret({DIGEST_PREFIX}{})", &digest[..8.min(digest.len())]),
            Secret::Masked => f.write_str("Secret(masked)"),
        }
    }
}

impl Serialize for Secret {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Secret::Plain { value, .. } => serializer.serialize_str(value),
            Secret::Digest(digest) => serializer.serialize_str(&format!("{DIGEST_PREFIX}{digest}")),
            Secret::Masked => serializer.serialize_str(MASKED_SENTINEL),
        }
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        if raw == MASKED_SENTINEL {
            return Ok(Secret::Masked);
        }
        if let Some(digest) = raw.strip_prefix(DIGEST_PREFIX) {
            if digest.len() == 64 && digest.chars().all(|c| c.is_ascii_hexdigit()) {
                return Ok(Secret::Digest(digest.to_ascii_lowercase()));
            }
        }
        Ok(Secret::new(raw))
    }
}

/// lowercase hex sha-256 of the given bytes.
pub fn digest_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_never_prints_plaintext() {
        let secret = Secret::new("hunter2");
        assert!(!format!("{secret:?}").contains("hunter2"));
    }

    #[test]
    fn masked_matches_anything() {
        let plain = Secret::new("a");
        assert!(plain.matches(&Secret::Masked));
        assert!(Secret::Masked.matches(&plain));
        assert!(!plain.matches(&Secret::new("b")));
    }

    #[test]
    fn redacted_compares_equal_to_plain() {
        let plain = Secret::new("a");
        assert_eq!(plain.redacted(), plain);
        assert_eq!(plain.redacted().expose(), None);
    }

    #[test]
    fn sentinel_deserializes_to_masked() {
        let secret: Secret = serde_json::from_value(serde_json::json!(MASKED_SENTINEL)).unwrap();
        assert!(secret.is_masked());
        let value = serde_json::to_value(Secret::new("x").redacted()).unwrap();
        let back: Secret = serde_json::from_value(value).unwrap();
        assert_eq!(back, Secret::new("x"));
    }
}
