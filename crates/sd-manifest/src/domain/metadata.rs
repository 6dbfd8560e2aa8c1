//! # Domain Metadata
//!
//! A domain's metadata is a flat map of string keys to scalar values. It is
//! persisted as `KEY=VALUE` lines (a file on file domains, `MDT_` VG tags on
//! block domains) closed by a checksum line over everything before it.

use super::errors::ManifestError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

pub const DMDK_SDUUID: &str = "SDUUID";
pub const DMDK_VERSION: &str = "VERSION";
pub const DMDK_TYPE: &str = "TYPE";
pub const DMDK_CLASS: &str = "CLASS";
pub const DMDK_DESCRIPTION: &str = "DESCRIPTION";
pub const DMDK_ROLE: &str = "ROLE";
pub const DMDK_POOLS: &str = "POOL_UUID";
pub const DMDK_LOCK_POLICY: &str = "LOCKPOLICY";
pub const DMDK_LEASE_RETRIES: &str = "LEASERETRIES";

/// Block domains only.
pub const DMDK_VGUUID: &str = "VGUUID";
pub const DMDK_LOGBLKSIZE: &str = "LOGBLKSIZE";
pub const DMDK_PHYBLKSIZE: &str = "PHYBLKSIZE";

/// Key of the trailing checksum line.
pub const CHECKSUM_KEY: &str = "_SHA_CKSUM";

/// A scalar metadata value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// Integer value (versions, block sizes, retry counts).
    Int(i64),
    /// Anything else, stored verbatim.
    Text(String),
}

impl MetadataValue {
    /// Parse a raw persisted value.
    ///
    /// Only canonical decimal integers (as `Display` writes them) become
    /// `Int`, so `"007"` or `"+5"` stay text. The persisted form carries no
    /// type, hence `Text("512")` reads back as `Int(512)`.
    pub fn parse(raw: &str) -> Self {
        match raw.parse::<i64>() {
            Ok(v) if v.to_string() == raw => MetadataValue::Int(v),
            _ => MetadataValue::Text(raw.to_string()),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            MetadataValue::Int(v) => Some(*v),
            MetadataValue::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(v) => Some(v),
            MetadataValue::Int(_) => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Int(v) => write!(f, "{}", v),
            MetadataValue::Text(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        MetadataValue::Int(v)
    }
}

impl From<i32> for MetadataValue {
    fn from(v: i32) -> Self {
        MetadataValue::Int(i64::from(v))
    }
}

impl From<u32> for MetadataValue {
    fn from(v: u32) -> Self {
        MetadataValue::Int(i64::from(v))
    }
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        MetadataValue::Text(v.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        MetadataValue::Text(v)
    }
}

/// Domain metadata map, ordered by key so the persisted form is stable.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainMetadata {
    entries: BTreeMap<String, MetadataValue>,
}

impl DomainMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.entries.get(key)
    }

    /// Look up a key, failing with `MetadataKeyNotFound` when absent.
    pub fn require(&self, key: &str) -> Result<&MetadataValue, ManifestError> {
        self.entries
            .get(key)
            .ok_or_else(|| ManifestError::MetadataKeyNotFound(key.to_string()))
    }

    /// Integer value of an optional key.
    ///
    /// `Ok(None)` when absent, an error when present but not an integer.
    pub fn get_int(&self, key: &str) -> Result<Option<i64>, ManifestError> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(MetadataValue::Int(v)) => Ok(Some(*v)),
            Some(MetadataValue::Text(v)) => Err(ManifestError::InvalidMetadata(format!(
                "{} is not an integer: {:?}",
                key, v
            ))),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<MetadataValue>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Builder-style `set`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<MetadataValue> {
        self.entries.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetadataValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Check that every entry survives the line format.
    ///
    /// Keys must be non-empty, free of `=` and line breaks, and not the
    /// checksum key. Values must be free of line breaks.
    pub fn validate(&self) -> Result<(), ManifestError> {
        for (key, value) in &self.entries {
            if key.is_empty() || key.contains(['=', '\n', '\r']) || key == CHECKSUM_KEY {
                return Err(ManifestError::InvalidMetadata(format!(
                    "invalid metadata key {:?}",
                    key
                )));
            }
            if let MetadataValue::Text(text) = value {
                if text.contains(['\n', '\r']) {
                    return Err(ManifestError::InvalidMetadata(format!(
                        "{} value contains a line break: {:?}",
                        key, text
                    )));
                }
            }
        }
        Ok(())
    }

    /// Persisted form: sorted `KEY=VALUE` lines plus the checksum line.
    pub fn to_lines(&self) -> Result<Vec<String>, ManifestError> {
        self.validate()?;
        let mut lines: Vec<String> = self
            .entries
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        let checksum = checksum(lines.iter().map(String::as_str));
        lines.push(format!("{}={}", CHECKSUM_KEY, checksum));
        Ok(lines)
    }

    /// Parse the persisted form.
    ///
    /// Lines are taken verbatim apart from a trailing `\r`, so whitespace
    /// around values is preserved. Blank lines are skipped. A checksum line,
    /// when present, must match; metadata written without one is accepted.
    pub fn from_lines<I, S>(lines: I) -> Result<Self, ManifestError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut entries = BTreeMap::new();
        // Raw lines in key order, which is the order `to_lines` hashes them in.
        let mut payload = BTreeMap::new();
        let mut stored_checksum = None;

        for line in lines {
            let line = line.as_ref();
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.trim().is_empty() {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| {
                ManifestError::InvalidMetadata(format!("line without '=': {:?}", line))
            })?;
            if key == CHECKSUM_KEY {
                stored_checksum = Some(value.to_string());
                continue;
            }
            payload.insert(key.to_string(), line.to_string());
            entries.insert(key.to_string(), MetadataValue::parse(value));
        }

        if let Some(stored) = stored_checksum {
            let computed = checksum(payload.values().map(String::as_str));
            if stored != computed {
                return Err(ManifestError::MetadataChecksumMismatch { stored, computed });
            }
        }

        Ok(Self { entries })
    }

    /// Persisted form as VG tags, each line behind `prefix`.
    pub fn to_tags(&self, prefix: &str) -> Result<Vec<String>, ManifestError> {
        Ok(self
            .to_lines()?
            .into_iter()
            .map(|line| format!("{}{}", prefix, line))
            .collect())
    }

    /// Parse metadata out of VG tags, ignoring tags without `prefix`.
    pub fn from_tags<'a, I>(tags: I, prefix: &str) -> Result<Self, ManifestError>
    where
        I: IntoIterator<Item = &'a String>,
    {
        Self::from_lines(tags.into_iter().filter_map(|tag| tag.strip_prefix(prefix)))
    }
}

impl<K, V> FromIterator<(K, V)> for DomainMetadata
where
    K: Into<String>,
    V: Into<MetadataValue>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let entries = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self { entries }
    }
}

fn checksum<'a>(lines: impl Iterator<Item = &'a str>) -> String {
    let mut hasher = Sha256::new();
    for line in lines {
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}
