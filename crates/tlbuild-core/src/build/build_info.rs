//! Persisted per-project build metadata.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::errors::Result;
use crate::fs::FileSystem;

/// Tool version recorded in every build info file
pub const BUILD_INFO_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Own (un-prepended) output of an `outFile` project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleInfo {
    pub code: String,
    #[serde(default)]
    pub declaration: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    pub version: String,

    /// Last time declaration content changed, in milliseconds since the epoch
    #[serde(default)]
    pub latest_changed_declaration_time: Option<u64>,

    /// blake3 hash of every declaration output
    #[serde(default)]
    pub declaration_hashes: BTreeMap<PathBuf, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle: Option<BundleInfo>,

    #[serde(default)]
    pub program: Value,
}

impl BuildInfo {
    pub fn new() -> Self {
        Self {
            version: BUILD_INFO_VERSION.to_string(),
            latest_changed_declaration_time: None,
            declaration_hashes: BTreeMap::new(),
            bundle: None,
            program: Value::Null,
        }
    }

    pub fn is_version_compatible(&self) -> bool {
        self.version == BUILD_INFO_VERSION
    }

    pub fn latest_changed_declaration(&self) -> Option<SystemTime> {
        self.latest_changed_declaration_time.map(from_millis)
    }
}

impl Default for BuildInfo {
    fn default() -> Self {
        Self::new()
    }
}

pub fn read_build_info(fs: &dyn FileSystem, path: &Path) -> Result<BuildInfo> {
    let text = fs.read_file(path)?;
    Ok(serde_json::from_str(&text)?)
}

pub fn write_build_info(fs: &dyn FileSystem, path: &Path, info: &BuildInfo) -> Result<()> {
    let json = serde_json::to_string_pretty(info)?;
    fs.write_file(path, &json, false)?;
    Ok(())
}

/// Compute blake3 hash of output text
pub fn hash_text(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

pub fn to_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub fn from_millis(millis: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(millis)
}
