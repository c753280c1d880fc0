use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::{HostError, Result};
use crate::exec::ToolCommand;

/// Device identifier (kernel name or filesystem label) → mount points.
///
/// A device that is present but not mounted has no entry.
pub type MountTable = HashMap<String, Vec<PathBuf>>;

/// Answers "where, if anywhere, is this device mounted right now".
#[async_trait]
pub trait DeviceResolver: Send + Sync {
    async fn list_mounts(&self) -> Result<MountTable>;
}

/// First mount point of `device_id`, if it is mounted at all.
pub fn first_mount<'a>(table: &'a MountTable, device_id: &str) -> Option<&'a Path> {
    table
        .get(device_id)
        .and_then(|mounts| mounts.first())
        .map(PathBuf::as_path)
}

/// [`DeviceResolver`] backed by `lsblk --json`.
pub struct Lsblk {
    program: String,
    timeout: Duration,
}

impl Lsblk {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait]
impl DeviceResolver for Lsblk {
    async fn list_mounts(&self) -> Result<MountTable> {
        let output = ToolCommand::new(&self.program, self.timeout)
            .args(["-J", "-o", "+LABEL"])
            .run()
            .await?
            .check(&self.program)?;
        let table = parse_lsblk(&output.stdout).map_err(|reason| HostError::Parse {
            program: self.program.clone(),
            reason,
        })?;
        debug!(devices = table.len(), "resolved mounted devices");
        Ok(table)
    }
}

#[derive(Debug, Deserialize)]
struct LsblkOutput {
    #[serde(default)]
    blockdevices: Vec<BlockDevice>,
}

#[derive(Debug, Deserialize)]
struct BlockDevice {
    name: Option<String>,
    label: Option<String>,
    /// util-linux ≥ 2.37
    #[serde(default)]
    mountpoints: Vec<Option<String>>,
    /// Older util-linux reports a single mount point.
    #[serde(default)]
    mountpoint: Option<String>,
    #[serde(default)]
    children: Vec<BlockDevice>,
}

impl BlockDevice {
    fn mounts(&self) -> Vec<PathBuf> {
        let mut mounts: Vec<PathBuf> = self
            .mountpoints
            .iter()
            .flatten()
            .map(PathBuf::from)
            .collect();
        if let Some(ref single) = self.mountpoint {
            let single = PathBuf::from(single);
            if !mounts.contains(&single) {
                mounts.push(single);
            }
        }
        mounts
    }

    fn collect_into(&self, table: &mut MountTable) {
        let mounts = self.mounts();
        if !mounts.is_empty() {
            for key in [&self.name, &self.label].into_iter().flatten() {
                table
                    .entry(key.clone())
                    .or_default()
                    .extend(mounts.iter().cloned());
            }
        }
        for child in &self.children {
            child.collect_into(table);
        }
    }
}

/// Build a [`MountTable`] from `lsblk -J -o +LABEL` output.
///
/// Walks the whole device tree; each mounted device is reachable both by its
/// kernel name and by its filesystem label.
pub fn parse_lsblk(json: &str) -> std::result::Result<MountTable, String> {
    let output: LsblkOutput = serde_json::from_str(json).map_err(|e| e.to_string())?;
    let mut table = MountTable::new();
    for device in &output.blockdevices {
        device.collect_into(&mut table);
    }
    Ok(table)
}
