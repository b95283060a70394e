use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use anyhow::Context;
use tokio_util::sync::CancellationToken;
use shared::types::ResourceBase;
use crate::error::{Error, Result};
use crate::hash::gen_hash;
use super::ResourceHandler;

/// Enumerates serial devices from a device directory such as
/// `/dev/serial/by-id`. The directory only exists while devices are attached.
pub struct SerialDevices {
    path: PathBuf,
}

impl SerialDevices {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ResourceHandler for SerialDevices {
    fn get(&self, cancel: &CancellationToken) -> Result<HashMap<String, ResourceBase>> {
        let entries = match fs::read_dir(&self.path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read {}", self.path.display()))
                    .map_err(Error::from);
            }
        };

        let mut resources = HashMap::new();
        for entry in entries {
            if cancel.is_cancelled() {
                return Err(Error::cancelled());
            }
            let entry = entry.with_context(|| format!("Failed to read {}", self.path.display()))?;
            let file_type = entry.file_type().context("Failed to read file type")?;
            if file_type.is_dir() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().to_string();
            resources.insert(
                gen_hash(&[&name]),
                ResourceBase {
                    path: self.path.join(&name).to_string_lossy().to_string(),
                    name,
                    tags: None,
                },
            );
        }

        Ok(resources)
    }
}
