pub mod service_file;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use anyhow::{bail, Context, Result as AnyResult};
use parking_lot::RwLock;
use regex::Regex;
use tokio_util::sync::CancellationToken;
use shared::types::ServiceGroup;
use crate::error::{Error, Result};
use service_file::ServiceGroupDoc;

const EXTENSION: &str = "service";

static ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_-]+$").expect("valid id regex"));

/// mDNS advertisements persisted as avahi service files, one file per
/// service group (`<dir>/<id>.service`).
pub struct ServiceGroupStore {
    dir: PathBuf,
    groups: RwLock<HashMap<String, ServiceGroup>>,
}

impl ServiceGroupStore {
    pub fn new(dir: impl AsRef<Path>) -> AnyResult<Self> {
        let dir = dir.as_ref();
        if !dir.is_absolute() {
            bail!("path '{}' not absolute", dir.display());
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            groups: RwLock::new(HashMap::new()),
        })
    }

    /// Load every service file in the directory. Files that cannot be parsed
    /// are logged and skipped.
    pub fn init(&self) -> AnyResult<()> {
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read {}", self.dir.display()))?;

        let mut groups = HashMap::new();
        for entry in entries {
            let entry = entry.with_context(|| format!("Failed to read {}", self.dir.display()))?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                tracing::debug!("Ignoring {}", path.display());
                continue;
            }
            let Some(id) = path.file_stem().map(|s| s.to_string_lossy().to_string()) else {
                continue;
            };

            match service_file::read(&path).and_then(|doc| doc.into_group(id.clone())) {
                Ok(group) => {
                    groups.insert(id, group);
                }
                Err(e) => {
                    tracing::error!("Skipping service file: {:#}", e);
                }
            }
        }

        tracing::info!("Loaded {} service groups from {}", groups.len(), self.dir.display());
        *self.groups.write() = groups;
        Ok(())
    }

    pub fn list(&self, cancel: &CancellationToken) -> Result<Vec<ServiceGroup>> {
        let groups = self.groups.read();
        let mut list = Vec::with_capacity(groups.len());
        for group in groups.values() {
            if cancel.is_cancelled() {
                return Err(Error::cancelled());
            }
            list.push(group.clone());
        }
        Ok(list)
    }

    pub fn add(&self, group: ServiceGroup) -> Result<()> {
        if !ID_RE.is_match(&group.id) {
            return Err(Error::invalid_input(format!("invalid id format '{}'", group.id)));
        }

        let mut groups = self.groups.write();
        if groups.contains_key(&group.id) {
            return Err(Error::invalid_input(format!("id '{}' already exists", group.id)));
        }
        self.write_group(&mut groups, group)
    }

    pub fn get(&self, id: &str) -> Result<ServiceGroup> {
        self.groups
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("service group '{}' not found", id)))
    }

    pub fn update(&self, group: ServiceGroup) -> Result<()> {
        let mut groups = self.groups.write();
        if !groups.contains_key(&group.id) {
            return Err(Error::not_found(format!("service group '{}' not found", group.id)));
        }
        self.write_group(&mut groups, group)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        let mut groups = self.groups.write();
        if !groups.contains_key(id) {
            return Err(Error::not_found(format!("service group '{}' not found", id)));
        }

        let path = self.file_path(id);
        fs::remove_file(&path).with_context(|| format!("Failed to remove {}", path.display()))?;

        groups.remove(id);
        Ok(())
    }

    /// Validate, write the file, then commit to the in-memory map.
    fn write_group(&self, groups: &mut HashMap<String, ServiceGroup>, group: ServiceGroup) -> Result<()> {
        let doc = ServiceGroupDoc::new(&group)?;
        service_file::write(&doc, &self.file_path(&group.id))?;

        // Store what a reload would produce, with defaults applied
        groups.insert(group.id.clone(), doc.into_group(group.id)?);
        Ok(())
    }

    fn file_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", id, EXTENSION))
    }
}
