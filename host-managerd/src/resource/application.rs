use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use anyhow::{bail, Context, Result as AnyResult};
use parking_lot::RwLock;
use serde_json::error::Category;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use shared::types::{HostApplication, HostApplicationBase, ResourceBase};
use crate::error::{Error, Result};
use crate::hash::gen_hash;
use crate::store::json_file;
use super::ResourceHandler;

const MIGRATION_BACKUP_SUFFIX: &str = ".migration_bk";

/// Disk-backed registry of host applications, stored as a JSON object keyed
/// by application id.
pub struct ApplicationStore {
    path: PathBuf,
    apps: RwLock<HashMap<String, HostApplication>>,
}

impl ApplicationStore {
    pub fn new(path: impl AsRef<Path>) -> AnyResult<Self> {
        let path = path.as_ref();
        if !path.is_absolute() {
            bail!("path '{}' not absolute", path.display());
        }

        Ok(Self {
            path: path.to_path_buf(),
            apps: RwLock::new(HashMap::new()),
        })
    }

    /// Load the stored applications, migrating a legacy array-format file in
    /// place. A missing file leaves the store empty.
    pub fn init(&self) -> AnyResult<()> {
        let apps = match json_file::read::<HashMap<String, HostApplication>>(&self.path) {
            Ok(apps) => apps.unwrap_or_default(),
            Err(e) if is_type_mismatch(&e) => {
                tracing::info!("Migrating legacy application store {}", self.path.display());
                migrate(&self.path)?
            }
            Err(e) => return Err(e),
        };

        *self.apps.write() = apps;
        Ok(())
    }

    pub fn list(&self) -> Vec<HostApplication> {
        self.apps.read().values().cloned().collect()
    }

    pub fn add(&self, base: HostApplicationBase) -> Result<String> {
        let mut apps = self.apps.write();
        let id = Uuid::new_v4().to_string();
        apps.insert(id.clone(), HostApplication::new(id.clone(), base));

        if let Err(e) = json_file::write(&*apps, &self.path, true) {
            apps.remove(&id);
            return Err(e.into());
        }

        Ok(id)
    }

    pub fn remove(&self, id: &str) -> Result<()> {
        let mut apps = self.apps.write();
        if !apps.contains_key(id) {
            return Err(Error::not_found(format!("application '{}' does not exist", id)));
        }

        let new_apps: HashMap<String, HostApplication> = apps
            .iter()
            .filter(|(app_id, _)| app_id.as_str() != id)
            .map(|(app_id, app)| (app_id.clone(), app.clone()))
            .collect();
        json_file::write(&new_apps, &self.path, true)?;

        *apps = new_apps;
        Ok(())
    }
}

impl ResourceHandler for ApplicationStore {
    fn get(&self, cancel: &CancellationToken) -> Result<HashMap<String, ResourceBase>> {
        let apps = self.apps.read();
        let mut resources = HashMap::with_capacity(apps.len());
        for (id, app) in apps.iter() {
            if cancel.is_cancelled() {
                return Err(Error::cancelled());
            }
            resources.insert(
                id.clone(),
                ResourceBase {
                    name: app.name.clone(),
                    tags: None,
                    path: app.socket.clone(),
                },
            );
        }
        Ok(resources)
    }
}

/// The legacy format is a bare array, which fails map decoding with a data
/// (type) error rather than a syntax error.
fn is_type_mismatch(err: &anyhow::Error) -> bool {
    err.downcast_ref::<serde_json::Error>()
        .is_some_and(|e| e.classify() == Category::Data)
}

/// Converts a legacy `[{name, socket}]` file into the keyed format. Legacy
/// entries get ids derived from their socket path so the migration is
/// idempotent.
fn migrate(path: &Path) -> AnyResult<HashMap<String, HostApplication>> {
    let backup_path = json_file::sibling(path, MIGRATION_BACKUP_SUFFIX);
    json_file::copy(path, &backup_path)
        .with_context(|| format!("Failed to back up {}", path.display()))?;

    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let legacy: Vec<HostApplicationBase> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to decode legacy format of {}", path.display()))?;

    let apps: HashMap<String, HostApplication> = legacy
        .into_iter()
        .map(|base| {
            let id = gen_hash(&[&base.socket]);
            (id.clone(), HostApplication::new(id, base))
        })
        .collect();

    json_file::write(&apps, path, false)?;
    tracing::info!("Migrated {} applications in {}", apps.len(), path.display());

    Ok(apps)
}
