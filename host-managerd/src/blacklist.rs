use std::path::{Path, PathBuf};
use anyhow::{bail, Result as AnyResult};
use ipnet::IpNet;
use parking_lot::RwLock;
use crate::error::{Error, Result};
use crate::store::json_file;

/// Validation hook applied to values before they are added.
pub type Validator = fn(&str) -> Result<()>;

/// A disk-backed set of blacklist values (interface name patterns or CIDR
/// ranges), stored as a JSON array of strings.
pub struct BlacklistStore {
    path: PathBuf,
    validator: Option<Validator>,
    values: RwLock<Vec<String>>,
}

impl BlacklistStore {
    pub fn new(path: impl AsRef<Path>) -> AnyResult<Self> {
        let path = path.as_ref();
        if !path.is_absolute() {
            bail!("path '{}' not absolute", path.display());
        }

        Ok(Self {
            path: path.to_path_buf(),
            validator: None,
            values: RwLock::new(Vec::new()),
        })
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Load the stored values. A missing file, or one holding `null` (an
    /// emptied list as written by older releases), leaves the list empty.
    pub fn init(&self) -> AnyResult<()> {
        let values: Vec<String> = json_file::read::<Option<Vec<String>>>(&self.path)?
            .flatten()
            .unwrap_or_default();
        tracing::debug!("Loaded {} blacklist values from {}", values.len(), self.path.display());
        *self.values.write() = values;
        Ok(())
    }

    pub fn list(&self) -> Vec<String> {
        self.values.read().clone()
    }

    pub fn add(&self, value: &str) -> Result<()> {
        if let Some(validate) = self.validator {
            validate(value)?;
        }

        let mut values = self.values.write();
        if values.iter().any(|v| v == value) {
            return Err(Error::invalid_input(format!("value '{}' already in list", value)));
        }

        let mut new_values = values.clone();
        new_values.push(value.to_string());
        json_file::write(&new_values, &self.path, true)?;

        *values = new_values;
        Ok(())
    }

    pub fn remove(&self, value: &str) -> Result<()> {
        let mut values = self.values.write();
        if !values.iter().any(|v| v == value) {
            return Err(Error::not_found(format!("value '{}' not in list", value)));
        }

        let new_values: Vec<String> = values.iter().filter(|v| *v != value).cloned().collect();
        json_file::write(&new_values, &self.path, true)?;

        *values = new_values;
        Ok(())
    }
}

pub fn validate_cidr(value: &str) -> Result<()> {
    value
        .parse::<IpNet>()
        .map(|_| ())
        .map_err(|e| Error::invalid_input(format!("invalid CIDR '{}': {}", value, e)))
}

/// Interface name patterns follow the kernel's naming limits (IFNAMSIZ).
pub fn validate_interface_name(value: &str) -> Result<()> {
    let valid = !value.is_empty()
        && value.len() < 16
        && !value.chars().any(|c| c.is_whitespace() || c == '/' || c == ':');
    if !valid {
        return Err(Error::invalid_input(format!("invalid interface name '{}'", value)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn store(dir: &tempfile::TempDir) -> BlacklistStore {
        BlacklistStore::new(dir.path().join("blacklist.json")).unwrap()
    }

    #[test]
    fn test_relative_path_rejected() {
        assert!(BlacklistStore::new("blacklist.json").is_err());
    }

    #[test]
    fn test_init() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blacklist.json");

        // File does not exist
        let s = BlacklistStore::new(&path).unwrap();
        s.init().unwrap();
        assert!(s.list().is_empty());

        fs::write(&path, r#"["a", "b"]"#).unwrap();
        let s = BlacklistStore::new(&path).unwrap();
        s.init().unwrap();
        assert_eq!(s.list(), vec!["a", "b"]);

        // Calling init again yields the same values
        s.init().unwrap();
        assert_eq!(s.list(), vec!["a", "b"]);

        // An emptied list may have been written as null
        fs::write(&path, "null\n").unwrap();
        let s = BlacklistStore::new(&path).unwrap();
        s.init().unwrap();
        assert!(s.list().is_empty());
        s.add("eth").unwrap();
        assert_eq!(s.list(), vec!["eth"]);

        // Empty file is corrupt
        fs::write(&path, "").unwrap();
        let s = BlacklistStore::new(&path).unwrap();
        assert!(s.init().is_err());
    }

    #[test]
    fn test_add() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(&dir);

        s.add("a").unwrap();
        assert_eq!(s.list(), vec!["a"]);

        let result = s.add("a");
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert_eq!(s.list(), vec!["a"]);

        // Persisted values survive a reload
        let reloaded = store(&dir);
        reloaded.init().unwrap();
        assert_eq!(reloaded.list(), vec!["a"]);
    }

    #[test]
    fn test_remove() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(&dir);

        let result = s.remove("a");
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert!(s.list().is_empty());

        s.add("a").unwrap();
        s.add("b").unwrap();
        s.remove("a").unwrap();
        assert_eq!(s.list(), vec!["b"]);

        let reloaded = store(&dir);
        reloaded.init().unwrap();
        assert_eq!(reloaded.list(), vec!["b"]);
    }

    #[test]
    fn test_validator() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(&dir).with_validator(validate_cidr);

        assert!(matches!(s.add("10.0.0.0/33"), Err(Error::InvalidInput(_))));
        assert!(matches!(s.add("eth0"), Err(Error::InvalidInput(_))));
        s.add("10.0.0.0/24").unwrap();
        s.add("fd00::/8").unwrap();
        assert_eq!(s.list().len(), 2);
    }

    #[test]
    fn test_interface_name_validation() {
        assert!(validate_interface_name("eth").is_ok());
        assert!(validate_interface_name("wlp3s0").is_ok());
        assert!(validate_interface_name("").is_err());
        assert!(validate_interface_name("eth 0").is_err());
        assert!(validate_interface_name("a-very-long-interface").is_err());
    }

    #[test]
    fn test_failed_persist_keeps_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blacklist.json");
        let s = store(&dir);

        s.add("a").unwrap();
        fs::create_dir(json_file::sibling(&path, ".tmp")).unwrap();

        assert!(matches!(s.add("b"), Err(Error::Internal(_))));
        assert_eq!(s.list(), vec!["a"]);

        assert!(matches!(s.remove("a"), Err(Error::Internal(_))));
        assert_eq!(s.list(), vec!["a"]);

        let on_disk: Option<Vec<String>> = json_file::read(&path).unwrap();
        assert_eq!(on_disk, Some(vec!["a".to_string()]));
    }
}
