use std::path::{Path, PathBuf};
use serde::Deserialize;
use anyhow::{Context, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub socket: SocketConfig,
    #[serde(default)]
    pub blacklist: BlacklistConfig,
    #[serde(default = "default_serial_device_path")]
    pub serial_device_path: PathBuf,
    #[serde(default = "default_applications_path")]
    pub applications_path: PathBuf,
    #[serde(default = "default_avahi_services_path")]
    pub avahi_services_path: PathBuf,
}

/// Unix socket the API is served on.
#[derive(Debug, Clone, Deserialize)]
pub struct SocketConfig {
    #[serde(default = "default_socket_path")]
    pub path: PathBuf,
    /// Group owning the socket file; unchanged when unset
    #[serde(default)]
    pub group_id: Option<u32>,
    #[serde(default = "default_socket_file_mode")]
    pub file_mode: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlacklistConfig {
    /// Static interface name patterns, applied in addition to the stored list
    #[serde(default)]
    pub net_interface_list: Vec<String>,
    /// Static CIDR ranges, applied in addition to the stored list
    #[serde(default)]
    pub net_range_list: Vec<String>,
    #[serde(default = "default_net_interface_list_path")]
    pub net_interface_list_path: PathBuf,
    #[serde(default = "default_net_range_list_path")]
    pub net_range_list_path: PathBuf,
}

fn default_serial_device_path() -> PathBuf {
    PathBuf::from("/dev/serial/by-id")
}

fn default_applications_path() -> PathBuf {
    PathBuf::from("/var/lib/host-manager/applications.json")
}

fn default_avahi_services_path() -> PathBuf {
    PathBuf::from("/etc/avahi/services")
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/run/host-manager/h_manager.sock")
}

fn default_socket_file_mode() -> u32 {
    0o660
}

fn default_net_interface_list_path() -> PathBuf {
    PathBuf::from("/var/lib/host-manager/net_interface_blacklist.json")
}

fn default_net_range_list_path() -> PathBuf {
    PathBuf::from("/var/lib/host-manager/net_range_blacklist.json")
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            path: default_socket_path(),
            group_id: None,
            file_mode: default_socket_file_mode(),
        }
    }
}

impl Default for BlacklistConfig {
    fn default() -> Self {
        Self {
            net_interface_list: Vec::new(),
            net_range_list: Vec::new(),
            net_interface_list_path: default_net_interface_list_path(),
            net_range_list_path: default_net_range_list_path(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.socket.path, PathBuf::from("/run/host-manager/h_manager.sock"));
        assert_eq!(config.socket.group_id, None);
        assert_eq!(config.socket.file_mode, 0o660);
        assert_eq!(config.serial_device_path, PathBuf::from("/dev/serial/by-id"));
        assert_eq!(config.avahi_services_path, PathBuf::from("/etc/avahi/services"));
        assert!(config.blacklist.net_interface_list.is_empty());
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host-managerd.toml");
        std::fs::write(
            &path,
            r#"
applications_path = "/data/apps.json"

[socket]
path = "/tmp/hm.sock"
group_id = 1000
file_mode = 0o600

[blacklist]
net_interface_list = ["docker", "veth"]
net_range_list = ["172.16.0.0/12"]
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.socket.path, PathBuf::from("/tmp/hm.sock"));
        assert_eq!(config.socket.group_id, Some(1000));
        assert_eq!(config.socket.file_mode, 0o600);
        assert_eq!(config.applications_path, PathBuf::from("/data/apps.json"));
        assert_eq!(config.blacklist.net_interface_list, vec!["docker", "veth"]);
        assert_eq!(config.blacklist.net_range_list, vec!["172.16.0.0/12"]);
        assert_eq!(
            config.blacklist.net_range_list_path,
            PathBuf::from("/var/lib/host-manager/net_range_blacklist.json")
        );
    }

    #[test]
    fn test_missing_file() {
        assert!(Config::load("/nonexistent/host-managerd.toml").is_err());
    }
}
