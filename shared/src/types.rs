use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

/// Kind of host resource exposed through the resource registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceType {
    SerialDevice,
    Application,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SerialDevice => "serial-device",
            Self::Application => "application",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "serial-device" => Ok(Self::SerialDevice),
            "application" => Ok(Self::Application),
            other => Err(format!("unknown resource type '{}'", other)),
        }
    }
}

/// Projection of a host object as returned by a resource sub-handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceBase {
    pub name: String,
    pub tags: Option<BTreeSet<String>>,
    pub path: String,
}

/// A host resource addressed by its global id `<type>:<sub_id>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    pub name: String,
    pub tags: Option<BTreeSet<String>>,
    pub path: String,
}

impl Resource {
    pub fn new(id: String, resource_type: ResourceType, base: ResourceBase) -> Self {
        Self {
            id,
            resource_type,
            name: base.name,
            tags: base.tags,
            path: base.path,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceFilter {
    /// Restrict the listing to a single resource type
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<ResourceType>,
}

/// Query of a blacklist value removal (`?value=`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlacklistValueQuery {
    pub value: String,
}

/// Query of an mDNS discovery request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryQuery {
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub domain: String,
    /// Milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_window: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostApplicationBase {
    pub name: String,
    pub socket: String,
}

/// A registered host application, keyed by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostApplication {
    pub id: String,
    pub name: String,
    pub socket: String,
}

impl HostApplication {
    pub fn new(id: String, base: HostApplicationBase) -> Self {
        Self {
            id,
            name: base.name,
            socket: base.socket,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpVersion {
    #[default]
    Any,
    Ipv4,
    Ipv6,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TxtFormat {
    #[default]
    Text,
    BinaryHex,
    BinaryBase64,
}

impl IpVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Ipv4 => "ipv4",
            Self::Ipv6 => "ipv6",
        }
    }
}

impl FromStr for IpVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "any" => Ok(Self::Any),
            "ipv4" => Ok(Self::Ipv4),
            "ipv6" => Ok(Self::Ipv6),
            other => Err(format!("invalid ip version '{}'", other)),
        }
    }
}

impl TxtFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::BinaryHex => "binary-hex",
            Self::BinaryBase64 => "binary-base64",
        }
    }
}

impl FromStr for TxtFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "binary-hex" => Ok(Self::BinaryHex),
            "binary-base64" => Ok(Self::BinaryBase64),
            other => Err(format!("invalid value format '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxtRecord {
    pub value: String,
    #[serde(default)]
    pub format: TxtFormat,
}

/// A single mDNS service advertisement within a service group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    /// DNS-SD service type, e.g. "_http._tcp"
    #[serde(rename = "type")]
    pub service_type: String,

    #[serde(default)]
    pub subtypes: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_name: Option<String>,

    pub port: u16,

    #[serde(default)]
    pub ip_version: IpVersion,

    #[serde(default)]
    pub txt_records: Vec<TxtRecord>,
}

/// A named collection of mDNS service advertisements, persisted as one
/// service file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceGroup {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub replace_wildcards: bool,
    pub services: Vec<Service>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetInterface {
    pub name: String,
    pub ipv4_address: String,
    pub ipv4_netmask: String,
    pub ipv4_cidr: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostNet {
    pub hostname: String,
    pub interfaces: Vec<NetInterface>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInfo {
    pub network: HostNet,
}

/// A service found by an mDNS discovery query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MdnsEntry {
    /// Instance name without the service type suffix
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: String,
    pub subtypes: Vec<String>,
    pub domain: String,
    pub hostname: String,
    pub port: u16,
    pub ipv4_address: Option<String>,
    pub txt_records: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SrvInfo {
    pub name: String,
    pub version: String,
    pub up_since: DateTime<Utc>,
}
