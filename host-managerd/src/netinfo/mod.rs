mod system;

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use anyhow::Context;
use ipnet::IpNet;
use tokio_util::sync::CancellationToken;
use shared::types::{HostInfo, HostNet, NetInterface};
use crate::blacklist::BlacklistStore;
use crate::error::{Error, Result};

pub use system::SystemInterfaces;

/// An interface as reported by the OS, before filtering.
#[derive(Debug, Clone)]
pub struct OsInterface {
    pub name: String,
    pub up: bool,
    pub running: bool,
    pub loopback: bool,
    pub addrs: Vec<IfAddr>,
}

#[derive(Debug, Clone)]
pub struct IfAddr {
    pub ip: IpAddr,
    pub netmask: Option<IpAddr>,
}

/// Source of live interface state.
pub trait InterfaceSource: Send + Sync {
    fn interfaces(&self) -> anyhow::Result<Vec<OsInterface>>;
}

/// Decides which interfaces are exposed, combining static configured
/// blacklists with the persisted blacklist stores.
pub struct NetFilter {
    interface_list: Vec<String>,
    range_list: Vec<String>,
    interface_blacklist: Arc<BlacklistStore>,
    range_blacklist: Arc<BlacklistStore>,
    source: Box<dyn InterfaceSource>,
}

impl NetFilter {
    pub fn new(
        interface_list: Vec<String>,
        range_list: Vec<String>,
        interface_blacklist: Arc<BlacklistStore>,
        range_blacklist: Arc<BlacklistStore>,
        source: Box<dyn InterfaceSource>,
    ) -> Self {
        Self {
            interface_list,
            range_list,
            interface_blacklist,
            range_blacklist,
            source,
        }
    }

    /// Up, running, non-loopback interfaces that survive both blacklists and
    /// have a resolvable IPv4 subnet. Order is not guaranteed.
    pub fn interfaces(&self, cancel: &CancellationToken) -> Result<Vec<NetInterface>> {
        let os_interfaces = self.source.interfaces()?;
        let subnets = subnet_map(&os_interfaces);

        let mut name_blacklist = self.interface_blacklist.list();
        name_blacklist.extend(self.interface_list.iter().cloned());

        let mut range_blacklist = parse_ranges(&self.range_blacklist.list())?;
        range_blacklist.extend(parse_ranges(&self.range_list)?);

        let mut interfaces = Vec::new();
        for itf in &os_interfaces {
            if cancel.is_cancelled() {
                return Err(Error::cancelled());
            }
            if name_blacklist.iter().any(|pattern| itf.name.contains(pattern.as_str())) {
                continue;
            }
            if !itf.up || !itf.running || itf.loopback {
                continue;
            }
            let Some(ip) = first_ipv4(itf) else {
                continue;
            };
            if range_blacklist.iter().any(|net| net.contains(&IpAddr::V4(ip))) {
                continue;
            }
            let Some(subnet) = subnets.get(&IpAddr::V4(ip)) else {
                tracing::debug!("No subnet for {} on {}", ip, itf.name);
                continue;
            };
            interfaces.push(NetInterface {
                name: itf.name.clone(),
                ipv4_address: ip.to_string(),
                ipv4_netmask: subnet.netmask().to_string(),
                ipv4_cidr: subnet.to_string(),
            });
        }

        Ok(interfaces)
    }
}

/// Composes the host name with the filtered interface list.
pub struct HostInfoProvider {
    filter: NetFilter,
}

impl HostInfoProvider {
    pub fn new(filter: NetFilter) -> Self {
        Self { filter }
    }

    pub fn get_net(&self, cancel: &CancellationToken) -> Result<HostNet> {
        let hostname = hostname::get()
            .context("Failed to get system hostname")?
            .to_string_lossy()
            .to_string();
        let interfaces = self.filter.interfaces(cancel)?;

        Ok(HostNet {
            hostname,
            interfaces,
        })
    }

    pub fn get_info(&self, cancel: &CancellationToken) -> Result<HostInfo> {
        Ok(HostInfo {
            network: self.get_net(cancel)?,
        })
    }
}

/// Maps every OS-reported address to its (truncated) subnet.
fn subnet_map(interfaces: &[OsInterface]) -> HashMap<IpAddr, IpNet> {
    interfaces
        .iter()
        .flat_map(|itf| itf.addrs.iter())
        .filter_map(|addr| {
            let net = IpNet::with_netmask(addr.ip, addr.netmask?).ok()?;
            Some((addr.ip, net.trunc()))
        })
        .collect()
}

fn first_ipv4(itf: &OsInterface) -> Option<Ipv4Addr> {
    itf.addrs.iter().find_map(|addr| match addr.ip {
        IpAddr::V4(ip) if !ip.is_loopback() => Some(ip),
        _ => None,
    })
}

fn parse_ranges(values: &[String]) -> Result<Vec<IpNet>> {
    values
        .iter()
        .map(|v| {
            v.parse::<IpNet>()
                .with_context(|| format!("Invalid network range '{}'", v))
                .map_err(Error::from)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::net::Ipv6Addr;

    struct FakeInterfaces(Vec<OsInterface>);

    impl InterfaceSource for FakeInterfaces {
        fn interfaces(&self) -> anyhow::Result<Vec<OsInterface>> {
            Ok(self.0.clone())
        }
    }

    fn itf(name: &str, ip: [u8; 4], prefix_mask: [u8; 4]) -> OsInterface {
        OsInterface {
            name: name.to_string(),
            up: true,
            running: true,
            loopback: false,
            addrs: vec![IfAddr {
                ip: IpAddr::V4(Ipv4Addr::from(ip)),
                netmask: Some(IpAddr::V4(Ipv4Addr::from(prefix_mask))),
            }],
        }
    }

    fn loopback() -> OsInterface {
        OsInterface {
            loopback: true,
            ..itf("lo", [127, 0, 0, 1], [255, 0, 0, 0])
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        interfaces: Arc<BlacklistStore>,
        ranges: Arc<BlacklistStore>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let interfaces = Arc::new(BlacklistStore::new(dir.path().join("itf.json")).unwrap());
        let ranges = Arc::new(BlacklistStore::new(dir.path().join("rng.json")).unwrap());
        Fixture {
            _dir: dir,
            interfaces,
            ranges,
        }
    }

    fn filter(fx: &Fixture, os: Vec<OsInterface>, static_itf: &[&str], static_rng: &[&str]) -> NetFilter {
        NetFilter::new(
            static_itf.iter().map(|s| s.to_string()).collect(),
            static_rng.iter().map(|s| s.to_string()).collect(),
            fx.interfaces.clone(),
            fx.ranges.clone(),
            Box::new(FakeInterfaces(os)),
        )
    }

    fn names(interfaces: &[NetInterface]) -> HashSet<String> {
        interfaces.iter().map(|i| i.name.clone()).collect()
    }

    #[test]
    fn test_interface_fields() {
        let fx = fixture();
        let f = filter(&fx, vec![itf("eth0", [10, 0, 0, 5], [255, 255, 255, 0]), loopback()], &[], &[]);

        let result = f.interfaces(&CancellationToken::new()).unwrap();
        assert_eq!(
            result,
            vec![NetInterface {
                name: "eth0".to_string(),
                ipv4_address: "10.0.0.5".to_string(),
                ipv4_netmask: "255.255.255.0".to_string(),
                ipv4_cidr: "10.0.0.0/24".to_string(),
            }]
        );
    }

    #[test]
    fn test_interface_blacklist_substring() {
        let fx = fixture();
        fx.interfaces.add("eth").unwrap();
        let f = filter(&fx, vec![itf("eth0", [10, 0, 0, 5], [255, 255, 255, 0]), loopback()], &[], &[]);

        let result = f.interfaces(&CancellationToken::new()).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_static_interface_list() {
        let fx = fixture();
        let os = vec![
            itf("docker0", [172, 17, 0, 1], [255, 255, 0, 0]),
            itf("wlan0", [192, 168, 1, 20], [255, 255, 255, 0]),
        ];
        let f = filter(&fx, os, &["docker"], &[]);

        let result = f.interfaces(&CancellationToken::new()).unwrap();
        assert_eq!(names(&result), HashSet::from(["wlan0".to_string()]));
    }

    #[test]
    fn test_range_blacklist() {
        let fx = fixture();
        fx.ranges.add("10.0.0.0/24").unwrap();
        let os = vec![
            itf("eth0", [10, 0, 0, 5], [255, 255, 255, 0]),
            itf("eth1", [192, 168, 1, 7], [255, 255, 255, 0]),
            loopback(),
        ];
        let f = filter(&fx, os, &[], &[]);

        let result = f.interfaces(&CancellationToken::new()).unwrap();
        assert_eq!(names(&result), HashSet::from(["eth1".to_string()]));
    }

    #[test]
    fn test_static_range_list() {
        let fx = fixture();
        let os = vec![
            itf("eth0", [10, 0, 0, 5], [255, 255, 255, 0]),
            itf("eth1", [192, 168, 1, 7], [255, 255, 255, 0]),
        ];
        let f = filter(&fx, os, &[], &["192.168.0.0/16"]);

        let result = f.interfaces(&CancellationToken::new()).unwrap();
        assert_eq!(names(&result), HashSet::from(["eth0".to_string()]));
    }

    #[test]
    fn test_invalid_range_fails_query() {
        let fx = fixture();
        let f = filter(&fx, vec![itf("eth0", [10, 0, 0, 5], [255, 255, 255, 0])], &[], &["not-a-cidr"]);

        let result = f.interfaces(&CancellationToken::new());
        assert!(matches!(result, Err(Error::Internal(_))));
    }

    #[test]
    fn test_down_and_addressless_interfaces_skipped() {
        let fx = fixture();
        let down = OsInterface {
            up: false,
            ..itf("eth0", [10, 0, 0, 5], [255, 255, 255, 0])
        };
        let not_running = OsInterface {
            running: false,
            ..itf("eth1", [10, 0, 1, 5], [255, 255, 255, 0])
        };
        let ipv6_only = OsInterface {
            name: "eth2".to_string(),
            up: true,
            running: true,
            loopback: false,
            addrs: vec![IfAddr {
                ip: IpAddr::V6(Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0, 0, 1)),
                netmask: None,
            }],
        };
        let no_subnet = OsInterface {
            name: "eth3".to_string(),
            up: true,
            running: true,
            loopback: false,
            addrs: vec![IfAddr {
                ip: IpAddr::V4(Ipv4Addr::new(10, 0, 3, 5)),
                netmask: None,
            }],
        };
        let f = filter(&fx, vec![down, not_running, ipv6_only, no_subnet], &[], &[]);

        let result = f.interfaces(&CancellationToken::new()).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_cancelled_query() {
        let fx = fixture();
        let f = filter(&fx, vec![itf("eth0", [10, 0, 0, 5], [255, 255, 255, 0])], &[], &[]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(matches!(f.interfaces(&cancel), Err(Error::Internal(_))));
    }

    #[test]
    fn test_get_net_reports_hostname() {
        let fx = fixture();
        let provider = HostInfoProvider::new(filter(&fx, vec![loopback()], &[], &[]));

        let info = provider.get_info(&CancellationToken::new()).unwrap();
        assert!(!info.network.hostname.is_empty());
        assert!(info.network.interfaces.is_empty());
    }
}
