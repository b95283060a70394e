use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddrV4, SocketAddrV6};
use anyhow::{Context, Result};
use nix::ifaddrs::getifaddrs;
use nix::net::if_::InterfaceFlags;
use nix::sys::socket::SockaddrStorage;
use super::{IfAddr, InterfaceSource, OsInterface};

/// Reads interface state from the OS via `getifaddrs`.
pub struct SystemInterfaces;

impl InterfaceSource for SystemInterfaces {
    fn interfaces(&self) -> Result<Vec<OsInterface>> {
        let addrs = getifaddrs().context("Failed to enumerate network interfaces")?;

        // getifaddrs yields one entry per address; group them by interface
        let mut interfaces: BTreeMap<String, OsInterface> = BTreeMap::new();
        for ifaddr in addrs {
            let itf = interfaces
                .entry(ifaddr.interface_name.clone())
                .or_insert_with(|| OsInterface {
                    name: ifaddr.interface_name.clone(),
                    up: ifaddr.flags.contains(InterfaceFlags::IFF_UP),
                    running: ifaddr.flags.contains(InterfaceFlags::IFF_RUNNING),
                    loopback: ifaddr.flags.contains(InterfaceFlags::IFF_LOOPBACK),
                    addrs: Vec::new(),
                });

            let Some(ip) = ifaddr.address.as_ref().and_then(to_ip) else {
                continue;
            };
            itf.addrs.push(IfAddr {
                ip,
                netmask: ifaddr.netmask.as_ref().and_then(to_ip),
            });
        }

        Ok(interfaces.into_values().collect())
    }
}

fn to_ip(addr: &SockaddrStorage) -> Option<IpAddr> {
    if let Some(sin) = addr.as_sockaddr_in() {
        return Some(IpAddr::V4(*SocketAddrV4::from(*sin).ip()));
    }
    if let Some(sin6) = addr.as_sockaddr_in6() {
        return Some(IpAddr::V6(*SocketAddrV6::from(*sin6).ip()));
    }
    None
}
