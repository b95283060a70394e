use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use tokio_util::sync::CancellationToken;
use shared::types::MdnsEntry;
use crate::error::{Error, Result};

pub const DEFAULT_DOMAIN: &str = "local";

/// Browse `<service>.<domain>.` for the duration of `window` and return the
/// services resolved in that time.
pub async fn query(
    daemon: &ServiceDaemon,
    cancel: &CancellationToken,
    service: &str,
    domain: &str,
    window: Duration,
) -> Result<Vec<MdnsEntry>> {
    let service = service.trim_end_matches('.');
    if service.is_empty() {
        return Err(Error::invalid_input("missing service"));
    }
    let domain = match domain.trim_matches('.') {
        "" => DEFAULT_DOMAIN,
        d => d,
    };
    let service_type = format!("{}.{}.", service, domain);

    let receiver: flume::Receiver<ServiceEvent> = daemon
        .browse(&service_type)
        .map_err(|e| Error::invalid_input(format!("cannot browse '{}': {}", service_type, e)))?;

    tracing::debug!("Browsing {} for {:?}", service_type, window);

    let deadline = tokio::time::sleep(window);
    tokio::pin!(deadline);

    // Keyed by full name so re-resolutions replace earlier results
    let mut entries: HashMap<String, MdnsEntry> = HashMap::new();
    let mut cancelled = false;
    loop {
        tokio::select! {
            event = receiver.recv_async() => {
                match event {
                    Ok(ServiceEvent::ServiceResolved(info)) => {
                        entries.insert(info.get_fullname().to_string(), convert_service_info(&info, domain));
                    }
                    Ok(ServiceEvent::ServiceRemoved(_typ, fullname)) => {
                        entries.remove(&fullname);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("Browse receiver for {} disconnected: {}", service_type, e);
                        break;
                    }
                }
            }
            _ = &mut deadline => break,
            _ = cancel.cancelled() => {
                cancelled = true;
                break;
            }
        }
    }

    if let Err(e) = daemon.stop_browse(&service_type) {
        tracing::warn!("Failed to stop browsing {}: {}", service_type, e);
    }

    if cancelled {
        return Err(Error::cancelled());
    }
    Ok(entries.into_values().collect())
}

fn convert_service_info(info: &ServiceInfo, domain: &str) -> MdnsEntry {
    let service_type = info.get_type();
    let fullname = info.get_fullname();
    let name = fullname
        .strip_suffix(service_type)
        .map(|s| s.trim_end_matches('.'))
        .unwrap_or(fullname);

    let ipv4_address = info.get_addresses().iter().find_map(|addr| match addr {
        IpAddr::V4(ip) => Some(ip.to_string()),
        _ => None,
    });

    let txt_records = info
        .get_properties()
        .iter()
        .map(|prop| format!("{}={}", prop.key(), prop.val_str()))
        .collect();

    MdnsEntry {
        name: name.to_string(),
        service_type: strip_domain(service_type, domain).to_string(),
        subtypes: info.get_subtype().iter().cloned().collect(),
        domain: domain.to_string(),
        hostname: short_hostname(info.get_hostname()).to_string(),
        port: info.get_port(),
        ipv4_address,
        txt_records,
    }
}

/// `_http._tcp.local.` -> `_http._tcp`
fn strip_domain<'a>(service_type: &'a str, domain: &str) -> &'a str {
    let trimmed = service_type.trim_end_matches('.');
    trimmed
        .strip_suffix(domain)
        .map(|s| s.trim_end_matches('.'))
        .unwrap_or(trimmed)
}

/// `gateway.local.` -> `gateway`
fn short_hostname(hostname: &str) -> &str {
    hostname.split('.').next().unwrap_or(hostname)
}
