mod api;
mod blacklist;
mod config;
mod error;
mod hash;
mod mdns;
mod netinfo;
mod resource;
mod store;

use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use mdns_sd::ServiceDaemon;
use anyhow::{Context, Result};
use shared::types::{ResourceType, SrvInfo};
use crate::blacklist::BlacklistStore;
use crate::config::Config;
use crate::mdns::advertise::ServiceGroupStore;
use crate::netinfo::{HostInfoProvider, NetFilter, SystemInterfaces};
use crate::resource::application::ApplicationStore;
use crate::resource::serial::SerialDevices;
use crate::resource::{ResourceHandler, ResourceRegistry};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("host_managerd=info"))
        )
        .init();

    tracing::info!("Starting host-managerd {}", env!("CARGO_PKG_VERSION"));

    // Load config
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/host-manager/host-managerd.toml".to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    tracing::info!("Loaded config from {}", config_path);

    // Blacklists
    let interface_blacklist = Arc::new(
        BlacklistStore::new(&config.blacklist.net_interface_list_path)?
            .with_validator(blacklist::validate_interface_name),
    );
    interface_blacklist.init()?;
    let range_blacklist = Arc::new(
        BlacklistStore::new(&config.blacklist.net_range_list_path)?
            .with_validator(blacklist::validate_cidr),
    );
    range_blacklist.init()?;

    let host_info = HostInfoProvider::new(NetFilter::new(
        config.blacklist.net_interface_list.clone(),
        config.blacklist.net_range_list.clone(),
        interface_blacklist.clone(),
        range_blacklist.clone(),
        Box::new(SystemInterfaces),
    ));

    // Applications, migrating the legacy list format if found
    let applications = Arc::new(ApplicationStore::new(&config.applications_path)?);
    applications.init()?;

    let service_groups = ServiceGroupStore::new(&config.avahi_services_path)?;
    service_groups.init()?;

    let mut handlers: HashMap<ResourceType, Arc<dyn ResourceHandler>> = HashMap::new();
    handlers.insert(
        ResourceType::SerialDevice,
        Arc::new(SerialDevices::new(&config.serial_device_path)),
    );
    handlers.insert(ResourceType::Application, applications.clone());
    let registry = ResourceRegistry::new(handlers);

    tracing::info!("Registered resource handlers: {:?}", registry.handlers());

    // mDNS daemon used for discovery queries
    let mdns_daemon = ServiceDaemon::new()
        .context("Failed to create mDNS daemon")?;

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    let app_state = api::routes::AppState {
        srv_info: Arc::new(SrvInfo {
            name: shared::protocol::SERVICE_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            up_since: chrono::Utc::now(),
        }),
        host_info: Arc::new(host_info),
        registry: Arc::new(registry),
        applications,
        interface_blacklist,
        range_blacklist,
        service_groups: Arc::new(service_groups),
        daemon: mdns_daemon.clone(),
        shutdown: cancel.clone(),
    };
    let app = api::routes::router(app_state);

    // Bind the API socket
    let listener = api::listener::bind(&config.socket).await?;

    tracing::info!("API listening on {}", config.socket.path.display());

    // Run server with graceful shutdown
    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");

    // Trigger cancellation; in-flight requests observe their child tokens
    cancel.cancel();

    if let Err(e) = server_handle.await {
        tracing::error!("Server task failed: {}", e);
    }

    if let Err(e) = std::fs::remove_file(&config.socket.path) {
        tracing::warn!("Failed to remove socket {}: {}", config.socket.path.display(), e);
    }

    // Shutdown mDNS daemon
    if let Err(e) = mdns_daemon.shutdown() {
        tracing::error!("Failed to shutdown mDNS daemon: {}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
