/// Service name reported in response headers and the info endpoint
pub const SERVICE_NAME: &str = "host-manager";

/// Response headers attached to every API response (lowercase, as http expects)
pub const HEADER_API_VERSION: &str = "x-api-version";
pub const HEADER_SERVICE_NAME: &str = "x-service-name";
pub const HEADER_REQUEST_ID: &str = "x-request-id";

/// API paths
pub const SRV_INFO_PATH: &str = "/info";
pub const HOST_INFO_PATH: &str = "/host-info";
pub const HOST_NET_PATH: &str = "/host-info/network";
pub const HOST_RESOURCES_PATH: &str = "/host-resources";
pub const HOST_APPS_PATH: &str = "/applications";
pub const NET_ITF_BLACKLIST_PATH: &str = "/blacklists/net-interfaces";
pub const NET_RNG_BLACKLIST_PATH: &str = "/blacklists/net-ranges";
pub const MDNS_ADV_PATH: &str = "/mdns-adv";
pub const MDNS_DISCOVERY_PATH: &str = "/discovery";

/// Separator between resource type and sub-id in a resource id
pub const RESOURCE_ID_SEPARATOR: char = ':';

/// Version reported in the `x-api-version` header
pub const API_VERSION: &str = "1";
