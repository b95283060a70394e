use std::path::{Path, PathBuf};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{CONTENT_TYPE, HOST};
use hyper::{Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::UnixStream;
use shared::protocol::*;
use shared::types::{
    BlacklistValueQuery, DiscoveryQuery, HostApplication, HostApplicationBase, HostInfo, HostNet,
    MdnsEntry, Resource, ResourceFilter, ServiceGroup, SrvInfo,
};
use crate::error::{Error, Result};

/// Characters escaped in an id used as a path segment
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// HTTP client of the host manager API, served on a local Unix socket.
///
/// Every call opens its own connection.
#[derive(Debug, Clone)]
pub struct Client {
    socket_path: PathBuf,
}

impl Client {
    pub fn new(socket_path: impl AsRef<Path>) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub async fn get_srv_info(&self) -> Result<SrvInfo> {
        self.get_json(SRV_INFO_PATH).await
    }

    pub async fn get_host_info(&self) -> Result<HostInfo> {
        self.get_json(HOST_INFO_PATH).await
    }

    pub async fn get_host_net(&self) -> Result<HostNet> {
        self.get_json(HOST_NET_PATH).await
    }

    pub async fn list_resources(&self, filter: &ResourceFilter) -> Result<Vec<Resource>> {
        self.get_json(&with_query(HOST_RESOURCES_PATH, filter)?).await
    }

    pub async fn get_resource(&self, id: &str) -> Result<Resource> {
        self.get_json(&item_path(HOST_RESOURCES_PATH, id)).await
    }

    pub async fn list_applications(&self) -> Result<Vec<HostApplication>> {
        self.get_json(HOST_APPS_PATH).await
    }

    /// Register an application; returns the id assigned by the host manager
    pub async fn add_application(&self, base: &HostApplicationBase) -> Result<String> {
        let body = self.send(Method::POST, HOST_APPS_PATH, Some(serde_json::to_vec(base)?)).await?;
        Ok(String::from_utf8_lossy(&body).trim().to_string())
    }

    pub async fn remove_application(&self, id: &str) -> Result<()> {
        self.send(Method::DELETE, &item_path(HOST_APPS_PATH, id), None).await?;
        Ok(())
    }

    pub async fn list_interface_blacklist(&self) -> Result<Vec<String>> {
        self.get_json(NET_ITF_BLACKLIST_PATH).await
    }

    pub async fn add_interface_blacklist(&self, value: &str) -> Result<()> {
        self.add_blacklist_value(NET_ITF_BLACKLIST_PATH, value).await
    }

    pub async fn remove_interface_blacklist(&self, value: &str) -> Result<()> {
        self.remove_blacklist_value(NET_ITF_BLACKLIST_PATH, value).await
    }

    pub async fn list_range_blacklist(&self) -> Result<Vec<String>> {
        self.get_json(NET_RNG_BLACKLIST_PATH).await
    }

    pub async fn add_range_blacklist(&self, value: &str) -> Result<()> {
        self.add_blacklist_value(NET_RNG_BLACKLIST_PATH, value).await
    }

    pub async fn remove_range_blacklist(&self, value: &str) -> Result<()> {
        self.remove_blacklist_value(NET_RNG_BLACKLIST_PATH, value).await
    }

    pub async fn list_service_groups(&self) -> Result<Vec<ServiceGroup>> {
        self.get_json(MDNS_ADV_PATH).await
    }

    pub async fn add_service_group(&self, group: &ServiceGroup) -> Result<()> {
        self.send(Method::POST, MDNS_ADV_PATH, Some(serde_json::to_vec(group)?)).await?;
        Ok(())
    }

    pub async fn get_service_group(&self, id: &str) -> Result<ServiceGroup> {
        self.get_json(&item_path(MDNS_ADV_PATH, id)).await
    }

    /// Replace the group stored under `group.id`
    pub async fn update_service_group(&self, group: &ServiceGroup) -> Result<()> {
        let path = item_path(MDNS_ADV_PATH, &group.id);
        self.send(Method::PUT, &path, Some(serde_json::to_vec(group)?)).await?;
        Ok(())
    }

    pub async fn delete_service_group(&self, id: &str) -> Result<()> {
        self.send(Method::DELETE, &item_path(MDNS_ADV_PATH, id), None).await?;
        Ok(())
    }

    /// Browse the network for `query.service`; blocks for the query time window
    pub async fn discover(&self, query: &DiscoveryQuery) -> Result<Vec<MdnsEntry>> {
        self.get_json(&with_query(MDNS_DISCOVERY_PATH, query)?).await
    }

    async fn add_blacklist_value(&self, path: &str, value: &str) -> Result<()> {
        self.send(Method::POST, path, Some(serde_json::to_vec(value)?)).await?;
        Ok(())
    }

    async fn remove_blacklist_value(&self, path: &str, value: &str) -> Result<()> {
        let query = BlacklistValueQuery {
            value: value.to_string(),
        };
        self.send(Method::DELETE, &with_query(path, &query)?, None).await?;
        Ok(())
    }

    async fn get_json<T: DeserializeOwned>(&self, path_and_query: &str) -> Result<T> {
        let body = self.send(Method::GET, path_and_query, None).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Send one request and return the body of a successful response. Error
    /// statuses are mapped to the matching error kind.
    async fn send(&self, method: Method, path_and_query: &str, json: Option<Vec<u8>>) -> Result<Bytes> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|source| Error::Connect {
                path: self.socket_path.clone(),
                source,
            })?;

        let (mut sender, conn) =
            hyper::client::conn::http1::handshake::<_, Full<Bytes>>(TokioIo::new(stream)).await?;
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!("Connection closed with error: {}", e);
            }
        });

        let mut request = Request::builder()
            .method(method.clone())
            .uri(path_and_query)
            .header(HOST, "localhost");
        let body = match json {
            Some(json) => {
                request = request.header(CONTENT_TYPE, "application/json");
                Full::new(Bytes::from(json))
            }
            None => Full::new(Bytes::new()),
        };
        let request = request.body(body)?;

        let response = sender.send_request(request).await?;
        let status = response.status();
        let request_id = response
            .headers()
            .get(HEADER_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.into_body().collect().await?.to_bytes();

        tracing::debug!(
            "{} {} -> {} ({})",
            method,
            path_and_query,
            status,
            request_id.as_deref().unwrap_or("-")
        );

        if status.is_success() {
            return Ok(body);
        }
        Err(Error::from_response(status, request_id, error_message(status, &body)))
    }
}

fn item_path(collection: &str, id: &str) -> String {
    format!("{}/{}", collection, utf8_percent_encode(id, PATH_SEGMENT))
}

fn with_query<Q: Serialize>(path: &str, query: &Q) -> Result<String> {
    let query = serde_urlencoded::to_string(query)?;
    if query.is_empty() {
        Ok(path.to_string())
    } else {
        Ok(format!("{}?{}", path, query))
    }
}

fn error_message(status: StatusCode, body: &[u8]) -> String {
    let message = String::from_utf8_lossy(body).trim().to_string();
    if message.is_empty() {
        status.canonical_reason().unwrap_or("unknown error").to_string()
    } else {
        message
    }
}
