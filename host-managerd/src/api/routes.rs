use std::sync::Arc;
use std::time::Duration;
use axum::{
    body::Body,
    extract::{rejection::{JsonRejection, QueryRejection}, Path, Query, State},
    http::{HeaderValue, Request, StatusCode},
    middleware,
    response::Response,
    routing::{delete, get},
    Json, Router,
};
use mdns_sd::ServiceDaemon;
use tokio_util::sync::{CancellationToken, DropGuard};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::Level;
use shared::protocol::*;
use shared::types::{
    BlacklistValueQuery, DiscoveryQuery, HostApplication, HostApplicationBase, HostInfo, HostNet,
    MdnsEntry, Resource, ResourceFilter, ServiceGroup, SrvInfo,
};
use crate::blacklist::BlacklistStore;
use crate::error::{Error, Result};
use crate::mdns::advertise::ServiceGroupStore;
use crate::mdns::browser;
use crate::netinfo::HostInfoProvider;
use crate::resource::application::ApplicationStore;
use crate::resource::ResourceRegistry;

const DEFAULT_TIME_WINDOW_MS: u64 = 1000;

#[derive(Clone)]
pub struct AppState {
    pub srv_info: Arc<SrvInfo>,
    pub host_info: Arc<HostInfoProvider>,
    pub registry: Arc<ResourceRegistry>,
    pub applications: Arc<ApplicationStore>,
    pub interface_blacklist: Arc<BlacklistStore>,
    pub range_blacklist: Arc<BlacklistStore>,
    pub service_groups: Arc<ServiceGroupStore>,
    pub daemon: ServiceDaemon,
    /// Parent of every per-request token; cancelled on shutdown
    pub shutdown: CancellationToken,
}

pub fn router(state: AppState) -> Router {
    let routes = Router::new()
        .route(SRV_INFO_PATH, get(get_srv_info))
        .route(HOST_INFO_PATH, get(get_host_info))
        .route(HOST_NET_PATH, get(get_host_net))
        .route(HOST_RESOURCES_PATH, get(list_resources))
        .route(&format!("{}/{{id}}", HOST_RESOURCES_PATH), get(get_resource))
        .route(HOST_APPS_PATH, get(list_applications).post(add_application))
        .route(&format!("{}/{{id}}", HOST_APPS_PATH), delete(remove_application))
        .route(
            NET_ITF_BLACKLIST_PATH,
            get(list_interface_blacklist)
                .post(add_interface_blacklist)
                .delete(remove_interface_blacklist),
        )
        .route(
            NET_RNG_BLACKLIST_PATH,
            get(list_range_blacklist)
                .post(add_range_blacklist)
                .delete(remove_range_blacklist),
        )
        .route(MDNS_ADV_PATH, get(list_service_groups).post(add_service_group))
        .route(
            &format!("{}/{{id}}", MDNS_ADV_PATH),
            get(get_service_group)
                .put(update_service_group)
                .delete(delete_service_group),
        )
        .route(MDNS_DISCOVERY_PATH, get(discover))
        .with_state(state);

    with_middleware(routes)
}

/// Static headers, a request id on every request and response, and one log
/// line per request carrying that id. The last layer added runs first.
fn with_middleware(router: Router) -> Router {
    router
        .layer(middleware::map_response(add_headers))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<Body>| {
                    let request_id = request
                        .headers()
                        .get(HEADER_REQUEST_ID)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("-");
                    tracing::info_span!(
                        "request",
                        id = %request_id,
                        method = %request.method(),
                        uri = %request.uri(),
                    )
                })
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

async fn add_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(HEADER_API_VERSION, HeaderValue::from_static(API_VERSION));
    headers.insert(HEADER_SERVICE_NAME, HeaderValue::from_static(SERVICE_NAME));
    response
}

/// Token for one request. It is cancelled on shutdown, and by the guard when
/// the handler future is dropped because the client went away.
fn request_token(shutdown: &CancellationToken) -> (CancellationToken, DropGuard) {
    let cancel = shutdown.child_token();
    let guard = cancel.clone().drop_guard();
    (cancel, guard)
}

/// Store operations do file and OS I/O under their locks; keep them off the
/// async workers.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Internal(anyhow::anyhow!("blocking task failed: {}", e)))?
}

fn json_body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|e| Error::invalid_input(e.body_text()))
}

fn query_params<T>(query: std::result::Result<Query<T>, QueryRejection>) -> Result<T> {
    query
        .map(|Query(value)| value)
        .map_err(|e| Error::invalid_input(e.body_text()))
}

/// Blacklist values are posted as a JSON string; a bare text body is
/// accepted as well.
fn blacklist_value(body: &str) -> String {
    serde_json::from_str::<String>(body).unwrap_or_else(|_| body.trim().to_string())
}

async fn get_srv_info(State(state): State<AppState>) -> Json<SrvInfo> {
    Json(state.srv_info.as_ref().clone())
}

async fn get_host_info(State(state): State<AppState>) -> Result<Json<HostInfo>> {
    let (cancel, _guard) = request_token(&state.shutdown);
    blocking(move || state.host_info.get_info(&cancel)).await.map(Json)
}

async fn get_host_net(State(state): State<AppState>) -> Result<Json<HostNet>> {
    let (cancel, _guard) = request_token(&state.shutdown);
    blocking(move || state.host_info.get_net(&cancel)).await.map(Json)
}

async fn list_resources(
    State(state): State<AppState>,
    filter: std::result::Result<Query<ResourceFilter>, QueryRejection>,
) -> Result<Json<Vec<Resource>>> {
    let filter = query_params(filter)?;
    let (cancel, _guard) = request_token(&state.shutdown);
    blocking(move || state.registry.list(&cancel, &filter)).await.map(Json)
}

async fn get_resource(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Resource>> {
    let (cancel, _guard) = request_token(&state.shutdown);
    blocking(move || state.registry.get(&cancel, &id)).await.map(Json)
}

async fn list_applications(State(state): State<AppState>) -> Json<Vec<HostApplication>> {
    Json(state.applications.list())
}

async fn add_application(
    State(state): State<AppState>,
    payload: std::result::Result<Json<HostApplicationBase>, JsonRejection>,
) -> Result<String> {
    let base = json_body(payload)?;
    blocking(move || state.applications.add(base)).await
}

async fn remove_application(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    blocking(move || state.applications.remove(&id)).await?;
    Ok(StatusCode::OK)
}

async fn list_interface_blacklist(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.interface_blacklist.list())
}

async fn add_interface_blacklist(State(state): State<AppState>, body: String) -> Result<StatusCode> {
    let value = blacklist_value(&body);
    blocking(move || state.interface_blacklist.add(&value)).await?;
    Ok(StatusCode::OK)
}

async fn remove_interface_blacklist(
    State(state): State<AppState>,
    query: std::result::Result<Query<BlacklistValueQuery>, QueryRejection>,
) -> Result<StatusCode> {
    let query = query_params(query)?;
    blocking(move || state.interface_blacklist.remove(&query.value)).await?;
    Ok(StatusCode::OK)
}

async fn list_range_blacklist(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.range_blacklist.list())
}

async fn add_range_blacklist(State(state): State<AppState>, body: String) -> Result<StatusCode> {
    let value = blacklist_value(&body);
    blocking(move || state.range_blacklist.add(&value)).await?;
    Ok(StatusCode::OK)
}

async fn remove_range_blacklist(
    State(state): State<AppState>,
    query: std::result::Result<Query<BlacklistValueQuery>, QueryRejection>,
) -> Result<StatusCode> {
    let query = query_params(query)?;
    blocking(move || state.range_blacklist.remove(&query.value)).await?;
    Ok(StatusCode::OK)
}

async fn list_service_groups(State(state): State<AppState>) -> Result<Json<Vec<ServiceGroup>>> {
    let (cancel, _guard) = request_token(&state.shutdown);
    state.service_groups.list(&cancel).map(Json)
}

async fn add_service_group(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ServiceGroup>, JsonRejection>,
) -> Result<StatusCode> {
    let group = json_body(payload)?;
    blocking(move || state.service_groups.add(group)).await?;
    Ok(StatusCode::OK)
}

async fn get_service_group(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ServiceGroup>> {
    state.service_groups.get(&id).map(Json)
}

async fn update_service_group(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: std::result::Result<Json<ServiceGroup>, JsonRejection>,
) -> Result<StatusCode> {
    let mut group = json_body(payload)?;
    group.id = id;
    blocking(move || state.service_groups.update(group)).await?;
    Ok(StatusCode::OK)
}

async fn delete_service_group(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    blocking(move || state.service_groups.delete(&id)).await?;
    Ok(StatusCode::OK)
}

async fn discover(
    State(state): State<AppState>,
    query: std::result::Result<Query<DiscoveryQuery>, QueryRejection>,
) -> Result<Json<Vec<MdnsEntry>>> {
    let query = query_params(query)?;
    let window = Duration::from_millis(query.time_window.unwrap_or(DEFAULT_TIME_WINDOW_MS));
    let (cancel, _guard) = request_token(&state.shutdown);
    browser::query(&state.daemon, &cancel, &query.service, &query.domain, window)
        .await
        .map(Json)
}
