//! Request routing and per-method handling.
//!
//! Handlers return `Result<_, ServerError>` and bubble failures with `?`;
//! [`handle_request`] converts them into Redfish error responses at the
//! edge, so the connection service itself is infallible.

use super::core::AppState;
use super::headers::{load_fixture_headers, FixtureHeaders};
use super::response::{
    build_response, build_response_with_headers, error_response, json_response, DEFAULT_HEADERS,
};
use crate::error::ServerError;
use crate::pagination::{paginate, PageQuery};
use crate::path::ResourcePath;
use crate::repository::{is_collection, Resolved};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::ffi::OsStr;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, warn};

const SUBMIT_TEST_EVENT_ACTION: &str = "EventService/Actions/EventService.SubmitTestEvent";
const SUBMIT_METRIC_REPORT_ACTION: &str =
    "TelemetryService/Actions/TelemetryService.SubmitTestMetricReport";

/// Canned ETags served when the server runs in ETag test mode.
const ETAG_TEST_PATHS: [(&str, &str); 2] = [
    ("/redfish/v1/Systems/1", "W/\"12345\""),
    ("/redfish/v1/AccountService/Accounts/1", "\"123456\""),
];

/// Entry point for every request on every connection.
pub async fn handle_request(
    state: Arc<AppState>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let target = req.uri().path().to_string();
    debug!(%method, path = %target, "incoming request");

    let response = match route_request(&state, req).await {
        Ok(response) => response,
        Err(e) => {
            let status = e.status();
            if status.is_server_error() {
                error!(%method, path = %target, error = %e, "request failed");
            } else {
                debug!(%method, path = %target, error = %e, "request rejected");
            }
            error_response(status, &e.to_string())
        }
    };
    Ok(response)
}

async fn route_request(
    state: &AppState,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, ServerError> {
    match *req.method() {
        Method::GET => handle_get(state, req).await,
        Method::HEAD => handle_head(state, req).await,
        Method::PATCH => handle_patch(state, req).await,
        Method::POST => handle_post(state, req).await,
        Method::DELETE => handle_delete(state, req).await,
        Method::PUT => handle_put(state, req).await,
        ref method => Err(ServerError::MethodNotSupported(method.to_string())),
    }
}

async fn handle_get(
    state: &AppState,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, ServerError> {
    let raw_path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);
    let path = ResourcePath::resolve(&raw_path, state.config.short_form);
    let resource_dir = state.repository.resource_dir(&path);
    state.timer.apply(&Method::GET, &resource_dir).await;

    // Short-form trees have no fixtures above the service root; answer the
    // discovery paths directly.
    if state.config.short_form {
        if raw_path == "/" {
            return Err(ServerError::ResourceNotFound(raw_path));
        }
        if raw_path == "/redfish" || raw_path == "/redfish/" {
            return Ok(json_response(StatusCode::OK, &json!({ "v1": "/redfish/v1" })));
        }
    }

    match state.repository.resolve(&path)? {
        Resolved::Document {
            value: mut document,
            ..
        } => {
            if let Some(map) = document.as_object_mut() {
                // Served documents never expose the fixture copyright stamp.
                map.remove("@Redfish.Copyright");
            }
            let page = PageQuery::parse(query.as_deref())?;
            paginate(&mut document, path.external_id(), &page);

            let mut headers = if state.config.emit_headers {
                match load_fixture_headers(&resource_dir, &Method::GET)? {
                    FixtureHeaders::Headers(headers) => headers,
                    FixtureHeaders::Missing => default_headers(),
                    FixtureHeaders::Unusable => {
                        warn!(path = %path, "headers.json has no GET map, sending defaults");
                        default_headers()
                    }
                }
            } else {
                default_headers()
            };
            if state.config.test_etag {
                if let Some((_, etag)) = ETAG_TEST_PATHS.iter().find(|(p, _)| *p == raw_path) {
                    headers.push(("ETag".to_string(), etag.to_string()));
                }
            }

            let body =
                serde_json::to_string_pretty(&document).unwrap_or_else(|_| "{}".to_string());
            Ok(build_response_with_headers(StatusCode::OK, headers, body))
        }
        Resolved::Tombstoned => Err(ServerError::ResourceNotFound(
            path.external_id().to_string(),
        )),
        Resolved::NotFound => serve_static_fallback(state, &path),
    }
}

/// Paths with no JSON document behind them may still name a raw fixture
/// file: `$metadata` and schema documents are stored as XML.
fn serve_static_fallback(
    state: &AppState,
    path: &ResourcePath,
) -> Result<Response<Full<Bytes>>, ServerError> {
    let dir = state.repository.resource_dir(path);
    let candidates = [dir.join("index.xml"), dir];
    let Some(file) = candidates.iter().find(|c| c.is_file()) else {
        return Err(ServerError::ResourceNotFound(
            path.external_id().to_string(),
        ));
    };

    let body = fs::read(file).map_err(|e| ServerError::Fixture {
        path: file.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok(build_response_with_headers(
        StatusCode::OK,
        [("Content-Type", static_content_type(file).as_str())],
        body,
    ))
}

async fn handle_head(
    state: &AppState,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, ServerError> {
    let path = ResourcePath::resolve(req.uri().path(), state.config.short_form);
    let resource_dir = state.repository.resource_dir(&path);
    state.timer.apply(&Method::HEAD, &resource_dir).await;

    if !state.config.emit_headers {
        return Ok(build_response_with_headers(
            StatusCode::OK,
            default_headers(),
            Bytes::new(),
        ));
    }
    match load_fixture_headers(&resource_dir, &Method::HEAD)? {
        FixtureHeaders::Headers(headers) => Ok(build_response_with_headers(
            StatusCode::OK,
            headers,
            Bytes::new(),
        )),
        FixtureHeaders::Missing => Ok(build_response_with_headers(
            StatusCode::OK,
            default_headers(),
            Bytes::new(),
        )),
        // A headers file that says nothing about this method means the
        // resource does not answer HEAD.
        FixtureHeaders::Unusable => Err(ServerError::ResourceNotFound(
            path.external_id().to_string(),
        )),
    }
}

async fn handle_patch(
    state: &AppState,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, ServerError> {
    let (parts, body) = req.into_parts();
    let path = ResourcePath::resolve(parts.uri.path(), state.config.short_form);
    state
        .timer
        .apply(&Method::PATCH, &state.repository.resource_dir(&path))
        .await;

    let patch = read_json_body(body).await?;
    if !patch.is_object() {
        return Err(ServerError::MalformedPayload(
            "PATCH body must be a JSON object".to_string(),
        ));
    }
    state.repository.merge(&path, &patch)?;
    Ok(build_response(StatusCode::NO_CONTENT, Bytes::new()))
}

async fn handle_post(
    state: &AppState,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, ServerError> {
    let (parts, body) = req.into_parts();
    let path = ResourcePath::resolve(parts.uri.path(), state.config.short_form);
    state
        .timer
        .apply(&Method::POST, &state.repository.resource_dir(&path))
        .await;

    match state.repository.resolve(&path)? {
        Resolved::Document { value, .. } => {
            if !is_collection(&value) {
                return Err(ServerError::CollectionOperationNotAllowed(
                    path.external_id().to_string(),
                ));
            }
            let member = read_json_body(body).await?;
            if !member.is_object() {
                return Err(ServerError::MalformedPayload(
                    "POST body must be a JSON object".to_string(),
                ));
            }
            let (id, _) = state.repository.create_member(&path, member)?;
            debug!(member = %id, "created collection member");
            Ok(build_response_with_headers(
                StatusCode::NO_CONTENT,
                [("Location", id.as_str())],
                Bytes::new(),
            ))
        }
        Resolved::Tombstoned => Err(ServerError::ResourceNotFound(
            path.external_id().to_string(),
        )),
        Resolved::NotFound => handle_action(state, &path, body).await,
    }
}

/// POST to a path with no document behind it is only meaningful for the two
/// test actions.
async fn handle_action(
    state: &AppState,
    path: &ResourcePath,
    body: Incoming,
) -> Result<Response<Full<Bytes>>, ServerError> {
    if path.canonical().ends_with(SUBMIT_TEST_EVENT_ACTION) {
        let payload = read_json_body(body).await?;
        let id = state.dispatcher.submit_test_event(payload)?;
        debug!(event = id, "accepted test event");
        Ok(build_response(StatusCode::NO_CONTENT, Bytes::new()))
    } else if path.canonical().ends_with(SUBMIT_METRIC_REPORT_ACTION) {
        let payload = read_json_body(body).await?;
        let id = state.dispatcher.submit_test_metric_report(payload)?;
        debug!(event = id, "accepted metric report");
        Ok(build_response(StatusCode::NO_CONTENT, Bytes::new()))
    } else {
        Err(ServerError::MethodNotSupported(
            path.external_id().to_string(),
        ))
    }
}

async fn handle_delete(
    state: &AppState,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, ServerError> {
    let path = ResourcePath::resolve(req.uri().path(), state.config.short_form);
    state
        .timer
        .apply(&Method::DELETE, &state.repository.resource_dir(&path))
        .await;
    state.repository.delete(&path)?;
    Ok(build_response(StatusCode::NO_CONTENT, Bytes::new()))
}

async fn handle_put(
    state: &AppState,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, ServerError> {
    let (parts, body) = req.into_parts();
    let path = ResourcePath::resolve(parts.uri.path(), state.config.short_form);
    // Drain the body so the connection stays reusable, then refuse.
    let _ = body.collect().await;
    state
        .timer
        .apply(&Method::PUT, &state.repository.resource_dir(&path))
        .await;
    Err(ServerError::MethodNotSupported(
        path.external_id().to_string(),
    ))
}

/// Collect and parse a JSON request body.
async fn read_json_body(body: Incoming) -> Result<Value, ServerError> {
    let bytes = body
        .collect()
        .await
        .map_err(|e| ServerError::MalformedPayload(format!("could not read request body: {e}")))?
        .to_bytes();
    serde_json::from_slice(&bytes)
        .map_err(|e| ServerError::MalformedPayload(format!("request body is not valid JSON: {e}")))
}

fn default_headers() -> Vec<(String, String)> {
    DEFAULT_HEADERS
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Media type for a raw fixture file; extensionless files are metadata XML.
fn static_content_type(file: &Path) -> String {
    let ext = file.extension().and_then(OsStr::to_str).unwrap_or("xml");
    format!("application/{ext};odata.metadata=minimal;charset=utf-8")
}
