use crate::error::ApiError;
use crate::model::Predictor;
use crate::response::{self, Envelope};
use crate::scoring;
use crate::store::{PassengerRecord, RecordStore};
use lambda_http::{Body, Error, Request, RequestExt, Response};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

const HEALTH_PATH: &str = "/health";
const PASSENGERS_PATH: &str = "/sobreviventes";

/// Built once per container and shared by every invocation.
#[derive(Clone)]
pub struct AppContext {
    pub predictor: Arc<dyn Predictor>,
    pub store: Arc<dyn RecordStore>,
}

#[derive(Debug, PartialEq)]
enum Route {
    Health,
    List,
    Get(String),
    Score,
    Delete(String),
    Unknown,
}

// API Gateway REST events carry the stage in the URI; the raw path does not
fn request_path(request: &Request) -> &str {
    match request.raw_http_path() {
        "" => request.uri().path(),
        raw => raw,
    }
}

// Body after lambda_http has undone any base64 encoding
fn body_text(request: &Request) -> Option<&str> {
    let bytes: &[u8] = request.body().as_ref();
    if bytes.is_empty() {
        return None;
    }
    std::str::from_utf8(bytes).ok()
}

// pathParameters, then ?id=, then /sobreviventes/{id}
fn passenger_id(request: &Request, trailing: Option<&str>) -> Option<String> {
    request
        .path_parameters()
        .first("id")
        .map(str::to_string)
        .or_else(|| request.query_string_parameters().first("id").map(str::to_string))
        .or_else(|| trailing.map(str::to_string))
        .filter(|id| !id.is_empty())
}

// DELETE may carry the id in its body instead
fn body_id(request: &Request) -> Option<String> {
    let body: Value = serde_json::from_str(body_text(request)?).ok()?;
    match body.get("id")? {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn resolve(request: &Request) -> Route {
    let path = request_path(request).trim_end_matches('/');
    let (resource, trailing) = match path.strip_prefix(PASSENGERS_PATH) {
        Some("") => (PASSENGERS_PATH, None),
        Some(rest) => match rest.strip_prefix('/') {
            Some(segment) if !segment.contains('/') => (PASSENGERS_PATH, Some(segment)),
            _ => (path, None),
        },
        None => (path, None),
    };
    let id = passenger_id(request, trailing);

    match (request.method().as_str().to_ascii_uppercase().as_str(), resource) {
        ("GET", HEALTH_PATH) => Route::Health,
        ("GET", PASSENGERS_PATH) => id.map_or(Route::List, Route::Get),
        ("POST", PASSENGERS_PATH) if trailing.is_none() => Route::Score,
        ("DELETE", PASSENGERS_PATH) => {
            id.or_else(|| body_id(request)).map_or(Route::Unknown, Route::Delete)
        }
        _ => Route::Unknown,
    }
}

#[derive(Serialize)]
struct PassengerList<'a> {
    passengers: &'a [PassengerRecord],
}

#[derive(Serialize)]
struct Deleted<'a> {
    #[serde(rename = "Operation")]
    operation: &'static str,
    #[serde(rename = "Message")]
    message: &'static str,
    #[serde(rename = "deletedItem")]
    deleted_item: &'a PassengerRecord,
}

// Top-level boundary: every outcome becomes a response
pub async fn function_handler(ctx: &AppContext, request: Request) -> Result<Response<Body>, Error> {
    tracing::info!(method = %request.method(), path = request_path(&request), "received request");

    let envelope = match resolve(&request) {
        Route::Health => response::health(),
        Route::List => list(ctx).await.unwrap_or_else(|e| e.into_envelope("list")),
        Route::Get(id) => get(ctx, id).await.unwrap_or_else(|e| e.into_envelope("get")),
        Route::Score => score(ctx, &request).await.unwrap_or_else(|e| e.into_envelope("score")),
        Route::Delete(id) => delete(ctx, id).await.unwrap_or_else(|e| e.into_envelope("delete")),
        Route::Unknown => response::not_found_route(),
    };

    tracing::info!(status = envelope.status_code, "request completed");
    Ok(envelope.into())
}

async fn list(ctx: &AppContext) -> Result<Envelope, ApiError> {
    let passengers = ctx.store.scan_all().await?;
    Ok(response::build(200, Some(&PassengerList { passengers: &passengers })))
}

async fn get(ctx: &AppContext, id: String) -> Result<Envelope, ApiError> {
    match ctx.store.get(&id).await? {
        Some(record) => Ok(response::build(200, Some(&record))),
        None => Err(ApiError::NotFound(id)),
    }
}

async fn score(ctx: &AppContext, request: &Request) -> Result<Envelope, ApiError> {
    let outcome =
        scoring::score(ctx.predictor.as_ref(), ctx.store.as_ref(), body_text(request)).await?;
    Ok(response::build(200, Some(&outcome)))
}

async fn delete(ctx: &AppContext, id: String) -> Result<Envelope, ApiError> {
    match ctx.store.delete(&id).await? {
        Some(record) => Ok(response::build(
            200,
            Some(&Deleted { operation: "DELETE", message: "SUCCESS", deleted_item: &record }),
        )),
        None => Err(ApiError::NotFound(id)),
    }
}
