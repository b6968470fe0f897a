use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use serde_json::{Map, Value, json};
use tokio::net::TcpListener;

use crate::storage::{FileStore, RecordStore, StorageError};
use crate::types::{Habit, Record, Task};

/// All server-side state: one file-backed store per record kind. The router
/// itself is stateless between requests.
pub struct AppState {
    pub habits: FileStore<Habit>,
    pub tasks: FileStore<Task>,
}

impl AppState {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            habits: FileStore::new(data_dir),
            tasks: FileStore::new(data_dir),
        }
    }
}

/// Bind and serve forever, one spawned task per connection.
pub async fn serve(state: Arc<AppState>, port: u16) -> std::io::Result<()> {
    let listener = bind_with_fallback(port).await?;
    tracing::info!("server running at http://{}", listener.local_addr()?);

    loop {
        let (stream, _) = match listener.accept().await {
            Ok(conn) => conn,
            Err(err) => {
                tracing::warn!(error = %err, "accept failed");
                continue;
            }
        };
        let io = TokioIo::new(stream);
        let state = state.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req| handle(state.clone(), req));
            if let Err(err) = Builder::new(TokioExecutor::default())
                .serve_connection(io, service)
                .await
            {
                tracing::debug!(error = %err, "connection error");
            }
        });
    }
}

/// Bind `port`; if it is already taken, log and retry once on the next one.
async fn bind_with_fallback(port: u16) -> std::io::Result<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    match TcpListener::bind(addr).await {
        Ok(listener) => Ok(listener),
        Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
            tracing::warn!("port {} is busy, trying {}", port, port + 1);
            TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port + 1))).await
        }
        Err(err) => Err(err),
    }
}

async fn handle(
    state: Arc<AppState>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            tracing::warn!(error = %err, "failed to read request body");
            Bytes::new()
        }
    };
    let (status, payload) =
        dispatch(state, parts.method.clone(), parts.uri.path().to_string(), bytes).await;
    tracing::debug!(method = %parts.method, path = parts.uri.path(), status = %status, "handled");
    Ok(json_response(status, &payload))
}

/// Run the route table on the blocking pool; the stores do synchronous file
/// I/O and must stay off the tokio worker threads.
async fn dispatch(
    state: Arc<AppState>,
    method: Method,
    path: String,
    body: Bytes,
) -> (StatusCode, Value) {
    match tokio::task::spawn_blocking(move || route(&state, &method, &path, &body)).await {
        Ok(result) => result,
        Err(err) => {
            tracing::error!(error = %err, "request task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "Internal server error" }),
            )
        }
    }
}

/// Dispatch a request to the matching store operation. Pure apart from the
/// store itself, which keeps the whole route table testable without sockets.
pub fn route(state: &AppState, method: &Method, path: &str, body: &[u8]) -> (StatusCode, Value) {
    if method == Method::OPTIONS {
        // CORS preflight
        return (StatusCode::NO_CONTENT, Value::Null);
    }
    let mut segments = path.trim_matches('/').splitn(3, '/');
    match (segments.next(), segments.next()) {
        (Some("api"), Some("habits")) => route_kind(&state.habits, method, segments.next(), body),
        (Some("api"), Some("tasks")) => route_kind(&state.tasks, method, segments.next(), body),
        _ => not_found_route(),
    }
}

fn route_kind<T: Record>(
    store: &dyn RecordStore<T>,
    method: &Method,
    rest: Option<&str>,
    body: &[u8],
) -> (StatusCode, Value) {
    match (method, rest) {
        // GET /api/{kind}/{userId}
        (&Method::GET, Some(user_id)) => match store.list_by_user(user_id) {
            Ok(records) => ok_json(&records),
            Err(err) => storage_failure(err),
        },
        // POST /api/{kind}
        (&Method::POST, None) => {
            let fields: T::New = match serde_json::from_slice(body) {
                Ok(fields) => fields,
                Err(err) => return bad_request(&err),
            };
            match store.create(fields) {
                Ok(record) => ok_json(&record),
                Err(err) => storage_failure(err),
            }
        }
        // PUT /api/{kind}/{id}
        (&Method::PUT, Some(id)) => {
            let partial: Map<String, Value> = match serde_json::from_slice(body) {
                Ok(partial) => partial,
                Err(err) => return bad_request(&err),
            };
            match store.update(id, &partial) {
                Ok(record) => ok_json(&record),
                Err(err) if err.is_not_found() => (
                    StatusCode::NOT_FOUND,
                    json!({ "error": format!("{} not found", T::kind().label()) }),
                ),
                Err(StorageError::Json(err)) => bad_request(&err),
                Err(err) => storage_failure(err),
            }
        }
        // DELETE /api/{kind}/{id} — unknown ids still report success
        (&Method::DELETE, Some(id)) => match store.delete(id) {
            Ok(()) => (StatusCode::OK, json!({ "success": true })),
            Err(err) => storage_failure(err),
        },
        _ => not_found_route(),
    }
}

fn ok_json<S: serde::Serialize>(payload: &S) -> (StatusCode, Value) {
    match serde_json::to_value(payload) {
        Ok(value) => (StatusCode::OK, value),
        Err(err) => storage_failure(StorageError::Json(err)),
    }
}

fn bad_request(err: &serde_json::Error) -> (StatusCode, Value) {
    (
        StatusCode::BAD_REQUEST,
        json!({ "error": format!("Invalid JSON body: {err}") }),
    )
}

fn storage_failure(err: StorageError) -> (StatusCode, Value) {
    tracing::error!(error = %err, "storage operation failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({ "error": err.to_string() }),
    )
}

fn not_found_route() -> (StatusCode, Value) {
    (StatusCode::NOT_FOUND, json!({ "error": "Not found" }))
}

fn json_response(status: StatusCode, payload: &Value) -> Response<Full<Bytes>> {
    let body = if payload.is_null() {
        Bytes::new()
    } else {
        Bytes::from(payload.to_string())
    };
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, PUT, DELETE, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type")
        .body(Full::new(body))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}
