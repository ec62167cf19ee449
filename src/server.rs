//! Sync Invocation Server
//!
//! Small HTTP surface over the sync engine:
//! - `POST /sync` runs a sync pass for the bearer credential's caller
//! - `GET /health` reports liveness
//!
//! Requests are served by a `tiny_http` loop on a dedicated thread and
//! dispatched to the async engine through a Tokio runtime handle.

use crate::sync::{SyncManager, SyncManagerError};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;
use tiny_http::{Header, Method, Request, Response, Server};
use tokio::runtime::Handle;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {message}")]
    Bind { addr: SocketAddr, message: String },

    #[error("Failed to spawn server thread: {0}")]
    Spawn(String),
}

/// JSON reply: status code and body
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub body: serde_json::Value,
}

impl Reply {
    fn ok(body: serde_json::Value) -> Self {
        Self { status: 200, body }
    }

    fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "error": message.into() }),
        }
    }
}

/// HTTP status for a setup failure
pub fn status_for(error: &SyncManagerError) -> u16 {
    match error {
        SyncManagerError::Unauthorized => 401,
        SyncManagerError::NoWorkspace => 400,
        SyncManagerError::Database(_) | SyncManagerError::Config(_) => 500,
    }
}

/// Token of an `Authorization: Bearer <token>` header value
pub fn bearer_token(value: &str) -> Option<&str> {
    let value = value.trim();
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Route one request
pub async fn dispatch(manager: &SyncManager, method: &Method, url: &str, authorization: Option<&str>) -> Reply {
    let path = url.split('?').next().unwrap_or_default();

    match (method, path) {
        (Method::Get, "/health") => Reply::ok(json!({ "status": "ok" })),
        (Method::Post, "/sync") => {
            let credential = authorization.and_then(bearer_token);

            let ctx = match manager.context_for_credential(credential) {
                Ok(ctx) => ctx,
                Err(e) => {
                    log::warn!("Rejected sync request: {}", e);
                    return Reply::error(status_for(&e), e.to_string());
                }
            };

            match manager.run(&ctx).await {
                Ok(result) => match serde_json::to_value(&result) {
                    Ok(body) => Reply::ok(body),
                    Err(e) => Reply::error(500, format!("Failed to encode result: {}", e)),
                },
                Err(e) => {
                    log::error!("Sync run failed: {}", e);
                    Reply::error(status_for(&e), e.to_string())
                }
            }
        }
        (_, "/sync") | (_, "/health") => Reply::error(405, "Method not allowed"),
        _ => Reply::error(404, "Not found"),
    }
}

/// Running server; dropping it leaves the thread running
pub struct ServerHandle {
    server: Arc<Server>,
    local_addr: Option<SocketAddr>,
    thread: JoinHandle<()>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Block until the request loop exits
    pub fn join(self) {
        if self.thread.join().is_err() {
            log::error!("Sync server thread panicked");
        }
    }

    /// Stop accepting requests and wait for the loop to exit
    pub fn shutdown(self) {
        self.server.unblock();
        self.join();
    }
}

/// Bind `addr` and serve requests on a dedicated thread
pub fn start(addr: SocketAddr, manager: SyncManager, runtime: Handle) -> Result<ServerHandle, ServerError> {
    let server = Server::http(addr).map_err(|e| ServerError::Bind {
        addr,
        message: e.to_string(),
    })?;
    let server = Arc::new(server);
    let local_addr = server.server_addr().to_ip();

    log::info!("Sync server listening on http://{}", local_addr.unwrap_or(addr));

    let loop_server = server.clone();
    let thread = std::thread::Builder::new()
        .name("sync-server".to_string())
        .spawn(move || serve(&loop_server, &manager, &runtime))
        .map_err(|e| ServerError::Spawn(e.to_string()))?;

    Ok(ServerHandle {
        server,
        local_addr,
        thread,
    })
}

fn serve(server: &Server, manager: &SyncManager, runtime: &Handle) {
    for request in server.incoming_requests() {
        handle_request(request, manager, runtime);
    }
    log::info!("Sync server stopped");
}

fn handle_request(request: Request, manager: &SyncManager, runtime: &Handle) {
    let authorization = request
        .headers()
        .iter()
        .find(|h| h.field.equiv("Authorization"))
        .map(|h| h.value.as_str().to_string());

    log::debug!("{:?} {}", request.method(), request.url());

    let reply = runtime.block_on(dispatch(
        manager,
        request.method(),
        request.url(),
        authorization.as_deref(),
    ));

    let mut response = Response::from_string(reply.body.to_string()).with_status_code(reply.status);
    if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
        response = response.with_header(header);
    }

    if let Err(e) = request.respond(response) {
        log::warn!("Failed to send response: {}", e);
    }
}
