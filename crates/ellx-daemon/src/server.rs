//! HTTP and WebSocket surface of the daemon
//!
//! Routes:
//! - `GET|PUT|DELETE|POST /resource/<path>`: resource operations, signature required
//! - `GET /identity`: the configured server identity, unauthenticated
//! - `GET /ws`: notification channel

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::Uri;
use axum::middleware::from_fn_with_state;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::auth::{require_signature, AuthGate, TrustCertificate};
use crate::config::DaemonConfig;
use crate::error::{DaemonError, Result};
use crate::registry::{
    BroadcastRegistry, ConnectionState, DocumentEvent, EditorAction, Notification, Outbound,
};
use crate::store::{decode_path, Relocation, Resource, ResourcePatch, ResourceStore};

/// Prefix under which resources are addressed
pub const RESOURCE_PREFIX: &str = "/resource";

/// Path of the notification channel
pub const NOTIFY_PATH: &str = "/ws";

/// Shared state for request handlers
#[derive(Clone)]
pub struct AppState {
    store: Arc<ResourceStore>,
    registry: Arc<BroadcastRegistry>,
    identity: Arc<str>,
}

impl AppState {
    pub fn new(store: ResourceStore, registry: Arc<BroadcastRegistry>, identity: &str) -> Self {
        Self {
            store: Arc::new(store),
            registry,
            identity: identity.into(),
        }
    }
}

/// Build the router, wrapping every resource route in the signature check
pub fn router(state: AppState, gate: Arc<AuthGate>) -> Router {
    let resource = get(get_resource)
        .put(put_resource)
        .delete(delete_resource)
        .post(post_resource);

    let resources = Router::new()
        .route(RESOURCE_PREFIX, resource.clone())
        .route(&format!("{}/", RESOURCE_PREFIX), resource.clone())
        .route(&format!("{}/*path", RESOURCE_PREFIX), resource)
        .route_layer(from_fn_with_state(gate, require_signature));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(resources)
        .route("/identity", get(identity))
        .route(NOTIFY_PATH, get(notifications))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Resource path relative to the root, percent-decoded
fn resource_path(uri: &Uri) -> Result<String> {
    let raw = uri.path().strip_prefix(RESOURCE_PREFIX).unwrap_or_default();
    decode_path(raw)
}

/// Parse an optional JSON body; an empty body is an empty object
fn json_body(body: &Bytes) -> Result<Value> {
    if body.is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_slice(body)
        .map_err(|e| DaemonError::BadRequest(format!("Malformed request body: {}", e)))
}

fn success() -> Response {
    "success".into_response()
}

async fn get_resource(State(state): State<AppState>, uri: Uri) -> Result<Response> {
    let path = resource_path(&uri)?;
    debug!("GET {}", path);

    match state.store.get(&path).await? {
        Resource::Directory(names) => Ok(Json(names).into_response()),
        Resource::File(content) => Ok(([(CONTENT_TYPE, "text/plain")], content).into_response()),
    }
}

async fn put_resource(State(state): State<AppState>, uri: Uri, body: Bytes) -> Result<Response> {
    let path = resource_path(&uri)?;
    state.store.require_dir(&path).await?;
    let patch = ResourcePatch::from_json(&json_body(&body)?)?;
    debug!("PUT {} ({} entries)", path, patch.entries().len());

    state.store.write(&path, &patch).await?;
    Ok(success())
}

async fn delete_resource(State(state): State<AppState>, uri: Uri) -> Result<Response> {
    let path = resource_path(&uri)?;
    debug!("DELETE {}", path);

    state.store.remove(&path).await?;
    Ok(success())
}

async fn post_resource(State(state): State<AppState>, uri: Uri, body: Bytes) -> Result<Response> {
    let path = resource_path(&uri)?;
    state.store.stat(&path).await?;
    let body = json_body(&body)?;

    let destination = body
        .get("destination")
        .and_then(Value::as_str)
        .ok_or_else(|| DaemonError::BadRequest("Missing destination".to_string()))
        .and_then(decode_path)?;
    let action = body.get("action").and_then(Value::as_str).unwrap_or_default();
    debug!("POST {} {} -> {}", path, action, destination);

    let how = match action {
        "move" => Relocation::Move,
        "copy" => Relocation::Copy,
        other => {
            // Containment is reported ahead of the unknown action
            state.store.resolve(&destination)?;
            return Err(DaemonError::BadRequest(format!(
                "Unrecognized action: {}",
                other
            )));
        }
    };

    state.store.relocate(&path, &destination, how).await?;
    Ok(success())
}

async fn identity(State(state): State<AppState>) -> String {
    state.identity.to_string()
}

async fn notifications(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| serve_client(socket, state.registry))
}

/// Pump registry instructions to one client until either side closes
async fn serve_client(socket: WebSocket, registry: Arc<BroadcastRegistry>) {
    let mut connection = registry.register().await;
    let (mut sink, mut stream) = socket.split();
    connection.set_state(ConnectionState::Open);
    info!("Notification client {} connected", connection.id());

    let mut graceful = true;
    loop {
        tokio::select! {
            outbound = connection.next_outbound() => match outbound {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = sink.send(Message::Text(text.to_string())).await {
                        warn!("Send to client {} failed: {}", connection.id(), e);
                        break;
                    }
                }
                Some(Outbound::Close) => {
                    connection.set_state(ConnectionState::Closing);
                    if sink.send(Message::Close(None)).await.is_err() {
                        break;
                    }
                }
                Some(Outbound::Terminate) | None => {
                    graceful = false;
                    break;
                }
            },
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // Clients only listen; anything they send is ignored
                Some(Ok(_)) => {}
            },
        }
    }

    if graceful {
        let _ = sink.close().await;
    }
    registry.deregister(&connection).await;
    info!("Notification client {} disconnected", connection.id());
}

/// A running daemon instance
///
/// Created by [`ServerHandle::start`], consumed by [`ServerHandle::stop`].
pub struct ServerHandle {
    local_addr: SocketAddr,
    registry: Arc<BroadcastRegistry>,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<Result<()>>,
}

impl ServerHandle {
    /// Fetch the trust certificate, then serve `config.root`
    pub async fn start(config: DaemonConfig) -> Result<Self> {
        config.validate()?;
        let trust = TrustCertificate::fetch(&config.trust_url).await?;
        Self::start_with_trust(config, trust).await
    }

    /// Serve `config.root` trusting an already known key
    pub async fn start_with_trust(config: DaemonConfig, trust: TrustCertificate) -> Result<Self> {
        config.validate_serving()?;
        let identity = config.identity();

        let registry = Arc::new(BroadcastRegistry::new());
        let store = ResourceStore::new(config.root.clone());
        let gate = AuthGate::new(trust, config.user.clone(), identity.clone());
        let app = router(
            AppState::new(store, Arc::clone(&registry), gate.identity()),
            Arc::new(gate),
        );

        let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
        let local_addr = listener.local_addr()?;

        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await?;
            Ok::<(), DaemonError>(())
        });

        info!("Running on http://{}", local_addr);
        info!("Serving {:?} as {:?}", config.root, identity);

        Ok(Self {
            local_addr,
            registry,
            shutdown,
            task,
        })
    }

    /// Address the server is listening on
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Registry of notification clients
    pub fn registry(&self) -> Arc<BroadcastRegistry> {
        Arc::clone(&self.registry)
    }

    /// Number of connected notification clients
    pub async fn client_count(&self) -> usize {
        self.registry.len().await
    }

    /// Push an editor event to every connected client
    pub async fn notify(&self, action: EditorAction, event: DocumentEvent) -> Result<usize> {
        self.registry
            .broadcast(&Notification::new(action, event))
            .await
    }

    /// Close all clients and shut the server down
    pub async fn stop(self) -> Result<()> {
        info!("Stopping server on {}", self.local_addr);
        self.registry.close_all().await;
        let _ = self.shutdown.send(());

        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(DaemonError::Server(e.to_string())),
        }
    }
}
