//! Notification connections and broadcast fan-out
//!
//! Each connection owns an outbound queue; the registry only holds the
//! sending halves. A broadcast snapshots the registered senders under the
//! lock and delivers outside it, so connects and disconnects during a
//! broadcast do not affect it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::error::Result;

/// Editor event kinds pushed to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditorAction {
    Save,
    Update,
    Open,
}

/// Document details accompanying an action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentEvent {
    /// Path relative to the served root
    pub path: String,
    /// Document text, when the action carries it
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub body: Option<String>,
}

/// Message sent to every notification client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub action: EditorAction,
    #[serde(flatten)]
    pub event: DocumentEvent,
}

impl Notification {
    pub fn new(action: EditorAction, event: DocumentEvent) -> Self {
        Self { action, event }
    }
}

/// Lifecycle of a notification connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Instruction for a connection's writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Send a text frame
    Text(Arc<str>),
    /// Start a graceful close handshake
    Close,
    /// Drop the connection without waiting for the peer
    Terminate,
}

/// Identifier assigned on registration
pub type ConnectionId = u64;

/// A connection as seen by its own task
pub struct ClientConnection {
    id: ConnectionId,
    state: Arc<Mutex<ConnectionState>>,
    outbound: mpsc::UnboundedReceiver<Outbound>,
}

impl ClientConnection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        read_state(&self.state)
    }

    /// Advance the connection's lifecycle state
    pub fn set_state(&self, next: ConnectionState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        debug!("Connection {}: {} -> {}", self.id, *state, next);
        *state = next;
    }

    /// Next instruction from the registry, None once deregistered
    pub async fn next_outbound(&mut self) -> Option<Outbound> {
        self.outbound.recv().await
    }
}

struct ClientEntry {
    tx: mpsc::UnboundedSender<Outbound>,
    state: Arc<Mutex<ConnectionState>>,
}

fn read_state(state: &Mutex<ConnectionState>) -> ConnectionState {
    *state.lock().unwrap_or_else(|e| e.into_inner())
}

/// The set of currently connected notification clients
#[derive(Default)]
pub struct BroadcastRegistry {
    clients: RwLock<HashMap<ConnectionId, ClientEntry>>,
    next_id: AtomicU64,
}

impl BroadcastRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection in the `Connecting` state
    pub async fn register(&self) -> ClientConnection {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, outbound) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(ConnectionState::Connecting));

        self.clients.write().await.insert(
            id,
            ClientEntry {
                tx,
                state: Arc::clone(&state),
            },
        );
        debug!("Registered notification client {}", id);

        ClientConnection {
            id,
            state,
            outbound,
        }
    }

    /// Mark a connection closed and forget it
    pub async fn deregister(&self, connection: &ClientConnection) {
        connection.set_state(ConnectionState::Closed);
        if self.clients.write().await.remove(&connection.id).is_some() {
            debug!("Deregistered notification client {}", connection.id);
        }
    }

    /// Number of registered connections
    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }

    /// Send a notification to every open connection
    ///
    /// Best effort: a failed delivery is logged and not retried. Returns the
    /// number of connections the message was queued for.
    pub async fn broadcast(&self, notification: &Notification) -> Result<usize> {
        let text: Arc<str> = serde_json::to_string(notification)?.into();
        let targets = self.snapshot().await;

        let mut delivered = 0;
        for (id, tx, state) in targets {
            if read_state(&state) != ConnectionState::Open {
                continue;
            }
            match tx.send(Outbound::Text(Arc::clone(&text))) {
                Ok(()) => delivered += 1,
                Err(_) => warn!("Failed to queue notification for client {}", id),
            }
        }

        debug!("Broadcast {:?} to {} client(s)", notification.action, delivered);
        Ok(delivered)
    }

    /// Close every connection: ask politely, yield once, then terminate
    pub async fn close_all(&self) {
        let targets = self.snapshot().await;
        if targets.is_empty() {
            return;
        }
        info!("Closing {} notification client(s)", targets.len());

        for (_, tx, _) in &targets {
            let _ = tx.send(Outbound::Close);
        }

        tokio::task::yield_now().await;

        for (id, tx, state) in self.snapshot().await {
            if read_state(&state) != ConnectionState::Closed {
                debug!("Terminating notification client {}", id);
                let _ = tx.send(Outbound::Terminate);
            }
        }
    }

    async fn snapshot(
        &self,
    ) -> Vec<(
        ConnectionId,
        mpsc::UnboundedSender<Outbound>,
        Arc<Mutex<ConnectionState>>,
    )> {
        self.clients
            .read()
            .await
            .iter()
            .map(|(id, entry)| (*id, entry.tx.clone(), Arc::clone(&entry.state)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn save_event() -> Notification {
        Notification::new(
            EditorAction::Save,
            DocumentEvent {
                path: "/index.md".to_string(),
                body: Some("# hi".to_string()),
            },
        )
    }

    #[test]
    fn test_notification_json_shape() {
        let json = serde_json::to_value(save_event()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "action": "save", "path": "/index.md", "body": "# hi" })
        );

        let open = Notification::new(
            EditorAction::Open,
            DocumentEvent {
                path: "/a.md".to_string(),
                body: None,
            },
        );
        assert_eq!(
            serde_json::to_value(open).unwrap(),
            serde_json::json!({ "action": "open", "path": "/a.md" })
        );
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_open_client() {
        let registry = BroadcastRegistry::new();
        let mut a = registry.register().await;
        let mut b = registry.register().await;
        a.set_state(ConnectionState::Open);
        b.set_state(ConnectionState::Open);

        assert_eq!(registry.broadcast(&save_event()).await.unwrap(), 2);

        let expected = serde_json::to_string(&save_event()).unwrap();
        for connection in [&mut a, &mut b] {
            match connection.next_outbound().await {
                Some(Outbound::Text(text)) => assert_eq!(&*text, expected),
                other => panic!("unexpected outbound: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_broadcast_skips_connecting_and_dropped_clients() {
        let registry = BroadcastRegistry::new();
        let _pending = registry.register().await;
        let dropped = registry.register().await;
        dropped.set_state(ConnectionState::Open);
        drop(dropped);
        let mut live = registry.register().await;
        live.set_state(ConnectionState::Open);

        // The dropped receiver fails silently; the live one still gets it
        assert_eq!(registry.broadcast(&save_event()).await.unwrap(), 1);
        assert!(matches!(live.next_outbound().await, Some(Outbound::Text(_))));
    }

    #[tokio::test]
    async fn test_deregister_removes_client() {
        let registry = BroadcastRegistry::new();
        let connection = registry.register().await;
        assert_eq!(registry.len().await, 1);

        registry.deregister(&connection).await;
        assert!(registry.is_empty().await);
        assert_eq!(connection.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_close_all_terminates_stragglers() {
        let registry = BroadcastRegistry::new();
        let mut connection = registry.register().await;
        connection.set_state(ConnectionState::Open);

        registry.close_all().await;

        assert_eq!(connection.next_outbound().await, Some(Outbound::Close));
        assert_eq!(connection.next_outbound().await, Some(Outbound::Terminate));
    }

    #[tokio::test]
    async fn test_close_all_spares_closed_clients() {
        let registry = Arc::new(BroadcastRegistry::new());
        let mut connection = registry.register().await;
        connection.set_state(ConnectionState::Open);

        let closer = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.close_all().await })
        };

        // Acknowledge the close before the registry yields back
        assert_eq!(connection.next_outbound().await, Some(Outbound::Close));
        registry.deregister(&connection).await;
        closer.await.unwrap();

        assert_eq!(connection.next_outbound().await, None);
    }
}
