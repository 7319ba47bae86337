//! Editor events to client notifications
//!
//! The host editor owns file watching and focus tracking. These helpers
//! decide which of its events become notifications, and feed notifications
//! from a newline-delimited JSON stream.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, warn};

use crate::error::Result;
use crate::registry::{BroadcastRegistry, DocumentEvent, EditorAction, Notification};

/// Document path relative to the workspace root URI
pub fn document_path(root_uri: &str, document_uri: &str) -> String {
    document_uri
        .strip_prefix(root_uri)
        .unwrap_or(document_uri)
        .to_string()
}

/// A document was saved
pub fn on_save(root_uri: &str, document_uri: &str, text: &str) -> Option<Notification> {
    let path = document_path(root_uri, document_uri);
    if path.ends_with(".ellx") {
        return None;
    }
    Some(Notification::new(
        EditorAction::Save,
        DocumentEvent {
            path,
            body: Some(text.to_string()),
        },
    ))
}

/// A document was edited; only markup documents are streamed
pub fn on_change(root_uri: &str, document_uri: &str, text: &str) -> Option<Notification> {
    let path = document_path(root_uri, document_uri);
    if !path.ends_with(".html") && !path.ends_with(".md") {
        return None;
    }
    Some(Notification::new(
        EditorAction::Update,
        DocumentEvent {
            path,
            body: Some(text.to_string()),
        },
    ))
}

/// An editor gained focus
pub fn on_focus(root_uri: &str, document_uri: &str) -> Option<Notification> {
    if !document_uri.starts_with("file://") {
        return None;
    }
    let openable = [".md", ".ellx", ".html"]
        .iter()
        .any(|ext| document_uri.ends_with(ext));
    if !openable {
        return None;
    }
    Some(Notification::new(
        EditorAction::Open,
        DocumentEvent {
            path: document_path(root_uri, document_uri),
            body: None,
        },
    ))
}

/// Broadcast every notification read from `reader`, one JSON object per line
///
/// Malformed lines are logged and skipped. Returns the number of
/// notifications broadcast once the stream ends.
pub async fn pump_lines<R>(reader: R, registry: &BroadcastRegistry) -> Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    let mut forwarded = 0;

    while reader.read_line(&mut line).await? > 0 {
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            match serde_json::from_str::<Notification>(trimmed) {
                Ok(notification) => {
                    debug!("Received editor event: {:?}", notification.action);
                    registry.broadcast(&notification).await?;
                    forwarded += 1;
                }
                Err(e) => warn!("Ignoring malformed editor event: {}", e),
            }
        }
        line.clear();
    }

    Ok(forwarded)
}
