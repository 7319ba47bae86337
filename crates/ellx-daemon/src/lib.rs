//! Ellx Daemon - Local sync daemon for a remote web client
//!
//! This crate provides:
//! - Path-contained filesystem resources under a single root
//! - Signature checks against a trust certificate fetched at startup
//! - An HTTP resource API and a WebSocket notification channel
//! - Broadcast of editor events to every connected client

pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod registry;
pub mod server;
pub mod store;

pub use auth::{auth_payload, AuthGate, TrustCertificate};
pub use config::DaemonConfig;
pub use error::{DaemonError, Result};
pub use registry::{
    BroadcastRegistry, ConnectionState, DocumentEvent, EditorAction, Notification,
};
pub use server::{router, AppState, ServerHandle};
pub use store::{Relocation, Resource, ResourcePatch, ResourceStore};
