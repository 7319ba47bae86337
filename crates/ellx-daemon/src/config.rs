//! Daemon configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{DaemonError, Result};

/// Identity used when the root has no usable directory name
pub const FALLBACK_IDENTITY: &str = "untitled-project";

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Directory served to the client
    pub root: PathBuf,

    /// Client user whose signatures are accepted
    pub user: String,

    /// Server identity; derived from the root when unset
    pub identity: Option<String>,

    /// URL returning the trusted public key as text
    pub trust_url: String,

    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            user: String::new(),
            identity: None,
            trust_url: String::new(),
            host: "127.0.0.1".to_string(),
            port: 3002,
        }
    }
}

impl DaemonConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Set the root, trimming a `file://` scheme if present
    pub fn set_root(&mut self, root: &str) {
        self.root = PathBuf::from(root.strip_prefix("file://").unwrap_or(root));
    }

    /// Identity announced to clients and bound into every signature
    pub fn identity(&self) -> String {
        if let Some(identity) = self.identity.as_ref().filter(|i| !i.is_empty()) {
            return identity.clone();
        }

        let root = std::fs::canonicalize(&self.root).unwrap_or_else(|_| self.root.clone());
        root.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| FALLBACK_IDENTITY.to_string())
    }

    /// Check that the configuration can start a daemon
    pub fn validate(&self) -> Result<()> {
        if self.trust_url.is_empty() {
            return Err(DaemonError::Config("A trust URL is required".to_string()));
        }
        self.validate_serving()
    }

    /// Check the fields needed to serve once a trusted key is known
    pub fn validate_serving(&self) -> Result<()> {
        if self.user.is_empty() {
            return Err(DaemonError::Config("A user name is required".to_string()));
        }
        if !self.root.is_dir() {
            return Err(DaemonError::Config(format!(
                "Root {:?} is not a directory",
                self.root
            )));
        }
        Ok(())
    }
}
