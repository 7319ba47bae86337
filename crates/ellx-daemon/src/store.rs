//! Path-contained filesystem resources
//!
//! Every path handed to the store is relative to the configured root. Paths
//! are normalized lexically and rejected with [`DaemonError::PathEscape`] if
//! a `..` segment would climb above the root; a batched write drops such
//! entries and keeps the rest. Containment is checked before the filesystem
//! call, not atomically with it.

use serde_json::Value;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{DaemonError, Result};

/// A resource read from the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    /// Visible entry names, directories suffixed with `/`
    Directory(Vec<String>),
    /// Raw file content
    File(Vec<u8>),
}

/// A set of entries to create under a directory in one request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourcePatch {
    entries: Vec<(String, String)>,
}

impl ResourcePatch {
    /// Create an empty patch
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry; a subpath ending in `/` creates a directory
    pub fn with(mut self, subpath: impl Into<String>, content: impl Into<String>) -> Self {
        self.entries.push((subpath.into(), content.into()));
        self
    }

    /// Parse a `{ "files": [[subpath, content], ...] }` request body
    ///
    /// Items that are not arrays are ignored. Missing or null content is an
    /// empty file; non-string content is written as its JSON text.
    pub fn from_json(body: &Value) -> Result<Self> {
        let files = body
            .get("files")
            .and_then(Value::as_array)
            .ok_or_else(|| DaemonError::BadRequest("Bad files argument".to_string()))?;

        let mut patch = Self::new();
        for item in files.iter().filter_map(Value::as_array) {
            let subpath = item
                .first()
                .and_then(Value::as_str)
                .ok_or_else(|| DaemonError::BadRequest("Bad files argument".to_string()))?;

            let content = match item.get(1) {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            };

            patch.entries.push((decode_path(subpath)?, content));
        }

        Ok(patch)
    }

    /// Entries in submission order
    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Relocation requested through the action endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relocation {
    Move,
    Copy,
}

/// Percent-decode a path received from a client
pub fn decode_path(path: &str) -> Result<String> {
    urlencoding::decode(path)
        .map(|decoded| decoded.into_owned())
        .map_err(|_| DaemonError::BadRequest(format!("Malformed path encoding: {}", path)))
}

/// Append `path` to the root-relative `rel`, refusing to climb above the root
fn push_contained(rel: &mut PathBuf, path: &str) -> Result<()> {
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => rel.push(part),
            Component::ParentDir => {
                if !rel.pop() {
                    return Err(DaemonError::PathEscape);
                }
            }
            Component::CurDir | Component::RootDir => {}
            Component::Prefix(_) => return Err(DaemonError::PathEscape),
        }
    }
    Ok(())
}

/// Filesystem operations confined to a single root directory
#[derive(Debug, Clone)]
pub struct ResourceStore {
    root: PathBuf,
}

impl ResourceStore {
    /// Create a store serving `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The served root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a request path to a root-relative path
    pub fn relative(&self, path: &str) -> Result<PathBuf> {
        let mut rel = PathBuf::new();
        push_contained(&mut rel, path)?;
        Ok(rel)
    }

    /// Resolve a request path to an absolute filesystem path under the root
    pub fn resolve(&self, path: &str) -> Result<PathBuf> {
        Ok(self.root.join(self.relative(path)?))
    }

    /// Look up the resource at `path`
    pub async fn stat(&self, path: &str) -> Result<std::fs::Metadata> {
        let target = self.resolve(path)?;
        Ok(tokio::fs::metadata(&target).await?)
    }

    /// Fail unless `path` is an existing directory
    pub async fn require_dir(&self, path: &str) -> Result<()> {
        if !self.stat(path).await?.is_dir() {
            return Err(DaemonError::TypeMismatch(format!(
                "{} is not a directory",
                path
            )));
        }
        Ok(())
    }

    /// Read a resource: a listing for directories, content for files
    pub async fn get(&self, path: &str) -> Result<Resource> {
        let target = self.resolve(path)?;
        let metadata = tokio::fs::metadata(&target).await?;

        if metadata.is_dir() {
            Ok(Resource::Directory(list_dir(&target).await?))
        } else if metadata.is_file() {
            Ok(Resource::File(tokio::fs::read(&target).await?))
        } else {
            Err(DaemonError::TypeMismatch(
                "Unsupported resource type".to_string(),
            ))
        }
    }

    /// List visible entries of a directory
    pub async fn list(&self, path: &str) -> Result<Vec<String>> {
        let target = self.resolve(path)?;
        let metadata = tokio::fs::metadata(&target).await?;
        if !metadata.is_dir() {
            return Err(DaemonError::TypeMismatch(format!(
                "{} is not a directory",
                path
            )));
        }
        list_dir(&target).await
    }

    /// Read the full content of a file
    pub async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let target = self.resolve(path)?;
        let metadata = tokio::fs::metadata(&target).await?;
        if !metadata.is_file() {
            return Err(DaemonError::TypeMismatch(
                "Unsupported resource type".to_string(),
            ));
        }
        Ok(tokio::fs::read(&target).await?)
    }

    /// Create the entries of `patch` under the directory at `path`
    ///
    /// Entries that would leave the root are dropped. Every remaining entry
    /// is attempted even after one fails; the first failure is returned and
    /// nothing already written is rolled back.
    pub async fn write(&self, path: &str, patch: &ResourcePatch) -> Result<()> {
        let base = self.relative(path)?;
        self.require_dir(path).await?;
        if patch.is_empty() {
            return Ok(());
        }

        let mut planned: Vec<(PathBuf, bool, &str)> = Vec::with_capacity(patch.entries.len());
        let mut positions: HashMap<PathBuf, usize> = HashMap::new();
        for (subpath, content) in &patch.entries {
            let mut rel = base.clone();
            if push_contained(&mut rel, subpath).is_err() {
                warn!("Dropping {:?} under {:?}: outside the root", subpath, path);
                continue;
            }
            let is_dir = subpath.ends_with('/');

            // Later entries for the same path win
            match positions.get(&rel) {
                Some(&index) => planned[index] = (rel, is_dir, content.as_str()),
                None => {
                    positions.insert(rel.clone(), planned.len());
                    planned.push((rel, is_dir, content.as_str()));
                }
            }
        }

        let mut first_error = None;
        for (rel, is_dir, content) in planned {
            if rel.as_os_str().is_empty() {
                // The target directory itself, which already exists
                continue;
            }
            if let Err(e) = self.write_entry(&rel, is_dir, content).await {
                warn!("Failed to write {:?}: {}", rel, e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn write_entry(&self, rel: &Path, is_dir: bool, content: &str) -> Result<()> {
        self.ensure_ancestors(rel).await?;

        let target = self.root.join(rel);
        if is_dir {
            debug!("Creating directory {:?}", target);
            ignore_exists(tokio::fs::create_dir(&target).await)
        } else {
            debug!("Writing {} bytes to {:?}", content.len(), target);
            Ok(tokio::fs::write(&target, content.as_bytes()).await?)
        }
    }

    /// Remove a file, or a directory with everything below it
    pub async fn remove(&self, path: &str) -> Result<()> {
        let rel = self.relative(path)?;
        let target = self.root.join(&rel);
        let metadata = tokio::fs::metadata(&target).await?;

        if rel.as_os_str().is_empty() {
            return Err(DaemonError::BadRequest(
                "Cannot remove the root directory".to_string(),
            ));
        }

        if metadata.is_dir() {
            tokio::fs::remove_dir_all(&target).await?;
        } else {
            tokio::fs::remove_file(&target).await?;
        }
        Ok(())
    }

    /// Rename a resource within the root
    pub async fn move_to(&self, path: &str, destination: &str) -> Result<()> {
        self.relocate(path, destination, Relocation::Move).await
    }

    /// Duplicate a resource within the root, recursively for directories
    pub async fn copy_to(&self, path: &str, destination: &str) -> Result<()> {
        self.relocate(path, destination, Relocation::Copy).await
    }

    /// Move or copy `path` to `destination`, both checked independently
    pub async fn relocate(&self, path: &str, destination: &str, how: Relocation) -> Result<()> {
        let source_rel = self.relative(path)?;
        let source = self.root.join(&source_rel);
        let metadata = tokio::fs::metadata(&source).await?;

        let dest_rel = self.relative(destination)?;
        let dest = self.root.join(&dest_rel);

        if source_rel.as_os_str().is_empty() {
            return Err(DaemonError::BadRequest(
                "Cannot relocate the root directory".to_string(),
            ));
        }

        match how {
            Relocation::Move => {
                debug!("Moving {:?} to {:?}", source, dest);
                tokio::fs::rename(&source, &dest).await?;
            }
            Relocation::Copy if metadata.is_dir() => {
                if dest_rel.starts_with(&source_rel) {
                    return Err(DaemonError::BadRequest(
                        "Cannot copy a directory into itself".to_string(),
                    ));
                }
                debug!("Copying directory {:?} to {:?}", source, dest);
                copy_dir(&source, &dest).await?;
            }
            Relocation::Copy => {
                debug!("Copying {:?} to {:?}", source, dest);
                tokio::fs::copy(&source, &dest).await?;
            }
        }
        Ok(())
    }

    /// Create every missing directory between the root and `rel`'s parent
    ///
    /// Bounded by the number of segments in `rel`.
    async fn ensure_ancestors(&self, rel: &Path) -> Result<()> {
        let Some(parent) = rel.parent() else {
            return Ok(());
        };

        let mut current = self.root.clone();
        for component in parent.components() {
            current.push(component);
            ignore_exists(tokio::fs::create_dir(&current).await)?;
        }
        Ok(())
    }
}

/// Treat "already exists" as success
fn ignore_exists(result: std::io::Result<()>) -> Result<()> {
    match result {
        Err(e) if e.kind() != std::io::ErrorKind::AlreadyExists => Err(e.into()),
        _ => Ok(()),
    }
}

/// Names of visible files and directories, directories suffixed with `/`
async fn list_dir(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }

        let file_type = entry.file_type().await?;
        if file_type.is_dir() {
            names.push(format!("{}/", name));
        } else if file_type.is_file() {
            names.push(name);
        }
    }

    Ok(names)
}

/// Recreate `from` at `to`, copying every file
async fn copy_dir(from: &Path, to: &Path) -> Result<()> {
    let mut pending = vec![(from.to_path_buf(), to.to_path_buf())];

    while let Some((source, dest)) = pending.pop() {
        tokio::fs::create_dir(&dest).await?;

        let mut entries = tokio::fs::read_dir(&source).await?;
        while let Some(entry) = entries.next_entry().await? {
            let target = dest.join(entry.file_name());
            if entry.file_type().await?.is_dir() {
                pending.push((entry.path(), target));
            } else {
                tokio::fs::copy(entry.path(), &target).await?;
            }
        }
    }

    Ok(())
}
