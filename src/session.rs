//! Per-connection session state.
//!
//! A session carries the client's display name and its virtual working
//! directory. The working directory is kept as plain path segments below the
//! server root, so it can never name anything above the root.

use bytes::BytesMut;
use std::path::{Component, Path, PathBuf};

/// Display name given to every new session.
pub const DEFAULT_DISPLAY_NAME: &str = "User";

/// Mutable context of one client connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    display_name: String,
    cwd: Vec<String>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Create a session at the root with the default display name.
    pub fn new() -> Self {
        Self {
            display_name: DEFAULT_DISPLAY_NAME.to_string(),
            cwd: Vec::new(),
        }
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn set_display_name(&mut self, name: impl Into<String>) {
        self.display_name = name.into();
    }

    /// Working directory segments below the root.
    pub fn cwd(&self) -> &[String] {
        &self.cwd
    }

    pub fn is_at_root(&self) -> bool {
        self.cwd.is_empty()
    }

    pub fn reset_to_root(&mut self) {
        self.cwd.clear();
    }

    /// Move one segment up. Returns false (and changes nothing) at the root.
    pub fn go_up(&mut self) -> bool {
        if self.is_at_root() {
            return false;
        }
        self.cwd.pop();
        true
    }

    /// Append already validated segments to the working directory.
    pub fn descend(&mut self, segments: Vec<String>) {
        self.cwd.extend(segments);
    }

    /// Absolute path of the working directory under `root`.
    pub fn cwd_path(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        path.extend(self.cwd());
        path
    }

    /// Resolve a client-supplied relative path against the working directory.
    ///
    /// Returns `None` for anything that is not a chain of plain names.
    pub fn resolve(&self, root: &Path, arg: &str) -> Option<PathBuf> {
        let segments = plain_segments(arg)?;
        let mut path = self.cwd_path(root);
        path.extend(segments);
        Some(path)
    }

    /// Append the working-directory banner and the name prompt.
    pub fn write_prompt(&self, root_label: &str, out: &mut BytesMut) {
        out.extend_from_slice(b"Working directory: ~");
        out.extend_from_slice(root_label.as_bytes());
        out.extend_from_slice(b"/");
        for segment in self.cwd() {
            out.extend_from_slice(segment.as_bytes());
            out.extend_from_slice(b"/");
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(self.display_name().as_bytes());
        out.extend_from_slice(b": ");
    }
}

/// Split `arg` into plain path segments.
///
/// Rejects empty input, absolute paths and any `.` or `..` component.
pub fn plain_segments(arg: &str) -> Option<Vec<String>> {
    let mut segments = Vec::new();
    for component in Path::new(arg).components() {
        match component {
            Component::Normal(name) => segments.push(name.to_str()?.to_string()),
            _ => return None,
        }
    }
    if segments.is_empty() {
        None
    } else {
        Some(segments)
    }
}
