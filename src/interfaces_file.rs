//! Whole-file access to the interfaces file.
//!
//! Edits read the entire file, change lines in memory and write everything
//! back. The rewrite goes to a temporary file in the same directory that is
//! then renamed over the original, so a crash mid-write leaves either the
//! old or the new content, never a torn file.
//!
//! There is no locking here. Two processes editing the same file at once
//! can lose an update; callers serialize their edits.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{Result, WifiError};
use crate::stanza::split_lines;

pub const DEFAULT_INTERFACES_PATH: &str = "/etc/network/interfaces";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfacesFile {
    path: PathBuf,
}

impl Default for InterfacesFile {
    fn default() -> Self {
        InterfacesFile::new(DEFAULT_INTERFACES_PATH)
    }
}

impl InterfacesFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        InterfacesFile { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the file as terminator-preserving lines, creating it empty if it
    /// does not exist yet.
    pub fn read_lines(&self) -> Result<Vec<String>> {
        if !self.path.exists() {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .map_err(|e| WifiError::file(&self.path, e))?;
        }

        let content = fs::read_to_string(&self.path).map_err(|e| WifiError::file(&self.path, e))?;
        Ok(split_lines(&content))
    }

    /// Replaces the file content with `lines`, atomically.
    pub fn write_lines(&self, lines: &[String]) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut temp = NamedTempFile::new_in(dir).map_err(|e| WifiError::file(dir, e))?;
        temp.write_all(lines.concat().as_bytes())
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|e| WifiError::file(temp.path(), e))?;

        if let Ok(metadata) = fs::metadata(&self.path) {
            temp.as_file()
                .set_permissions(metadata.permissions())
                .map_err(|e| WifiError::file(temp.path(), e))?;
        }

        temp.persist(&self.path)
            .map_err(|e| WifiError::file(&self.path, e.error))?;

        tracing::debug!(path = %self.path.display(), lines = lines.len(), "rewrote interfaces file");
        Ok(())
    }

    /// Reads, lets `edit` change the lines, and writes back only when `edit`
    /// returns true. Returns what `edit` returned.
    pub fn edit<F>(&self, edit: F) -> Result<bool>
    where
        F: FnOnce(&mut Vec<String>) -> bool,
    {
        let mut lines = self.read_lines()?;
        let changed = edit(&mut lines);
        if changed {
            self.write_lines(&lines)?;
        }
        Ok(changed)
    }
}
