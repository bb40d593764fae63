//! In-memory mirror of the watched subtree's shape.
//!
//! Every known directory owns a map of its direct children keyed by
//! absolute path. Parents are found by path, never by reference, so a
//! subtree can be detached or grafted with plain map operations.

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::error::{Result, WatchError};
use crate::filter::FilterPair;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeCache {
    root: PathBuf,
    dirs: HashMap<PathBuf, HashMap<PathBuf, EntryKind>>,
}

impl TreeCache {
    /// A cache holding only the (empty) root directory.
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        let root = root.into();
        let mut dirs = HashMap::new();
        dirs.insert(root.clone(), HashMap::new());
        Self { root, dirs }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// True when `path` is the root or lies beneath it.
    pub fn covers(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
    }

    pub fn kind(&self, path: &Path) -> Option<EntryKind> {
        if path == self.root {
            return Some(EntryKind::Dir);
        }
        let parent = path.parent()?;
        self.dirs.get(parent)?.get(path).copied()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.kind(path).is_some()
    }

    pub fn is_file(&self, path: &Path) -> bool {
        self.kind(path) == Some(EntryKind::File)
    }

    pub fn is_directory(&self, path: &Path) -> bool {
        self.dirs.contains_key(path)
    }

    /// Record a directory, linking it (and any untracked ancestors below the
    /// root) into its parent. An existing entry keeps its children.
    ///
    /// Returns false when the path lies outside the root.
    pub fn insert_directory(&mut self, path: &Path) -> bool {
        if !self.covers(path) {
            return false;
        }
        self.dirs.entry(path.to_path_buf()).or_default();
        if path != self.root {
            if let Some(parent) = path.parent() {
                self.link(parent, path, EntryKind::Dir);
            }
        }
        true
    }

    /// Detach a directory and everything recorded under it.
    ///
    /// Returns every descendant in depth-first pre-order; the directory
    /// itself is not included. Removing the root empties it but keeps its
    /// entry.
    pub fn remove_directory(&mut self, path: &Path) -> Vec<(PathBuf, EntryKind)> {
        if path != self.root {
            if let Some(siblings) = path.parent().and_then(|parent| self.dirs.get_mut(parent)) {
                siblings.remove(path);
            }
        }

        let mut removed = Vec::new();
        self.detach(path, &mut removed);

        if path == self.root {
            self.dirs.insert(self.root.clone(), HashMap::new());
        }
        removed
    }

    /// Record a file under its parent, tracking the parent chain if needed.
    ///
    /// Returns false when the path is the root or lies outside it.
    pub fn insert_file(&mut self, path: &Path) -> bool {
        if path == self.root || !self.covers(path) {
            return false;
        }
        match path.parent() {
            Some(parent) => {
                self.link(parent, path, EntryKind::File);
                true
            }
            None => false,
        }
    }

    /// Returns true when a tracked file was dropped.
    pub fn remove_file(&mut self, path: &Path) -> bool {
        let Some(siblings) = path.parent().and_then(|parent| self.dirs.get_mut(parent)) else {
            return false;
        };
        if siblings.get(path) == Some(&EntryKind::File) {
            siblings.remove(path);
            true
        } else {
            false
        }
    }

    /// All tracked files, sorted.
    pub fn files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self
            .dirs
            .values()
            .flat_map(|children| children.iter())
            .filter(|(_, kind)| **kind == EntryKind::File)
            .map(|(path, _)| path.clone())
            .collect();
        files.sort();
        files
    }

    /// All tracked directories including the root, sorted.
    pub fn directories(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = self.dirs.keys().cloned().collect();
        dirs.sort();
        dirs
    }

    /// Graft a cache built off to the side for a subtree of this one.
    ///
    /// The fragment's directories replace any existing entries with the same
    /// path; callers detach a stale subtree first.
    pub fn merge(&mut self, fragment: TreeCache) -> bool {
        if !self.covers(&fragment.root) {
            return false;
        }
        let fragment_root = fragment.root.clone();
        for (dir, children) in fragment.dirs {
            self.dirs.insert(dir, children);
        }
        self.insert_directory(&fragment_root)
    }

    /// Path of `path` below the root, `/`-separated.
    pub fn relative(&self, path: &Path) -> Option<String> {
        relative_path(&self.root, path)
    }

    fn link(&mut self, parent: &Path, child: &Path, kind: EntryKind) {
        if !self.dirs.contains_key(parent) {
            self.insert_directory(parent);
        }
        if let Some(children) = self.dirs.get_mut(parent) {
            children.insert(child.to_path_buf(), kind);
        }
    }

    fn detach(&mut self, dir: &Path, removed: &mut Vec<(PathBuf, EntryKind)>) {
        let Some(children) = self.dirs.remove(dir) else {
            return;
        };
        let mut children: Vec<(PathBuf, EntryKind)> = children.into_iter().collect();
        children.sort();

        for (child, kind) in children {
            removed.push((child.clone(), kind));
            if kind == EntryKind::Dir {
                self.detach(&child, removed);
            }
        }
    }
}

/// `/`-separated path of `path` relative to `root`; `None` outside the root.
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rest = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rest
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    Some(parts.join("/"))
}

/// Canonical form of a watch root, checked to be a readable directory.
pub fn resolve_root(path: &Path) -> Result<PathBuf> {
    let root = path
        .canonicalize()
        .map_err(|err| WatchError::configuration(path, err))?;
    if !root.is_dir() {
        return Err(WatchError::configuration(path, "not a directory"));
    }
    fs::read_dir(&root).map_err(|err| WatchError::configuration(path, err))?;
    Ok(root)
}

/// Result of listing a directory: its shape and the visible files found,
/// in walk order.
#[derive(Debug, Clone)]
pub struct Scan {
    pub tree: TreeCache,
    pub files: Vec<PathBuf>,
}

/// List `dir` into a fresh cache rooted at `dir`.
///
/// Files failing `filter` are neither recorded nor reported. Directories are
/// recorded and descended into whatever the filter says. Symbolic links are
/// not followed and not recorded.
pub fn scan(dir: &Path, filter: &FilterPair, recursive: bool) -> Result<Scan> {
    if !dir.is_dir() {
        return Err(WatchError::configuration(dir, "not a directory"));
    }
    fs::read_dir(dir).map_err(|err| WatchError::configuration(dir, err))?;

    let mut tree = TreeCache::new(dir);
    let mut files = Vec::new();

    let mut builder = WalkBuilder::new(dir);
    builder
        .standard_filters(false)
        .follow_links(false)
        .sort_by_file_name(|a, b| a.cmp(b));
    if !recursive {
        builder.max_depth(Some(1));
    }

    for result in builder.build() {
        let entry = match result {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Error walking directory: {}", err);
                continue;
            }
        };
        if entry.depth() == 0 {
            continue;
        }

        let path = entry.path();
        match entry.file_type() {
            Some(file_type) if file_type.is_dir() => {
                tree.insert_directory(path);
            }
            Some(file_type) if file_type.is_file() => {
                if filter.accepts(path) {
                    tree.insert_file(path);
                    files.push(path.to_path_buf());
                } else {
                    debug!("Filtered out {}", path.display());
                }
            }
            _ => trace!("Skipping {}", path.display()),
        }
    }

    debug!("Scanned {}: {} files", dir.display(), files.len());
    Ok(Scan { tree, files })
}
