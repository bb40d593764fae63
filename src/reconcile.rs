//! Turns raw notifier events into file add/change/remove events.
//!
//! The reconciler owns the tree cache. Each raw event mutates the cache
//! first and then reports the file events it implies, so anything reading the
//! cache while handling those events sees the post-event state.

use std::path::{Path, PathBuf};

use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::events::{FileEvent, RawEvent, RawEventKind};
use crate::filter::FilterPair;
use crate::tree::{self, EntryKind, Scan, TreeCache};

/// What one raw event produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Applied {
    pub events: Vec<FileEvent>,
    /// A directory moved in; it must be scanned and [`Reconciler::graft`]ed.
    pub rescan: Option<PathBuf>,
}

impl Applied {
    fn none() -> Self {
        Self::default()
    }

    fn emit(events: Vec<FileEvent>) -> Self {
        Self { events, rescan: None }
    }
}

#[derive(Debug, Clone)]
pub struct Reconciler {
    filter: FilterPair,
    tree: TreeCache,
    recursive: bool,
}

impl Reconciler {
    /// `root` should already be canonical; see [`tree::resolve_root`].
    pub fn new<P: Into<PathBuf>>(root: P, filter: FilterPair, recursive: bool) -> Self {
        Self {
            filter,
            tree: TreeCache::new(root),
            recursive,
        }
    }

    pub fn root(&self) -> &Path {
        self.tree.root()
    }

    pub fn tree(&self) -> &TreeCache {
        &self.tree
    }

    /// List the root synchronously and install the result.
    pub fn initial_scan(&mut self, skip_initial: bool) -> Result<Vec<FileEvent>> {
        let scan = tree::scan(self.tree.root(), &self.filter, self.recursive)?;
        Ok(self.install(scan, skip_initial))
    }

    /// Replace the cache with a scan of the root.
    pub fn install(&mut self, scan: Scan, skip_initial: bool) -> Vec<FileEvent> {
        self.tree = scan.tree;
        if skip_initial {
            return Vec::new();
        }
        scan.files
            .iter()
            .filter_map(|path| self.tree.relative(path))
            .map(FileEvent::add)
            .collect()
    }

    pub fn apply(&mut self, event: &RawEvent) -> Applied {
        let path = event.full_path();
        trace!("Raw event {} on {} (dir: {})", event.kind, path.display(), event.is_dir);

        if event.event_name.is_none() {
            debug!("Ignoring {} on watch {}", event.kind, path.display());
            return Applied::none();
        }
        if path == self.tree.root() || !self.tree.covers(&path) {
            debug!("Ignoring {} outside the watch root: {}", event.kind, path.display());
            return Applied::none();
        }

        match event.kind {
            RawEventKind::Create | RawEventKind::MovedTo if !event.is_dir => self.file_appeared(&path),
            RawEventKind::Create | RawEventKind::MovedTo if !self.recursive => {
                self.tree.insert_directory(&path);
                Applied::none()
            }
            RawEventKind::Create => {
                self.tree.insert_directory(&path);
                Applied::none()
            }
            RawEventKind::MovedTo => Applied {
                events: Vec::new(),
                rescan: Some(path),
            },
            RawEventKind::Modify => self.file_modified(&path, event.is_dir),
            RawEventKind::Delete | RawEventKind::MovedFrom if !event.is_dir => self.file_vanished(&path),
            RawEventKind::Delete | RawEventKind::MovedFrom => Applied::emit(self.directory_vanished(&path)),
            RawEventKind::Access
            | RawEventKind::Attrib
            | RawEventKind::CloseWrite
            | RawEventKind::CloseNowrite
            | RawEventKind::Close
            | RawEventKind::Open
            | RawEventKind::Move
            | RawEventKind::MoveSelf
            | RawEventKind::DeleteSelf
            | RawEventKind::Unmount
            | RawEventKind::Ignored => {
                trace!("No reconciliation for {}", event.kind);
                Applied::none()
            }
        }
    }

    /// Apply an event, scanning a moved-in directory inline.
    pub fn apply_blocking(&mut self, event: &RawEvent) -> Vec<FileEvent> {
        let applied = self.apply(event);
        match applied.rescan {
            Some(dir) => self.moved_in_directory(&dir),
            None => applied.events,
        }
    }

    /// Scan a directory that appeared by rename and graft it.
    pub fn moved_in_directory(&mut self, dir: &Path) -> Vec<FileEvent> {
        match tree::scan(dir, &self.filter, self.recursive) {
            Ok(scan) => self.graft(scan),
            Err(err) => {
                warn!("Could not scan moved-in directory: {}", err);
                Vec::new()
            }
        }
    }

    /// Install a scan of a moved-in directory, replacing whatever was
    /// tracked at that path.
    pub fn graft(&mut self, scan: Scan) -> Vec<FileEvent> {
        let dir = scan.tree.root().to_path_buf();
        if !self.tree.covers(&dir) || dir == self.tree.root() {
            warn!("Refusing to graft {} outside the watch root", dir.display());
            return Vec::new();
        }

        let mut events = if self.tree.contains(&dir) {
            self.directory_vanished(&dir)
        } else {
            Vec::new()
        };

        self.tree.merge(scan.tree);
        events.extend(
            scan.files
                .iter()
                .filter_map(|path| self.tree.relative(path))
                .map(FileEvent::add),
        );
        debug!("Grafted {} ({} files)", dir.display(), scan.files.len());
        events
    }

    fn file_appeared(&mut self, path: &Path) -> Applied {
        if !self.filter.accepts(path) {
            debug!("Filtered out {}", path.display());
            return Applied::none();
        }
        if self.tree.is_file(path) {
            debug!("Already tracking {}", path.display());
            return Applied::none();
        }
        // A directory replaced by a file of the same name.
        let mut events = if self.tree.is_directory(path) {
            self.directory_vanished(path)
        } else {
            Vec::new()
        };

        self.tree.insert_file(path);
        events.extend(self.relative_event(path, FileEvent::add).events);
        Applied::emit(events)
    }

    fn file_modified(&self, path: &Path, is_dir: bool) -> Applied {
        if is_dir || !self.tree.is_file(path) {
            debug!("Ignoring modify on untracked {}", path.display());
            return Applied::none();
        }
        self.relative_event(path, FileEvent::change)
    }

    fn file_vanished(&mut self, path: &Path) -> Applied {
        if !self.tree.remove_file(path) {
            debug!("Ignoring removal of untracked {}", path.display());
            return Applied::none();
        }
        self.relative_event(path, FileEvent::remove)
    }

    fn directory_vanished(&mut self, dir: &Path) -> Vec<FileEvent> {
        if !self.tree.is_directory(dir) && !self.tree.contains(dir) {
            debug!("Ignoring removal of untracked directory {}", dir.display());
            return Vec::new();
        }
        self.tree
            .remove_directory(dir)
            .into_iter()
            .filter(|(_, kind)| *kind == EntryKind::File)
            .filter_map(|(path, _)| self.tree.relative(&path))
            .map(FileEvent::remove)
            .collect()
    }

    fn relative_event(&self, path: &Path, make: fn(String) -> FileEvent) -> Applied {
        match self.tree.relative(path) {
            Some(rel) => Applied::emit(vec![make(rel)]),
            None => Applied::none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::fs;
    use tempfile::TempDir;

    fn raw(kind: RawEventKind, name: &str, is_dir: bool) -> RawEvent {
        let path = Path::new("/w").join(name);
        let (watch, entry) = (path.parent().unwrap().to_path_buf(), path.file_name().unwrap().to_string_lossy().into_owned());
        RawEvent::new(kind, watch, Some(entry.as_str()), is_dir)
    }

    fn reconciler() -> Reconciler {
        Reconciler::new("/w", FilterPair::default(), true)
    }

    #[test]
    fn test_file_lifecycle() {
        let mut r = reconciler();

        assert_eq!(r.apply_blocking(&raw(RawEventKind::Create, "a.txt", false)), vec![FileEvent::add("a.txt")]);
        assert_eq!(r.apply_blocking(&raw(RawEventKind::Modify, "a.txt", false)), vec![FileEvent::change("a.txt")]);
        assert_eq!(r.apply_blocking(&raw(RawEventKind::Delete, "a.txt", false)), vec![FileEvent::remove("a.txt")]);
        assert!(r.tree().files().is_empty());
    }

    #[test]
    fn test_directory_events_are_silent() {
        let mut r = reconciler();
        assert!(r.apply_blocking(&raw(RawEventKind::Create, "d", true)).is_empty());
        assert!(r.tree().is_directory(Path::new("/w/d")));
        assert!(r.apply_blocking(&raw(RawEventKind::Modify, "d", true)).is_empty());
        assert!(r.apply_blocking(&raw(RawEventKind::Delete, "d", true)).is_empty());
        assert!(!r.tree().contains(Path::new("/w/d")));
    }

    #[test]
    fn test_untracked_paths_are_ignored() {
        let mut r = reconciler();
        assert!(r.apply_blocking(&raw(RawEventKind::Modify, "ghost", false)).is_empty());
        assert!(r.apply_blocking(&raw(RawEventKind::Delete, "ghost", false)).is_empty());
        assert!(r.apply_blocking(&raw(RawEventKind::MovedFrom, "ghost", true)).is_empty());

        let outside = RawEvent::new(RawEventKind::Create, "/elsewhere", Some("x"), false);
        assert!(r.apply_blocking(&outside).is_empty());
        let on_root = RawEvent::new(RawEventKind::DeleteSelf, "/w", None, true);
        assert!(r.apply_blocking(&on_root).is_empty());
    }

    #[test]
    fn test_cascade_emits_one_remove_per_file() {
        let mut r = reconciler();
        for name in ["d/a", "d/e/b", "d/e/f/c", "d/e/f/g/h"] {
            r.apply_blocking(&raw(RawEventKind::Create, name, false));
        }
        r.apply_blocking(&raw(RawEventKind::Create, "d/empty", true));
        r.apply_blocking(&raw(RawEventKind::Create, "other", false));

        let removed = r.apply_blocking(&raw(RawEventKind::Delete, "d", true));
        let paths: BTreeSet<_> = removed.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(removed.len(), 4);
        assert!(removed.iter().all(|e| e.kind == crate::FileEventKind::Remove));
        assert_eq!(paths, BTreeSet::from(["d/a", "d/e/b", "d/e/f/c", "d/e/f/g/h"]));
        assert_eq!(r.tree().files(), vec![PathBuf::from("/w/other")]);
    }

    #[test]
    fn test_moved_from_directory_cascades() {
        let mut r = reconciler();
        r.apply_blocking(&raw(RawEventKind::Create, "d/x", false));
        assert_eq!(r.apply_blocking(&raw(RawEventKind::MovedFrom, "d", true)), vec![FileEvent::remove("d/x")]);
    }

    #[test]
    fn test_filter_hides_files() {
        let filter = FilterPair::compile(None, Some(r"\.tmp$")).unwrap();
        let mut r = Reconciler::new("/w", filter, true);

        assert!(r.apply_blocking(&raw(RawEventKind::Create, "f.tmp", false)).is_empty());
        assert!(r.apply_blocking(&raw(RawEventKind::Modify, "f.tmp", false)).is_empty());
        assert!(r.apply_blocking(&raw(RawEventKind::Delete, "f.tmp", false)).is_empty());
        assert_eq!(r.apply_blocking(&raw(RawEventKind::Create, "f.txt", false)), vec![FileEvent::add("f.txt")]);
    }

    #[test]
    fn test_repeated_create_is_reported_once() {
        let mut r = reconciler();
        assert_eq!(r.apply_blocking(&raw(RawEventKind::Create, "a", false)).len(), 1);
        assert!(r.apply_blocking(&raw(RawEventKind::MovedTo, "a", false)).is_empty());
    }

    #[test]
    fn test_moved_to_directory_requests_rescan() {
        let mut r = reconciler();
        let applied = r.apply(&raw(RawEventKind::MovedTo, "sub", true));
        assert!(applied.events.is_empty());
        assert_eq!(applied.rescan, Some(PathBuf::from("/w/sub")));
    }

    #[test]
    fn test_non_recursive_move_in_records_directory_only() {
        let mut r = Reconciler::new("/w", FilterPair::default(), false);
        let applied = r.apply(&raw(RawEventKind::MovedTo, "sub", true));
        assert_eq!(applied, Applied::default());
        assert!(r.tree().is_directory(Path::new("/w/sub")));
    }

    #[test]
    fn test_graft_replaces_stale_subtree() {
        let mut r = reconciler();
        r.apply_blocking(&raw(RawEventKind::Create, "sub/old", false));

        let mut fragment = TreeCache::new("/w/sub");
        fragment.insert_file(Path::new("/w/sub/new"));
        let scan = Scan {
            tree: fragment,
            files: vec![PathBuf::from("/w/sub/new")],
        };

        assert_eq!(r.graft(scan), vec![FileEvent::remove("sub/old"), FileEvent::add("sub/new")]);
        assert_eq!(r.tree().files(), vec![PathBuf::from("/w/sub/new")]);
    }

    #[test]
    fn test_other_kinds_do_nothing() {
        let mut r = reconciler();
        r.apply_blocking(&raw(RawEventKind::Create, "a", false));
        for kind in [RawEventKind::Access, RawEventKind::Attrib, RawEventKind::CloseWrite, RawEventKind::Open] {
            assert!(r.apply_blocking(&raw(kind, "a", false)).is_empty());
        }
        assert_eq!(r.tree().files().len(), 1);
    }

    #[test]
    fn test_cache_matches_emitted_events() {
        let mut r = reconciler();
        let script = [
            (RawEventKind::Create, "a", false),
            (RawEventKind::Create, "d", true),
            (RawEventKind::Create, "d/b", false),
            (RawEventKind::Create, "d/e/c", false),
            (RawEventKind::MovedFrom, "a", false),
            (RawEventKind::MovedTo, "d/a", false),
            (RawEventKind::Modify, "d/b", false),
            (RawEventKind::Delete, "d/e", true),
            (RawEventKind::Create, "z", false),
            (RawEventKind::Delete, "d/b", false),
        ];

        let mut live = BTreeSet::new();
        for (kind, name, is_dir) in script {
            for event in r.apply_blocking(&raw(kind, name, is_dir)) {
                match event.kind {
                    crate::FileEventKind::Add => assert!(live.insert(event.path)),
                    crate::FileEventKind::Remove => assert!(live.remove(&event.path)),
                    crate::FileEventKind::Change => assert!(live.contains(&event.path)),
                }
            }
        }

        let tracked: BTreeSet<String> = r.tree().files().iter().filter_map(|p| r.tree().relative(p)).collect();
        assert_eq!(tracked, live);
        assert_eq!(live, BTreeSet::from(["d/a".to_string(), "z".to_string()]));
    }

    #[test]
    fn test_initial_scan_and_move_in() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = tree::resolve_root(temp_dir.path()).unwrap();
        fs::write(root.join("a.txt"), "a").unwrap();

        let mut r = Reconciler::new(&root, FilterPair::default(), true);
        assert_eq!(r.initial_scan(false).unwrap(), vec![FileEvent::add("a.txt")]);

        let mut quiet = Reconciler::new(&root, FilterPair::default(), true);
        assert!(quiet.initial_scan(true).unwrap().is_empty());
        assert_eq!(quiet.tree().files(), vec![root.join("a.txt")]);

        fs::create_dir_all(root.join("sub/deep")).unwrap();
        fs::write(root.join("sub/x.txt"), "").unwrap();
        fs::write(root.join("sub/deep/y.txt"), "").unwrap();

        let moved = RawEvent::new(RawEventKind::MovedTo, &root, Some("sub"), true);
        let added: BTreeSet<_> = r.apply_blocking(&moved).into_iter().collect();
        assert_eq!(added, BTreeSet::from([FileEvent::add("sub/deep/y.txt"), FileEvent::add("sub/x.txt")]));
        assert!(r.tree().is_directory(&root.join("sub/deep")));
    }

    #[test]
    fn test_move_in_of_vanished_directory_is_quiet() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = tree::resolve_root(temp_dir.path()).unwrap();
        let mut r = Reconciler::new(&root, FilterPair::default(), true);

        let moved = RawEvent::new(RawEventKind::MovedTo, &root, Some("gone"), true);
        assert!(r.apply_blocking(&moved).is_empty());
    }
}
