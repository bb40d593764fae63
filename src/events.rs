use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{NotifierError, WatchError};

/// Separator between fields of a notifier record.
pub const FIELD_SEPARATOR: char = '|';

/// `--format` argument producing records [`parse_record`] understands.
pub const RECORD_FORMAT: &str = "%e|%w|%f|%T";

/// inotify event names as printed by the notifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawEventKind {
    Access,
    Modify,
    Attrib,
    CloseWrite,
    CloseNowrite,
    Close,
    Open,
    MovedTo,
    MovedFrom,
    Move,
    MoveSelf,
    Create,
    Delete,
    DeleteSelf,
    Unmount,
    Ignored,
}

impl RawEventKind {
    pub const ALL: [RawEventKind; 16] = [
        RawEventKind::Access,
        RawEventKind::Modify,
        RawEventKind::Attrib,
        RawEventKind::CloseWrite,
        RawEventKind::CloseNowrite,
        RawEventKind::Close,
        RawEventKind::Open,
        RawEventKind::MovedTo,
        RawEventKind::MovedFrom,
        RawEventKind::Move,
        RawEventKind::MoveSelf,
        RawEventKind::Create,
        RawEventKind::Delete,
        RawEventKind::DeleteSelf,
        RawEventKind::Unmount,
        RawEventKind::Ignored,
    ];

    /// Lowercase name, as accepted by `--event`.
    pub fn name(self) -> &'static str {
        match self {
            RawEventKind::Access => "access",
            RawEventKind::Modify => "modify",
            RawEventKind::Attrib => "attrib",
            RawEventKind::CloseWrite => "close_write",
            RawEventKind::CloseNowrite => "close_nowrite",
            RawEventKind::Close => "close",
            RawEventKind::Open => "open",
            RawEventKind::MovedTo => "moved_to",
            RawEventKind::MovedFrom => "moved_from",
            RawEventKind::Move => "move",
            RawEventKind::MoveSelf => "move_self",
            RawEventKind::Create => "create",
            RawEventKind::Delete => "delete",
            RawEventKind::DeleteSelf => "delete_self",
            RawEventKind::Unmount => "unmount",
            RawEventKind::Ignored => "ignored",
        }
    }
}

impl fmt::Display for RawEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RawEventKind {
    type Err = String;

    /// Accepts either case: `CLOSE_WRITE` from records, `close_write` from users.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        RawEventKind::ALL
            .into_iter()
            .find(|kind| kind.name() == lower)
            .ok_or_else(|| format!("unknown event kind: {}", s))
    }
}

/// One kernel event as reported by the notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub kind: RawEventKind,
    /// Directory (or watched file) the event fired on, without trailing slash.
    pub watch_path: PathBuf,
    /// Entry name within `watch_path`; absent for events on the watch itself.
    pub event_name: Option<String>,
    pub is_dir: bool,
    pub timestamp: Option<DateTime<Utc>>,
}

impl RawEvent {
    pub fn new(kind: RawEventKind, watch_path: impl Into<PathBuf>, event_name: Option<&str>, is_dir: bool) -> Self {
        Self {
            kind,
            watch_path: watch_path.into(),
            event_name: event_name.map(str::to_string),
            is_dir,
            timestamp: None,
        }
    }

    pub fn full_path(&self) -> PathBuf {
        match &self.event_name {
            Some(name) => self.watch_path.join(name),
            None => self.watch_path.clone(),
        }
    }
}

/// Parse one `%e|%w|%f|%T` record into one event per reported kind.
///
/// Entry names may contain the separator; watch paths of directories end in
/// `/`, so the boundary is the last `/|` in the middle section.
pub fn parse_record(line: &str) -> Result<Vec<RawEvent>, NotifierError> {
    let line = line.trim_end_matches(['\r', '\n']);

    let (kinds, rest) = line
        .split_once(FIELD_SEPARATOR)
        .ok_or_else(|| NotifierError::malformed(line, "missing fields"))?;
    let (middle, stamp) = rest
        .rsplit_once(FIELD_SEPARATOR)
        .ok_or_else(|| NotifierError::malformed(line, "missing timestamp field"))?;

    let (watch, name) = match middle.rfind("/|") {
        Some(at) => (&middle[..at + 1], &middle[at + 2..]),
        None => middle
            .split_once(FIELD_SEPARATOR)
            .ok_or_else(|| NotifierError::malformed(line, "missing file name field"))?,
    };
    if watch.is_empty() {
        return Err(NotifierError::malformed(line, "empty watch path"));
    }

    let timestamp = parse_timestamp(stamp).ok_or_else(|| NotifierError::malformed(line, "bad timestamp"))?;

    let mut is_dir = false;
    let mut parsed = Vec::new();
    for name in kinds.split(',').filter(|name| !name.is_empty()) {
        if name == "ISDIR" {
            is_dir = true;
            continue;
        }
        let kind = name
            .parse::<RawEventKind>()
            .map_err(|reason| NotifierError::malformed(line, reason))?;
        parsed.push(kind);
    }
    if parsed.is_empty() {
        return Err(NotifierError::malformed(line, "no event kind"));
    }

    let watch_path = strip_trailing_slash(watch);
    let event_name = (!name.is_empty()).then_some(name);

    Ok(parsed
        .into_iter()
        .map(|kind| {
            let mut event = RawEvent::new(kind, watch_path.clone(), event_name, is_dir);
            event.timestamp = timestamp;
            event
        })
        .collect())
}

/// `Some(None)` for an empty field, `None` when unparsable.
fn parse_timestamp(field: &str) -> Option<Option<DateTime<Utc>>> {
    let field = field.trim();
    if field.is_empty() {
        return Some(None);
    }
    let seconds: i64 = field.parse().ok()?;
    DateTime::<Utc>::from_timestamp(seconds, 0).map(Some)
}

fn strip_trailing_slash(path: &str) -> PathBuf {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        PathBuf::from("/")
    } else {
        PathBuf::from(trimmed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileEventKind {
    Add,
    Change,
    Remove,
}

impl FileEventKind {
    pub fn name(self) -> &'static str {
        match self {
            FileEventKind::Add => "add",
            FileEventKind::Change => "change",
            FileEventKind::Remove => "remove",
        }
    }
}

impl fmt::Display for FileEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A file appeared, changed or disappeared. `path` is relative to the watch
/// root with `/` separators.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileEvent {
    pub kind: FileEventKind,
    pub path: String,
}

impl FileEvent {
    pub fn new(kind: FileEventKind, path: impl Into<String>) -> Self {
        Self { kind, path: path.into() }
    }

    pub fn add(path: impl Into<String>) -> Self {
        Self::new(FileEventKind::Add, path)
    }

    pub fn change(path: impl Into<String>) -> Self {
        Self::new(FileEventKind::Change, path)
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self::new(FileEventKind::Remove, path)
    }
}

/// Everything a [`crate::Watch`] delivers, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    File(FileEvent),
    Error(WatchError),
}

impl From<FileEvent> for WatchEvent {
    fn from(event: FileEvent) -> Self {
        WatchEvent::File(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_file_create() {
        let events = parse_record("CREATE|/w/|a.txt|1700000000").unwrap();
        assert_eq!(events.len(), 1);

        let event = &events[0];
        assert_eq!(event.kind, RawEventKind::Create);
        assert_eq!(event.watch_path, PathBuf::from("/w"));
        assert_eq!(event.event_name.as_deref(), Some("a.txt"));
        assert!(!event.is_dir);
        assert_eq!(event.full_path(), PathBuf::from("/w/a.txt"));
        assert_eq!(event.timestamp.map(|t| t.timestamp()), Some(1_700_000_000));
    }

    #[test]
    fn test_parse_isdir_and_multiple_kinds() {
        let events = parse_record("CLOSE_WRITE,CLOSE|/w/sub/|x|").unwrap();
        let kinds: Vec<_> = events.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![RawEventKind::CloseWrite, RawEventKind::Close]);
        assert!(events.iter().all(|e| e.timestamp.is_none()));

        let dir = parse_record("MOVED_TO,ISDIR|/w/|sub|1").unwrap();
        assert_eq!(dir.len(), 1);
        assert!(dir[0].is_dir);
        assert_eq!(dir[0].kind, RawEventKind::MovedTo);
    }

    #[test]
    fn test_parse_names_containing_separator() {
        let events = parse_record("MODIFY|/w/odd|dir/|we|ird|name|5").unwrap();
        assert_eq!(events[0].watch_path, PathBuf::from("/w/odd|dir"));
        assert_eq!(events[0].event_name.as_deref(), Some("we|ird|name"));
    }

    #[test]
    fn test_parse_self_event() {
        let events = parse_record("DELETE_SELF|/w/gone/||").unwrap();
        assert_eq!(events[0].kind, RawEventKind::DeleteSelf);
        assert_eq!(events[0].event_name, None);
        assert_eq!(events[0].full_path(), PathBuf::from("/w/gone"));

        let file_watch = parse_record("MODIFY|/w/file.txt||").unwrap();
        assert_eq!(file_watch[0].watch_path, PathBuf::from("/w/file.txt"));
        assert_eq!(file_watch[0].event_name, None);
    }

    #[test]
    fn test_parse_malformed() {
        for line in ["", "CREATE", "CREATE|/w/", "FROB|/w/|a|", "ISDIR|/w/|a|", "CREATE|/w/|a|soon"] {
            let err = parse_record(line).unwrap_err();
            assert!(matches!(err, NotifierError::MalformedRecord { .. }), "{:?}", line);
        }
    }

    #[test]
    fn test_kind_names() {
        assert_eq!("MOVED_FROM".parse::<RawEventKind>(), Ok(RawEventKind::MovedFrom));
        assert_eq!("close_nowrite".parse::<RawEventKind>(), Ok(RawEventKind::CloseNowrite));
        for kind in RawEventKind::ALL {
            assert_eq!(kind.name().parse::<RawEventKind>(), Ok(kind));
        }
    }

    #[test]
    fn test_file_event_serialization() {
        let json = serde_json::to_string(&FileEvent::add("sub/x.txt")).unwrap();
        assert_eq!(json, r#"{"kind":"add","path":"sub/x.txt"}"#);
    }
}
