//! The `inotifywait` child process.
//!
//! [`Notifier`] spawns the utility in monitor mode, reads one record per
//! line from its stdout and hands out parsed [`RawEvent`]s in delivery
//! order. Identical lines arriving within a configurable window can be
//! dropped before parsing.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use lru::LruCache;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::error::NotifierError;
use crate::events::{parse_record, RawEvent, RawEventKind, RECORD_FORMAT};

pub const DEFAULT_PROGRAM: &str = "inotifywait";
pub const DEFAULT_DEDUP_CAPACITY: usize = 1024;

/// Everything needed to start the notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifierConfig {
    pub program: String,
    pub paths: Vec<PathBuf>,
    pub recursive: bool,
    /// POSIX ERE; only matching paths are reported.
    pub include: Option<String>,
    /// POSIX ERE; matching paths are not reported.
    pub exclude: Option<String>,
    /// Empty means every kind.
    pub events: Vec<RawEventKind>,
    /// Zero disables duplicate suppression.
    pub dedup_window: Duration,
    pub dedup_capacity: usize,
}

impl NotifierConfig {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            paths: vec![path.into()],
            recursive: true,
            include: None,
            exclude: None,
            events: Vec::new(),
            dedup_window: Duration::ZERO,
            dedup_capacity: DEFAULT_DEDUP_CAPACITY,
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_events(mut self, events: &[RawEventKind]) -> Self {
        self.events = events.to_vec();
        self
    }

    /// Command-line arguments, paths last.
    pub fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "--monitor".into(),
            "--quiet".into(),
            "--timefmt".into(),
            "%s".into(),
            "--format".into(),
            RECORD_FORMAT.into(),
        ];

        if self.recursive {
            args.push("--recursive".into());
        }
        if let Some(exclude) = &self.exclude {
            args.push("--exclude".into());
            args.push(exclude.clone());
        }
        if let Some(include) = &self.include {
            args.push("--include".into());
            args.push(include.clone());
        }
        for kind in &self.events {
            args.push("--event".into());
            args.push(kind.name().into());
        }
        args.extend(self.paths.iter().map(|path| path.to_string_lossy().into_owned()));
        args
    }

    /// The full command as a shell would read it.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.clone())
            .chain(self.args())
            .map(|arg| shell_quote(&arg))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn deduplicator(&self) -> Option<Deduplicator> {
        if self.dedup_window.is_zero() {
            None
        } else {
            Some(Deduplicator::new(self.dedup_window, self.dedup_capacity))
        }
    }
}

fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ',' | ':' | '='));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Drops a line seen again within `window` of its previous sighting.
///
/// Every sighting refreshes the line's timestamp, so a steady stream of
/// identical lines closer together than the window is reported once.
#[derive(Debug)]
pub struct Deduplicator {
    window: Duration,
    seen: LruCache<String, Instant>,
}

impl Deduplicator {
    pub fn new(window: Duration, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            window,
            seen: LruCache::new(capacity),
        }
    }

    pub fn is_duplicate(&mut self, line: &str, now: Instant) -> bool {
        match self.seen.put(line.to_string(), now) {
            Some(last) => now.saturating_duration_since(last) < self.window,
            None => false,
        }
    }
}

/// A running notifier process.
pub struct Notifier {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    stderr: Option<JoinHandle<Option<String>>>,
    pending: VecDeque<RawEvent>,
    dedup: Option<Deduplicator>,
    finished: bool,
}

impl Notifier {
    pub fn spawn(config: &NotifierConfig) -> Result<Self, NotifierError> {
        let spawn_error = |reason: String| NotifierError::Spawn {
            program: config.program.clone(),
            reason,
        };

        let mut child = Command::new(&config.program)
            .args(config.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| spawn_error(err.to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_error("stdout not captured".to_string()))?;
        let stderr = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                let mut last = None;
                while let Ok(Some(line)) = lines.next_line().await {
                    if !line.trim().is_empty() {
                        warn!("{}: {}", DEFAULT_PROGRAM, line);
                        last = Some(line);
                    }
                }
                last
            })
        });

        info!("Started {} (pid {:?})", config.program, child.id());
        debug!("Notifier command: {}", config.command_line());

        Ok(Self {
            child,
            lines: BufReader::new(stdout).lines(),
            stderr,
            pending: VecDeque::new(),
            dedup: config.deduplicator(),
            finished: false,
        })
    }

    /// The next raw event, a fatal condition, or `None` once the process
    /// has exited and its exit was reported.
    ///
    /// A malformed record is reported and reading continues after it.
    pub async fn next_event(&mut self) -> Option<Result<RawEvent, NotifierError>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(Ok(event));
            }
            if self.finished {
                return None;
            }

            match self.lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    if let Some(dedup) = &mut self.dedup {
                        if dedup.is_duplicate(&line, Instant::now()) {
                            trace!("Dropping duplicate record {:?}", line);
                            continue;
                        }
                    }
                    match parse_record(&line) {
                        Ok(events) => self.pending.extend(events),
                        Err(err) => return Some(Err(err)),
                    }
                }
                Ok(None) => {
                    self.finished = true;
                    return Some(Err(self.exit_error().await));
                }
                Err(err) => {
                    self.finished = true;
                    return Some(Err(NotifierError::Io(err.to_string())));
                }
            }
        }
    }

    /// Kill the process and reap it.
    pub async fn shutdown(&mut self) {
        self.finished = true;
        if let Err(err) = self.child.kill().await {
            debug!("Notifier already gone: {}", err);
        }
        if let Some(stderr) = self.stderr.take() {
            stderr.abort();
        }
    }

    async fn exit_error(&mut self) -> NotifierError {
        let status = match self.child.wait().await {
            Ok(status) => status.to_string(),
            Err(err) => format!("unknown status: {}", err),
        };
        let stderr = match self.stderr.take() {
            Some(handle) => handle.await.ok().flatten(),
            None => None,
        };
        NotifierError::Exited { status, stderr }
    }
}
