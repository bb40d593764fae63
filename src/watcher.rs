use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use regex::Regex;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{Result, WatchError};
use crate::events::{FileEvent, RawEvent, RawEventKind, WatchEvent};
use crate::filter::FilterPair;
use crate::notifier::{Notifier, NotifierConfig, DEFAULT_DEDUP_CAPACITY, DEFAULT_PROGRAM};
use crate::reconcile::Reconciler;
use crate::tree::{self, Scan};

/// Kinds requested from the notifier; everything the reconciler acts on.
pub const WATCHED_EVENTS: [RawEventKind; 4] = [
    RawEventKind::Create,
    RawEventKind::Modify,
    RawEventKind::Delete,
    RawEventKind::Move,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// Initial scan in progress.
    Scanning,
    /// Notifier started (or failed to start; see the event stream).
    Active,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub filter: FilterPair,
    pub recursive: bool,
    /// Don't report files already present when the watch starts.
    pub skip_initial: bool,
    /// Report the initial scan and stop; never start the notifier.
    pub scan_only: bool,
    pub exec_path: String,
    pub dedup_window: Duration,
    pub dedup_capacity: usize,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            filter: FilterPair::default(),
            recursive: true,
            skip_initial: false,
            scan_only: false,
            exec_path: DEFAULT_PROGRAM.to_string(),
            dedup_window: Duration::ZERO,
            dedup_capacity: DEFAULT_DEDUP_CAPACITY,
        }
    }
}

impl WatchOptions {
    pub fn allow(mut self, pattern: Regex) -> Self {
        self.filter.allow = Some(pattern);
        self
    }

    pub fn reject(mut self, pattern: Regex) -> Self {
        self.filter.reject = Some(pattern);
        self
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn skip_initial(mut self, skip: bool) -> Self {
        self.skip_initial = skip;
        self
    }

    pub fn scan_only(mut self, scan_only: bool) -> Self {
        self.scan_only = scan_only;
        self
    }

    pub fn exec_path(mut self, program: impl Into<String>) -> Self {
        self.exec_path = program.into();
        self
    }

    pub fn ignore_duplicates(mut self, window: Duration) -> Self {
        self.dedup_window = window;
        self
    }

    /// Notifier arguments for watching `root`, filters rendered as POSIX ERE.
    pub fn notifier_config(&self, root: &Path) -> NotifierConfig {
        NotifierConfig {
            program: self.exec_path.clone(),
            paths: vec![root.to_path_buf()],
            recursive: self.recursive,
            include: self.filter.include_extended(),
            exclude: self.filter.exclude_extended(),
            events: WATCHED_EVENTS.to_vec(),
            dedup_window: self.dedup_window,
            dedup_capacity: self.dedup_capacity,
        }
    }
}

/// Emission point shared by the driver; closed for good once stopped.
struct Sink {
    tx: mpsc::UnboundedSender<WatchEvent>,
    stopped: Arc<AtomicBool>,
}

impl Sink {
    fn send(&self, event: WatchEvent) -> bool {
        if self.stopped.load(Ordering::SeqCst) {
            return false;
        }
        self.tx.send(event).is_ok()
    }

    fn send_files(&self, events: Vec<FileEvent>) {
        for event in events {
            if !self.send(WatchEvent::File(event)) {
                break;
            }
        }
    }
}

/// A watched directory tree.
///
/// Created inside a tokio runtime. The initial scan starts immediately;
/// its `add` events are queued before [`Watch::ready`] resolves.
pub struct Watch {
    root: PathBuf,
    events: mpsc::UnboundedReceiver<WatchEvent>,
    state: watch::Receiver<WatchState>,
    ready: watch::Receiver<Option<Result<()>>>,
    stopped: Arc<AtomicBool>,
    shutdown: Option<oneshot::Sender<()>>,
    driver: Option<JoinHandle<()>>,
    outcome: Option<Result<()>>,
    reconciler: Arc<Mutex<Reconciler>>,
}

impl Watch {
    pub fn new<P: Into<PathBuf>>(root: P, options: WatchOptions) -> Self {
        let root = root.into();
        let (event_tx, events) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(WatchState::Scanning);
        let (ready_tx, ready) = watch::channel(None);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let stopped = Arc::new(AtomicBool::new(false));
        let reconciler = Arc::new(Mutex::new(Reconciler::new(
            root.clone(),
            options.filter.clone(),
            options.recursive,
        )));

        let driver = Driver {
            root: root.clone(),
            options,
            reconciler: Arc::clone(&reconciler),
            sink: Sink {
                tx: event_tx,
                stopped: Arc::clone(&stopped),
            },
            state: state_tx,
            ready: ready_tx,
        };
        let driver = tokio::spawn(driver.run(shutdown_rx));

        Self {
            root,
            events,
            state,
            ready,
            stopped,
            shutdown: Some(shutdown_tx),
            driver: Some(driver),
            outcome: None,
            reconciler,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state(&self) -> WatchState {
        if self.outcome.is_some() {
            return WatchState::Stopped;
        }
        *self.state.borrow()
    }

    /// Resolves once the initial scan has finished, with its outcome.
    pub async fn ready(&self) -> Result<()> {
        let mut ready = self.ready.clone();
        let outcome = match ready.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| Err(WatchError::Aborted("watch ended before the scan completed".to_string())))
    }

    /// Next event in delivery order; `None` once stopped or finished.
    pub async fn recv(&mut self) -> Option<WatchEvent> {
        if self.is_stopped() {
            return None;
        }
        let event = self.events.recv().await?;
        if self.is_stopped() {
            return None;
        }
        Some(event)
    }

    pub fn try_recv(&mut self) -> std::result::Result<WatchEvent, TryRecvError> {
        if self.is_stopped() {
            return Err(TryRecvError::Disconnected);
        }
        self.events.try_recv()
    }

    /// Like [`Watch::recv`], giving up after `timeout`.
    pub async fn recv_timeout(
        &mut self,
        timeout: Duration,
    ) -> std::result::Result<Option<WatchEvent>, tokio::time::error::Elapsed> {
        tokio::time::timeout(timeout, self.recv()).await
    }

    /// Relative paths of every file currently tracked, sorted.
    pub fn tracked_files(&self) -> Vec<String> {
        let reconciler = lock(&self.reconciler);
        let tree = reconciler.tree();
        tree.files().iter().filter_map(|path| tree.relative(path)).collect()
    }

    /// Stop delivering events and terminate the notifier.
    ///
    /// No event is delivered once this has been called. Later calls return
    /// the first call's outcome.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }

        self.stopped.store(true, Ordering::SeqCst);
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }

        let outcome = match self.driver.take() {
            Some(driver) => match driver.await {
                Ok(()) => Ok(()),
                Err(err) if err.is_cancelled() => Ok(()),
                Err(err) => Err(WatchError::Aborted(err.to_string())),
            },
            None => Ok(()),
        };
        self.events.close();

        info!("Stopped watching {}", self.root.display());
        self.outcome = Some(outcome.clone());
        outcome
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl Drop for Watch {
    fn drop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

fn lock(reconciler: &Mutex<Reconciler>) -> MutexGuard<'_, Reconciler> {
    reconciler.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Driver {
    root: PathBuf,
    options: WatchOptions,
    reconciler: Arc<Mutex<Reconciler>>,
    sink: Sink,
    state: watch::Sender<WatchState>,
    ready: watch::Sender<Option<Result<()>>>,
}

impl Driver {
    async fn run(self, mut shutdown: oneshot::Receiver<()>) {
        let filter = self.options.filter.clone();
        let recursive = self.options.recursive;
        let root = self.root.clone();
        let scanning = tokio::task::spawn_blocking(move || -> Result<Scan> {
            let root = tree::resolve_root(&root)?;
            tree::scan(&root, &filter, recursive)
        });

        let scanned = tokio::select! {
            biased;
            _ = &mut shutdown => {
                self.finish(Err(WatchError::Aborted("stopped during the initial scan".to_string())));
                return;
            }
            scanned = scanning => scanned,
        };
        let scan = match scanned {
            Ok(Ok(scan)) => scan,
            Ok(Err(err)) => {
                error!("Initial scan failed: {}", err);
                self.finish(Err(err));
                return;
            }
            Err(err) => {
                self.finish(Err(WatchError::Aborted(err.to_string())));
                return;
            }
        };

        let root = scan.tree.root().to_path_buf();
        let initial = {
            let mut reconciler = lock(&self.reconciler);
            *reconciler = Reconciler::new(&root, self.options.filter.clone(), recursive);
            reconciler.install(scan, self.options.skip_initial)
        };
        info!("Scanned {}: {} files", root.display(), lock(&self.reconciler).tree().files().len());
        self.sink.send_files(initial);
        let _ = self.ready.send(Some(Ok(())));

        if self.options.scan_only {
            self.finish_state();
            return;
        }

        let _ = self.state.send(WatchState::Active);
        let config = self.options.notifier_config(&root);
        let mut notifier = match Notifier::spawn(&config) {
            Ok(notifier) => notifier,
            Err(err) => {
                error!("{}", err);
                self.sink.send(WatchEvent::Error(err.into()));
                let _ = shutdown.await;
                self.finish_state();
                return;
            }
        };

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                next = notifier.next_event() => match next {
                    Some(Ok(raw)) => self.reconcile(&raw).await,
                    Some(Err(err)) => {
                        error!("{}", err);
                        self.sink.send(WatchEvent::Error(err.into()));
                    }
                    None => {
                        debug!("Notifier finished; waiting for stop");
                        let _ = (&mut shutdown).await;
                        break;
                    }
                },
            }
        }

        notifier.shutdown().await;
        self.finish_state();
    }

    /// Apply one raw event. A moved-in directory is scanned before the next
    /// raw event is read, so later events on any path wait for that scan.
    async fn reconcile(&self, raw: &RawEvent) {
        let applied = lock(&self.reconciler).apply(raw);
        self.sink.send_files(applied.events);

        let Some(dir) = applied.rescan else {
            return;
        };
        // Built off to the side, then grafted in one step.
        let filter = self.options.filter.clone();
        let recursive = self.options.recursive;
        let scanned = tokio::task::spawn_blocking(move || tree::scan(&dir, &filter, recursive)).await;
        match scanned {
            Ok(Ok(scan)) => {
                let added = lock(&self.reconciler).graft(scan);
                self.sink.send_files(added);
            }
            Ok(Err(err)) => warn!("Could not scan moved-in directory: {}", err),
            Err(err) => warn!("Moved-in directory scan aborted: {}", err),
        }
    }

    fn finish(&self, outcome: Result<()>) {
        let _ = self.ready.send(Some(outcome));
        self.finish_state();
    }

    fn finish_state(&self) {
        let _ = self.state.send(WatchState::Stopped);
    }
}
