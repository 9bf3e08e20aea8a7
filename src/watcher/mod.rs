pub mod event;

use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver as StdReceiver, RecvTimeoutError};
use std::time::Duration;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use notify::RecursiveMode;
use notify::Watcher as _;
use notify_debouncer_mini::{DebounceEventResult, new_debouncer};
use regex::Regex;
use tokio::sync::mpsc as tokio_mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use event::WatchEvent;

/// Rules used when the project config does not list any: Clojure sources and
/// tests in a Leiningen layout.
pub const DEFAULT_RULES: &[(&str, &str)] = &[("test", r"test/.*\.clj"), ("src", r"src/.*\.clj")];

/// Default quiet period before a burst of notifications is delivered.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(75);

/// Errors raised while setting up the watcher. None of them are recovered.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("project root {} is not accessible: {source}", path.display())]
    RootNotFound {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("watch directory does not exist: {}", .0.display())]
    DirNotFound(PathBuf),

    #[error("invalid watch pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },

    #[error("file notification backend failed: {0}")]
    Notify(#[from] notify::Error),
}

/// A directory to watch plus the pattern its files must match.
///
/// The pattern is matched against the whole root-relative path, written with
/// `/` separators, e.g. `src/my_app/core.clj`.
#[derive(Debug)]
pub struct WatchRule {
    dir: PathBuf,
    pattern: Regex,
}

impl WatchRule {
    pub fn new(dir: impl Into<PathBuf>, pattern: &str) -> Result<Self, WatchError> {
        let anchored = format!("^(?:{pattern})$");
        let pattern = Regex::new(&anchored).map_err(|source| WatchError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self {
            dir: dir.into(),
            pattern,
        })
    }

    pub fn defaults() -> Result<Vec<Self>, WatchError> {
        DEFAULT_RULES
            .iter()
            .map(|(dir, pattern)| Self::new(*dir, pattern))
            .collect()
    }

    pub fn matches(&self, relative: &str) -> bool {
        self.pattern.is_match(relative)
    }
}

/// Handle to a running watcher. Dropping it (or calling [`WatcherHandle::stop`])
/// stops watching.
pub struct WatcherHandle {
    /// Keep alive: dropping the debouncer stops the OS watcher.
    debouncer: notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>,
    /// Forwards matching events from the debouncer thread to the tokio channel.
    bridge_task: JoinHandle<()>,
}

impl WatcherHandle {
    pub async fn stop(self) {
        drop(self.debouncer);
        // The bridge exits once the debouncer thread drops its sender.
        if tokio::time::timeout(Duration::from_secs(1), self.bridge_task)
            .await
            .is_err()
        {
            debug!("watcher bridge did not exit within 1s");
        }
    }
}

/// File watcher bound to a project root and an explicit list of rules.
#[derive(Debug)]
pub struct Watcher {
    root: PathBuf,
    rules: Vec<WatchRule>,
    debounce: Duration,
    respect_gitignore: bool,
}

impl Watcher {
    /// Validate the root and every rule directory. Fails fast when any of them
    /// is missing.
    pub fn new(root: &Path, rules: Vec<WatchRule>) -> Result<Self, WatchError> {
        let root = std::fs::canonicalize(root).map_err(|source| WatchError::RootNotFound {
            path: root.to_path_buf(),
            source,
        })?;
        for rule in &rules {
            let dir = root.join(&rule.dir);
            if !dir.is_dir() {
                return Err(WatchError::DirNotFound(dir));
            }
        }
        Ok(Self {
            root,
            rules,
            debounce: DEFAULT_DEBOUNCE,
            respect_gitignore: true,
        })
    }

    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn respect_gitignore(mut self, respect: bool) -> Self {
        self.respect_gitignore = respect;
        self
    }

    /// Distinct directories to register, skipping any already covered by a
    /// recursive watch on one of its ancestors.
    fn watch_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = self.rules.iter().map(|r| self.root.join(&r.dir)).collect();
        dirs.sort();
        dirs.dedup();
        let mut roots: Vec<PathBuf> = Vec::new();
        for dir in dirs {
            if !roots.iter().any(|r| dir.starts_with(r)) {
                roots.push(dir);
            }
        }
        roots
    }

    /// Start a debounced watcher on every rule directory.
    ///
    /// Returns a `WatcherHandle` (must be kept alive) and a receiver yielding
    /// one batch of `WatchEvent`s per burst of changes to matching files. Must
    /// be called from within a tokio runtime.
    pub fn start(
        self,
    ) -> Result<(WatcherHandle, tokio_mpsc::Receiver<Vec<WatchEvent>>), WatchError> {
        let (std_tx, std_rx) = std::sync::mpsc::channel::<DebounceEventResult>();

        let mut debouncer = new_debouncer(self.debounce, move |res| {
            let _ = std_tx.send(res);
        })?;
        let dirs = self.watch_dirs();
        for dir in &dirs {
            debouncer.watcher().watch(dir, RecursiveMode::Recursive)?;
        }
        info!(
            root = %self.root.display(),
            dirs = ?dirs,
            rules = self.rules.len(),
            "watching for changes"
        );

        let filter = EventFilter::new(self.root, self.rules, self.respect_gitignore);
        let (tokio_tx, tokio_rx) = tokio_mpsc::channel::<Vec<WatchEvent>>(256);

        let settle = self.debounce;
        let bridge_task = tokio::task::spawn_blocking(move || {
            forward_bursts(&std_rx, &filter, settle, &tokio_tx);
        });

        Ok((
            WatcherHandle {
                debouncer,
                bridge_task,
            },
            tokio_rx,
        ))
    }
}

/// Bridge loop: collect debounced results into one batch until no further
/// result arrives for `settle`, then send the batch as a whole.
///
/// notify-debouncer-mini can release a single burst over several ticks; the
/// settle window glues those pieces back together. Batches with no matching
/// path are never sent.
fn forward_bursts(
    std_rx: &StdReceiver<DebounceEventResult>,
    filter: &EventFilter,
    settle: Duration,
    tokio_tx: &tokio_mpsc::Sender<Vec<WatchEvent>>,
) {
    let mut pending: Vec<WatchEvent> = Vec::new();
    loop {
        let received = if pending.is_empty() {
            std_rx.recv().map_err(|_| RecvTimeoutError::Disconnected)
        } else {
            std_rx.recv_timeout(settle)
        };

        match received {
            Ok(Ok(events)) => {
                let matched = events.iter().filter_map(|e| filter.classify(&e.path));
                merge_events(&mut pending, matched);
            }
            Ok(Err(err)) => {
                warn!(error = ?err, "file notification error");
            }
            Err(RecvTimeoutError::Timeout) => {
                debug!(changes = pending.len(), "burst settled");
                if tokio_tx.blocking_send(std::mem::take(&mut pending)).is_err() {
                    return; // receiver dropped, shutdown
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                if !pending.is_empty() {
                    let _ = tokio_tx.blocking_send(pending);
                }
                return;
            }
        }
    }
}

/// Append `incoming` to `batch`, keeping only the latest event per path.
pub fn merge_events(
    batch: &mut Vec<WatchEvent>,
    incoming: impl IntoIterator<Item = WatchEvent>,
) {
    for event in incoming {
        batch.retain(|existing| existing.path() != event.path());
        batch.push(event);
    }
}

/// Decides which raw notification paths become `WatchEvent`s.
struct EventFilter {
    root: PathBuf,
    rules: Vec<WatchRule>,
    gitignore: Option<Gitignore>,
}

impl EventFilter {
    fn new(root: PathBuf, rules: Vec<WatchRule>, respect_gitignore: bool) -> Self {
        let gitignore = respect_gitignore.then(|| build_gitignore_matcher(&root));
        Self {
            root,
            rules,
            gitignore,
        }
    }

    /// Filtering order:
    /// 1. Outside the root or a directory: dropped
    /// 2. `.gitignore`d paths: dropped
    /// 3. No rule matches the relative path: dropped
    /// 4. File existence decides Modified vs Deleted
    fn classify(&self, path: &Path) -> Option<WatchEvent> {
        let relative = path.strip_prefix(&self.root).ok()?;
        if path.is_dir() {
            return None;
        }

        if let Some(gitignore) = &self.gitignore
            && gitignore
                .matched_path_or_any_parents(relative, false)
                .is_ignore()
        {
            return None;
        }

        let relative_str = relative_slash_path(relative)?;
        if !self.rules.iter().any(|rule| rule.matches(&relative_str)) {
            return None;
        }

        // notify-debouncer-mini does not tell creation from modification.
        if path.exists() {
            Some(WatchEvent::Modified(relative.to_path_buf()))
        } else {
            Some(WatchEvent::Deleted(relative.to_path_buf()))
        }
    }
}

/// Join path components with `/` regardless of platform. `None` for non-UTF-8 paths.
fn relative_slash_path(relative: &Path) -> Option<String> {
    let parts: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
    Some(parts?.join("/"))
}

/// Build a Gitignore matcher from the project root's .gitignore file.
/// If no .gitignore exists, returns an empty matcher that matches nothing.
fn build_gitignore_matcher(project_root: &Path) -> Gitignore {
    let mut builder = GitignoreBuilder::new(project_root);
    let gitignore_path = project_root.join(".gitignore");
    if gitignore_path.exists()
        && let Some(err) = builder.add(&gitignore_path)
    {
        warn!(error = %err, "ignoring unreadable .gitignore");
    }
    builder.build().unwrap_or_else(|_| Gitignore::empty())
}
