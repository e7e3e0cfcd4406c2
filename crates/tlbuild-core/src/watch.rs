//! Watch and timer host abstraction.
//!
//! Watchers and timers are registered through [`WatchHost`]; notifications come
//! back to the builder as plain values ([`WatchEvent`], [`TimerId`]) that the
//! driver feeds in one at a time, so no callback ever runs concurrently with a
//! build step.

use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatcherId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Created,
    Changed,
    Deleted,
}

/// A change observed by a watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub watcher: WatcherId,
    pub path: PathBuf,
    pub kind: WatchEventKind,
}

pub trait WatchHost {
    fn watch_file(&mut self, path: &Path) -> WatcherId;
    fn watch_directory(&mut self, path: &Path, recursive: bool) -> WatcherId;
    fn close_watcher(&mut self, id: WatcherId);
    fn set_timeout(&mut self, delay: Duration) -> TimerId;
    fn clear_timeout(&mut self, id: TimerId);
}

/// Host for one-shot builds: hands out ids, never delivers anything
#[derive(Debug, Default)]
pub struct NoopWatchHost {
    next_id: u64,
}

impl NoopWatchHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

impl WatchHost for NoopWatchHost {
    fn watch_file(&mut self, _path: &Path) -> WatcherId {
        WatcherId(self.next())
    }

    fn watch_directory(&mut self, _path: &Path, _recursive: bool) -> WatcherId {
        WatcherId(self.next())
    }

    fn close_watcher(&mut self, _id: WatcherId) {}

    fn set_timeout(&mut self, _delay: Duration) -> TimerId {
        TimerId(self.next())
    }

    fn clear_timeout(&mut self, _id: TimerId) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRegistration {
    pub path: PathBuf,
    pub directory: bool,
    pub recursive: bool,
}

impl WatchRegistration {
    /// Whether a change at `path` is delivered to this watcher
    pub fn covers(&self, path: &Path) -> bool {
        if !self.directory {
            return self.path == path;
        }
        if self.recursive {
            path.starts_with(&self.path)
        } else {
            path == self.path || path.parent() == Some(self.path.as_path())
        }
    }
}

#[derive(Debug, Default)]
struct RecordingState {
    next_id: u64,
    watchers: FxHashMap<WatcherId, WatchRegistration>,
    closed: Vec<(WatcherId, PathBuf)>,
    timer: Option<(TimerId, Duration)>,
    timers_set: usize,
    timers_cleared: usize,
}

/// Records every watcher and timer so tests can inspect them and fire events.
/// Clones share state.
#[derive(Debug, Default, Clone)]
pub struct RecordingWatchHost {
    state: Arc<Mutex<RecordingState>>,
}

impl RecordingWatchHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RecordingState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Open watchers on exactly this path
    pub fn watchers_for(&self, path: impl AsRef<Path>) -> Vec<WatcherId> {
        let mut ids: Vec<_> = self
            .lock()
            .watchers
            .iter()
            .filter(|(_, r)| r.path == path.as_ref())
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    pub fn registration(&self, id: WatcherId) -> Option<WatchRegistration> {
        self.lock().watchers.get(&id).cloned()
    }

    pub fn is_watching(&self, path: impl AsRef<Path>) -> bool {
        !self.watchers_for(path).is_empty()
    }

    pub fn open_watcher_count(&self) -> usize {
        self.lock().watchers.len()
    }

    /// How many times a watcher on `path` has been closed
    pub fn close_count(&self, path: impl AsRef<Path>) -> usize {
        self.lock()
            .closed
            .iter()
            .filter(|(_, p)| p == path.as_ref())
            .count()
    }

    /// Every open watcher whose registration covers `path`
    pub fn watchers_covering(&self, path: &Path) -> Vec<WatcherId> {
        let mut ids: Vec<_> = self
            .lock()
            .watchers
            .iter()
            .filter(|(_, r)| r.covers(path))
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    /// Build the events every covering watcher would deliver for a change at `path`
    pub fn events_for(&self, path: impl AsRef<Path>, kind: WatchEventKind) -> Vec<WatchEvent> {
        let path = path.as_ref();
        self.watchers_covering(path)
            .into_iter()
            .map(|watcher| WatchEvent {
                watcher,
                path: path.to_path_buf(),
                kind,
            })
            .collect()
    }

    pub fn pending_timer(&self) -> Option<TimerId> {
        self.lock().timer.map(|(id, _)| id)
    }

    pub fn pending_timer_delay(&self) -> Option<Duration> {
        self.lock().timer.map(|(_, delay)| delay)
    }

    /// Remove and return the armed timer, as if it had fired
    pub fn take_timer(&self) -> Option<TimerId> {
        self.lock().timer.take().map(|(id, _)| id)
    }

    pub fn timers_set(&self) -> usize {
        self.lock().timers_set
    }

    pub fn timers_cleared(&self) -> usize {
        self.lock().timers_cleared
    }
}

impl WatchHost for RecordingWatchHost {
    fn watch_file(&mut self, path: &Path) -> WatcherId {
        let mut state = self.lock();
        state.next_id += 1;
        let id = WatcherId(state.next_id);
        state.watchers.insert(
            id,
            WatchRegistration {
                path: path.to_path_buf(),
                directory: false,
                recursive: false,
            },
        );
        id
    }

    fn watch_directory(&mut self, path: &Path, recursive: bool) -> WatcherId {
        let mut state = self.lock();
        state.next_id += 1;
        let id = WatcherId(state.next_id);
        state.watchers.insert(
            id,
            WatchRegistration {
                path: path.to_path_buf(),
                directory: true,
                recursive,
            },
        );
        id
    }

    fn close_watcher(&mut self, id: WatcherId) {
        let mut state = self.lock();
        if let Some(registration) = state.watchers.remove(&id) {
            state.closed.push((id, registration.path));
        }
    }

    fn set_timeout(&mut self, delay: Duration) -> TimerId {
        let mut state = self.lock();
        state.next_id += 1;
        let id = TimerId(state.next_id);
        state.timer = Some((id, delay));
        state.timers_set += 1;
        id
    }

    fn clear_timeout(&mut self, id: TimerId) {
        let mut state = self.lock();
        if state.timer.map(|(current, _)| current) == Some(id) {
            state.timer = None;
            state.timers_cleared += 1;
        }
    }
}
