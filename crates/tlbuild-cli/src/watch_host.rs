//! `notify`-backed watch host.
//!
//! OS notifications arrive on notify's thread and are forwarded over a channel;
//! the main loop drains the channel, maps raw paths back to the watchers the
//! builder registered, and fires the debounce timer when its deadline passes.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use notify::event::EventKind;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tlbuild_core::{
    SolutionBuilder, TimerId, WatchEvent, WatchEventKind, WatchHost, WatchRegistration, WatcherId,
};
use tracing::{debug, trace, warn};

/// State shared between the host (owned by the builder) and the event loop
#[derive(Debug, Default)]
struct Shared {
    next_id: u64,
    registrations: FxHashMap<WatcherId, WatchRegistration>,
    timer: Option<(TimerId, Instant)>,
}

#[derive(Debug, Clone, Default)]
pub struct WatchState {
    shared: Arc<Mutex<Shared>>,
}

impl WatchState {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn armed_timer(&self) -> Option<(TimerId, Instant)> {
        self.lock().timer
    }

    fn take_timer(&self, id: TimerId) -> bool {
        let mut shared = self.lock();
        if shared.timer.map(|(armed, _)| armed) == Some(id) {
            shared.timer = None;
            return true;
        }
        false
    }

    /// Builder-level events for one raw notification
    fn route(&self, event: &Event) -> Vec<WatchEvent> {
        let kind = match event.kind {
            EventKind::Create(_) => WatchEventKind::Created,
            EventKind::Modify(_) => WatchEventKind::Changed,
            EventKind::Remove(_) => WatchEventKind::Deleted,
            _ => return Vec::new(),
        };
        let shared = self.lock();
        let mut routed = Vec::new();
        for path in &event.paths {
            let mut watchers: Vec<WatcherId> = shared
                .registrations
                .iter()
                .filter(|(_, registration)| registration.covers(path))
                .map(|(id, _)| *id)
                .collect();
            watchers.sort();
            routed.extend(watchers.into_iter().map(|watcher| WatchEvent {
                watcher,
                path: path.clone(),
                kind,
            }));
        }
        routed
    }
}

/// Files are watched through their directory so creation and deletion are seen
fn os_target(registration: &WatchRegistration) -> (PathBuf, bool) {
    if registration.directory {
        return (registration.path.clone(), registration.recursive);
    }
    let parent = registration
        .path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| registration.path.clone());
    (parent, false)
}

/// Watches are multiplexed onto one OS watch per (directory, recursive) pair
pub struct NotifyWatchHost {
    watcher: RecommendedWatcher,
    state: WatchState,
    os_watches: FxHashMap<(PathBuf, bool), usize>,
}

impl NotifyWatchHost {
    pub fn new(events: Sender<notify::Result<Event>>) -> notify::Result<Self> {
        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = events.send(res);
        })?;
        Ok(Self {
            watcher,
            state: WatchState::default(),
            os_watches: FxHashMap::default(),
        })
    }

    pub fn state(&self) -> WatchState {
        self.state.clone()
    }

    fn register(&mut self, registration: WatchRegistration) -> WatcherId {
        self.add_os_watch(os_target(&registration));

        let mut shared = self.state.lock();
        shared.next_id += 1;
        let id = WatcherId(shared.next_id);
        shared.registrations.insert(id, registration);
        id
    }

    fn add_os_watch(&mut self, target: (PathBuf, bool)) {
        let count = self.os_watches.entry(target.clone()).or_insert(0);
        *count += 1;
        if *count > 1 {
            return;
        }
        let (path, recursive) = target;
        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        match self.watcher.watch(&path, mode) {
            Ok(()) => trace!("Watching {} ({:?})", path.display(), mode),
            // Missing directories are expected (type roots, failed lookups)
            Err(err) => debug!("Cannot watch {}: {}", path.display(), err),
        }
    }

    fn release_os_watch(&mut self, target: (PathBuf, bool)) {
        let Some(count) = self.os_watches.get_mut(&target) else {
            return;
        };
        *count -= 1;
        if *count > 0 {
            return;
        }
        self.os_watches.remove(&target);
        if let Err(err) = self.watcher.unwatch(&target.0) {
            trace!("Cannot unwatch {}: {}", target.0.display(), err);
        }
    }
}

impl WatchHost for NotifyWatchHost {
    fn watch_file(&mut self, path: &Path) -> WatcherId {
        self.register(WatchRegistration {
            path: path.to_path_buf(),
            directory: false,
            recursive: false,
        })
    }

    fn watch_directory(&mut self, path: &Path, recursive: bool) -> WatcherId {
        self.register(WatchRegistration {
            path: path.to_path_buf(),
            directory: true,
            recursive,
        })
    }

    fn close_watcher(&mut self, id: WatcherId) {
        let Some(registration) = self.state.lock().registrations.remove(&id) else {
            return;
        };
        self.release_os_watch(os_target(&registration));
    }

    fn set_timeout(&mut self, delay: Duration) -> TimerId {
        let mut shared = self.state.lock();
        shared.next_id += 1;
        let id = TimerId(shared.next_id);
        shared.timer = Some((id, Instant::now() + delay));
        id
    }

    fn clear_timeout(&mut self, id: TimerId) {
        self.state.take_timer(id);
    }
}

/// Drive the builder from file-system events until the channel closes
pub fn run(
    builder: &mut SolutionBuilder,
    state: &WatchState,
    events: &Receiver<notify::Result<Event>>,
) -> anyhow::Result<()> {
    loop {
        let received = match state.armed_timer() {
            Some((timer, deadline)) => match events.recv_deadline(deadline) {
                Ok(received) => received,
                Err(RecvTimeoutError::Timeout) => {
                    if state.take_timer(timer) {
                        builder.on_timer(timer);
                    }
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(anyhow::anyhow!("File watcher disconnected"))
                }
            },
            None => events
                .recv()
                .map_err(|_| anyhow::anyhow!("File watcher disconnected"))?,
        };

        match received {
            Ok(event) => {
                for routed in state.route(&event) {
                    trace!("{:?} {}", routed.kind, routed.path.display());
                    builder.on_watch_event(&routed);
                }
            }
            Err(err) => warn!("Watch error: {}", err),
        }
    }
}
