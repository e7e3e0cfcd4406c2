//! Watch-mode wiring: which watcher belongs to which project, how events map
//! to reload levels, and the debounce timer that drains the queue.

use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, trace, warn};

use crate::config::ParsedProject;
use crate::diagnostics::codes;
use crate::paths::{has_source_extension, remove_ignored_path};
use crate::watch::{TimerId, WatchEvent, WatchEventKind, WatcherId};

use super::builder::{ReloadLevel, SolutionBuilder};

/// Delay between the last change event and the rebuild it triggers
pub const WATCH_DEBOUNCE: Duration = Duration::from_millis(250);

#[derive(Debug, Default)]
pub(super) struct ProjectWatchers {
    config: Option<WatcherId>,
    extended: Vec<PathBuf>,
    wildcard_directories: IndexMap<PathBuf, (WatcherId, bool)>,
    inputs: FxHashMap<PathBuf, WatcherId>,
}

/// A file watched on behalf of several projects (extended configs)
#[derive(Debug)]
pub(super) struct SharedWatcher {
    id: WatcherId,
    projects: FxHashSet<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum WatchTarget {
    ConfigFile(PathBuf),
    ExtendedConfig(PathBuf),
    WildcardDirectory(PathBuf),
    InputFile(PathBuf),
}

impl SolutionBuilder {
    /// Arm watchers for every project in the build; only once, and only in watch mode
    pub(super) fn start_watching(&mut self) {
        if !self.options.watch || self.watching {
            return;
        }
        self.watching = true;
        let order = self.get_build_order();
        for project in order.projects() {
            self.watch_config_file(project);
            let Some(parsed) = self.parse_config(project) else {
                continue;
            };
            self.watch_project(project, &parsed);
            self.resolution_cache.update_type_roots_watch(
                project,
                &parsed.effective_type_roots(),
                parsed.options.types.is_none(),
                &mut *self.watch_host,
            );
        }
        debug!("Watching {} projects", order.projects().len());
    }

    pub(super) fn watch_project(&mut self, project: &Path, parsed: &ParsedProject) {
        self.watch_config_file(project);
        self.watch_extended_config_files(project, parsed);
        self.watch_wildcard_directories(project, parsed);
        self.watch_input_files(project, parsed);
    }

    fn watch_config_file(&mut self, project: &Path) {
        let watchers = self.watchers.entry(project.to_path_buf()).or_default();
        if watchers.config.is_some() {
            return;
        }
        let id = self.watch_host.watch_file(project);
        watchers.config = Some(id);
        self.watch_targets
            .insert(id, WatchTarget::ConfigFile(project.to_path_buf()));
    }

    fn watch_extended_config_files(&mut self, project: &Path, parsed: &ParsedProject) {
        let wanted = parsed.extended_config_paths.clone();
        let previous = std::mem::replace(
            &mut self
                .watchers
                .entry(project.to_path_buf())
                .or_default()
                .extended,
            wanted.clone(),
        );
        for path in previous.iter().filter(|path| !wanted.contains(path)) {
            self.release_extended_config(path, project);
        }

        for path in wanted {
            if !self.extended_watchers.contains_key(&path) {
                let id = self.watch_host.watch_file(&path);
                self.watch_targets
                    .insert(id, WatchTarget::ExtendedConfig(path.clone()));
                self.extended_watchers.insert(
                    path.clone(),
                    SharedWatcher {
                        id,
                        projects: FxHashSet::default(),
                    },
                );
            }
            if let Some(shared) = self.extended_watchers.get_mut(&path) {
                shared.projects.insert(project.to_path_buf());
            }
        }
    }

    fn release_extended_config(&mut self, path: &Path, project: &Path) {
        let Some(shared) = self.extended_watchers.get_mut(path) else {
            return;
        };
        shared.projects.remove(project);
        if shared.projects.is_empty() {
            let id = shared.id;
            self.extended_watchers.remove(path);
            self.watch_targets.remove(&id);
            self.watch_host.close_watcher(id);
        }
    }

    fn watch_wildcard_directories(&mut self, project: &Path, parsed: &ParsedProject) {
        let watchers = self.watchers.entry(project.to_path_buf()).or_default();
        let stale: Vec<PathBuf> = watchers
            .wildcard_directories
            .iter()
            .filter(|(dir, (_, recursive))| parsed.wildcard_directories.get(*dir) != Some(recursive))
            .map(|(dir, _)| dir.clone())
            .collect();
        for dir in stale {
            if let Some((id, _)) = watchers.wildcard_directories.shift_remove(&dir) {
                self.watch_targets.remove(&id);
                self.watch_host.close_watcher(id);
            }
        }

        for (dir, recursive) in &parsed.wildcard_directories {
            if watchers.wildcard_directories.contains_key(dir) {
                continue;
            }
            let id = self.watch_host.watch_directory(dir, *recursive);
            watchers
                .wildcard_directories
                .insert(dir.clone(), (id, *recursive));
            self.watch_targets
                .insert(id, WatchTarget::WildcardDirectory(project.to_path_buf()));
        }
    }

    pub(super) fn watch_input_files(&mut self, project: &Path, parsed: &ParsedProject) {
        let watchers = self.watchers.entry(project.to_path_buf()).or_default();
        let stale: Vec<PathBuf> = watchers
            .inputs
            .keys()
            .filter(|input| !parsed.file_names.contains(input))
            .cloned()
            .collect();
        for input in stale {
            if let Some(id) = watchers.inputs.remove(&input) {
                self.watch_targets.remove(&id);
                self.watch_host.close_watcher(id);
            }
        }

        for input in &parsed.file_names {
            if watchers.inputs.contains_key(input) {
                continue;
            }
            let id = self.watch_host.watch_file(input);
            watchers.inputs.insert(input.clone(), id);
            self.watch_targets
                .insert(id, WatchTarget::InputFile(project.to_path_buf()));
        }
    }

    pub(super) fn close_project_watchers(&mut self, project: &Path) {
        let Some(watchers) = self.watchers.remove(project) else {
            return;
        };
        let ids = watchers
            .config
            .into_iter()
            .chain(watchers.wildcard_directories.values().map(|(id, _)| *id))
            .chain(watchers.inputs.values().copied());
        for id in ids {
            self.watch_targets.remove(&id);
            self.watch_host.close_watcher(id);
        }
        for path in &watchers.extended {
            self.release_extended_config(path, project);
        }
    }

    /// Close every watcher and the pending timer
    pub fn close_watchers(&mut self) {
        let projects: Vec<PathBuf> = self.watchers.keys().cloned().collect();
        for project in projects {
            self.close_project_watchers(&project);
            self.resolution_cache
                .close_type_roots_watch(&project, &mut *self.watch_host);
        }
        self.resolution_cache.clear(&mut *self.watch_host);
        if let Some(timer) = self.timer.take() {
            self.watch_host.clear_timeout(timer);
        }
        self.watching = false;
    }

    /// Route a change notification from the watch host
    pub fn on_watch_event(&mut self, event: &WatchEvent) {
        let Some(target) = self.watch_targets.get(&event.watcher).cloned() else {
            self.on_resolution_watch_event(event);
            return;
        };
        trace!("{:?} {} ({:?})", event.kind, event.path.display(), target);

        match target {
            WatchTarget::ConfigFile(project) => {
                self.invalidate_project_and_schedule_builds(&project, ReloadLevel::Full)
            }
            WatchTarget::ExtendedConfig(path) => {
                let mut projects: Vec<PathBuf> = self
                    .extended_watchers
                    .get(&path)
                    .map(|shared| shared.projects.iter().cloned().collect())
                    .unwrap_or_default();
                projects.sort();
                for project in projects {
                    self.invalidate_project_and_schedule_builds(&project, ReloadLevel::Full);
                }
            }
            WatchTarget::WildcardDirectory(project) => {
                if self.is_wildcard_change_relevant(&project, event) {
                    self.invalidate_project_and_schedule_builds(&project, ReloadLevel::Partial);
                }
            }
            WatchTarget::InputFile(project) => {
                self.invalidate_project_and_schedule_builds(&project, ReloadLevel::None)
            }
        }
    }

    /// Only additions and removals of candidate inputs change the file list
    fn is_wildcard_change_relevant(&self, project: &Path, event: &WatchEvent) -> bool {
        if event.kind == WatchEventKind::Changed {
            return false;
        }
        let Some(path) = remove_ignored_path(&event.path) else {
            return false;
        };
        let Some(Ok(parsed)) = self.configs.get(project) else {
            return true;
        };
        if path == parsed.config_path || parsed.is_output_file(&path) || parsed.specs.is_excluded(&path)
        {
            return false;
        }
        if has_source_extension(&path) {
            return parsed.specs.matches_wildcards(&path);
        }
        // Directories may hold inputs; other files never are
        path.extension().is_none()
    }

    fn on_resolution_watch_event(&mut self, event: &WatchEvent) {
        let is_directory = self.fs.directory_exists(&event.path);
        let Some(outcome) = self.resolution_cache.on_watch_event(event, is_directory) else {
            trace!("Ignoring event from unknown watcher {:?}", event.watcher);
            return;
        };

        let mut affected: Vec<PathBuf> = outcome.type_root_owner.into_iter().collect();
        if outcome.invalidated {
            let files = self.resolution_cache.take_files_with_invalidated_resolutions();
            let everything = self.resolution_cache.all_files_have_invalidated_resolution();
            let order = self.get_build_order();
            for project in order.projects() {
                let owns_file = everything
                    || self
                        .programs
                        .get(project)
                        .is_some_and(|program| program.source_files().iter().any(|f| files.contains(f)))
                    || matches!(
                        self.configs.get(project),
                        Some(Ok(parsed)) if parsed.file_names.iter().any(|f| files.contains(f))
                    );
                if owns_file && !affected.contains(project) {
                    affected.push(project.clone());
                }
            }
        }
        for project in affected {
            self.stale_resolutions.insert(project.clone());
            self.invalidate_project_and_schedule_builds(&project, ReloadLevel::None);
        }
    }

    fn invalidate_project_and_schedule_builds(&mut self, project: &Path, level: ReloadLevel) {
        self.report_file_change_detected = true;
        self.invalidate_project(project, level);
        self.schedule_build_invalidated_project();
    }

    /// Cancel-and-rearm: only the most recently armed timer ever fires
    fn schedule_build_invalidated_project(&mut self) {
        if let Some(timer) = self.timer.take() {
            self.watch_host.clear_timeout(timer);
        }
        let timer = self.watch_host.set_timeout(WATCH_DEBOUNCE);
        trace!("Armed build timer {:?}", timer);
        self.timer = Some(timer);
    }

    /// Timer currently armed to drain the queue
    pub fn pending_timer(&self) -> Option<TimerId> {
        self.timer
    }

    /// Timer expiry from the watch host; stale timers are ignored
    pub fn on_timer(&mut self, timer: TimerId) {
        if self.timer != Some(timer) {
            trace!("Ignoring stale timer {:?}", timer);
            return;
        }
        self.timer = None;
        self.build_next_invalidated_project();
    }

    /// Build exactly one project, then re-arm if more work is queued
    fn build_next_invalidated_project(&mut self) {
        if self.report_file_change_detected {
            self.report_file_change_detected = false;
            self.report_status(
                codes::FILE_CHANGE_DETECTED,
                "File change detected. Starting incremental compilation...".to_string(),
            );
        }

        let order = self.get_build_order();
        if let Some(mut state) = self.next_invalidated(&order, false) {
            if let Err(err) = self.run_to_completion(&mut state, None) {
                warn!("Build of {} stopped: {}", state.project.display(), err);
            }
        }

        if order
            .projects()
            .iter()
            .any(|project| self.pending.contains_key(project))
        {
            self.schedule_build_invalidated_project();
        } else {
            self.report_error_summary(&order);
        }
    }
}
