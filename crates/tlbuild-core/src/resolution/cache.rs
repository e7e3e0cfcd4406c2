use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

use crate::compiler::{ResolutionOutcome, ResolvedModule};
use crate::paths::{
    directory_of, has_default_failed_lookup_extension, is_external_module_name_relative,
    is_node_modules_at_types_directory, is_node_modules_directory, path_contains_node_modules,
    remove_ignored_path,
};
use crate::watch::{WatchEvent, WatchEventKind, WatchHost, WatcherId};

use super::watch::directory_to_watch;
use super::DEFAULT_MAX_FILES_TO_ITERATE_FOR_INVALIDATION;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionCacheOptions {
    /// Above this many affected containing files, one invalidation flags every file instead
    pub max_files_to_iterate_for_invalidation: usize,
}

impl Default for ResolutionCacheOptions {
    fn default() -> Self {
        Self {
            max_files_to_iterate_for_invalidation: DEFAULT_MAX_FILES_TO_ITERATE_FOR_INVALIDATION,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionKind {
    Module,
    TypeReference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResolutionId(u64);

/// Who is asking: the project the containing file is compiled under, and its root directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionScope {
    pub redirect: Option<PathBuf>,
    pub root_dir: PathBuf,
}

type DirectoryKey = (Option<PathBuf>, PathBuf);

/// One cached resolution, shared by every containing file that looked the name up
#[derive(Debug, Clone)]
pub struct Resolution {
    pub kind: ResolutionKind,
    pub name: String,
    pub resolved: Option<ResolvedModule>,
    pub failed_lookup_locations: Vec<PathBuf>,
    pub is_invalidated: bool,
    /// Containing files holding this resolution; empty means it can be released
    files: FxHashSet<PathBuf>,
    directory_key: DirectoryKey,
    root_dir: PathBuf,
    watched_directories: Vec<PathBuf>,
    custom_failed_lookup_paths: Vec<PathBuf>,
    watched: bool,
}

impl Resolution {
    pub fn reference_count(&self) -> usize {
        self.files.len()
    }
}

#[derive(Debug, Default)]
struct FileResolutions {
    redirect: Option<PathBuf>,
    names: IndexMap<String, ResolutionId>,
}

#[derive(Debug, Default)]
struct NameCache {
    per_file: FxHashMap<PathBuf, FileResolutions>,
    per_directory: FxHashMap<DirectoryKey, FxHashMap<String, ResolutionId>>,
}

#[derive(Debug)]
struct DirectoryWatcher {
    watcher: WatcherId,
    ref_count: usize,
    recursive: bool,
}

#[derive(Debug)]
struct TypeRootWatcher {
    owner: PathBuf,
    root: PathBuf,
}

/// What a resolution-cache watcher event led to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheEventOutcome {
    pub invalidated: bool,
    /// Project whose automatic type directives may have changed
    pub type_root_owner: Option<PathBuf>,
}

/// Caches module and type-reference resolutions across programs and keeps the
/// directory watchers that report when a failed lookup might now succeed
#[derive(Debug, Default)]
pub struct ResolutionCache {
    options: ResolutionCacheOptions,
    next_id: u64,
    resolutions: FxHashMap<ResolutionId, Resolution>,
    modules: NameCache,
    type_references: NameCache,

    directory_watchers: FxHashMap<PathBuf, DirectoryWatcher>,
    watcher_directories: FxHashMap<WatcherId, PathBuf>,
    custom_failed_lookup_paths: FxHashMap<PathBuf, usize>,
    /// Non-relative module resolutions whose watches are deferred to the end of the pass
    pending_watches: Vec<ResolutionId>,

    type_root_watchers: FxHashMap<WatcherId, TypeRootWatcher>,

    files_with_invalidated_resolutions: FxHashSet<PathBuf>,
    all_files_have_invalidated_resolution: bool,
    has_changed_automatic_type_directive_names: bool,
    directories_with_new_candidates: FxHashSet<PathBuf>,
    open_files: FxHashSet<PathBuf>,
    caching_per_directory: bool,
}

impl ResolutionCache {
    pub fn new(options: ResolutionCacheOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn options(&self) -> &ResolutionCacheOptions {
        &self.options
    }

    fn names(&self, kind: ResolutionKind) -> &NameCache {
        match kind {
            ResolutionKind::Module => &self.modules,
            ResolutionKind::TypeReference => &self.type_references,
        }
    }

    fn names_mut(&mut self, kind: ResolutionKind) -> &mut NameCache {
        match kind {
            ResolutionKind::Module => &mut self.modules,
            ResolutionKind::TypeReference => &mut self.type_references,
        }
    }

    /// Begin a caching pass; directory-scoped entries from earlier passes are dropped
    pub fn start_caching_per_directory_resolution(&mut self) {
        self.modules.per_directory.clear();
        self.type_references.per_directory.clear();
        self.caching_per_directory = true;
    }

    /// End a caching pass: arm deferred watches and close directory watchers nobody needs
    pub fn finish_caching_per_directory_resolution(&mut self, host: &mut dyn WatchHost) {
        self.all_files_have_invalidated_resolution = false;
        self.has_changed_automatic_type_directive_names = false;
        self.directories_with_new_candidates.clear();
        self.caching_per_directory = false;

        for id in std::mem::take(&mut self.pending_watches) {
            self.watch_failed_lookup_locations(id, host);
        }

        let unused: Vec<PathBuf> = self
            .directory_watchers
            .iter()
            .filter(|(_, watcher)| watcher.ref_count == 0)
            .map(|(dir, _)| dir.clone())
            .collect();
        for dir in unused {
            if let Some(watcher) = self.directory_watchers.remove(&dir) {
                debug!("Closing failed lookup watcher on {}", dir.display());
                self.watcher_directories.remove(&watcher.watcher);
                host.close_watcher(watcher.watcher);
            }
        }
        self.custom_failed_lookup_paths.retain(|_, count| *count > 0);
    }

    pub fn is_caching_per_directory(&self) -> bool {
        self.caching_per_directory
    }

    pub fn resolve_module_names(
        &mut self,
        names: &[String],
        containing_file: &Path,
        scope: &ResolutionScope,
        loader: &mut dyn FnMut(&str) -> ResolutionOutcome,
        host: &mut dyn WatchHost,
    ) -> Vec<Option<ResolvedModule>> {
        self.resolve_names(
            ResolutionKind::Module,
            names,
            containing_file,
            scope,
            loader,
            host,
        )
    }

    pub fn resolve_type_reference_directives(
        &mut self,
        names: &[String],
        containing_file: &Path,
        scope: &ResolutionScope,
        loader: &mut dyn FnMut(&str) -> ResolutionOutcome,
        host: &mut dyn WatchHost,
    ) -> Vec<Option<ResolvedModule>> {
        self.resolve_names(
            ResolutionKind::TypeReference,
            names,
            containing_file,
            scope,
            loader,
            host,
        )
    }

    fn resolve_names(
        &mut self,
        kind: ResolutionKind,
        names: &[String],
        containing_file: &Path,
        scope: &ResolutionScope,
        loader: &mut dyn FnMut(&str) -> ResolutionOutcome,
        host: &mut dyn WatchHost,
    ) -> Vec<Option<ResolvedModule>> {
        let containing_dir = directory_of(containing_file);
        let directory_key: DirectoryKey = (scope.redirect.clone(), containing_dir.clone());
        let prior = self
            .names_mut(kind)
            .per_file
            .remove(containing_file)
            .unwrap_or_default();
        let redirect_changed = !prior.names.is_empty() && prior.redirect != scope.redirect;

        let mut current: IndexMap<String, ResolutionId> = IndexMap::new();
        let mut results = Vec::with_capacity(names.len());

        for name in names {
            if let Some(id) = current.get(name) {
                results.push(self.resolved_of(*id));
                continue;
            }

            let reusable = prior
                .names
                .get(name)
                .copied()
                .filter(|id| !redirect_changed && self.can_reuse(*id, &containing_dir));

            let id = match reusable {
                Some(id) => id,
                None => {
                    let id = match self.directory_cached(kind, &directory_key, name) {
                        Some(id) => id,
                        None => {
                            let outcome = loader(name);
                            let id = self.insert_resolution(kind, name, outcome, &directory_key, scope);
                            self.names_mut(kind)
                                .per_directory
                                .entry(directory_key.clone())
                                .or_default()
                                .insert(name.clone(), id);
                            if kind == ResolutionKind::Module
                                && !is_external_module_name_relative(name)
                            {
                                self.pending_watches.push(id);
                            } else {
                                self.watch_failed_lookup_locations(id, host);
                            }
                            id
                        }
                    };
                    if let Some(resolution) = self.resolutions.get_mut(&id) {
                        resolution.files.insert(containing_file.to_path_buf());
                    }
                    if let Some(previous) = prior.names.get(name) {
                        if *previous != id {
                            self.release(*previous, containing_file);
                        }
                    }
                    id
                }
            };

            current.insert(name.clone(), id);
            results.push(self.resolved_of(id));
        }

        for (name, id) in &prior.names {
            if !current.contains_key(name) {
                self.release(*id, containing_file);
            }
        }

        self.names_mut(kind).per_file.insert(
            containing_file.to_path_buf(),
            FileResolutions {
                redirect: scope.redirect.clone(),
                names: current,
            },
        );
        results
    }

    fn resolved_of(&self, id: ResolutionId) -> Option<ResolvedModule> {
        self.resolutions
            .get(&id)
            .and_then(|resolution| resolution.resolved.clone())
    }

    fn can_reuse(&self, id: ResolutionId, containing_dir: &Path) -> bool {
        if self.all_files_have_invalidated_resolution {
            return false;
        }
        let Some(resolution) = self.resolutions.get(&id) else {
            return false;
        };
        if resolution.is_invalidated {
            return false;
        }
        let retry_unresolved = resolution.resolved.is_none()
            && !is_external_module_name_relative(&resolution.name)
            && self
                .directories_with_new_candidates
                .iter()
                .any(|dir| containing_dir.starts_with(dir));
        !retry_unresolved
    }

    fn directory_cached(
        &self,
        kind: ResolutionKind,
        key: &DirectoryKey,
        name: &str,
    ) -> Option<ResolutionId> {
        let id = *self.names(kind).per_directory.get(key)?.get(name)?;
        let resolution = self.resolutions.get(&id)?;
        (!resolution.is_invalidated).then_some(id)
    }

    fn insert_resolution(
        &mut self,
        kind: ResolutionKind,
        name: &str,
        outcome: ResolutionOutcome,
        directory_key: &DirectoryKey,
        scope: &ResolutionScope,
    ) -> ResolutionId {
        self.next_id += 1;
        let id = ResolutionId(self.next_id);
        trace!(
            "Resolved '{}' from {}: {:?}",
            name,
            directory_key.1.display(),
            outcome.resolved.as_ref().map(|r| &r.resolved_file_name)
        );
        self.resolutions.insert(
            id,
            Resolution {
                kind,
                name: name.to_string(),
                resolved: outcome.resolved,
                failed_lookup_locations: outcome.failed_lookup_locations,
                is_invalidated: false,
                files: FxHashSet::default(),
                directory_key: directory_key.clone(),
                root_dir: scope.root_dir.clone(),
                watched_directories: Vec::new(),
                custom_failed_lookup_paths: Vec::new(),
                watched: false,
            },
        );
        id
    }

    fn watch_failed_lookup_locations(&mut self, id: ResolutionId, host: &mut dyn WatchHost) {
        let Some(resolution) = self.resolutions.get(&id) else {
            return;
        };
        if resolution.watched {
            return;
        }

        let mut directories = Vec::new();
        let mut custom = Vec::new();
        for location in &resolution.failed_lookup_locations {
            let Some(target) = directory_to_watch(location, &resolution.root_dir) else {
                continue;
            };
            if !has_default_failed_lookup_extension(location) {
                custom.push(location.clone());
            }
            directories.push((target.dir, target.recursive));
        }

        for location in &custom {
            *self
                .custom_failed_lookup_paths
                .entry(location.clone())
                .or_insert(0) += 1;
        }
        for (dir, recursive) in &directories {
            self.add_directory_ref(dir, *recursive, host);
        }

        if let Some(resolution) = self.resolutions.get_mut(&id) {
            resolution.watched = true;
            resolution.watched_directories = directories.into_iter().map(|(dir, _)| dir).collect();
            resolution.custom_failed_lookup_paths = custom;
        }
    }

    fn add_directory_ref(&mut self, dir: &Path, recursive: bool, host: &mut dyn WatchHost) {
        if let Some(existing) = self.directory_watchers.get_mut(dir) {
            existing.ref_count += 1;
            if recursive && !existing.recursive {
                host.close_watcher(existing.watcher);
                self.watcher_directories.remove(&existing.watcher);
                existing.watcher = host.watch_directory(dir, true);
                existing.recursive = true;
                self.watcher_directories
                    .insert(existing.watcher, dir.to_path_buf());
            }
            return;
        }

        debug!(
            "Watching failed lookup directory {} (recursive: {})",
            dir.display(),
            recursive
        );
        let watcher = host.watch_directory(dir, recursive);
        self.watcher_directories.insert(watcher, dir.to_path_buf());
        self.directory_watchers.insert(
            dir.to_path_buf(),
            DirectoryWatcher {
                watcher,
                ref_count: 1,
                recursive,
            },
        );
    }

    /// Drop one containing file's hold on a resolution, releasing its watches when unused
    fn release(&mut self, id: ResolutionId, containing_file: &Path) {
        let Some(resolution) = self.resolutions.get_mut(&id) else {
            return;
        };
        resolution.files.remove(containing_file);
        if !resolution.files.is_empty() {
            return;
        }
        let Some(resolution) = self.resolutions.remove(&id) else {
            return;
        };

        if resolution.watched {
            for dir in &resolution.watched_directories {
                if let Some(watcher) = self.directory_watchers.get_mut(dir) {
                    watcher.ref_count = watcher.ref_count.saturating_sub(1);
                }
            }
            for location in &resolution.custom_failed_lookup_paths {
                if let Some(count) = self.custom_failed_lookup_paths.get_mut(location) {
                    *count = count.saturating_sub(1);
                }
            }
        } else {
            self.pending_watches.retain(|pending| *pending != id);
        }

        let names = self.names_mut(resolution.kind);
        if let Some(entries) = names.per_directory.get_mut(&resolution.directory_key) {
            if entries.get(&resolution.name) == Some(&id) {
                entries.remove(&resolution.name);
            }
        }
    }

    pub fn get_cached_module(&self, containing_file: &Path, name: &str) -> Option<&Resolution> {
        self.get_cached(ResolutionKind::Module, containing_file, name)
    }

    pub fn get_cached_type_reference(
        &self,
        containing_file: &Path,
        name: &str,
    ) -> Option<&Resolution> {
        self.get_cached(ResolutionKind::TypeReference, containing_file, name)
    }

    fn get_cached(
        &self,
        kind: ResolutionKind,
        containing_file: &Path,
        name: &str,
    ) -> Option<&Resolution> {
        let id = self.names(kind).per_file.get(containing_file)?.names.get(name)?;
        self.resolutions.get(id)
    }

    /// Forget every resolution made on behalf of a file that left its program
    pub fn remove_resolutions_of_file(&mut self, containing_file: &Path) {
        for kind in [ResolutionKind::Module, ResolutionKind::TypeReference] {
            if let Some(entry) = self.names_mut(kind).per_file.remove(containing_file) {
                for id in entry.names.values() {
                    self.release(*id, containing_file);
                }
            }
        }
        self.files_with_invalidated_resolutions
            .remove(containing_file);
    }

    /// A file was deleted or replaced: drop its own resolutions and invalidate those that found it
    pub fn invalidate_resolution_of_file(&mut self, file: &Path) -> bool {
        self.remove_resolutions_of_file(file);
        self.invalidate_resolutions(|resolution| {
            resolution
                .resolved
                .as_ref()
                .is_some_and(|r| r.resolved_file_name == file)
        })
    }

    /// Flag every live resolution matching `predicate` and record the files holding it
    pub fn invalidate_resolutions(&mut self, predicate: impl Fn(&Resolution) -> bool) -> bool {
        let mut affected: FxHashSet<PathBuf> = FxHashSet::default();
        let mut invalidated = false;
        for resolution in self.resolutions.values_mut() {
            if resolution.is_invalidated || !predicate(resolution) {
                continue;
            }
            resolution.is_invalidated = true;
            invalidated = true;
            affected.extend(resolution.files.iter().cloned());
            if resolution.kind == ResolutionKind::TypeReference {
                self.has_changed_automatic_type_directive_names = true;
            }
        }

        if affected.len() > self.options.max_files_to_iterate_for_invalidation {
            debug!(
                "{} files affected by one invalidation, invalidating all resolutions",
                affected.len()
            );
            self.all_files_have_invalidated_resolution = true;
        } else {
            self.files_with_invalidated_resolutions.extend(affected);
        }
        invalidated
    }

    /// Invalidate resolutions that probed `path` and found nothing
    pub fn invalidate_resolution_of_failed_lookup_location(
        &mut self,
        path: &Path,
        is_creating_directory: bool,
    ) -> bool {
        let Some(path) = remove_ignored_path(path) else {
            return false;
        };
        if self.open_files.contains(&path) {
            return false;
        }

        if is_creating_directory {
            self.directories_with_new_candidates.insert(path.clone());
            return self.invalidate_resolutions(|resolution| {
                resolution
                    .failed_lookup_locations
                    .iter()
                    .any(|location| location.starts_with(&path))
            });
        }

        let node_modules_adjacent = is_node_modules_directory(&path)
            || is_node_modules_at_types_directory(&path)
            || path_contains_node_modules(&path);
        if node_modules_adjacent {
            if let Some(parent) = path.parent() {
                self.directories_with_new_candidates
                    .insert(parent.to_path_buf());
            }
            return self.invalidate_resolutions(|resolution| {
                resolution
                    .failed_lookup_locations
                    .iter()
                    .any(|location| location.starts_with(&path))
            });
        }

        if !has_default_failed_lookup_extension(&path)
            && !self.custom_failed_lookup_paths.contains_key(&path)
        {
            return false;
        }
        self.invalidate_resolutions(|resolution| {
            resolution
                .failed_lookup_locations
                .iter()
                .any(|location| *location == path)
        })
    }

    /// Route an event from one of this cache's watchers; `None` if the watcher is not ours
    pub fn on_watch_event(
        &mut self,
        event: &WatchEvent,
        is_directory: bool,
    ) -> Option<CacheEventOutcome> {
        if let Some(type_root) = self.type_root_watchers.get(&event.watcher) {
            let owner = type_root.owner.clone();
            let root = type_root.root.clone();
            self.has_changed_automatic_type_directive_names = true;
            let invalidated = self.invalidate_resolutions(|resolution| {
                resolution.kind == ResolutionKind::TypeReference
                    && resolution
                        .failed_lookup_locations
                        .iter()
                        .any(|location| location.starts_with(&root))
            });
            return Some(CacheEventOutcome {
                invalidated,
                type_root_owner: Some(owner),
            });
        }

        self.watcher_directories.get(&event.watcher)?;
        let is_creating_directory = is_directory && event.kind == WatchEventKind::Created;
        if event.kind == WatchEventKind::Created && !is_directory {
            if let Some(dir) = event.path.parent() {
                self.directories_with_new_candidates.insert(dir.to_path_buf());
            }
        }
        let invalidated =
            self.invalidate_resolution_of_failed_lookup_location(&event.path, is_creating_directory);
        Some(CacheEventOutcome {
            invalidated,
            type_root_owner: None,
        })
    }

    pub fn is_cache_watcher(&self, watcher: WatcherId) -> bool {
        self.watcher_directories.contains_key(&watcher)
            || self.type_root_watchers.contains_key(&watcher)
    }

    /// Hint that unresolved non-relative names looked up at or below `dir` should be retried
    pub fn mark_directory_has_new_candidates(&mut self, dir: &Path) {
        self.directories_with_new_candidates.insert(dir.to_path_buf());
    }

    pub fn has_invalidated_resolution(&self, file: &Path) -> bool {
        self.all_files_have_invalidated_resolution
            || self.files_with_invalidated_resolutions.contains(file)
    }

    pub fn all_files_have_invalidated_resolution(&self) -> bool {
        self.all_files_have_invalidated_resolution
    }

    pub fn has_changed_automatic_type_directive_names(&self) -> bool {
        self.has_changed_automatic_type_directive_names
    }

    /// Hand out the files flagged since the last call
    pub fn take_files_with_invalidated_resolutions(&mut self) -> FxHashSet<PathBuf> {
        std::mem::take(&mut self.files_with_invalidated_resolutions)
    }

    pub fn set_file_open(&mut self, file: &Path, open: bool) {
        if open {
            self.open_files.insert(file.to_path_buf());
        } else {
            self.open_files.remove(file);
        }
    }

    /// Watch a project's type roots so added `@types` packages change its automatic directives.
    /// With `automatic` false every root watch of the owner is closed.
    pub fn update_type_roots_watch(
        &mut self,
        owner: &Path,
        roots: &[PathBuf],
        automatic: bool,
        host: &mut dyn WatchHost,
    ) {
        let wanted: Vec<&PathBuf> = if automatic {
            roots
                .iter()
                .filter(|root| crate::paths::can_watch_directory(root))
                .collect()
        } else {
            Vec::new()
        };

        let stale: Vec<WatcherId> = self
            .type_root_watchers
            .iter()
            .filter(|(_, w)| w.owner == owner && !wanted.contains(&&w.root))
            .map(|(id, _)| *id)
            .collect();
        for id in stale {
            self.type_root_watchers.remove(&id);
            host.close_watcher(id);
        }

        for root in wanted {
            let already = self
                .type_root_watchers
                .values()
                .any(|w| w.owner == owner && &w.root == root);
            if !already {
                let id = host.watch_directory(root, true);
                self.type_root_watchers.insert(
                    id,
                    TypeRootWatcher {
                        owner: owner.to_path_buf(),
                        root: root.clone(),
                    },
                );
            }
        }
    }

    /// Close the type-root watches of a project that left the build
    pub fn close_type_roots_watch(&mut self, owner: &Path, host: &mut dyn WatchHost) {
        self.update_type_roots_watch(owner, &[], false, host);
    }

    pub fn watched_directory_ref_count(&self, dir: &Path) -> Option<usize> {
        self.directory_watchers.get(dir).map(|w| w.ref_count)
    }

    pub fn resolution_count(&self) -> usize {
        self.resolutions.len()
    }

    /// Drop every resolution and close every watcher
    pub fn clear(&mut self, host: &mut dyn WatchHost) {
        for (_, watcher) in self.directory_watchers.drain() {
            host.close_watcher(watcher.watcher);
        }
        for (id, _) in self.type_root_watchers.drain() {
            host.close_watcher(id);
        }
        self.watcher_directories.clear();
        self.custom_failed_lookup_paths.clear();
        self.pending_watches.clear();
        self.resolutions.clear();
        self.modules = NameCache::default();
        self.type_references = NameCache::default();
        self.files_with_invalidated_resolutions.clear();
        self.all_files_have_invalidated_resolution = false;
        self.has_changed_automatic_type_directive_names = false;
        self.directories_with_new_candidates.clear();
    }
}
