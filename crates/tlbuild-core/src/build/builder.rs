use rustc_hash::{FxHashMap, FxHashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::cancellation::{check_canceled, CancellationToken};
use crate::compiler::{Compiler, ModuleResolver, Program};
use crate::config::{parse_project_config, ParsedProject, ProjectReference};
use crate::diagnostics::{codes, Diagnostic, DiagnosticHandler};
use crate::errors::{BuildError, Result};
use crate::fs::FileSystem;
use crate::paths::resolve_config_file_name;
use crate::resolution::{ResolutionCache, ResolutionCacheOptions};
use crate::watch::{TimerId, WatchHost, WatcherId};

use super::invalidated::{BuildResultFlags, BuildStep, InvalidatedProjectKind};
use super::order::{create_build_order, BuildOrder};
use super::project::ProjectBuildState;
use super::status::{check_up_to_date, UpToDateStatus, UpstreamStatus};
use super::watcher::{ProjectWatchers, SharedWatcher, WatchTarget};

/// How much of a project's configuration must be re-derived before it is rebuilt
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReloadLevel {
    /// Inputs changed; config and file list are still valid
    None,
    /// Re-run wildcard expansion
    Partial,
    /// Re-parse the config file
    Full,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Report what would happen without touching disk
    pub dry: bool,
    /// Rebuild even when outputs are up to date
    pub force: bool,
    pub verbose: bool,
    pub watch: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    DiagnosticsPresentOutputsGenerated,
    DiagnosticsPresentOutputsSkipped,
    InvalidProjectOutputsSkipped,
    ProjectReferenceCycleOutputsSkipped,
}

impl ExitStatus {
    /// Process exit code
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::DiagnosticsPresentOutputsSkipped => 1,
            ExitStatus::DiagnosticsPresentOutputsGenerated => 2,
            ExitStatus::InvalidProjectOutputsSkipped => 3,
            ExitStatus::ProjectReferenceCycleOutputsSkipped => 4,
        }
    }
}

/// Collaborators the builder drives
pub struct SolutionBuilderHost {
    pub fs: Arc<dyn FileSystem>,
    pub compiler: Box<dyn Compiler>,
    pub resolver: Box<dyn ModuleResolver>,
    pub watch_host: Box<dyn WatchHost>,
    /// Receives compile and config diagnostics
    pub diagnostics: Arc<dyn DiagnosticHandler>,
    /// Receives human-facing progress messages
    pub status: Arc<dyn DiagnosticHandler>,
}

type ConfigEntry = std::result::Result<Arc<ParsedProject>, Diagnostic>;

/// Builds a solution of referenced projects in dependency order
///
/// Every per-project cache lives here and is only mutated through the build,
/// clean and invalidation entry points.
pub struct SolutionBuilder {
    pub(super) fs: Arc<dyn FileSystem>,
    pub(super) compiler: Box<dyn Compiler>,
    pub(super) resolver: Box<dyn ModuleResolver>,
    pub(super) watch_host: Box<dyn WatchHost>,
    pub(super) diagnostics: Arc<dyn DiagnosticHandler>,
    pub(super) status: Arc<dyn DiagnosticHandler>,
    pub(super) options: BuildOptions,
    root_names: Vec<PathBuf>,
    pub(super) resolution_cache: ResolutionCache,

    build_order: Option<BuildOrder>,
    pub(super) configs: FxHashMap<PathBuf, ConfigEntry>,
    pub(super) statuses: FxHashMap<PathBuf, UpToDateStatus>,
    pub(super) pending: FxHashMap<PathBuf, ReloadLevel>,
    /// Projects whose cached resolutions changed; they recompile even when outputs look current
    pub(super) stale_resolutions: FxHashSet<PathBuf>,
    all_projects_pending: bool,
    pub(super) project_diagnostics: FxHashMap<PathBuf, Vec<Diagnostic>>,
    pub(super) programs: FxHashMap<PathBuf, Box<dyn Program>>,

    pub(super) watching: bool,
    pub(super) watchers: FxHashMap<PathBuf, ProjectWatchers>,
    pub(super) extended_watchers: FxHashMap<PathBuf, SharedWatcher>,
    pub(super) watch_targets: FxHashMap<WatcherId, WatchTarget>,
    pub(super) timer: Option<TimerId>,
    pub(super) report_file_change_detected: bool,
}

impl SolutionBuilder {
    pub fn new(host: SolutionBuilderHost, root_names: &[PathBuf], options: BuildOptions) -> Self {
        Self::with_cache_options(host, root_names, options, ResolutionCacheOptions::default())
    }

    pub fn with_cache_options(
        host: SolutionBuilderHost,
        root_names: &[PathBuf],
        options: BuildOptions,
        cache_options: ResolutionCacheOptions,
    ) -> Self {
        Self {
            fs: host.fs,
            compiler: host.compiler,
            resolver: host.resolver,
            watch_host: host.watch_host,
            diagnostics: host.diagnostics,
            status: host.status,
            options,
            root_names: root_names
                .iter()
                .map(|name| resolve_config_file_name(name))
                .collect(),
            resolution_cache: ResolutionCache::new(cache_options),
            build_order: None,
            configs: FxHashMap::default(),
            statuses: FxHashMap::default(),
            pending: FxHashMap::default(),
            stale_resolutions: FxHashSet::default(),
            all_projects_pending: true,
            project_diagnostics: FxHashMap::default(),
            programs: FxHashMap::default(),
            watching: false,
            watchers: FxHashMap::default(),
            extended_watchers: FxHashMap::default(),
            watch_targets: FxHashMap::default(),
            timer: None,
            report_file_change_detected: false,
        }
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    pub fn resolution_cache(&self) -> &ResolutionCache {
        &self.resolution_cache
    }

    pub fn resolution_cache_mut(&mut self) -> &mut ResolutionCache {
        &mut self.resolution_cache
    }

    /// Diagnostics stored for a project by its last build attempt
    pub fn project_diagnostics(&self, project: &Path) -> &[Diagnostic] {
        self.project_diagnostics
            .get(&resolve_config_file_name(project))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Reload level a project is queued at, if it is queued
    pub fn pending_reload_level(&self, project: &Path) -> Option<ReloadLevel> {
        self.pending.get(&resolve_config_file_name(project)).copied()
    }

    pub fn is_watching(&self) -> bool {
        self.watching
    }

    pub(super) fn report_status(&self, code: u32, message: String) {
        self.status.info(code, &message);
    }

    pub(super) fn report_diagnostics(&self, diagnostics: &[Diagnostic]) {
        for diagnostic in diagnostics {
            self.diagnostics.report(diagnostic.clone());
        }
    }

    /// Parsed config of a project; parse failures are cached too
    pub(super) fn parse_config(&mut self, project: &Path) -> Option<Arc<ParsedProject>> {
        if let Some(entry) = self.configs.get(project) {
            return entry.as_ref().ok().cloned();
        }
        let entry = match parse_project_config(&*self.fs, project) {
            Ok(parsed) => Ok(Arc::new(parsed)),
            Err(err) => {
                debug!("Failed to parse {}: {}", project.display(), err);
                Err(config_error_diagnostic(project, &err))
            }
        };
        let parsed = entry.as_ref().ok().cloned();
        self.configs.insert(project.to_path_buf(), entry);
        parsed
    }

    fn references_of(&mut self, project: &Path) -> Vec<ProjectReference> {
        self.parse_config(project)
            .map(|parsed| parsed.references.clone())
            .unwrap_or_default()
    }

    /// Dependency-first order of every project reachable from the roots
    ///
    /// Computed once and cached until a config reload discards it; recomputing prunes
    /// every per-project cache of projects that left the graph.
    pub fn get_build_order(&mut self) -> BuildOrder {
        if let Some(order) = &self.build_order {
            return order.clone();
        }
        let roots = self.root_names.clone();
        let order = create_build_order(&roots, &mut |project| self.references_of(project));
        self.prune_to(&order);
        self.build_order = Some(order.clone());
        order
    }

    fn build_order_for(&mut self, project: Option<&Path>) -> Option<BuildOrder> {
        let full = self.get_build_order();
        let Some(project) = project else {
            return Some(full);
        };
        let project = resolve_config_file_name(project);
        if !full.contains(&project) {
            return None;
        }
        Some(create_build_order(&[project], &mut |p| self.references_of(p)))
    }

    fn prune_to(&mut self, order: &BuildOrder) {
        let keep: FxHashSet<&PathBuf> = order.projects().iter().collect();
        self.configs.retain(|project, _| keep.contains(project));
        self.statuses.retain(|project, _| keep.contains(project));
        self.pending.retain(|project, _| keep.contains(project));
        self.stale_resolutions.retain(|project| keep.contains(project));
        self.project_diagnostics
            .retain(|project, _| keep.contains(project));

        let dropped: Vec<PathBuf> = self
            .programs
            .keys()
            .filter(|project| !keep.contains(project))
            .cloned()
            .collect();
        for project in dropped {
            if let Some(program) = self.programs.remove(&project) {
                for file in program.source_files() {
                    self.resolution_cache.remove_resolutions_of_file(&file);
                }
            }
        }

        let unwatched: Vec<PathBuf> = self
            .watchers
            .keys()
            .filter(|project| !keep.contains(project))
            .cloned()
            .collect();
        for project in unwatched {
            debug!("Project {} left the build", project.display());
            self.close_project_watchers(&project);
            self.resolution_cache
                .close_type_roots_watch(&project, &mut *self.watch_host);
        }
    }

    /// Cycle members and every project that depends on one
    fn cycle_excluded(&mut self, order: &BuildOrder) -> FxHashSet<PathBuf> {
        let mut excluded: FxHashSet<PathBuf> = order.cycle_members().iter().cloned().collect();
        if excluded.is_empty() {
            return excluded;
        }
        loop {
            let mut changed = false;
            for project in order.projects() {
                if excluded.contains(project) {
                    continue;
                }
                if self
                    .references_of(project)
                    .iter()
                    .any(|reference| excluded.contains(&reference.path))
                {
                    excluded.insert(project.clone());
                    changed = true;
                }
            }
            if !changed {
                return excluded;
            }
        }
    }

    /// Memoized status; `ComputingUpstream` guards against reference cycles
    pub(super) fn get_up_to_date_status(&mut self, project: &Path) -> UpToDateStatus {
        if let Some(status) = self.statuses.get(project) {
            return status.clone();
        }
        let Some(parsed) = self.parse_config(project) else {
            let status = UpToDateStatus::Unbuildable {
                reason: "its config file could not be parsed".to_string(),
            };
            self.statuses.insert(project.to_path_buf(), status.clone());
            return status;
        };

        self.statuses
            .insert(project.to_path_buf(), UpToDateStatus::ComputingUpstream);
        let mut upstream = Vec::with_capacity(parsed.references.len());
        for reference in &parsed.references {
            let status = self.get_up_to_date_status(&reference.path);
            upstream.push((reference, status));
        }
        let views: Vec<UpstreamStatus<'_>> = upstream
            .iter()
            .map(|(reference, status)| UpstreamStatus {
                config_path: &reference.path,
                prepend: reference.prepend,
                status,
            })
            .collect();

        let status = check_up_to_date(&parsed, &*self.fs, &views);
        self.statuses.insert(project.to_path_buf(), status.clone());
        status
    }

    pub fn get_up_to_date_status_of_project(&mut self, project: &Path) -> UpToDateStatus {
        let project = resolve_config_file_name(project);
        self.get_up_to_date_status(&project)
    }

    pub(super) fn add_to_queue(&mut self, project: PathBuf, level: ReloadLevel) {
        let queued = self.pending.entry(project).or_insert(level);
        if *queued < level {
            *queued = level;
        }
    }

    /// Mark a project for rebuild; a queued level is only ever raised
    pub fn invalidate_project(&mut self, project: &Path, level: ReloadLevel) {
        let project = resolve_config_file_name(project);
        debug!("Invalidating {} at {:?}", project.display(), level);
        if level == ReloadLevel::Full {
            self.configs.remove(&project);
            self.build_order = None;
        }
        self.statuses.remove(&project);
        self.add_to_queue(project, level);
    }

    fn setup_initial_build(&mut self, token: Option<&CancellationToken>) -> Result<()> {
        if !self.all_projects_pending {
            return Ok(());
        }
        self.all_projects_pending = false;
        if self.options.watch {
            self.report_status(
                codes::STARTING_WATCH_COMPILATION,
                "Starting compilation in watch mode...".to_string(),
            );
        }
        let order = self.get_build_order();
        for project in order.projects() {
            self.add_to_queue(project.clone(), ReloadLevel::None);
        }
        check_canceled(token)
    }

    fn report_build_queue(&self, order: &BuildOrder) {
        if !self.options.verbose {
            return;
        }
        let listing: String = order
            .projects()
            .iter()
            .map(|project| format!("\n    * {}", project.display()))
            .collect();
        self.report_status(
            codes::PROJECTS_IN_THIS_BUILD,
            format!("Projects in this build: {}", listing),
        );
    }

    fn report_project_status(&self, project: &Path, status: &UpToDateStatus) {
        if !self.options.verbose {
            return;
        }
        if let Some(message) = status.describe(project) {
            self.status.report(message);
        }
    }

    /// Pick the first queued project in `order` that needs work
    ///
    /// Projects that turn out to be up to date, blocked, container-only or on a
    /// cycle are dropped from the queue on the way.
    pub(super) fn next_invalidated(
        &mut self,
        order: &BuildOrder,
        report_queue: bool,
    ) -> Option<ProjectBuildState> {
        if self.pending.is_empty() {
            return None;
        }
        let excluded = self.cycle_excluded(order);
        let mut report_queue = report_queue;

        for project in order.projects() {
            let Some(level) = self.pending.get(project).copied() else {
                continue;
            };
            if report_queue {
                report_queue = false;
                self.report_build_queue(order);
            }

            if excluded.contains(project) {
                self.pending.remove(project);
                if self.options.verbose {
                    self.report_status(
                        codes::SKIPPING_BUILD_UPSTREAM_ERRORS,
                        format!(
                            "Skipping build of project '{}' because its references form a cycle",
                            project.display()
                        ),
                    );
                }
                continue;
            }

            let Some(mut parsed) = self.parse_config(project) else {
                if let Some(Err(diagnostic)) = self.configs.get(project) {
                    let diagnostic = diagnostic.clone();
                    self.report_diagnostics(std::slice::from_ref(&diagnostic));
                    self.project_diagnostics
                        .insert(project.clone(), vec![diagnostic]);
                }
                self.pending.remove(project);
                continue;
            };

            match level {
                ReloadLevel::Full => {
                    if self.watching {
                        self.watch_project(project, &parsed);
                    }
                }
                ReloadLevel::Partial => {
                    if let Some(Ok(entry)) = self.configs.get_mut(project) {
                        Arc::make_mut(entry).reload_file_names(&*self.fs);
                        parsed = entry.clone();
                    }
                    self.statuses.remove(project);
                    if self.watching {
                        self.watch_input_files(project, &parsed);
                    }
                }
                ReloadLevel::None => {}
            }

            let status = self.get_up_to_date_status(project);
            self.report_project_status(project, &status);

            // Outputs can look current while a module now resolves elsewhere
            let stale_resolutions = self.stale_resolutions.contains(project);
            if !self.options.force && !stale_resolutions {
                match status {
                    UpToDateStatus::UpToDate(_) => {
                        self.pending.remove(project);
                        if self.options.dry {
                            self.report_status(
                                codes::PROJECT_IS_UP_TO_DATE,
                                format!("Project '{}' is up to date", project.display()),
                            );
                        }
                        continue;
                    }
                    UpToDateStatus::UpToDateWithUpstreamTypes(_) => {
                        return Some(ProjectBuildState::new(
                            project.clone(),
                            InvalidatedProjectKind::UpdateOutputFileStamps,
                            parsed,
                            order.projects().to_vec(),
                        ));
                    }
                    _ => {}
                }
            }

            match status {
                UpToDateStatus::UpstreamBlocked { .. } => {
                    self.pending.remove(project);
                    // verbose mode already described the status
                    if !self.options.verbose {
                        if let Some(message) = status.describe(project) {
                            self.status.report(message);
                        }
                    }
                    continue;
                }
                UpToDateStatus::ContainerOnly => {
                    self.pending.remove(project);
                    continue;
                }
                _ => {}
            }

            let kind = if stale_resolutions || self.needs_build(&status, &parsed) {
                InvalidatedProjectKind::Build
            } else {
                InvalidatedProjectKind::UpdateBundle
            };
            return Some(ProjectBuildState::new(
                project.clone(),
                kind,
                parsed,
                order.projects().to_vec(),
            ));
        }
        None
    }

    /// Only a prepend-stale bundle with usable config can skip compilation
    fn needs_build(&self, status: &UpToDateStatus, parsed: &ParsedProject) -> bool {
        if !matches!(status, UpToDateStatus::OutOfDateWithPrepend { .. }) || self.options.force {
            return true;
        }
        parsed.file_names.is_empty() || !parsed.errors.is_empty()
    }

    /// Pull the next project that needs work, to be driven step by step
    pub fn get_next_invalidated_project(
        &mut self,
        token: Option<&CancellationToken>,
    ) -> Result<Option<InvalidatedProject<'_>>> {
        self.setup_initial_build(token)?;
        let order = self.get_build_order();
        let Some(state) = self.next_invalidated(&order, false) else {
            return Ok(None);
        };
        Ok(Some(InvalidatedProject {
            builder: self,
            state,
        }))
    }

    /// Build `project` (or every root) and everything it references
    pub fn build(
        &mut self,
        project: Option<&Path>,
        token: Option<&CancellationToken>,
    ) -> Result<ExitStatus> {
        let Some(order) = self.build_order_for(project) else {
            if let Some(project) = project {
                self.diagnostics.error(
                    codes::FILE_NOT_FOUND,
                    &format!("File '{}' not found.", project.display()),
                );
            }
            return Ok(ExitStatus::InvalidProjectOutputsSkipped);
        };
        self.setup_initial_build(token)?;
        self.report_diagnostics(order.diagnostics());

        let mut report_queue = true;
        let mut successful_projects = 0;
        while let Some(mut state) = self.next_invalidated(&order, report_queue) {
            report_queue = false;
            check_canceled(token)?;
            if self.options.dry {
                self.report_dry_run(&state);
                self.pending.remove(&state.project);
                continue;
            }
            self.run_to_completion(&mut state, token)?;
            if !self.project_diagnostics.contains_key(&state.project) {
                successful_projects += 1;
            }
        }

        self.report_error_summary(&order);
        self.start_watching();

        let status = if order.is_circular() {
            ExitStatus::ProjectReferenceCycleOutputsSkipped
        } else if !order
            .projects()
            .iter()
            .any(|project| self.project_diagnostics.contains_key(project))
        {
            ExitStatus::Success
        } else if successful_projects > 0 {
            ExitStatus::DiagnosticsPresentOutputsGenerated
        } else {
            ExitStatus::DiagnosticsPresentOutputsSkipped
        };
        info!("Build finished: {:?}", status);
        Ok(status)
    }

    fn report_dry_run(&self, state: &ProjectBuildState) {
        let project = state.project.display();
        match state.kind {
            InvalidatedProjectKind::UpdateOutputFileStamps => self.report_status(
                codes::DRY_WOULD_UPDATE_TIMESTAMPS,
                format!(
                    "A non-dry build would update timestamps for output of project '{}'",
                    project
                ),
            ),
            InvalidatedProjectKind::UpdateBundle => self.report_status(
                codes::DRY_WOULD_BUILD,
                format!("A non-dry build would update output of project '{}'", project),
            ),
            InvalidatedProjectKind::Build => self.report_status(
                codes::DRY_WOULD_BUILD,
                format!("A non-dry build would build project '{}'", project),
            ),
        }
    }

    pub(super) fn report_error_summary(&self, order: &BuildOrder) {
        let errors = order.diagnostics().len()
            + order
                .projects()
                .iter()
                .filter_map(|project| self.project_diagnostics.get(project))
                .flatten()
                .filter(|diagnostic| diagnostic.is_error())
                .count();
        let summary = if errors == 1 {
            "Found 1 error.".to_string()
        } else {
            format!("Found {} errors.", errors)
        };
        if self.watching || self.options.watch {
            self.report_status(
                codes::FOUND_ERRORS_WATCHING,
                format!("{} Watching for file changes.", summary),
            );
        } else {
            self.report_status(codes::FOUND_ERRORS, summary);
        }
    }

    /// Delete the outputs and build info of `project` (or every root) and its references
    pub fn clean(&mut self, project: Option<&Path>) -> ExitStatus {
        let Some(order) = self.build_order_for(project) else {
            return ExitStatus::InvalidProjectOutputsSkipped;
        };
        if order.is_circular() {
            self.report_diagnostics(order.diagnostics());
            return ExitStatus::ProjectReferenceCycleOutputsSkipped;
        }

        let mut would_delete = Vec::new();
        for project in order.projects() {
            let Some(parsed) = self.parse_config(project) else {
                if let Some(Err(diagnostic)) = self.configs.get(project) {
                    self.report_diagnostics(std::slice::from_ref(diagnostic));
                }
                continue;
            };
            for output in parsed.all_output_file_names() {
                if self.fs.modified_time(&output).is_none() {
                    continue;
                }
                if self.options.dry {
                    would_delete.push(output);
                } else if let Err(err) = self.fs.delete_file(&output) {
                    self.diagnostics.error(
                        codes::CANNOT_WRITE_FILE,
                        &format!("Could not delete file '{}': {}", output.display(), err),
                    );
                } else {
                    debug!("Deleted {}", output.display());
                }
            }
            if !self.options.dry {
                self.statuses.remove(project);
                self.add_to_queue(project.clone(), ReloadLevel::None);
            }
        }

        if self.options.dry {
            let listing: String = would_delete
                .iter()
                .map(|file| format!("\n * {}", file.display()))
                .collect();
            self.report_status(
                codes::DRY_WOULD_DELETE,
                format!("A non-dry build would delete the following files: {}", listing),
            );
        }
        ExitStatus::Success
    }
}

fn config_error_diagnostic(project: &Path, error: &BuildError) -> Diagnostic {
    let code = match error {
        BuildError::ConfigNotFound { .. } => codes::CANNOT_READ_FILE,
        _ => codes::INVALID_CONFIG,
    };
    Diagnostic::error(code, error.to_string()).with_file(project)
}

/// A project pulled from the queue, executed one step at a time
///
/// Dropping it before [`InvalidatedProject::done`] leaves the project queued.
pub struct InvalidatedProject<'b> {
    builder: &'b mut SolutionBuilder,
    state: ProjectBuildState,
}

impl InvalidatedProject<'_> {
    pub fn project(&self) -> &Path {
        &self.state.project
    }

    pub fn kind(&self) -> InvalidatedProjectKind {
        self.state.kind
    }

    pub fn current_step(&self) -> BuildStep {
        self.state.step
    }

    pub fn result(&self) -> BuildResultFlags {
        self.state.result
    }

    /// Execute the current step and return the one that follows
    pub fn step(&mut self, token: Option<&CancellationToken>) -> Result<BuildStep> {
        self.builder.execute_step(&mut self.state, token)?;
        Ok(self.state.step)
    }

    /// Run every remaining step
    pub fn done(mut self, token: Option<&CancellationToken>) -> Result<BuildResultFlags> {
        self.builder.run_to_completion(&mut self.state, token)?;
        Ok(self.state.result)
    }
}
