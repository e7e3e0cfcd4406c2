//! Step execution for one invalidated project.

use rustc_hash::FxHashSet;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, warn};

use crate::cancellation::{check_canceled, CancellationToken};
use crate::compiler::{EmitFile, Program, ProgramInput};
use crate::config::ParsedProject;
use crate::diagnostics::{codes, Diagnostic};
use crate::errors::Result;
use crate::paths::is_declaration_file;
use crate::resolution::{ProjectResolutionHost, ResolutionScope};

use super::build_info::{
    hash_text, read_build_info, to_millis, write_build_info, BuildInfo, BundleInfo,
};
use super::builder::{ReloadLevel, SolutionBuilder};
use super::invalidated::{
    initial_step, next_step, BuildResultFlags, BuildStep, InvalidatedProjectKind, StepEvent,
};
use super::status::UpToDateStatus;

pub(super) struct ProjectBuildState {
    pub(super) project: PathBuf,
    pub(super) kind: InvalidatedProjectKind,
    pub(super) step: BuildStep,
    pub(super) parsed: Arc<ParsedProject>,
    /// Build order the project was pulled from
    pub(super) order: Vec<PathBuf>,
    pub(super) program: Option<Box<dyn Program>>,
    pub(super) result: BuildResultFlags,
    pub(super) diagnostics: Vec<Diagnostic>,
}

impl ProjectBuildState {
    pub(super) fn new(
        project: PathBuf,
        kind: InvalidatedProjectKind,
        parsed: Arc<ParsedProject>,
        order: Vec<PathBuf>,
    ) -> Self {
        Self {
            project,
            kind,
            step: initial_step(kind),
            parsed,
            order,
            program: None,
            result: BuildResultFlags::empty(),
            diagnostics: Vec::new(),
        }
    }
}

/// Outputs of `prepend` references, in reference order
#[derive(Default)]
struct PrependedOutput {
    code: Vec<String>,
    declarations: Vec<String>,
}

fn concat_bundle(parts: &[String], own: &str) -> String {
    let mut text = String::new();
    for part in parts {
        text.push_str(part);
        if !part.ends_with('\n') {
            text.push('\n');
        }
    }
    text.push_str(own);
    text
}

impl SolutionBuilder {
    pub(super) fn run_to_completion(
        &mut self,
        state: &mut ProjectBuildState,
        token: Option<&CancellationToken>,
    ) -> Result<()> {
        while state.step != BuildStep::Done {
            self.execute_step(state, token)?;
        }
        Ok(())
    }

    pub(super) fn execute_step(
        &mut self,
        state: &mut ProjectBuildState,
        token: Option<&CancellationToken>,
    ) -> Result<()> {
        check_canceled(token)?;
        debug!("{:?}: {}", state.step, state.project.display());

        let event = match state.step {
            BuildStep::CreateProgram => self.create_program(state),
            BuildStep::SyntaxDiagnostics => {
                let diagnostics = state
                    .program
                    .as_ref()
                    .map(|program| program.syntactic_diagnostics())
                    .unwrap_or_default();
                self.record_errors(
                    state,
                    diagnostics,
                    BuildResultFlags::SYNTAX_ERRORS,
                    "Syntactic",
                )
            }
            BuildStep::SemanticDiagnostics => {
                let diagnostics = state
                    .program
                    .as_mut()
                    .map(|program| program.semantic_diagnostics())
                    .unwrap_or_default();
                self.record_errors(state, diagnostics, BuildResultFlags::TYPE_ERRORS, "Semantic")
            }
            BuildStep::Emit => self.emit(state),
            BuildStep::EmitBundle => self.emit_bundle(state),
            BuildStep::BuildInvalidatedProjectOfBundle => {
                self.build_bundle_from_scratch(state, token)?;
                StepEvent::Completed
            }
            BuildStep::UpdateOutputFileStamps => {
                self.update_output_timestamps(state);
                StepEvent::Completed
            }
            BuildStep::QueueReferencingProjects => {
                self.queue_referencing_projects(state);
                StepEvent::Completed
            }
            BuildStep::Done => return Ok(()),
        };

        state.step = next_step(state.step, event);
        if state.step == BuildStep::Done {
            self.finish_project(state);
        }
        Ok(())
    }

    /// Report diagnostics and, if any is an error, fail the project with `flag`
    fn record_errors(
        &mut self,
        state: &mut ProjectBuildState,
        diagnostics: Vec<Diagnostic>,
        flag: BuildResultFlags,
        kind: &str,
    ) -> StepEvent {
        if diagnostics.is_empty() {
            return StepEvent::Completed;
        }
        self.report_diagnostics(&diagnostics);
        let has_errors = diagnostics.iter().any(Diagnostic::is_error);
        state.diagnostics.extend(diagnostics);
        if !has_errors {
            return StepEvent::Completed;
        }

        state.result |= flag;
        self.project_diagnostics
            .insert(state.project.clone(), state.diagnostics.clone());
        self.statuses.insert(
            state.project.clone(),
            UpToDateStatus::Unbuildable {
                reason: format!("{} errors", kind),
            },
        );
        StepEvent::Diagnostics
    }

    fn create_program(&mut self, state: &mut ProjectBuildState) -> StepEvent {
        let project = state.project.clone();
        let parsed = state.parsed.clone();
        if self.options.verbose {
            self.report_status(
                codes::BUILDING_PROJECT,
                format!("Building project '{}'...", project.display()),
            );
        }

        let mut config_diagnostics = parsed.errors.clone();
        let mut references = Vec::with_capacity(parsed.references.len());
        for reference in &parsed.references {
            // A reference that fails to parse reports its own error when visited
            let Some(referenced) = self.parse_config(&reference.path) else {
                continue;
            };
            if !referenced.options.composite {
                config_diagnostics.push(
                    Diagnostic::error(
                        codes::REFERENCED_PROJECT_NOT_COMPOSITE,
                        format!(
                            "Referenced project '{}' must have setting \"composite\": true.",
                            reference.path.display()
                        ),
                    )
                    .with_file(&project),
                );
            }
            if reference.prepend && referenced.options.out_file.is_none() {
                config_diagnostics.push(
                    Diagnostic::error(
                        codes::PREPEND_REQUIRES_OUT_FILE,
                        format!(
                            "Cannot prepend project '{}' because it does not have 'outFile' set",
                            reference.path.display()
                        ),
                    )
                    .with_file(&project),
                );
            }
            references.push(referenced);
        }

        let prior_state = read_build_info(&*self.fs, &parsed.build_info_path())
            .ok()
            .filter(BuildInfo::is_version_compatible)
            .map(|info| info.program);
        let old_program = self.programs.remove(&project);
        let old_files = old_program
            .as_ref()
            .map(|program| program.source_files())
            .unwrap_or_default();
        let type_roots = parsed.effective_type_roots();

        self.resolution_cache.start_caching_per_directory_resolution();
        let program = {
            let mut host = ProjectResolutionHost {
                cache: &mut self.resolution_cache,
                resolver: &*self.resolver,
                fs: &*self.fs,
                watch_host: &mut *self.watch_host,
                scope: ResolutionScope {
                    redirect: Some(project.clone()),
                    root_dir: parsed.directory(),
                },
                type_roots: type_roots.clone(),
            };
            self.compiler.create_program(ProgramInput {
                project: parsed.clone(),
                references,
                old_program,
                prior_state,
                fs: &*self.fs,
                host: &mut host,
            })
        };
        self.resolution_cache
            .finish_caching_per_directory_resolution(&mut *self.watch_host);
        self.stale_resolutions.remove(&project);

        let current: FxHashSet<PathBuf> = program.source_files().into_iter().collect();
        for file in old_files.iter().filter(|file| !current.contains(*file)) {
            self.resolution_cache.remove_resolutions_of_file(file);
        }
        if self.watching {
            self.resolution_cache.update_type_roots_watch(
                &project,
                &type_roots,
                parsed.options.types.is_none(),
                &mut *self.watch_host,
            );
        }

        config_diagnostics.extend(program.options_diagnostics());
        config_diagnostics.extend(program.global_diagnostics());
        state.program = Some(program);
        self.record_errors(
            state,
            config_diagnostics,
            BuildResultFlags::CONFIG_FILE_ERRORS,
            "Config file",
        )
    }

    fn emit(&mut self, state: &mut ProjectBuildState) -> StepEvent {
        let Some(program) = state.program.as_mut() else {
            return StepEvent::Completed;
        };
        program.backup_state();
        let output = program.emit();
        if output.declaration_diagnostics.iter().any(Diagnostic::is_error) {
            // Roll back so a partial interface never reaches dependents
            program.restore_state();
            return self.record_errors(
                state,
                output.declaration_diagnostics,
                BuildResultFlags::DECLARATION_EMIT_ERRORS,
                "Declaration file",
            );
        }
        let program_state = program.state();
        // Warnings are reported and the outputs still get written
        let mut diagnostics = output.declaration_diagnostics;
        diagnostics.extend(output.diagnostics);
        if self.record_errors(state, diagnostics, BuildResultFlags::EMIT_ERRORS, "Emit")
            == StepEvent::Diagnostics
        {
            return StepEvent::Diagnostics;
        }
        if output.skipped {
            debug!("Emit skipped for {}", state.project.display());
        }

        let parsed = state.parsed.clone();
        let prior = read_build_info(&*self.fs, &parsed.build_info_path()).ok();
        let mut files = output.files;
        let mut bundle = None;
        if let Some((code_path, declaration_path)) = parsed.bundle_outputs() {
            let prepended = match self.prepended_output(&parsed) {
                Ok(prepended) => prepended,
                Err(diagnostics) => {
                    return self.record_errors(
                        state,
                        diagnostics,
                        BuildResultFlags::EMIT_ERRORS,
                        "Emit",
                    )
                }
            };
            let mut own = BundleInfo {
                code: String::new(),
                declaration: None,
            };
            for file in &mut files {
                if file.path == code_path {
                    own.code = std::mem::take(&mut file.text);
                    file.text = concat_bundle(&prepended.code, &own.code);
                } else if declaration_path.as_ref() == Some(&file.path) {
                    let declaration = std::mem::take(&mut file.text);
                    file.text = concat_bundle(&prepended.declarations, &declaration);
                    own.declaration = Some(declaration);
                }
            }
            bundle = Some(own);
        }

        self.write_outputs(state, files, prior, bundle, program_state)
    }

    /// Re-concatenate prepended upstream output without compiling
    fn emit_bundle(&mut self, state: &mut ProjectBuildState) -> StepEvent {
        let parsed = state.parsed.clone();
        if self.options.verbose {
            self.report_status(
                codes::UPDATING_BUNDLE,
                format!("Updating output of project '{}'...", state.project.display()),
            );
        }
        let prior = match read_build_info(&*self.fs, &parsed.build_info_path()) {
            Ok(info) if info.is_version_compatible() => info,
            _ => return StepEvent::BundleUnavailable,
        };
        let (Some(bundle), Some((code_path, declaration_path))) =
            (prior.bundle.clone(), parsed.bundle_outputs())
        else {
            return StepEvent::BundleUnavailable;
        };
        let Ok(prepended) = self.prepended_output(&parsed) else {
            return StepEvent::BundleUnavailable;
        };

        let mut files = vec![EmitFile {
            path: code_path,
            text: concat_bundle(&prepended.code, &bundle.code),
            write_byte_order_mark: false,
        }];
        if let (Some(path), Some(declaration)) = (declaration_path, &bundle.declaration) {
            files.push(EmitFile {
                path,
                text: concat_bundle(&prepended.declarations, declaration),
                write_byte_order_mark: false,
            });
        }
        let program_state = prior.program.clone();
        self.write_outputs(state, files, Some(prior), Some(bundle), program_state)
    }

    fn build_bundle_from_scratch(
        &mut self,
        state: &mut ProjectBuildState,
        token: Option<&CancellationToken>,
    ) -> Result<()> {
        debug!(
            "Bundle info unavailable for {}, building from scratch",
            state.project.display()
        );
        let mut nested = ProjectBuildState::new(
            state.project.clone(),
            InvalidatedProjectKind::Build,
            state.parsed.clone(),
            state.order.clone(),
        );
        self.run_to_completion(&mut nested, token)?;
        state.result = nested.result;
        state.diagnostics = nested.diagnostics;
        Ok(())
    }

    fn prepended_output(
        &mut self,
        parsed: &ParsedProject,
    ) -> std::result::Result<PrependedOutput, Vec<Diagnostic>> {
        let mut prepended = PrependedOutput::default();
        let mut errors = Vec::new();
        for reference in parsed.references.iter().filter(|r| r.prepend) {
            let Some(referenced) = self.parse_config(&reference.path) else {
                continue;
            };
            let Some((code, declaration)) = referenced.bundle_outputs() else {
                continue;
            };
            let mut paths = vec![(code, false)];
            if parsed.options.emits_declarations() {
                paths.extend(declaration.map(|path| (path, true)));
            }
            for (path, is_declaration) in paths {
                match self.fs.read_file(&path) {
                    Ok(text) if is_declaration => prepended.declarations.push(text),
                    Ok(text) => prepended.code.push(text),
                    Err(_) => errors.push(
                        Diagnostic::error(
                            codes::CANNOT_READ_FILE,
                            format!("Cannot read file '{}'", path.display()),
                        )
                        .with_file(&parsed.config_path),
                    ),
                }
            }
        }
        if errors.is_empty() {
            Ok(prepended)
        } else {
            Err(errors)
        }
    }

    /// Write outputs and build info, classifying whether declarations changed
    fn write_outputs(
        &mut self,
        state: &mut ProjectBuildState,
        files: Vec<EmitFile>,
        prior: Option<BuildInfo>,
        bundle: Option<BundleInfo>,
        program_state: Value,
    ) -> StepEvent {
        let mut result = BuildResultFlags::SUCCESS | BuildResultFlags::DECLARATION_OUTPUT_UNCHANGED;
        let mut any_declaration = false;
        let mut prior_change: Option<SystemTime> = None;
        let mut changed_declarations = Vec::new();
        let mut declaration_hashes = BTreeMap::new();
        let mut write_errors = Vec::new();

        for file in &files {
            if is_declaration_file(&file.path) {
                any_declaration = true;
                let hash = hash_text(&file.text);
                let unchanged = match self.fs.read_file(&file.path) {
                    Ok(existing) => existing == file.text,
                    Err(_) => prior
                        .as_ref()
                        .and_then(|info| info.declaration_hashes.get(&file.path))
                        == Some(&hash),
                };
                if unchanged {
                    if let Some(time) = self.fs.modified_time(&file.path) {
                        prior_change = prior_change.max(Some(time));
                    }
                } else {
                    result.remove(BuildResultFlags::DECLARATION_OUTPUT_UNCHANGED);
                    changed_declarations.push(file.path.clone());
                }
                declaration_hashes.insert(file.path.clone(), hash);
            }
            if let Err(err) = self
                .fs
                .write_file(&file.path, &file.text, file.write_byte_order_mark)
            {
                write_errors.push(
                    Diagnostic::error(
                        codes::CANNOT_WRITE_FILE,
                        format!("Could not write file '{}': {}", file.path.display(), err),
                    )
                    .with_file(&file.path),
                );
            }
        }
        if !write_errors.is_empty() {
            return self.record_errors(state, write_errors, BuildResultFlags::EMIT_ERRORS, "Emit");
        }
        if !any_declaration {
            result.remove(BuildResultFlags::DECLARATION_OUTPUT_UNCHANGED);
        }

        let latest_changed_declaration_time =
            if result.contains(BuildResultFlags::DECLARATION_OUTPUT_UNCHANGED) {
                prior
                    .as_ref()
                    .and_then(|info| info.latest_changed_declaration_time)
                    .or(prior_change.map(to_millis))
            } else {
                changed_declarations
                    .iter()
                    .filter_map(|path| self.fs.modified_time(path))
                    .max()
                    .map(to_millis)
            };

        let info = BuildInfo {
            latest_changed_declaration_time,
            declaration_hashes,
            bundle,
            program: program_state,
            ..BuildInfo::new()
        };
        let build_info_path = state.parsed.build_info_path();
        if let Err(err) = write_build_info(&*self.fs, &build_info_path, &info) {
            let diagnostic = Diagnostic::error(
                codes::CANNOT_WRITE_FILE,
                format!("Could not write file '{}': {}", build_info_path.display(), err),
            );
            return self.record_errors(
                state,
                vec![diagnostic],
                BuildResultFlags::EMIT_ERRORS,
                "Emit",
            );
        }

        debug!(
            "Wrote {} outputs for {} ({:?})",
            files.len(),
            state.project.display(),
            result
        );
        self.project_diagnostics.remove(&state.project);
        self.statuses.remove(&state.project);
        state.result = result;
        StepEvent::Completed
    }

    fn update_output_timestamps(&mut self, state: &mut ProjectBuildState) {
        if self.options.verbose {
            self.report_status(
                codes::UPDATING_OUTPUT_TIMESTAMPS,
                format!(
                    "Updating output timestamps of project '{}'...",
                    state.project.display()
                ),
            );
        }
        let now = self.fs.now();
        for output in state.parsed.all_output_file_names() {
            if self.fs.modified_time(&output).is_none() {
                continue;
            }
            if let Err(err) = self.fs.set_modified_time(&output, now) {
                warn!("Failed to update timestamp of {}: {}", output.display(), err);
            }
        }
        self.statuses.remove(&state.project);
        state.result = BuildResultFlags::DECLARATION_OUTPUT_UNCHANGED;
    }

    /// Adjust cached statuses of later projects that reference this one and queue them
    fn queue_referencing_projects(&mut self, state: &ProjectBuildState) {
        let project = &state.project;
        let Some(index) = state.order.iter().position(|p| p == project) else {
            return;
        };
        let failed = state.result.has_errors();
        let unchanged = state
            .result
            .contains(BuildResultFlags::DECLARATION_OUTPUT_UNCHANGED);

        for next in &state.order[index + 1..] {
            let Some(parsed) = self.parse_config(next) else {
                continue;
            };
            let Some(reference) = parsed.references.iter().find(|r| &r.path == project) else {
                continue;
            };

            let updated = match self.statuses.get(next) {
                _ if failed => None,
                Some(UpToDateStatus::UpToDate(info)) if unchanged => Some(if reference.prepend {
                    UpToDateStatus::OutOfDateWithPrepend {
                        out_of_date_output: info.oldest_output_file_name.clone().unwrap_or_default(),
                        newer_project: project.clone(),
                    }
                } else {
                    UpToDateStatus::UpToDateWithUpstreamTypes(info.clone())
                }),
                Some(
                    UpToDateStatus::UpToDate(info) | UpToDateStatus::UpToDateWithUpstreamTypes(info),
                ) if !unchanged => Some(UpToDateStatus::OutOfDateWithUpstream {
                    out_of_date_output: info.oldest_output_file_name.clone().unwrap_or_default(),
                    newer_project: project.clone(),
                }),
                Some(UpToDateStatus::OutOfDateWithPrepend {
                    out_of_date_output, ..
                }) if !unchanged => Some(UpToDateStatus::OutOfDateWithUpstream {
                    out_of_date_output: out_of_date_output.clone(),
                    newer_project: project.clone(),
                }),
                _ => None,
            };

            match updated {
                Some(status) => {
                    debug!("{} is now {:?}", next.display(), status);
                    self.statuses.insert(next.clone(), status);
                }
                None => {
                    let stale = failed
                        || matches!(
                            self.statuses.get(next),
                            Some(UpToDateStatus::UpstreamBlocked { upstream, .. })
                                | Some(UpToDateStatus::UpstreamOutOfDate { upstream })
                                if upstream == project
                        );
                    if stale {
                        self.statuses.remove(next);
                    }
                }
            }
            self.add_to_queue(next.clone(), ReloadLevel::None);
        }
    }

    fn finish_project(&mut self, state: &mut ProjectBuildState) {
        self.pending.remove(&state.project);
        if let Some(program) = state.program.take() {
            if self.options.watch {
                self.programs.insert(state.project.clone(), program);
            }
        }
        if !state.result.has_errors() {
            self.project_diagnostics.remove(&state.project);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concat_bundle_separates_parts() {
        let parts = vec!["local a = 1".to_string(), "local b = 2\n".to_string()];
        assert_eq!(
            concat_bundle(&parts, "local c = 3\n"),
            "local a = 1\nlocal b = 2\nlocal c = 3\n"
        );
        assert_eq!(concat_bundle(&[], "x"), "x");
    }
}
