//! Collaborator interfaces the orchestrator drives but does not implement:
//! program construction, diagnostics, emit and single-name resolution.

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::ParsedProject;
use crate::diagnostics::Diagnostic;
use crate::fs::FileSystem;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModule {
    pub resolved_file_name: PathBuf,
    /// Found through a `node_modules` lookup rather than a relative path
    pub is_external_library_import: bool,
}

/// Result of resolving one name: the artifact, plus every path probed and found absent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionOutcome {
    pub resolved: Option<ResolvedModule>,
    pub failed_lookup_locations: Vec<PathBuf>,
}

/// Resolves a single name; caching and watching are layered on top
pub trait ModuleResolver: Send + Sync {
    fn resolve_module_name(
        &self,
        name: &str,
        containing_file: &Path,
        fs: &dyn FileSystem,
    ) -> ResolutionOutcome;

    fn resolve_type_reference_directive(
        &self,
        name: &str,
        containing_file: &Path,
        type_roots: &[PathBuf],
        fs: &dyn FileSystem,
    ) -> ResolutionOutcome;
}

/// Batch resolution as seen by a program under construction
pub trait ResolutionHost {
    fn resolve_module_names(
        &mut self,
        names: &[String],
        containing_file: &Path,
    ) -> Vec<Option<ResolvedModule>>;

    fn resolve_type_reference_directives(
        &mut self,
        names: &[String],
        containing_file: &Path,
    ) -> Vec<Option<ResolvedModule>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmitFile {
    pub path: PathBuf,
    pub text: String,
    pub write_byte_order_mark: bool,
}

#[derive(Debug, Clone, Default)]
pub struct EmitOutput {
    pub files: Vec<EmitFile>,
    pub diagnostics: Vec<Diagnostic>,
    pub declaration_diagnostics: Vec<Diagnostic>,
    pub skipped: bool,
}

/// A compiled project, queried step by step by the build state machine
pub trait Program: Send {
    fn root_file_names(&self) -> &[PathBuf];

    /// Every file the program pulled in, roots included
    fn source_files(&self) -> Vec<PathBuf>;

    fn options_diagnostics(&self) -> Vec<Diagnostic>;
    fn global_diagnostics(&self) -> Vec<Diagnostic>;
    fn syntactic_diagnostics(&self) -> Vec<Diagnostic>;
    fn semantic_diagnostics(&mut self) -> Vec<Diagnostic>;

    /// Produce output text; nothing is written by the program itself
    fn emit(&mut self) -> EmitOutput;

    /// Snapshot incremental state so a failed declaration emit can be rolled back
    fn backup_state(&mut self);
    fn restore_state(&mut self);

    /// Opaque state persisted in the build info
    fn state(&self) -> Value;
}

/// Everything a compiler needs to build one project
pub struct ProgramInput<'a> {
    pub project: Arc<ParsedProject>,
    pub references: Vec<Arc<ParsedProject>>,
    pub old_program: Option<Box<dyn Program>>,
    pub prior_state: Option<Value>,
    pub fs: &'a dyn FileSystem,
    pub host: &'a mut dyn ResolutionHost,
}

pub trait Compiler {
    fn create_program(&self, input: ProgramInput<'_>) -> Box<dyn Program>;
}
