use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::diagnostics::{codes, Diagnostic};
use crate::errors::{BuildError, Result};
use crate::fs::FileSystem;
use crate::paths::{
    directory_of, is_declaration_file, resolve_config_file_name, resolve_path, with_extension,
    BUILD_INFO_EXTENSION, DECLARATION_EXTENSION, OUTPUT_EXTENSION,
};
use crate::wildcard::FileSpecs;

/// `compilerOptions` exactly as written in a config file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilerOptionsFile {
    /// Output directory for compiled files
    #[serde(default)]
    pub out_dir: Option<String>,

    /// Root of the input tree mirrored under `outDir`
    #[serde(default)]
    pub root_dir: Option<String>,

    /// Bundle all output into one file
    #[serde(default)]
    pub out_file: Option<String>,

    /// Emit `.d.tl` declaration files
    #[serde(default)]
    pub declaration: Option<bool>,

    /// Project may be referenced by other projects (implies `declaration`)
    #[serde(default)]
    pub composite: Option<bool>,

    #[serde(default)]
    pub type_roots: Option<Vec<String>>,

    #[serde(default)]
    pub types: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectReferenceFile {
    pub path: String,

    /// Concatenate the referenced project's bundle in front of ours
    #[serde(default)]
    pub prepend: bool,

    /// Suppress the circularity diagnostic for this edge
    #[serde(default)]
    pub circular: bool,
}

/// `tlconfig.json`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfigFile {
    #[serde(default)]
    pub extends: Option<String>,

    #[serde(default)]
    pub compiler_options: CompilerOptionsFile,

    #[serde(default)]
    pub files: Option<Vec<String>>,

    #[serde(default)]
    pub include: Option<Vec<String>>,

    #[serde(default)]
    pub exclude: Option<Vec<String>>,

    #[serde(default)]
    pub references: Vec<ProjectReferenceFile>,
}

impl ProjectConfigFile {
    pub fn parse(text: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Compiler options after `extends` merging, with every path made absolute
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompilerOptions {
    pub out_dir: Option<PathBuf>,
    pub root_dir: Option<PathBuf>,
    pub out_file: Option<PathBuf>,
    pub declaration: bool,
    pub composite: bool,
    pub type_roots: Option<Vec<PathBuf>>,
    pub types: Option<Vec<String>>,
}

impl CompilerOptions {
    pub fn emits_declarations(&self) -> bool {
        self.declaration || self.composite
    }
}

/// Options of one file in an `extends` chain, paths resolved against that file
#[derive(Debug, Clone, Default)]
struct PartialOptions {
    out_dir: Option<PathBuf>,
    root_dir: Option<PathBuf>,
    out_file: Option<PathBuf>,
    declaration: Option<bool>,
    composite: Option<bool>,
    type_roots: Option<Vec<PathBuf>>,
    types: Option<Vec<String>>,
}

impl PartialOptions {
    fn resolve(file: &CompilerOptionsFile, dir: &Path) -> Self {
        Self {
            out_dir: file.out_dir.as_ref().map(|p| resolve_path(dir, p)),
            root_dir: file.root_dir.as_ref().map(|p| resolve_path(dir, p)),
            out_file: file.out_file.as_ref().map(|p| resolve_path(dir, p)),
            declaration: file.declaration,
            composite: file.composite,
            type_roots: file
                .type_roots
                .as_ref()
                .map(|roots| roots.iter().map(|r| resolve_path(dir, r)).collect()),
            types: file.types.clone(),
        }
    }

    /// Fields set in `over` win
    fn overlay(self, over: PartialOptions) -> Self {
        Self {
            out_dir: over.out_dir.or(self.out_dir),
            root_dir: over.root_dir.or(self.root_dir),
            out_file: over.out_file.or(self.out_file),
            declaration: over.declaration.or(self.declaration),
            composite: over.composite.or(self.composite),
            type_roots: over.type_roots.or(self.type_roots),
            types: over.types.or(self.types),
        }
    }

    fn finish(self) -> CompilerOptions {
        CompilerOptions {
            out_dir: self.out_dir,
            root_dir: self.root_dir,
            out_file: self.out_file,
            declaration: self.declaration.unwrap_or(false),
            composite: self.composite.unwrap_or(false),
            type_roots: self.type_roots,
            types: self.types,
        }
    }
}

/// A resolved edge to another project's config file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectReference {
    pub path: PathBuf,
    pub prepend: bool,
    pub circular: bool,
}

/// A fully parsed project: options, inputs, references and the non-fatal problems found on the way
#[derive(Debug, Clone)]
pub struct ParsedProject {
    pub config_path: PathBuf,
    pub options: CompilerOptions,
    pub file_names: Vec<PathBuf>,
    pub references: Vec<ProjectReference>,
    pub errors: Vec<Diagnostic>,
    pub wildcard_directories: IndexMap<PathBuf, bool>,
    pub extended_config_paths: Vec<PathBuf>,
    pub specs: FileSpecs,
}

/// Specs inherited along an `extends` chain, already anchored to the defining file
#[derive(Default)]
struct InheritedSpecs {
    files: Option<Vec<String>>,
    include: Option<Vec<String>>,
    exclude: Option<Vec<String>>,
}

fn anchor(dir: &Path, patterns: &Option<Vec<String>>) -> Option<Vec<String>> {
    patterns.as_ref().map(|patterns| {
        patterns
            .iter()
            .map(|p| dir.join(p).display().to_string())
            .collect()
    })
}

/// Read and parse a project's config file
///
/// An unreadable or malformed root file is fatal; everything else is collected into
/// [`ParsedProject::errors`].
pub fn parse_project_config(fs: &dyn FileSystem, config_path: &Path) -> Result<ParsedProject> {
    let text = fs
        .read_file(config_path)
        .map_err(|_| BuildError::ConfigNotFound {
            path: config_path.to_path_buf(),
        })?;
    let file = ProjectConfigFile::parse(&text).map_err(|e| BuildError::InvalidConfig {
        path: config_path.to_path_buf(),
        message: e.to_string(),
    })?;

    debug!("Parsed project config {}", config_path.display());

    let config_dir = directory_of(config_path);
    let mut errors = Vec::new();
    let mut extended_config_paths = Vec::new();

    // Walk the extends chain, root first, then fold bases underneath
    let mut chain = vec![(config_dir.clone(), file.clone())];
    let mut next = file.extends.clone().map(|e| (config_dir.clone(), e));
    while let Some((from_dir, extends)) = next.take() {
        let mut base_path = resolve_path(&from_dir, &extends);
        if base_path.extension().is_none() {
            base_path.set_extension("json");
        }
        if base_path == config_path || extended_config_paths.contains(&base_path) {
            errors.push(
                Diagnostic::error(
                    codes::CIRCULAR_EXTENDS,
                    format!("Circularity detected while resolving configuration: {}", base_path.display()),
                )
                .with_file(config_path),
            );
            break;
        }
        extended_config_paths.push(base_path.clone());

        let base = match fs.read_file(&base_path) {
            Ok(text) => text,
            Err(_) => {
                errors.push(
                    Diagnostic::error(
                        codes::CANNOT_READ_FILE,
                        format!("Cannot read file '{}'", base_path.display()),
                    )
                    .with_file(config_path),
                );
                break;
            }
        };
        match ProjectConfigFile::parse(&base) {
            Ok(base_file) => {
                let base_dir = directory_of(&base_path);
                next = base_file.extends.clone().map(|e| (base_dir.clone(), e));
                chain.push((base_dir, base_file));
            }
            Err(e) => {
                errors.push(
                    Diagnostic::error(codes::INVALID_CONFIG, e.to_string()).with_file(&base_path),
                );
                break;
            }
        }
    }

    let mut partial = PartialOptions::default();
    let mut inherited = InheritedSpecs::default();
    for (dir, config) in chain.iter().rev() {
        partial = partial.overlay(PartialOptions::resolve(&config.compiler_options, dir));
        if config.files.is_some() {
            inherited.files = anchor(dir, &config.files);
        }
        if config.include.is_some() {
            inherited.include = anchor(dir, &config.include);
        }
        if config.exclude.is_some() {
            inherited.exclude = anchor(dir, &config.exclude);
        }
    }
    let options = partial.finish();

    let references: Vec<ProjectReference> = file
        .references
        .iter()
        .map(|r| ProjectReference {
            path: resolve_config_file_name(&config_dir.join(&r.path)),
            prepend: r.prepend,
            circular: r.circular,
        })
        .collect();

    let exclude = inherited.exclude.unwrap_or_else(|| {
        let mut exclude = vec!["node_modules".to_string()];
        if let Some(out_dir) = &options.out_dir {
            exclude.push(out_dir.display().to_string());
        }
        exclude
    });
    let specs = FileSpecs::new(&config_dir, inherited.files, inherited.include, exclude);
    let file_names = specs.matched_file_names(fs);

    if file_names.is_empty() && references.is_empty() {
        errors.push(
            Diagnostic::error(
                codes::NO_INPUTS_FOUND,
                format!("No inputs were found in config file '{}'", config_path.display()),
            )
            .with_file(config_path),
        );
    }
    if options.out_file.is_none() {
        for reference in references.iter().filter(|r| r.prepend) {
            errors.push(
                Diagnostic::error(
                    codes::PREPEND_REQUIRES_OUT_FILE,
                    format!(
                        "Cannot prepend project '{}' because it does not have 'outFile' set",
                        reference.path.display()
                    ),
                )
                .with_file(config_path),
            );
        }
    }

    Ok(ParsedProject {
        config_path: config_path.to_path_buf(),
        options,
        wildcard_directories: specs.wildcard_directories(),
        file_names,
        references,
        errors,
        extended_config_paths,
        specs,
    })
}

impl ParsedProject {
    pub fn directory(&self) -> PathBuf {
        directory_of(&self.config_path)
    }

    /// Re-run wildcard expansion after files were added or removed
    pub fn reload_file_names(&mut self, fs: &dyn FileSystem) {
        self.file_names = self.specs.matched_file_names(fs);
        self.errors.retain(|d| d.code != codes::NO_INPUTS_FOUND);
        if self.file_names.is_empty() && self.references.is_empty() {
            self.errors.push(
                Diagnostic::error(
                    codes::NO_INPUTS_FOUND,
                    format!(
                        "No inputs were found in config file '{}'",
                        self.config_path.display()
                    ),
                )
                .with_file(&self.config_path),
            );
        }
    }

    /// Inputs that produce output (declaration inputs do not)
    pub fn emitting_inputs(&self) -> impl Iterator<Item = &PathBuf> {
        self.file_names.iter().filter(|f| !is_declaration_file(f))
    }

    /// Output paths for one input when not bundling
    pub fn outputs_for_input(&self, input: &Path) -> Vec<PathBuf> {
        if is_declaration_file(input) {
            return Vec::new();
        }
        let root = self
            .options
            .root_dir
            .clone()
            .unwrap_or_else(|| self.directory());
        let relative = input
            .strip_prefix(&root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| input.file_name().map(PathBuf::from).unwrap_or_default());
        let base = match &self.options.out_dir {
            Some(out_dir) => out_dir.join(relative),
            None => input.to_path_buf(),
        };

        let mut outputs = vec![with_extension(&base, OUTPUT_EXTENSION)];
        if self.options.emits_declarations() {
            outputs.push(with_extension(&base, DECLARATION_EXTENSION));
        }
        outputs
    }

    /// Code and declaration paths of an `outFile` bundle
    pub fn bundle_outputs(&self) -> Option<(PathBuf, Option<PathBuf>)> {
        let out_file = self.options.out_file.as_ref()?;
        let code = with_extension(out_file, OUTPUT_EXTENSION);
        let declaration = self
            .options
            .emits_declarations()
            .then(|| with_extension(out_file, DECLARATION_EXTENSION));
        Some((code, declaration))
    }

    /// Every output except the build info file
    pub fn output_file_names(&self) -> Vec<PathBuf> {
        if let Some((code, declaration)) = self.bundle_outputs() {
            return std::iter::once(code).chain(declaration).collect();
        }
        self.emitting_inputs()
            .flat_map(|input| self.outputs_for_input(input))
            .collect()
    }

    pub fn declaration_output_file_names(&self) -> Vec<PathBuf> {
        self.output_file_names()
            .into_iter()
            .filter(|p| is_declaration_file(p))
            .collect()
    }

    pub fn build_info_path(&self) -> PathBuf {
        if let Some(out_file) = &self.options.out_file {
            return with_extension(out_file, BUILD_INFO_EXTENSION);
        }
        let stem = self
            .config_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "tlconfig".to_string());
        let dir = self
            .options
            .out_dir
            .clone()
            .unwrap_or_else(|| self.directory());
        dir.join(format!("{}{}", stem, BUILD_INFO_EXTENSION))
    }

    /// Outputs plus the build info file
    pub fn all_output_file_names(&self) -> Vec<PathBuf> {
        let mut outputs = self.output_file_names();
        outputs.push(self.build_info_path());
        outputs
    }

    pub fn is_output_file(&self, path: &Path) -> bool {
        if let Some(out_dir) = &self.options.out_dir {
            if path.starts_with(out_dir) {
                return true;
            }
        }
        self.all_output_file_names().iter().any(|o| o == path)
    }

    /// Explicit type roots, or every `node_modules/@types` above the project
    pub fn effective_type_roots(&self) -> Vec<PathBuf> {
        if let Some(roots) = &self.options.type_roots {
            return roots.clone();
        }
        self.directory()
            .ancestors()
            .map(|dir| dir.join("node_modules").join("@types"))
            .collect()
    }
}
