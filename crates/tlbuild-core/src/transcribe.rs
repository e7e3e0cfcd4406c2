//! Line-oriented reference compiler.
//!
//! Understands just enough TypedLua to drive the orchestrator end to end:
//!
//! - `import "name"` resolves a module and becomes `require("name")`
//! - `reference types "name"` resolves a type-reference directive
//! - `let x: T = v` / `export let x: T = v` become Lua locals; exports also
//!   produce a declaration line and must carry a type annotation
//! - braces must balance
//!
//! `outFile` projects get one concatenated bundle instead of per-file outputs.

use rustc_hash::FxHashSet;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::build::hash_text;
use crate::compiler::{Compiler, EmitFile, EmitOutput, Program, ProgramInput};
use crate::config::ParsedProject;
use crate::diagnostics::{codes, Diagnostic};
use crate::paths::is_declaration_file;

#[derive(Debug, Default, Clone, Copy)]
pub struct TranscribeCompiler;

impl TranscribeCompiler {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Export {
    name: String,
    annotation: Option<String>,
    line: usize,
}

#[derive(Debug, Clone)]
struct SourceFile {
    path: PathBuf,
    text: String,
    imports: Vec<String>,
    type_references: Vec<String>,
    exports: Vec<Export>,
}

fn quoted(rest: &str) -> Option<String> {
    let rest = rest.trim();
    let inner = rest.strip_prefix('"')?.strip_suffix('"')?;
    Some(inner.to_string())
}

/// `let name[: T] = value` split into its parts
fn split_binding(rest: &str) -> Option<(String, Option<String>, String)> {
    let (target, value) = rest.split_once('=')?;
    let (name, annotation) = match target.split_once(':') {
        Some((name, annotation)) => (name.trim(), Some(annotation.trim().to_string())),
        None => (target.trim(), None),
    };
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), annotation, value.trim().to_string()))
}

impl SourceFile {
    fn parse(path: PathBuf, text: String) -> Self {
        let mut imports = Vec::new();
        let mut type_references = Vec::new();
        let mut exports = Vec::new();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if let Some(name) = line.strip_prefix("import ").and_then(quoted) {
                imports.push(name);
            } else if let Some(name) = line.strip_prefix("reference types ").and_then(quoted) {
                type_references.push(name);
            } else if let Some(rest) = line.strip_prefix("export let ") {
                if let Some((name, annotation, _)) = split_binding(rest) {
                    exports.push(Export {
                        name,
                        annotation,
                        line: index + 1,
                    });
                }
            }
        }
        Self {
            path,
            text,
            imports,
            type_references,
            exports,
        }
    }

    fn syntax_diagnostics(&self) -> Vec<Diagnostic> {
        let mut depth: i64 = 0;
        for (index, line) in self.text.lines().enumerate() {
            for c in line.chars() {
                match c {
                    '{' => depth += 1,
                    '}' => depth -= 1,
                    _ => {}
                }
                if depth < 0 {
                    return vec![Diagnostic::error(
                        codes::EXPECTED_TOKEN,
                        format!("Unexpected '}}' on line {}", index + 1),
                    )
                    .with_file(&self.path)];
                }
            }
        }
        if depth > 0 {
            return vec![
                Diagnostic::error(codes::EXPECTED_TOKEN, "'}' expected.").with_file(&self.path)
            ];
        }
        Vec::new()
    }

    fn to_lua(&self) -> String {
        let mut out = String::new();
        for line in self.text.lines() {
            let trimmed = line.trim();
            if let Some(name) = trimmed.strip_prefix("import ").and_then(quoted) {
                out.push_str(&format!("require(\"{}\")\n", name));
            } else if trimmed.starts_with("reference types ") {
                continue;
            } else if let Some((name, _, value)) = trimmed
                .strip_prefix("export let ")
                .or_else(|| trimmed.strip_prefix("let "))
                .and_then(split_binding)
            {
                out.push_str(&format!("local {} = {}\n", name, value));
            } else {
                out.push_str(line);
                out.push('\n');
            }
        }
        if !self.exports.is_empty() {
            let fields: Vec<String> = self
                .exports
                .iter()
                .map(|export| format!("{0} = {0}", export.name))
                .collect();
            out.push_str(&format!("return {{ {} }}\n", fields.join(", ")));
        }
        out
    }

    /// Declaration text, or the exports that lack the annotation it needs
    fn to_declaration(&self) -> Result<String, Vec<Diagnostic>> {
        let missing: Vec<Diagnostic> = self
            .exports
            .iter()
            .filter(|export| export.annotation.is_none())
            .map(|export| {
                Diagnostic::error(
                    codes::EXPORT_NEEDS_TYPE_ANNOTATION,
                    format!(
                        "Exported variable '{}' on line {} must have an explicit type annotation",
                        export.name, export.line
                    ),
                )
                .with_file(&self.path)
            })
            .collect();
        if !missing.is_empty() {
            return Err(missing);
        }
        Ok(self
            .exports
            .iter()
            .map(|export| {
                format!(
                    "export let {}: {}\n",
                    export.name,
                    export.annotation.as_deref().unwrap_or_default()
                )
            })
            .collect())
    }
}

struct TranscribeProgram {
    project: Arc<ParsedProject>,
    files: Vec<SourceFile>,
    /// Resolved dependencies outside the root set
    dependencies: Vec<PathBuf>,
    options_diagnostics: Vec<Diagnostic>,
    global_diagnostics: Vec<Diagnostic>,
    semantic_diagnostics: Vec<Diagnostic>,
    /// Hash of each root file as of the last successful emit
    emitted: Map<String, Value>,
    backup: Option<Map<String, Value>>,
}

impl Compiler for TranscribeCompiler {
    fn create_program(&self, input: ProgramInput<'_>) -> Box<dyn Program> {
        let ProgramInput {
            project,
            references,
            old_program,
            prior_state,
            fs,
            host,
        } = input;

        let previous = old_program
            .map(|program| program.state())
            .or(prior_state)
            .and_then(|state| state.get("files").and_then(Value::as_object).cloned())
            .unwrap_or_default();

        let mut files = Vec::new();
        let mut options_diagnostics = Vec::new();
        for root in &project.file_names {
            match fs.read_file(root) {
                Ok(text) => files.push(SourceFile::parse(root.clone(), text)),
                Err(_) => options_diagnostics.push(
                    Diagnostic::error(
                        codes::FILE_NOT_FOUND,
                        format!("File '{}' not found.", root.display()),
                    )
                    .with_file(&project.config_path),
                ),
            }
        }

        let changed = files
            .iter()
            .filter(|file| {
                previous.get(&file.path.display().to_string())
                    != Some(&Value::String(hash_text(&file.text)))
            })
            .count();
        debug!(
            "Program for {}: {} of {} files changed",
            project.config_path.display(),
            changed,
            files.len()
        );

        let roots: FxHashSet<&PathBuf> = project.file_names.iter().collect();
        let mut dependencies = Vec::new();
        let mut semantic_diagnostics = Vec::new();
        for file in &files {
            let modules = host.resolve_module_names(&file.imports, &file.path);
            for (name, resolved) in file.imports.iter().zip(modules) {
                match resolved {
                    Some(module) => {
                        let target = redirect_to_declaration(&references, &module.resolved_file_name)
                            .unwrap_or(module.resolved_file_name);
                        if !roots.contains(&target) && !dependencies.contains(&target) {
                            dependencies.push(target);
                        }
                    }
                    None => semantic_diagnostics.push(
                        Diagnostic::error(
                            codes::CANNOT_FIND_MODULE,
                            format!("Cannot find module '{}'", name),
                        )
                        .with_file(&file.path),
                    ),
                }
            }

            let directives = host.resolve_type_reference_directives(&file.type_references, &file.path);
            for (name, resolved) in file.type_references.iter().zip(directives) {
                if resolved.is_none() {
                    semantic_diagnostics.push(
                        Diagnostic::error(
                            codes::CANNOT_FIND_TYPE_DEFINITION,
                            format!("Cannot find type definition file for '{}'", name),
                        )
                        .with_file(&file.path),
                    );
                }
            }
        }

        let mut global_diagnostics = Vec::new();
        if let Some(types) = &project.options.types {
            let resolved = host.resolve_type_reference_directives(types, &project.config_path);
            for (name, resolved) in types.iter().zip(resolved) {
                match resolved {
                    Some(module) => dependencies.push(module.resolved_file_name),
                    None => global_diagnostics.push(
                        Diagnostic::error(
                            codes::CANNOT_FIND_TYPE_DEFINITION,
                            format!("Cannot find type definition file for '{}'", name),
                        )
                        .with_file(&project.config_path),
                    ),
                }
            }
        }

        Box::new(TranscribeProgram {
            project,
            files,
            dependencies,
            options_diagnostics,
            global_diagnostics,
            semantic_diagnostics,
            emitted: previous,
            backup: None,
        })
    }
}

/// Sources of referenced projects are consumed through their declaration output
fn redirect_to_declaration(references: &[Arc<ParsedProject>], resolved: &Path) -> Option<PathBuf> {
    references
        .iter()
        .find(|reference| reference.file_names.iter().any(|f| f == resolved))
        .and_then(|reference| {
            reference
                .outputs_for_input(resolved)
                .into_iter()
                .find(|output| is_declaration_file(output))
        })
}

impl Program for TranscribeProgram {
    fn root_file_names(&self) -> &[PathBuf] {
        &self.project.file_names
    }

    fn source_files(&self) -> Vec<PathBuf> {
        self.files
            .iter()
            .map(|file| file.path.clone())
            .chain(self.dependencies.iter().cloned())
            .collect()
    }

    fn options_diagnostics(&self) -> Vec<Diagnostic> {
        self.options_diagnostics.clone()
    }

    fn global_diagnostics(&self) -> Vec<Diagnostic> {
        self.global_diagnostics.clone()
    }

    fn syntactic_diagnostics(&self) -> Vec<Diagnostic> {
        self.files
            .iter()
            .flat_map(SourceFile::syntax_diagnostics)
            .collect()
    }

    fn semantic_diagnostics(&mut self) -> Vec<Diagnostic> {
        self.semantic_diagnostics.clone()
    }

    fn emit(&mut self) -> EmitOutput {
        let emitting: Vec<&SourceFile> = self
            .files
            .iter()
            .filter(|file| !is_declaration_file(&file.path))
            .collect();
        let emit_declarations = self.project.options.emits_declarations();

        let mut declaration_diagnostics = Vec::new();
        let mut outputs: Vec<(PathBuf, String, Option<String>)> = Vec::new();
        for file in &emitting {
            let declaration = if emit_declarations {
                match file.to_declaration() {
                    Ok(text) => Some(text),
                    Err(diagnostics) => {
                        declaration_diagnostics.extend(diagnostics);
                        None
                    }
                }
            } else {
                None
            };
            outputs.push((file.path.clone(), file.to_lua(), declaration));
        }

        let mut files = Vec::new();
        if let Some((code_path, declaration_path)) = self.project.bundle_outputs() {
            let code: String = outputs.iter().map(|(_, code, _)| code.as_str()).collect();
            files.push(EmitFile {
                path: code_path,
                text: code,
                write_byte_order_mark: false,
            });
            if let Some(path) = declaration_path {
                let declaration: String = outputs
                    .iter()
                    .filter_map(|(_, _, declaration)| declaration.as_deref())
                    .collect();
                files.push(EmitFile {
                    path,
                    text: declaration,
                    write_byte_order_mark: false,
                });
            }
        } else {
            for (input, code, declaration) in outputs {
                for path in self.project.outputs_for_input(&input) {
                    let text = if is_declaration_file(&path) {
                        declaration.clone().unwrap_or_default()
                    } else {
                        code.clone()
                    };
                    files.push(EmitFile {
                        path,
                        text,
                        write_byte_order_mark: false,
                    });
                }
            }
        }

        for file in &emitting {
            self.emitted.insert(
                file.path.display().to_string(),
                Value::String(hash_text(&file.text)),
            );
        }

        EmitOutput {
            files,
            diagnostics: Vec::new(),
            declaration_diagnostics,
            skipped: false,
        }
    }

    fn backup_state(&mut self) {
        self.backup = Some(self.emitted.clone());
    }

    fn restore_state(&mut self) {
        if let Some(backup) = self.backup.take() {
            self.emitted = backup;
        }
    }

    fn state(&self) -> Value {
        json!({ "files": self.emitted })
    }
}
