//! Mock implementations for testing

use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tlbuild_core::compiler::{Compiler, EmitOutput, Program, ProgramInput};
use tlbuild_core::{Diagnostic, TranscribeCompiler};

/// Transcribing compiler that counts how many programs it created
#[derive(Debug, Default, Clone)]
pub struct CountingCompiler {
    inner: TranscribeCompiler,
    created: Arc<AtomicUsize>,
}

impl CountingCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count into an existing counter, e.g. one shared by several builders
    pub fn sharing(created: Arc<AtomicUsize>) -> Self {
        Self {
            inner: TranscribeCompiler::new(),
            created,
        }
    }

    /// Shared counter; stays valid after the compiler is boxed into a host
    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.created.clone()
    }
}

impl Compiler for CountingCompiler {
    fn create_program(&self, input: ProgramInput<'_>) -> Box<dyn Program> {
        self.created.fetch_add(1, Ordering::SeqCst);
        self.inner.create_program(input)
    }
}

/// Counting compiler whose programs attach one warning to every declaration emit
#[derive(Debug, Clone)]
pub struct DeclarationWarningCompiler {
    inner: CountingCompiler,
    code: u32,
}

impl DeclarationWarningCompiler {
    pub fn new(inner: CountingCompiler, code: u32) -> Self {
        Self { inner, code }
    }
}

impl Compiler for DeclarationWarningCompiler {
    fn create_program(&self, input: ProgramInput<'_>) -> Box<dyn Program> {
        Box::new(DeclarationWarningProgram {
            inner: self.inner.create_program(input),
            code: self.code,
        })
    }
}

struct DeclarationWarningProgram {
    inner: Box<dyn Program>,
    code: u32,
}

impl Program for DeclarationWarningProgram {
    fn root_file_names(&self) -> &[PathBuf] {
        self.inner.root_file_names()
    }

    fn source_files(&self) -> Vec<PathBuf> {
        self.inner.source_files()
    }

    fn options_diagnostics(&self) -> Vec<Diagnostic> {
        self.inner.options_diagnostics()
    }

    fn global_diagnostics(&self) -> Vec<Diagnostic> {
        self.inner.global_diagnostics()
    }

    fn syntactic_diagnostics(&self) -> Vec<Diagnostic> {
        self.inner.syntactic_diagnostics()
    }

    fn semantic_diagnostics(&mut self) -> Vec<Diagnostic> {
        self.inner.semantic_diagnostics()
    }

    fn emit(&mut self) -> EmitOutput {
        let mut output = self.inner.emit();
        output.declaration_diagnostics.push(Diagnostic::warning(
            self.code,
            "Declaration emit used an inferred type",
        ));
        output
    }

    fn backup_state(&mut self) {
        self.inner.backup_state()
    }

    fn restore_state(&mut self) {
        self.inner.restore_state()
    }

    fn state(&self) -> Value {
        self.inner.state()
    }
}
