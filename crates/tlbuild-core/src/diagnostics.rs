use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Error,
    Warning,
    Info,
}

/// A diagnostic message with an optional file and a stable numeric code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub code: u32,
    pub file: Option<PathBuf>,
    pub message: String,
}

impl Diagnostic {
    pub fn error(code: u32, message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Error,
            code,
            file: None,
            message: message.into(),
        }
    }

    pub fn warning(code: u32, message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Warning,
            code,
            file: None,
            message: message.into(),
        }
    }

    pub fn info(code: u32, message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Info,
            code,
            file: None,
            message: message.into(),
        }
    }

    pub fn with_file(mut self, file: impl AsRef<Path>) -> Self {
        self.file = Some(file.as_ref().to_path_buf());
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == DiagnosticLevel::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level_str = match self.level {
            DiagnosticLevel::Error => "error",
            DiagnosticLevel::Warning => "warning",
            DiagnosticLevel::Info => "info",
        };
        match &self.file {
            Some(file) => write!(
                f,
                "{}: {} TL{}: {}",
                file.display(),
                level_str,
                self.code,
                self.message
            ),
            None => write!(f, "{} TL{}: {}", level_str, self.code, self.message),
        }
    }
}

/// Stable diagnostic and status message codes
pub mod codes {
    // Configuration
    pub const CANNOT_READ_FILE: u32 = 5083;
    pub const INVALID_CONFIG: u32 = 5092;
    pub const NO_INPUTS_FOUND: u32 = 18003;
    pub const CIRCULAR_EXTENDS: u32 = 18000;
    pub const PREPEND_REQUIRES_OUT_FILE: u32 = 6308;
    pub const REFERENCED_PROJECT_NOT_COMPOSITE: u32 = 6306;
    pub const FILE_NOT_FOUND: u32 = 6053;

    // Build order
    pub const CIRCULAR_REFERENCES: u32 = 6202;

    // Program
    pub const CANNOT_FIND_MODULE: u32 = 2307;
    pub const CANNOT_FIND_TYPE_DEFINITION: u32 = 2688;
    pub const EXPECTED_TOKEN: u32 = 1005;
    pub const EXPORT_NEEDS_TYPE_ANNOTATION: u32 = 9010;
    pub const CANNOT_WRITE_FILE: u32 = 5033;

    // Status messages
    pub const PROJECTS_IN_THIS_BUILD: u32 = 6355;
    pub const PROJECT_IS_UP_TO_DATE: u32 = 6361;
    pub const PROJECT_IS_OUT_OF_DATE: u32 = 6350;
    pub const BUILDING_PROJECT: u32 = 6358;
    pub const UPDATING_OUTPUT_TIMESTAMPS: u32 = 6359;
    pub const UPDATING_BUNDLE: u32 = 6371;
    pub const SKIPPING_BUILD_UPSTREAM_ERRORS: u32 = 6362;
    pub const DRY_WOULD_BUILD: u32 = 6357;
    pub const DRY_WOULD_UPDATE_TIMESTAMPS: u32 = 6374;
    pub const DRY_WOULD_DELETE: u32 = 6356;
    pub const FOUND_ERRORS: u32 = 6194;
    pub const FOUND_ERRORS_WATCHING: u32 = 6193;
    pub const STARTING_WATCH_COMPILATION: u32 = 6031;
    pub const FILE_CHANGE_DETECTED: u32 = 6032;
}

/// Trait for handling diagnostics
/// This allows for dependency injection and testing with mock handlers
pub trait DiagnosticHandler: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);

    fn error(&self, code: u32, message: &str) {
        self.report(Diagnostic::error(code, message));
    }

    fn warning(&self, code: u32, message: &str) {
        self.report(Diagnostic::warning(code, message));
    }

    fn info(&self, code: u32, message: &str) {
        self.report(Diagnostic::info(code, message));
    }

    fn has_errors(&self) -> bool;
    fn error_count(&self) -> usize;
    fn warning_count(&self) -> usize;
    fn get_diagnostics(&self) -> Vec<Diagnostic>;
}

/// Console-based diagnostic handler that prints to stderr
pub struct ConsoleDiagnosticHandler {
    diagnostics: Mutex<Vec<Diagnostic>>,
    pretty: bool,
}

impl ConsoleDiagnosticHandler {
    pub fn new(pretty: bool) -> Self {
        Self {
            diagnostics: Mutex::new(Vec::new()),
            pretty,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Diagnostic>> {
        self.diagnostics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DiagnosticHandler for ConsoleDiagnosticHandler {
    fn report(&self, diagnostic: Diagnostic) {
        if self.pretty && diagnostic.is_error() {
            eprintln!("\x1b[1m{}\x1b[0m", diagnostic);
        } else {
            eprintln!("{}", diagnostic);
        }

        self.lock().push(diagnostic);
    }

    fn has_errors(&self) -> bool {
        self.lock().iter().any(Diagnostic::is_error)
    }

    fn error_count(&self) -> usize {
        self.lock().iter().filter(|d| d.is_error()).count()
    }

    fn warning_count(&self) -> usize {
        self.lock()
            .iter()
            .filter(|d| d.level == DiagnosticLevel::Warning)
            .count()
    }

    fn get_diagnostics(&self) -> Vec<Diagnostic> {
        self.lock().clone()
    }
}

/// Collecting diagnostic handler for testing
/// Collects all diagnostics without printing
pub struct CollectingDiagnosticHandler {
    diagnostics: Mutex<Vec<Diagnostic>>,
}

impl CollectingDiagnosticHandler {
    pub fn new() -> Self {
        Self {
            diagnostics: Mutex::new(Vec::new()),
        }
    }

    /// Drop everything collected so far
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Messages of every collected entry with the given code
    pub fn messages_with_code(&self, code: u32) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|d| d.code == code)
            .map(|d| d.message.clone())
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Diagnostic>> {
        self.diagnostics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for CollectingDiagnosticHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticHandler for CollectingDiagnosticHandler {
    fn report(&self, diagnostic: Diagnostic) {
        self.lock().push(diagnostic);
    }

    fn has_errors(&self) -> bool {
        self.lock().iter().any(Diagnostic::is_error)
    }

    fn error_count(&self) -> usize {
        self.lock().iter().filter(|d| d.is_error()).count()
    }

    fn warning_count(&self) -> usize {
        self.lock()
            .iter()
            .filter(|d| d.level == DiagnosticLevel::Warning)
            .count()
    }

    fn get_diagnostics(&self) -> Vec<Diagnostic> {
        self.lock().clone()
    }
}
