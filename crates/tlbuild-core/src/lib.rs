pub mod build;
pub mod cancellation;
pub mod compiler;
pub mod config;
pub mod diagnostics;
pub mod errors;
pub mod fs;
pub mod paths;
pub mod resolution;
pub mod transcribe;
pub mod watch;
pub mod wildcard;

pub use build::{
    BuildOptions, BuildOrder, BuildResultFlags, BuildStep, ExitStatus, InvalidatedProject,
    InvalidatedProjectKind, ReloadLevel, SolutionBuilder, SolutionBuilderHost, UpToDateStatus,
    WATCH_DEBOUNCE,
};
pub use cancellation::CancellationToken;
pub use compiler::{Compiler, ModuleResolver, Program, ProgramInput, ResolutionHost};
pub use config::{parse_project_config, ParsedProject, ProjectReference};
pub use diagnostics::{
    codes, CollectingDiagnosticHandler, ConsoleDiagnosticHandler, Diagnostic, DiagnosticHandler,
    DiagnosticLevel,
};
pub use errors::{BuildError, Result};
pub use fs::{FileSystem, MemoryFileSystem, RealFileSystem};
pub use resolution::{NodeModuleResolver, ResolutionCache, ResolutionCacheOptions};
pub use transcribe::TranscribeCompiler;
pub use watch::{
    NoopWatchHost, RecordingWatchHost, TimerId, WatchEvent, WatchEventKind, WatchHost,
    WatchRegistration, WatcherId,
};
