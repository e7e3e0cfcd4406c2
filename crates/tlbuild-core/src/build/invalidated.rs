//! Per-project build state machine.
//!
//! The step sequence is a plain value advanced by [`next_step`], so the
//! transition rules can be checked without a builder around them.

use bitflags::bitflags;

bitflags! {
    /// Outcome of building one project
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct BuildResultFlags: u32 {
        const SUCCESS = 1 << 0;
        /// Declaration outputs are byte-identical to what was on disk
        const DECLARATION_OUTPUT_UNCHANGED = 1 << 1;

        const CONFIG_FILE_ERRORS = 1 << 2;
        const SYNTAX_ERRORS = 1 << 3;
        const TYPE_ERRORS = 1 << 4;
        const DECLARATION_EMIT_ERRORS = 1 << 5;
        const EMIT_ERRORS = 1 << 6;

        const ANY_ERRORS = Self::CONFIG_FILE_ERRORS.bits()
            | Self::SYNTAX_ERRORS.bits()
            | Self::TYPE_ERRORS.bits()
            | Self::DECLARATION_EMIT_ERRORS.bits()
            | Self::EMIT_ERRORS.bits();
    }
}

impl BuildResultFlags {
    pub fn has_errors(self) -> bool {
        self.intersects(Self::ANY_ERRORS)
    }

    /// Reason recorded in the `Unbuildable` status after a failed build
    pub fn error_kind(self) -> Option<&'static str> {
        if self.contains(Self::CONFIG_FILE_ERRORS) {
            Some("Config file")
        } else if self.contains(Self::SYNTAX_ERRORS) {
            Some("Syntactic")
        } else if self.contains(Self::TYPE_ERRORS) {
            Some("Semantic")
        } else if self.contains(Self::DECLARATION_EMIT_ERRORS) {
            Some("Declaration file")
        } else if self.contains(Self::EMIT_ERRORS) {
            Some("Emit")
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidatedProjectKind {
    /// Full compile
    Build,
    /// Re-concatenate prepended output from the build info, no compile
    UpdateBundle,
    /// Only refresh output timestamps
    UpdateOutputFileStamps,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BuildStep {
    CreateProgram,
    SyntaxDiagnostics,
    SemanticDiagnostics,
    Emit,
    EmitBundle,
    BuildInvalidatedProjectOfBundle,
    UpdateOutputFileStamps,
    QueueReferencingProjects,
    Done,
}

/// What happened while executing a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepEvent {
    Completed,
    /// The step recorded at least one diagnostic
    Diagnostics,
    /// Prior build info could not supply the bundle
    BundleUnavailable,
}

pub fn initial_step(kind: InvalidatedProjectKind) -> BuildStep {
    match kind {
        InvalidatedProjectKind::Build => BuildStep::CreateProgram,
        InvalidatedProjectKind::UpdateBundle => BuildStep::EmitBundle,
        InvalidatedProjectKind::UpdateOutputFileStamps => BuildStep::UpdateOutputFileStamps,
    }
}

/// Transition function of the state machine; never moves backwards
pub fn next_step(step: BuildStep, event: StepEvent) -> BuildStep {
    use BuildStep::*;

    match (step, event) {
        (CreateProgram, StepEvent::Completed) => SyntaxDiagnostics,
        (SyntaxDiagnostics, StepEvent::Completed) => SemanticDiagnostics,
        (SemanticDiagnostics, StepEvent::Completed) => Emit,
        (CreateProgram | SyntaxDiagnostics | SemanticDiagnostics, _) => QueueReferencingProjects,
        (Emit, _) => QueueReferencingProjects,
        (EmitBundle, StepEvent::BundleUnavailable) => BuildInvalidatedProjectOfBundle,
        (EmitBundle, _) => QueueReferencingProjects,
        // The detour runs a complete nested build, including its own queueing
        (BuildInvalidatedProjectOfBundle, _) => Done,
        (UpdateOutputFileStamps, _) => QueueReferencingProjects,
        (QueueReferencingProjects, _) | (Done, _) => Done,
    }
}
