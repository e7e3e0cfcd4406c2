//! Test utilities and fixtures for tlbuild
//!
//! Shared by the integration tests of every crate in the workspace.

pub mod fixtures;
pub mod mocks;

pub use fixtures::{TestSolution, REPO_ROOT};
pub use mocks::{CountingCompiler, DeclarationWarningCompiler};
