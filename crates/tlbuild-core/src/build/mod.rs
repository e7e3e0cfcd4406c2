//! Solution builder
//!
//! Orders projects by their references, decides which ones are stale, runs
//! each stale project through the build state machine and, in watch mode,
//! turns filesystem events into debounced incremental rebuilds.

mod build_info;
mod builder;
mod invalidated;
mod order;
mod project;
mod status;
mod watcher;

pub use build_info::{
    hash_text, read_build_info, write_build_info, BuildInfo, BundleInfo, BUILD_INFO_VERSION,
};
pub use builder::{
    BuildOptions, ExitStatus, InvalidatedProject, ReloadLevel, SolutionBuilder,
    SolutionBuilderHost,
};
pub use invalidated::{
    initial_step, next_step, BuildResultFlags, BuildStep, InvalidatedProjectKind, StepEvent,
};
pub use order::{create_build_order, BuildOrder};
pub use status::{check_up_to_date, UpToDateInfo, UpToDateStatus, UpstreamStatus};
pub use watcher::WATCH_DEBOUNCE;
