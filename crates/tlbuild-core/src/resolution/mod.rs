//! Resolution cache for module names and type-reference directives
//!
//! Resolutions are cached per containing file and per directory, and every
//! failed lookup location is tied to a reference-counted directory watcher so
//! the cache learns when a previously missing file appears.

mod cache;
mod host;
mod resolver;
mod watch;

pub use cache::{
    CacheEventOutcome, Resolution, ResolutionCache, ResolutionCacheOptions, ResolutionId,
    ResolutionKind, ResolutionScope,
};
pub use host::ProjectResolutionHost;
pub use resolver::NodeModuleResolver;
pub use watch::{directory_to_watch, DirectoryToWatch};

/// Default ceiling on containing files flagged by one invalidation
pub const DEFAULT_MAX_FILES_TO_ITERATE_FOR_INVALIDATION: usize = 256;
