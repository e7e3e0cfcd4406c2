use std::path::{Path, PathBuf};

use crate::compiler::{ModuleResolver, ResolutionHost, ResolvedModule};
use crate::fs::FileSystem;
use crate::watch::WatchHost;

use super::{ResolutionCache, ResolutionScope};

/// The resolution cache seen through one project while its program is built
pub struct ProjectResolutionHost<'a> {
    pub cache: &'a mut ResolutionCache,
    pub resolver: &'a dyn ModuleResolver,
    pub fs: &'a dyn FileSystem,
    pub watch_host: &'a mut dyn WatchHost,
    pub scope: ResolutionScope,
    pub type_roots: Vec<PathBuf>,
}

impl ResolutionHost for ProjectResolutionHost<'_> {
    fn resolve_module_names(
        &mut self,
        names: &[String],
        containing_file: &Path,
    ) -> Vec<Option<ResolvedModule>> {
        let resolver = self.resolver;
        let fs = self.fs;
        self.cache.resolve_module_names(
            names,
            containing_file,
            &self.scope,
            &mut |name| resolver.resolve_module_name(name, containing_file, fs),
            &mut *self.watch_host,
        )
    }

    fn resolve_type_reference_directives(
        &mut self,
        names: &[String],
        containing_file: &Path,
    ) -> Vec<Option<ResolvedModule>> {
        let resolver = self.resolver;
        let fs = self.fs;
        let type_roots = &self.type_roots;
        self.cache.resolve_type_reference_directives(
            names,
            containing_file,
            &self.scope,
            &mut |name| {
                resolver.resolve_type_reference_directive(name, containing_file, type_roots, fs)
            },
            &mut *self.watch_host,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFileSystem;
    use crate::resolution::NodeModuleResolver;
    use crate::watch::NoopWatchHost;

    #[test]
    fn test_second_file_in_directory_costs_no_probes() {
        let fs = MemoryFileSystem::new();
        fs.add_file("/home/user/repo/app/src/util.tl", "");
        let mut cache = ResolutionCache::default();
        let mut watch_host = NoopWatchHost::new();
        let resolver = NodeModuleResolver::new();
        let names = vec!["./util".to_string(), "missing-dep".to_string()];

        cache.start_caching_per_directory_resolution();
        let mut host = ProjectResolutionHost {
            cache: &mut cache,
            resolver: &resolver,
            fs: &fs,
            watch_host: &mut watch_host,
            scope: ResolutionScope {
                redirect: None,
                root_dir: PathBuf::from("/home/user/repo/app"),
            },
            type_roots: Vec::new(),
        };

        host.resolve_module_names(&names, Path::new("/home/user/repo/app/src/a.tl"));
        fs.reset_counters();
        let second = host.resolve_module_names(&names, Path::new("/home/user/repo/app/src/b.tl"));

        assert_eq!(fs.file_exists_calls(), 0);
        assert!(second[0].is_some());
        assert!(second[1].is_none());
    }
}
