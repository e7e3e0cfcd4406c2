use std::path::{Path, PathBuf};

use crate::compiler::{ModuleResolver, ResolutionOutcome, ResolvedModule};
use crate::fs::FileSystem;
use crate::paths::{directory_of, is_external_module_name_relative, resolve_path};

/// `node_modules`-style lookup over `.tl` and `.d.tl` files
#[derive(Debug, Default, Clone, Copy)]
pub struct NodeModuleResolver;

impl NodeModuleResolver {
    pub fn new() -> Self {
        Self
    }
}

fn file_candidates(base: &Path) -> Vec<PathBuf> {
    let text = base.display().to_string();
    if text.ends_with(".tl") {
        return vec![base.to_path_buf()];
    }
    vec![
        PathBuf::from(format!("{}.tl", text)),
        PathBuf::from(format!("{}.d.tl", text)),
        base.join("index.tl"),
        base.join("index.d.tl"),
    ]
}

fn probe(
    fs: &dyn FileSystem,
    candidates: impl IntoIterator<Item = PathBuf>,
    is_external_library_import: bool,
    outcome: &mut ResolutionOutcome,
) -> bool {
    for candidate in candidates {
        if fs.file_exists(&candidate) {
            outcome.resolved = Some(ResolvedModule {
                resolved_file_name: candidate,
                is_external_library_import,
            });
            return true;
        }
        outcome.failed_lookup_locations.push(candidate);
    }
    false
}

fn probe_node_modules(
    fs: &dyn FileSystem,
    name: &str,
    from: &Path,
    outcome: &mut ResolutionOutcome,
) {
    for dir in from.ancestors() {
        let node_modules = dir.join("node_modules");
        if probe(fs, file_candidates(&node_modules.join(name)), true, outcome) {
            return;
        }
        let types = node_modules.join("@types").join(name);
        if probe(fs, [types.join("index.d.tl")], true, outcome) {
            return;
        }
    }
}

impl ModuleResolver for NodeModuleResolver {
    fn resolve_module_name(
        &self,
        name: &str,
        containing_file: &Path,
        fs: &dyn FileSystem,
    ) -> ResolutionOutcome {
        let mut outcome = ResolutionOutcome::default();
        let containing_dir = directory_of(containing_file);
        if is_external_module_name_relative(name) {
            let base = resolve_path(&containing_dir, name);
            probe(fs, file_candidates(&base), false, &mut outcome);
        } else {
            probe_node_modules(fs, name, &containing_dir, &mut outcome);
        }
        outcome
    }

    fn resolve_type_reference_directive(
        &self,
        name: &str,
        containing_file: &Path,
        type_roots: &[PathBuf],
        fs: &dyn FileSystem,
    ) -> ResolutionOutcome {
        let mut outcome = ResolutionOutcome::default();
        for root in type_roots {
            let base = root.join(name);
            let candidates = [
                base.join("index.d.tl"),
                PathBuf::from(format!("{}.d.tl", base.display())),
            ];
            if probe(fs, candidates, false, &mut outcome) {
                return outcome;
            }
        }
        probe_node_modules(fs, name, &directory_of(containing_file), &mut outcome);
        outcome
    }
}
