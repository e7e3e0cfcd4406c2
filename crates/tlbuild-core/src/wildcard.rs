//! `files` / `include` / `exclude` expansion and wildcard-directory discovery.

use glob::{MatchOptions, Pattern};
use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use std::path::{Component, Path, PathBuf};
use tracing::warn;

use crate::fs::FileSystem;
use crate::paths::{has_source_extension, normalize_path};

const DEFAULT_INCLUDE: &str = "**/*";

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// File selection of one project, with every path relative to `base_dir` already resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSpecs {
    pub base_dir: PathBuf,
    pub files: Option<Vec<PathBuf>>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl FileSpecs {
    pub fn new(
        base_dir: &Path,
        files: Option<Vec<String>>,
        include: Option<Vec<String>>,
        exclude: Vec<String>,
    ) -> Self {
        let include = match (&files, include) {
            (_, Some(include)) => include,
            (Some(_), None) => Vec::new(),
            (None, None) => vec![DEFAULT_INCLUDE.to_string()],
        };
        let files = files.map(|files| {
            files
                .iter()
                .map(|f| normalize_path(&base_dir.join(f)))
                .collect()
        });

        Self {
            base_dir: base_dir.to_path_buf(),
            files,
            include: include.iter().map(|p| absolute_pattern(base_dir, p)).collect(),
            exclude: exclude.iter().map(|p| absolute_pattern(base_dir, p)).collect(),
        }
    }

    /// Explicit files first, then every wildcard match in a stable order
    pub fn matched_file_names(&self, fs: &dyn FileSystem) -> Vec<PathBuf> {
        let mut seen = FxHashSet::default();
        let mut result = Vec::new();

        if let Some(files) = &self.files {
            for file in files {
                if seen.insert(file.clone()) {
                    result.push(file.clone());
                }
            }
        }

        for include in &self.include {
            let Some(pattern) = compile(include) else {
                continue;
            };
            let (base, recursive) = literal_base(include);
            let mut matches = Vec::new();
            self.collect(fs, &base, recursive, &pattern, &mut matches);
            matches.sort();
            for file in matches {
                if seen.insert(file.clone()) {
                    result.push(file);
                }
            }
        }

        result
    }

    fn collect(
        &self,
        fs: &dyn FileSystem,
        dir: &Path,
        recursive: bool,
        pattern: &Pattern,
        out: &mut Vec<PathBuf>,
    ) {
        let Ok(entries) = fs.read_dir(dir) else {
            return;
        };
        for entry in entries {
            if self.is_excluded(&entry.path) {
                continue;
            }
            if entry.is_dir {
                if recursive {
                    self.collect(fs, &entry.path, recursive, pattern, out);
                }
            } else if has_source_extension(&entry.path)
                && pattern.matches_path_with(&entry.path, MATCH_OPTIONS)
            {
                out.push(entry.path);
            }
        }
    }

    /// A path is excluded when it, or any ancestor under the base directory, matches an exclude
    pub fn is_excluded(&self, path: &Path) -> bool {
        let patterns: Vec<Pattern> = self.exclude.iter().filter_map(|p| compile(p)).collect();
        let mut current = Some(path);
        while let Some(candidate) = current {
            if !candidate.starts_with(&self.base_dir) {
                break;
            }
            if patterns
                .iter()
                .any(|p| p.matches_path_with(candidate, MATCH_OPTIONS))
            {
                return true;
            }
            current = candidate.parent();
        }
        false
    }

    /// Whether a newly created file would be picked up by this project's wildcards
    pub fn matches_wildcards(&self, path: &Path) -> bool {
        has_source_extension(path)
            && !self.is_excluded(path)
            && self
                .include
                .iter()
                .filter_map(|p| compile(p))
                .any(|p| p.matches_path_with(path, MATCH_OPTIONS))
    }

    /// Directories to watch for added or removed inputs, mapped to "recursive"
    pub fn wildcard_directories(&self) -> IndexMap<PathBuf, bool> {
        let mut directories: IndexMap<PathBuf, bool> = IndexMap::new();
        for include in &self.include {
            let (base, recursive) = literal_base(include);
            let entry = directories.entry(base).or_insert(recursive);
            *entry |= recursive;
        }

        let recursive_roots: Vec<PathBuf> = directories
            .iter()
            .filter(|(_, recursive)| **recursive)
            .map(|(dir, _)| dir.clone())
            .collect();
        directories.retain(|dir, _| {
            !recursive_roots
                .iter()
                .any(|root| root != dir && dir.starts_with(root))
        });
        directories
    }
}

/// Directory names without wildcards mean "everything below"
fn absolute_pattern(base_dir: &Path, pattern: &str) -> String {
    let joined = normalize_path(&base_dir.join(pattern));
    let last = joined
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if !has_wildcard(&last) && !last.contains('.') {
        format!("{}/{}", joined.display(), DEFAULT_INCLUDE)
    } else {
        joined.display().to_string()
    }
}

fn has_wildcard(segment: &str) -> bool {
    segment.contains(['*', '?', '['])
}

fn compile(pattern: &str) -> Option<Pattern> {
    match Pattern::new(pattern) {
        Ok(pattern) => Some(pattern),
        Err(e) => {
            warn!("Ignoring invalid file pattern '{}': {}", pattern, e);
            None
        }
    }
}

/// Longest wildcard-free directory prefix of a pattern, and whether matching must recurse
fn literal_base(pattern: &str) -> (PathBuf, bool) {
    let path = Path::new(pattern);
    let components: Vec<Component> = path.components().collect();
    let first_wild = components
        .iter()
        .position(|c| has_wildcard(&c.as_os_str().to_string_lossy()))
        .unwrap_or(components.len().saturating_sub(1));

    let base: PathBuf = components[..first_wild].iter().collect();
    let rest = &components[first_wild..];
    let recursive = rest.len() > 1 || rest.iter().any(|c| c.as_os_str() == "**");
    (base, recursive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFileSystem;

    fn project_fs() -> MemoryFileSystem {
        let fs = MemoryFileSystem::new();
        fs.add_file("/p/src/a.tl", "");
        fs.add_file("/p/src/nested/b.tl", "");
        fs.add_file("/p/src/readme.md", "");
        fs.add_file("/p/dist/a.d.tl", "");
        fs.add_file("/p/node_modules/dep/index.d.tl", "");
        fs
    }

    #[test]
    fn test_default_include_respects_excludes() {
        let fs = project_fs();
        let specs = FileSpecs::new(
            Path::new("/p"),
            None,
            None,
            vec!["node_modules".to_string(), "dist".to_string()],
        );

        assert_eq!(
            specs.matched_file_names(&fs),
            vec![
                PathBuf::from("/p/src/a.tl"),
                PathBuf::from("/p/src/nested/b.tl")
            ]
        );
    }

    #[test]
    fn test_non_recursive_include() {
        let fs = project_fs();
        let specs = FileSpecs::new(Path::new("/p"), None, Some(vec!["src/*.tl".into()]), vec![]);

        assert_eq!(specs.matched_file_names(&fs), vec![PathBuf::from("/p/src/a.tl")]);
        let dirs = specs.wildcard_directories();
        assert_eq!(dirs.get(Path::new("/p/src")), Some(&false));
    }

    #[test]
    fn test_explicit_files_keep_missing_entries() {
        let fs = project_fs();
        let specs = FileSpecs::new(
            Path::new("/p"),
            Some(vec!["src/a.tl".into(), "src/missing.tl".into()]),
            None,
            vec![],
        );

        assert_eq!(
            specs.matched_file_names(&fs),
            vec![
                PathBuf::from("/p/src/a.tl"),
                PathBuf::from("/p/src/missing.tl")
            ]
        );
        assert!(specs.wildcard_directories().is_empty());
    }

    #[test]
    fn test_wildcard_directories_collapse_nested() {
        let specs = FileSpecs::new(
            Path::new("/p"),
            None,
            Some(vec!["src".into(), "src/nested/*.tl".into()]),
            vec![],
        );

        let dirs = specs.wildcard_directories();
        assert_eq!(dirs.len(), 1);
        assert_eq!(dirs.get(Path::new("/p/src")), Some(&true));
    }

    #[test]
    fn test_matches_wildcards() {
        let specs = FileSpecs::new(Path::new("/p"), None, None, vec!["dist".into()]);

        assert!(specs.matches_wildcards(Path::new("/p/src/new.tl")));
        assert!(!specs.matches_wildcards(Path::new("/p/dist/new.tl")));
        assert!(!specs.matches_wildcards(Path::new("/p/src/new.md")));
    }
}
