//! Lexical path helpers shared by the builder and the resolution cache.
//!
//! All paths handled by the orchestrator are absolute and normalized; no
//! helper here touches the filesystem.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "tlconfig.json";
pub const SOURCE_EXTENSION: &str = ".tl";
pub const DECLARATION_EXTENSION: &str = ".d.tl";
pub const OUTPUT_EXTENSION: &str = ".lua";
pub const BUILD_INFO_EXTENSION: &str = ".tlbuildinfo";

const NODE_MODULES: &str = "node_modules";

/// Resolve `.` and `..` components without consulting the filesystem
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(component);
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}

/// Join `path` onto `base` unless it is already absolute, then normalize
pub fn resolve_path(base: &Path, path: impl AsRef<Path>) -> PathBuf {
    normalize_path(&base.join(path.as_ref()))
}

/// Parent directory, or the path itself for a root
pub fn directory_of(path: &Path) -> PathBuf {
    path.parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| path.to_path_buf())
}

/// Whether `child` equals `dir` or lies beneath it
pub fn is_in_directory(dir: &Path, child: &Path) -> bool {
    child.starts_with(dir)
}

/// Project names may point at a directory or directly at a config file
pub fn resolve_config_file_name(path: &Path) -> PathBuf {
    let normalized = normalize_path(path);
    if normalized.extension() == Some(OsStr::new("json")) {
        normalized
    } else {
        normalized.join(CONFIG_FILE_NAME)
    }
}

pub fn is_external_module_name_relative(name: &str) -> bool {
    name.starts_with("./")
        || name.starts_with("../")
        || name == "."
        || name == ".."
        || Path::new(name).is_absolute()
}

pub fn is_declaration_file(path: &Path) -> bool {
    path.to_string_lossy().ends_with(DECLARATION_EXTENSION)
}

pub fn has_source_extension(path: &Path) -> bool {
    path.to_string_lossy().ends_with(SOURCE_EXTENSION)
}

/// Extensions produced by the default resolver; other failed lookups are tracked individually
pub fn has_default_failed_lookup_extension(path: &Path) -> bool {
    let text = path.to_string_lossy();
    text.ends_with(SOURCE_EXTENSION) || text.ends_with(".json") || text.ends_with(OUTPUT_EXTENSION)
}

/// Strip `.d.tl` or `.tl` from a file path
pub fn remove_source_extension(path: &Path) -> PathBuf {
    let text = path.to_string_lossy();
    if let Some(stem) = text.strip_suffix(DECLARATION_EXTENSION) {
        PathBuf::from(stem)
    } else if let Some(stem) = text.strip_suffix(SOURCE_EXTENSION) {
        PathBuf::from(stem)
    } else if let Some(stem) = text.strip_suffix(OUTPUT_EXTENSION) {
        PathBuf::from(stem)
    } else {
        path.to_path_buf()
    }
}

pub fn with_extension(path: &Path, extension: &str) -> PathBuf {
    let mut text = remove_source_extension(path).into_os_string();
    text.push(extension);
    PathBuf::from(text)
}

pub fn is_node_modules_directory(path: &Path) -> bool {
    path.file_name() == Some(OsStr::new(NODE_MODULES))
}

pub fn is_node_modules_at_types_directory(path: &Path) -> bool {
    path.file_name() == Some(OsStr::new("@types"))
        && path.parent().is_some_and(is_node_modules_directory)
}

pub fn path_contains_node_modules(path: &Path) -> bool {
    path.components()
        .any(|c| c.as_os_str() == OsStr::new(NODE_MODULES))
}

/// Filter out editor temp files, VCS internals and package-manager staging areas
pub fn remove_ignored_path(path: &Path) -> Option<PathBuf> {
    let text = path.to_string_lossy();
    if let Some(stripped) = text.strip_suffix("/node_modules/.staging") {
        return Some(PathBuf::from(format!("{}/node_modules", stripped)));
    }
    const IGNORED: [&str; 3] = ["/node_modules/.", "/.git", "/.#"];
    if IGNORED.iter().any(|ignored| text.contains(ignored)) {
        None
    } else {
        Some(path.to_path_buf())
    }
}

/// Filesystem roots and top-level/user-home directories are never watched
pub fn can_watch_directory(dir: &Path) -> bool {
    let depth = dir
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .count();
    if dir.is_absolute() && dir.has_root() {
        depth >= 3
    } else {
        depth >= 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Path::new("/a/b/../c/./d.tl")),
            PathBuf::from("/a/c/d.tl")
        );
        assert_eq!(resolve_path(Path::new("/a/b"), "../x"), PathBuf::from("/a/x"));
        assert_eq!(resolve_path(Path::new("/a/b"), "/abs"), PathBuf::from("/abs"));
    }

    #[test]
    fn test_resolve_config_file_name() {
        assert_eq!(
            resolve_config_file_name(Path::new("/repo/core")),
            PathBuf::from("/repo/core/tlconfig.json")
        );
        assert_eq!(
            resolve_config_file_name(Path::new("/repo/core/tlconfig.build.json")),
            PathBuf::from("/repo/core/tlconfig.build.json")
        );
    }

    #[test]
    fn test_relative_module_names() {
        assert!(is_external_module_name_relative("./util"));
        assert!(is_external_module_name_relative("../util"));
        assert!(!is_external_module_name_relative("lodash"));
        assert!(!is_external_module_name_relative(".hidden"));
    }

    #[test]
    fn test_extensions() {
        let decl = Path::new("/p/out/a.d.tl");
        assert!(is_declaration_file(decl));
        assert!(has_source_extension(decl));
        assert_eq!(
            with_extension(Path::new("/p/src/a.tl"), OUTPUT_EXTENSION),
            PathBuf::from("/p/src/a.lua")
        );
        assert_eq!(
            with_extension(decl, BUILD_INFO_EXTENSION),
            PathBuf::from("/p/out/a.tlbuildinfo")
        );
    }

    #[test]
    fn test_node_modules_helpers() {
        assert!(is_node_modules_directory(Path::new("/p/node_modules")));
        assert!(is_node_modules_at_types_directory(Path::new(
            "/p/node_modules/@types"
        )));
        assert!(path_contains_node_modules(Path::new("/p/node_modules/x/y")));
        assert!(!path_contains_node_modules(Path::new("/p/src/x")));
    }

    #[test]
    fn test_remove_ignored_path() {
        assert_eq!(
            remove_ignored_path(Path::new("/p/node_modules/.staging")),
            Some(PathBuf::from("/p/node_modules"))
        );
        assert_eq!(remove_ignored_path(Path::new("/p/node_modules/.cache/x")), None);
        assert_eq!(remove_ignored_path(Path::new("/p/.git/index")), None);
        assert!(remove_ignored_path(Path::new("/p/src/a.tl")).is_some());
    }

    #[test]
    fn test_can_watch_directory() {
        assert!(!can_watch_directory(Path::new("/")));
        assert!(!can_watch_directory(Path::new("/home")));
        assert!(!can_watch_directory(Path::new("/home/user")));
        assert!(can_watch_directory(Path::new("/home/user/project")));
    }
}
