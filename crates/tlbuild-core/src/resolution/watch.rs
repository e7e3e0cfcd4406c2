//! Choosing which directory to watch for a failed lookup location.

use std::path::{Path, PathBuf};

use crate::paths::{can_watch_directory, directory_of, is_in_directory, is_node_modules_directory};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryToWatch {
    pub dir: PathBuf,
    pub recursive: bool,
}

/// Directory whose watcher will report the creation of `failed_lookup`
///
/// Under `root_dir` this is the child of the root that contains the location
/// (recursive), or the root itself (non-recursive) for direct children. Outside
/// the root, the topmost `node_modules` is watched recursively; otherwise the
/// walk climbs until it reaches an ancestor of the root. `None` when the
/// resulting directory is too close to the filesystem root to watch.
pub fn directory_to_watch(failed_lookup: &Path, root_dir: &Path) -> Option<DirectoryToWatch> {
    let lookup_dir = directory_of(failed_lookup);

    if is_in_directory(root_dir, &lookup_dir) {
        let relative = lookup_dir.strip_prefix(root_dir).ok()?;
        return match relative.components().next() {
            Some(first) => Some(DirectoryToWatch {
                dir: root_dir.join(first),
                recursive: true,
            }),
            None => Some(DirectoryToWatch {
                dir: root_dir.to_path_buf(),
                recursive: false,
            }),
        };
    }

    if let Some(node_modules) = topmost_node_modules(&lookup_dir) {
        let parent = directory_of(&node_modules);
        return can_watch_directory(&parent).then_some(DirectoryToWatch {
            dir: node_modules,
            recursive: true,
        });
    }

    let mut dir = lookup_dir;
    let mut sub_directory = None;
    while !is_in_directory(&dir, root_dir) {
        let Some(parent) = dir.parent().map(Path::to_path_buf) else {
            break;
        };
        sub_directory = Some(dir);
        dir = parent;
    }
    if !can_watch_directory(&dir) {
        return None;
    }
    let recursive = sub_directory.is_some();
    Some(DirectoryToWatch {
        dir: sub_directory.unwrap_or(dir),
        recursive,
    })
}

fn topmost_node_modules(dir: &Path) -> Option<PathBuf> {
    dir.ancestors()
        .filter(|ancestor| is_node_modules_directory(ancestor))
        .last()
        .map(Path::to_path_buf)
}
