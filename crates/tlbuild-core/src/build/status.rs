use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::config::ParsedProject;
use crate::diagnostics::{codes, Diagnostic};
use crate::fs::FileSystem;

use super::build_info::{read_build_info, BUILD_INFO_VERSION};

/// Timestamps gathered while classifying a project as up to date
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpToDateInfo {
    pub newest_input_file_time: Option<SystemTime>,
    pub newest_input_file_name: Option<PathBuf>,
    /// Last time the declaration content (not just its timestamp) changed
    pub newest_declaration_changed_time: Option<SystemTime>,
    pub newest_output_file_time: Option<SystemTime>,
    pub newest_output_file_name: Option<PathBuf>,
    pub oldest_output_file_time: Option<SystemTime>,
    pub oldest_output_file_name: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpToDateStatus {
    /// Config could not be used or an input is missing
    Unbuildable { reason: String },
    /// No inputs; only aggregates references
    ContainerOnly,
    OutOfDateWithSelf {
        out_of_date_output: PathBuf,
        newer_input: PathBuf,
    },
    OutOfDateWithUpstream {
        out_of_date_output: PathBuf,
        newer_project: PathBuf,
    },
    UpstreamOutOfDate {
        upstream: PathBuf,
    },
    UpstreamBlocked {
        upstream: PathBuf,
        /// Upstream was itself blocked rather than broken
        upstream_project_blocked: bool,
    },
    OutputMissing {
        missing_output: PathBuf,
    },
    OutOfDateWithPrepend {
        out_of_date_output: PathBuf,
        newer_project: PathBuf,
    },
    ToolVersionOutOfDate {
        version: String,
    },
    UpToDate(UpToDateInfo),
    /// Upstream declarations are unchanged; only output timestamps need refreshing
    UpToDateWithUpstreamTypes(UpToDateInfo),
    /// Sentinel while a project's status is being computed; breaks recursion on cycles
    ComputingUpstream,
}

impl UpToDateStatus {
    pub fn info(&self) -> Option<&UpToDateInfo> {
        match self {
            UpToDateStatus::UpToDate(info) | UpToDateStatus::UpToDateWithUpstreamTypes(info) => {
                Some(info)
            }
            _ => None,
        }
    }

    /// Whether dependents may treat this project as built
    pub fn satisfies_dependents(&self) -> bool {
        matches!(
            self,
            UpToDateStatus::UpToDate(_)
                | UpToDateStatus::UpToDateWithUpstreamTypes(_)
                | UpToDateStatus::ContainerOnly
                | UpToDateStatus::ComputingUpstream
        )
    }

    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            UpToDateStatus::Unbuildable { .. } | UpToDateStatus::UpstreamBlocked { .. }
        )
    }

    /// Human-readable reason for verbose status reporting
    pub fn describe(&self, project: &Path) -> Option<Diagnostic> {
        let project = project.display();
        let (code, message) = match self {
            UpToDateStatus::Unbuildable { reason } => (
                codes::PROJECT_IS_OUT_OF_DATE,
                format!("Project '{}' can't be built because {}", project, reason),
            ),
            UpToDateStatus::OutOfDateWithSelf {
                out_of_date_output,
                newer_input,
            } => (
                codes::PROJECT_IS_OUT_OF_DATE,
                format!(
                    "Project '{}' is out of date because output '{}' is older than input '{}'",
                    project,
                    out_of_date_output.display(),
                    newer_input.display()
                ),
            ),
            UpToDateStatus::OutOfDateWithUpstream {
                out_of_date_output,
                newer_project,
            } => (
                codes::PROJECT_IS_OUT_OF_DATE,
                format!(
                    "Project '{}' is out of date because output '{}' is older than its dependency '{}'",
                    project,
                    out_of_date_output.display(),
                    newer_project.display()
                ),
            ),
            UpToDateStatus::UpstreamOutOfDate { upstream } => (
                codes::PROJECT_IS_OUT_OF_DATE,
                format!(
                    "Project '{}' is out of date because its dependency '{}' is out of date",
                    project,
                    upstream.display()
                ),
            ),
            UpToDateStatus::UpstreamBlocked {
                upstream,
                upstream_project_blocked,
            } => (
                codes::SKIPPING_BUILD_UPSTREAM_ERRORS,
                format!(
                    "Project '{}' can't be built because its dependency '{}' {}",
                    project,
                    upstream.display(),
                    if *upstream_project_blocked {
                        "was not built"
                    } else {
                        "has errors"
                    }
                ),
            ),
            UpToDateStatus::OutputMissing { missing_output } => (
                codes::PROJECT_IS_OUT_OF_DATE,
                format!(
                    "Project '{}' is out of date because output file '{}' does not exist",
                    project,
                    missing_output.display()
                ),
            ),
            UpToDateStatus::OutOfDateWithPrepend { newer_project, .. } => (
                codes::PROJECT_IS_OUT_OF_DATE,
                format!(
                    "Project '{}' is out of date because output of its dependency '{}' has changed",
                    project,
                    newer_project.display()
                ),
            ),
            UpToDateStatus::ToolVersionOutOfDate { version } => (
                codes::PROJECT_IS_OUT_OF_DATE,
                format!(
                    "Project '{}' is out of date because its output was generated with version '{}', which differs from the current version '{}'",
                    project, version, BUILD_INFO_VERSION
                ),
            ),
            UpToDateStatus::UpToDate(info) => (
                codes::PROJECT_IS_UP_TO_DATE,
                format!(
                    "Project '{}' is up to date because newest input '{}' is older than oldest output '{}'",
                    project,
                    display_opt(&info.newest_input_file_name),
                    display_opt(&info.oldest_output_file_name)
                ),
            ),
            UpToDateStatus::UpToDateWithUpstreamTypes(_) => (
                codes::PROJECT_IS_UP_TO_DATE,
                format!(
                    "Project '{}' is up to date with .d.tl files from its dependencies",
                    project
                ),
            ),
            UpToDateStatus::ContainerOnly | UpToDateStatus::ComputingUpstream => return None,
        };
        Some(Diagnostic::info(code, message))
    }
}

fn display_opt(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default()
}

/// Status of one referenced project, as seen by the project referencing it
#[derive(Debug, Clone, Copy)]
pub struct UpstreamStatus<'a> {
    pub config_path: &'a Path,
    pub prepend: bool,
    pub status: &'a UpToDateStatus,
}

struct Stamp {
    time: SystemTime,
    path: PathBuf,
}

/// Classify one project given the already-computed statuses of its references
///
/// Rules apply in order: missing inputs, container projects, blocked or stale
/// upstreams, outputs older than inputs, outputs older than upstream changes,
/// missing outputs, config changes, then the recorded tool version.
pub fn check_up_to_date(
    project: &ParsedProject,
    fs: &dyn FileSystem,
    upstream: &[UpstreamStatus<'_>],
) -> UpToDateStatus {
    let mut newest_input: Option<Stamp> = None;
    for input in &project.file_names {
        let Some(time) = fs.modified_time(input) else {
            return UpToDateStatus::Unbuildable {
                reason: format!("input file '{}' does not exist", input.display()),
            };
        };
        if newest_input.as_ref().map_or(true, |n| time > n.time) {
            newest_input = Some(Stamp {
                time,
                path: input.clone(),
            });
        }
    }

    if project.file_names.is_empty() && project.errors.is_empty() {
        return UpToDateStatus::ContainerOnly;
    }

    for reference in upstream {
        if reference.status.is_blocking() {
            return UpToDateStatus::UpstreamBlocked {
                upstream: reference.config_path.to_path_buf(),
                upstream_project_blocked: matches!(
                    reference.status,
                    UpToDateStatus::UpstreamBlocked { .. }
                ),
            };
        }
        if !reference.status.satisfies_dependents() {
            return UpToDateStatus::UpstreamOutOfDate {
                upstream: reference.config_path.to_path_buf(),
            };
        }
    }

    let mut oldest_output: Option<Stamp> = None;
    let mut newest_output: Option<Stamp> = None;
    let mut missing_output = None;
    for output in project.all_output_file_names() {
        let Some(time) = fs.modified_time(&output) else {
            missing_output.get_or_insert(output);
            continue;
        };
        if oldest_output.as_ref().map_or(true, |o| time < o.time) {
            oldest_output = Some(Stamp {
                time,
                path: output.clone(),
            });
        }
        if newest_output.as_ref().map_or(true, |n| time > n.time) {
            newest_output = Some(Stamp { time, path: output });
        }
    }

    if let (Some(oldest), Some(newest)) = (&oldest_output, &newest_input) {
        if oldest.time < newest.time {
            return UpToDateStatus::OutOfDateWithSelf {
                out_of_date_output: oldest.path.clone(),
                newer_input: newest.path.clone(),
            };
        }
    }

    let mut pseudo_up_to_date: Option<PathBuf> = None;
    if let Some(oldest) = &oldest_output {
        for reference in upstream {
            let Some(info) = reference.status.info() else {
                continue;
            };
            if info
                .newest_input_file_time
                .map_or(true, |time| time <= oldest.time)
            {
                continue;
            }
            if info
                .newest_declaration_changed_time
                .is_some_and(|time| time <= oldest.time)
            {
                pseudo_up_to_date = Some(reference.config_path.to_path_buf());
                continue;
            }
            return UpToDateStatus::OutOfDateWithUpstream {
                out_of_date_output: oldest.path.clone(),
                newer_project: reference.config_path.to_path_buf(),
            };
        }
    }

    if let Some(missing_output) = missing_output {
        return UpToDateStatus::OutputMissing { missing_output };
    }

    // All outputs exist past this point, so there is an oldest one
    let Some(oldest) = oldest_output else {
        return UpToDateStatus::OutputMissing {
            missing_output: project.build_info_path(),
        };
    };

    for config in std::iter::once(&project.config_path).chain(&project.extended_config_paths) {
        if fs.modified_time(config).is_some_and(|time| time > oldest.time) {
            return UpToDateStatus::OutOfDateWithSelf {
                out_of_date_output: oldest.path,
                newer_input: config.clone(),
            };
        }
    }

    let build_info = match read_build_info(fs, &project.build_info_path()) {
        Ok(info) if info.is_version_compatible() => info,
        Ok(info) => return UpToDateStatus::ToolVersionOutOfDate {
            version: info.version,
        },
        Err(_) => {
            return UpToDateStatus::ToolVersionOutOfDate {
                version: "<unreadable>".to_string(),
            }
        }
    };

    let info = UpToDateInfo {
        newest_input_file_time: newest_input.as_ref().map(|n| n.time),
        newest_input_file_name: newest_input.map(|n| n.path),
        newest_declaration_changed_time: build_info
            .latest_changed_declaration()
            .or(newest_output.as_ref().map(|n| n.time)),
        newest_output_file_time: newest_output.as_ref().map(|n| n.time),
        newest_output_file_name: newest_output.map(|n| n.path),
        oldest_output_file_time: Some(oldest.time),
        oldest_output_file_name: Some(oldest.path.clone()),
    };

    match pseudo_up_to_date {
        Some(newer_project) if upstream.iter().any(|r| r.prepend) => {
            UpToDateStatus::OutOfDateWithPrepend {
                out_of_date_output: oldest.path,
                newer_project,
            }
        }
        Some(_) => UpToDateStatus::UpToDateWithUpstreamTypes(info),
        None => UpToDateStatus::UpToDate(info),
    }
}
