use rustc_hash::FxHashSet;
use std::path::{Path, PathBuf};

use crate::config::ProjectReference;
use crate::diagnostics::{codes, Diagnostic};

/// Dependency-first project sequence, possibly with cycle diagnostics attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOrder {
    Order(Vec<PathBuf>),
    Circular {
        order: Vec<PathBuf>,
        diagnostics: Vec<Diagnostic>,
        /// Projects on a reported cycle
        cycle_members: Vec<PathBuf>,
    },
}

impl BuildOrder {
    pub fn projects(&self) -> &[PathBuf] {
        match self {
            BuildOrder::Order(order) => order,
            BuildOrder::Circular { order, .. } => order,
        }
    }

    pub fn is_circular(&self) -> bool {
        matches!(self, BuildOrder::Circular { .. })
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            BuildOrder::Order(_) => &[],
            BuildOrder::Circular { diagnostics, .. } => diagnostics,
        }
    }

    pub fn cycle_members(&self) -> &[PathBuf] {
        match self {
            BuildOrder::Order(_) => &[],
            BuildOrder::Circular { cycle_members, .. } => cycle_members,
        }
    }

    pub fn contains(&self, project: &Path) -> bool {
        self.projects().iter().any(|p| p == project)
    }
}

struct Frame {
    project: PathBuf,
    references: Vec<ProjectReference>,
    next: usize,
    in_circular_context: bool,
}

/// Topologically sort the projects reachable from `roots`
///
/// Iterative depth-first traversal with temporary and permanent marks. Reaching a
/// temporarily marked project closes a cycle, which is reported unless an edge on
/// the way was flagged `circular`.
pub fn create_build_order(
    roots: &[PathBuf],
    references_of: &mut dyn FnMut(&Path) -> Vec<ProjectReference>,
) -> BuildOrder {
    let mut permanent: FxHashSet<PathBuf> = FxHashSet::default();
    let mut temporary: FxHashSet<PathBuf> = FxHashSet::default();
    let mut order = Vec::new();
    let mut diagnostics = Vec::new();
    let mut cycle_members: Vec<PathBuf> = Vec::new();
    let mut frames: Vec<Frame> = Vec::new();

    for root in roots {
        if permanent.contains(root) {
            continue;
        }
        temporary.insert(root.clone());
        frames.push(Frame {
            project: root.clone(),
            references: references_of(root),
            next: 0,
            in_circular_context: false,
        });

        while let Some(frame) = frames.last_mut() {
            if frame.next < frame.references.len() {
                let reference = frame.references[frame.next].clone();
                frame.next += 1;
                let in_circular_context = frame.in_circular_context || reference.circular;

                if permanent.contains(&reference.path) {
                    continue;
                }
                if temporary.contains(&reference.path) {
                    if !in_circular_context {
                        let start = frames
                            .iter()
                            .position(|f| f.project == reference.path)
                            .unwrap_or(0);
                        let cycle: Vec<PathBuf> =
                            frames[start..].iter().map(|f| f.project.clone()).collect();
                        let rendered = cycle
                            .iter()
                            .chain(std::iter::once(&reference.path))
                            .map(|p| p.display().to_string())
                            .collect::<Vec<_>>()
                            .join("\n");
                        diagnostics.push(Diagnostic::error(
                            codes::CIRCULAR_REFERENCES,
                            format!(
                                "Project references may not form a circular graph. Cycle detected: {}",
                                rendered
                            ),
                        ));
                        for member in cycle {
                            if !cycle_members.contains(&member) {
                                cycle_members.push(member);
                            }
                        }
                    }
                    continue;
                }

                temporary.insert(reference.path.clone());
                let references = references_of(&reference.path);
                frames.push(Frame {
                    project: reference.path,
                    references,
                    next: 0,
                    in_circular_context,
                });
            } else if let Some(done) = frames.pop() {
                temporary.remove(&done.project);
                permanent.insert(done.project.clone());
                order.push(done.project);
            }
        }
    }

    if diagnostics.is_empty() {
        BuildOrder::Order(order)
    } else {
        BuildOrder::Circular {
            order,
            diagnostics,
            cycle_members,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rustc_hash::FxHashMap;

    fn project(name: &str) -> PathBuf {
        PathBuf::from(format!("/repo/{}/tlconfig.json", name))
    }

    fn graph(edges: &[(&str, &str, bool)]) -> FxHashMap<PathBuf, Vec<ProjectReference>> {
        let mut graph: FxHashMap<PathBuf, Vec<ProjectReference>> = FxHashMap::default();
        for (from, to, circular) in edges {
            graph.entry(project(from)).or_default().push(ProjectReference {
                path: project(to),
                prepend: false,
                circular: *circular,
            });
        }
        graph
    }

    fn order_of(
        graph: &FxHashMap<PathBuf, Vec<ProjectReference>>,
        roots: &[PathBuf],
    ) -> BuildOrder {
        create_build_order(roots, &mut |p| graph.get(p).cloned().unwrap_or_default())
    }

    #[test]
    fn test_dependencies_come_first() {
        let g = graph(&[("app", "core", false), ("app", "util", false), ("util", "core", false)]);
        let order = order_of(&g, &[project("app")]);

        assert_eq!(
            order,
            BuildOrder::Order(vec![project("core"), project("util"), project("app")])
        );
    }

    #[test]
    fn test_cycle_is_reported() {
        let g = graph(&[("a", "b", false), ("b", "a", false)]);
        let order = order_of(&g, &[project("a")]);

        assert!(order.is_circular());
        assert_eq!(order.diagnostics().len(), 1);
        assert_eq!(order.projects(), &[project("b"), project("a")]);
        assert_eq!(order.cycle_members(), &[project("a"), project("b")]);
    }

    #[test]
    fn test_circular_flag_suppresses_diagnostic() {
        let g = graph(&[("a", "b", true), ("b", "a", false)]);
        let order = order_of(&g, &[project("a")]);

        assert_eq!(order, BuildOrder::Order(vec![project("b"), project("a")]));
    }

    proptest! {
        #[test]
        fn prop_acyclic_order_respects_references(
            edges in proptest::collection::vec((0usize..12, 0usize..12), 0..40),
            roots in proptest::collection::vec(0usize..12, 1..5),
        ) {
            // Only edges from higher to lower indices, so the graph stays acyclic
            let mut g: FxHashMap<PathBuf, Vec<ProjectReference>> = FxHashMap::default();
            for (a, b) in edges.into_iter().filter(|(a, b)| a > b) {
                g.entry(project(&a.to_string())).or_default().push(ProjectReference {
                    path: project(&b.to_string()),
                    prepend: false,
                    circular: false,
                });
            }
            let roots: Vec<PathBuf> = roots.iter().map(|r| project(&r.to_string())).collect();

            let order = order_of(&g, &roots);
            prop_assert!(!order.is_circular());
            let projects = order.projects();
            let unique: FxHashSet<_> = projects.iter().collect();
            prop_assert_eq!(unique.len(), projects.len());

            for (index, p) in projects.iter().enumerate() {
                for reference in g.get(p).into_iter().flatten() {
                    let position = projects.iter().position(|q| q == &reference.path);
                    prop_assert!(matches!(position, Some(i) if i < index));
                }
            }
            for root in &roots {
                prop_assert!(order.contains(root));
            }
        }

        #[test]
        fn prop_cycle_still_orders_every_project(size in 2usize..8) {
            let mut g: FxHashMap<PathBuf, Vec<ProjectReference>> = FxHashMap::default();
            for i in 0..size {
                g.entry(project(&i.to_string())).or_default().push(ProjectReference {
                    path: project(&((i + 1) % size).to_string()),
                    prepend: false,
                    circular: false,
                });
            }

            let order = order_of(&g, &[project("0")]);
            prop_assert!(order.is_circular());
            prop_assert!(!order.diagnostics().is_empty());
            prop_assert_eq!(order.projects().len(), size);
        }
    }
}
