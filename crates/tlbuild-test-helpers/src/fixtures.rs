//! Multi-project solutions laid out in an in-memory file system

use indoc::formatdoc;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tlbuild_core::{
    BuildOptions, CollectingDiagnosticHandler, Compiler, DiagnosticHandler, MemoryFileSystem, NodeModuleResolver,
    RecordingWatchHost, SolutionBuilder, SolutionBuilderHost,
};

use crate::mocks::CountingCompiler;

/// Deep enough that every project directory is watchable
pub const REPO_ROOT: &str = "/home/user/repo";

/// Shared state of one test solution; builders created from it see the same disk
pub struct TestSolution {
    pub fs: Arc<MemoryFileSystem>,
    pub watch_host: RecordingWatchHost,
    pub diagnostics: Arc<CollectingDiagnosticHandler>,
    pub status: Arc<CollectingDiagnosticHandler>,
    programs_created: Arc<AtomicUsize>,
}

impl Default for TestSolution {
    fn default() -> Self {
        Self::new()
    }
}

impl TestSolution {
    pub fn new() -> Self {
        Self {
            fs: Arc::new(MemoryFileSystem::new()),
            watch_host: RecordingWatchHost::new(),
            diagnostics: Arc::new(CollectingDiagnosticHandler::new()),
            status: Arc::new(CollectingDiagnosticHandler::new()),
            programs_created: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The classic three-project chain: `app` -> `logic` -> `core`
    pub fn chain() -> Self {
        let solution = Self::new();
        solution.add_project(
            "core",
            &composite_config(&[]),
            &[("index.tl", "export let version: string = \"1\"\n")],
        );
        solution.add_project(
            "logic",
            &composite_config(&["../core"]),
            &[(
                "index.tl",
                "import \"../core/index\"\nexport let double: number = 2\n",
            )],
        );
        solution.add_project(
            "app",
            &composite_config(&["../logic"]),
            &[("main.tl", "import \"../logic/index\"\nlet run = 1\n")],
        );
        solution
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        PathBuf::from(REPO_ROOT).join(relative)
    }

    /// Config file of the project in directory `name`
    pub fn config(&self, name: &str) -> PathBuf {
        self.path(name).join("tlconfig.json")
    }

    pub fn add_project(&self, name: &str, config: &str, files: &[(&str, &str)]) {
        self.fs.add_file(self.config(name), config);
        for (file, text) in files {
            self.fs.add_file(self.path(name).join(file), *text);
        }
    }

    /// Overwrite a file, bumping its modification time
    pub fn write(&self, relative: &str, text: &str) {
        self.fs.add_file(self.path(relative), text);
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.fs.contents(self.path(relative)).is_some()
    }

    pub fn read(&self, relative: &str) -> Option<String> {
        self.fs.contents(self.path(relative))
    }

    pub fn programs_created(&self) -> usize {
        self.programs_created.load(Ordering::SeqCst)
    }

    pub fn reset_programs_created(&self) {
        self.programs_created.store(0, Ordering::SeqCst);
    }

    /// A fresh builder over this solution's disk, watch host and handlers
    pub fn builder(&self, roots: &[&str], options: BuildOptions) -> SolutionBuilder {
        self.builder_with_compiler(roots, options, Box::new(self.counting_compiler()))
    }

    /// Compiler counting into this solution's program counter
    pub fn counting_compiler(&self) -> CountingCompiler {
        CountingCompiler::sharing(self.programs_created.clone())
    }

    pub fn builder_with_compiler(
        &self,
        roots: &[&str],
        options: BuildOptions,
        compiler: Box<dyn Compiler>,
    ) -> SolutionBuilder {
        let roots: Vec<PathBuf> = roots.iter().map(|root| self.config(root)).collect();
        SolutionBuilder::new(
            SolutionBuilderHost {
                fs: self.fs.clone(),
                compiler,
                resolver: Box::new(NodeModuleResolver::new()),
                watch_host: Box::new(self.watch_host.clone()),
                diagnostics: self.diagnostics.clone(),
                status: self.status.clone(),
            },
            &roots,
            options,
        )
    }

    /// Error codes reported so far
    pub fn error_codes(&self) -> Vec<u32> {
        self.diagnostics
            .get_diagnostics()
            .iter()
            .filter(|d| d.is_error())
            .map(|d| d.code)
            .collect()
    }
}

/// Composite project emitting into `dist`
pub fn composite_config(references: &[&str]) -> String {
    let references: Vec<String> = references
        .iter()
        .map(|path| format!("{{ \"path\": \"{}\" }}", path))
        .collect();
    formatdoc! {r#"
        {{
            "compilerOptions": {{ "composite": true, "outDir": "dist" }},
            "references": [{}]
        }}
    "#, references.join(", ")}
}

/// Bundled project compiling `src/` into `out/<name>.lua`; references are prepended
pub fn bundle_config(name: &str, prepends: &[&str]) -> String {
    let references: Vec<String> = prepends
        .iter()
        .map(|path| format!("{{ \"path\": \"{}\", \"prepend\": true }}", path))
        .collect();
    formatdoc! {r#"
        {{
            "compilerOptions": {{ "composite": true, "outFile": "out/{}.lua" }},
            "include": ["src"],
            "references": [{}]
        }}
    "#, name, references.join(", ")}
}
