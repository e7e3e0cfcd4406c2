use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tlbuild_core::paths::{normalize_path, resolve_config_file_name};
use tlbuild_core::{
    BuildOptions, CollectingDiagnosticHandler, ConsoleDiagnosticHandler, Diagnostic,
    DiagnosticHandler, ExitStatus, NodeModuleResolver, NoopWatchHost, RealFileSystem,
    SolutionBuilder, SolutionBuilderHost, TranscribeCompiler, WatchHost,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod watch_host;

use watch_host::NotifyWatchHost;

/// tlbuild - Incremental builds for solutions of referenced TypedLua projects
#[derive(Parser, Debug, Clone)]
#[command(name = "tlbuild")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Project directories or tlconfig.json files to build
    #[arg(value_name = "PROJECT", default_value = ".")]
    projects: Vec<PathBuf>,

    /// Rebuild whenever inputs change
    #[arg(short, long)]
    watch: bool,

    /// Explain why each project is or is not built
    #[arg(short, long)]
    verbose: bool,

    /// Show what would be built without writing anything
    #[arg(long)]
    dry: bool,

    /// Build every project even if it is up to date
    #[arg(short, long)]
    force: bool,

    /// Delete the outputs of every project instead of building
    #[arg(long)]
    clean: bool,

    /// Highlight errors in terminal output
    #[arg(long)]
    pretty: bool,
}

/// Progress messages go to stdout; everything else is left to the diagnostics channel
#[derive(Default)]
struct StatusPrinter {
    messages: CollectingDiagnosticHandler,
}

impl DiagnosticHandler for StatusPrinter {
    fn report(&self, diagnostic: Diagnostic) {
        println!("{}", diagnostic.message);
        self.messages.report(diagnostic);
    }

    fn has_errors(&self) -> bool {
        self.messages.has_errors()
    }

    fn error_count(&self) -> usize {
        self.messages.error_count()
    }

    fn warning_count(&self) -> usize {
        self.messages.warning_count()
    }

    fn get_diagnostics(&self) -> Vec<Diagnostic> {
        self.messages.get_diagnostics()
    }
}

fn main() -> anyhow::Result<()> {
    // Set RUST_LOG=debug for detailed logs
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();
    let cwd = std::env::current_dir()?;
    let roots: Vec<PathBuf> = cli
        .projects
        .iter()
        .map(|project| resolve_config_file_name(&normalize_path(&cwd.join(project))))
        .collect();
    debug!("Root projects: {:?}", roots);

    let options = BuildOptions {
        dry: cli.dry,
        force: cli.force,
        verbose: cli.verbose,
        watch: cli.watch && !cli.clean,
    };

    let (events_tx, events_rx) = crossbeam_channel::unbounded();
    let mut watch_state = None;
    let watch_host: Box<dyn WatchHost> = if options.watch {
        let host = NotifyWatchHost::new(events_tx)?;
        watch_state = Some(host.state());
        Box::new(host)
    } else {
        Box::new(NoopWatchHost::new())
    };

    let mut builder = SolutionBuilder::new(
        SolutionBuilderHost {
            fs: Arc::new(RealFileSystem),
            compiler: Box::new(TranscribeCompiler::new()),
            resolver: Box::new(NodeModuleResolver::new()),
            watch_host,
            diagnostics: Arc::new(ConsoleDiagnosticHandler::new(cli.pretty)),
            status: Arc::new(StatusPrinter::default()),
        },
        &roots,
        options,
    );

    if cli.clean {
        let status = builder.clean(None);
        exit(status);
    }

    let status = builder.build(None, None)?;
    if let Some(state) = watch_state {
        info!("Watching {} project(s)", roots.len());
        watch_host::run(&mut builder, &state, &events_rx)?;
    }
    exit(status);
}

fn exit(status: ExitStatus) -> ! {
    debug!("Exit status {:?}", status);
    std::process::exit(status.code())
}
