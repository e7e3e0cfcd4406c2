use std::path::Path;
use tlbuild_core::{
    codes, BuildOptions, ExitStatus, ReloadLevel, SolutionBuilder, WatchEventKind,
    WATCH_DEBOUNCE,
};
use tlbuild_test_helpers::TestSolution;

fn watch_options() -> BuildOptions {
    BuildOptions {
        watch: true,
        ..BuildOptions::default()
    }
}

fn watching(solution: &TestSolution) -> SolutionBuilder {
    let mut builder = solution.builder(&["app"], watch_options());
    assert_eq!(builder.build(None, None).unwrap(), ExitStatus::Success);
    assert!(builder.is_watching());
    solution.reset_programs_created();
    solution.status.clear();
    builder
}

/// Deliver every event the recording host would produce for a change at `path`
fn notify(solution: &TestSolution, builder: &mut SolutionBuilder, path: &Path, kind: WatchEventKind) {
    let events = solution.watch_host.events_for(path, kind);
    assert!(!events.is_empty(), "nothing watches {}", path.display());
    for event in events {
        builder.on_watch_event(&event);
    }
}

/// Fire timers until the queue is drained; returns how many fired
fn drain(solution: &TestSolution, builder: &mut SolutionBuilder) -> usize {
    let mut fired = 0;
    while let Some(timer) = solution.watch_host.take_timer() {
        builder.on_timer(timer);
        fired += 1;
        assert!(fired < 20, "timer never settled");
    }
    fired
}

#[test]
fn test_initial_watch_registers_watchers() {
    let solution = TestSolution::chain();
    let builder = watching(&solution);

    for project in ["core", "logic", "app"] {
        assert!(solution.watch_host.is_watching(solution.config(project)));
        assert!(solution.watch_host.is_watching(solution.path(project)));
    }
    assert!(solution.watch_host.is_watching(solution.path("core/index.tl")));
    assert!(solution.watch_host.pending_timer().is_none());
    assert!(builder.is_watching());
}

#[test]
fn test_burst_of_edits_arms_one_timer() {
    let solution = TestSolution::chain();
    let mut builder = watching(&solution);
    let input = solution.path("core/index.tl");

    for value in 2..5 {
        solution.write("core/index.tl", &format!("export let version: string = \"{}\"\n", value));
        notify(&solution, &mut builder, &input, WatchEventKind::Changed);
    }

    assert_eq!(solution.watch_host.timers_set(), 3);
    assert_eq!(solution.watch_host.timers_cleared(), 2);
    assert_eq!(solution.watch_host.pending_timer_delay(), Some(WATCH_DEBOUNCE));
    assert_eq!(builder.pending_timer(), solution.watch_host.pending_timer());
    assert_eq!(solution.programs_created(), 0);

    // One project per firing, re-armed while work remains
    let timer = solution.watch_host.take_timer().unwrap();
    builder.on_timer(timer);
    assert_eq!(solution.programs_created(), 1);
    assert!(solution.watch_host.pending_timer().is_some());

    drain(&solution, &mut builder);
    assert_eq!(solution.programs_created(), 1);
    assert_eq!(
        solution.read("core/dist/index.lua").unwrap(),
        "local version = \"4\"\nreturn { version = version }\n"
    );
    assert_eq!(
        solution.status.messages_with_code(codes::FILE_CHANGE_DETECTED).len(),
        1
    );
    assert_eq!(
        solution.status.messages_with_code(codes::FOUND_ERRORS_WATCHING),
        vec!["Found 0 errors. Watching for file changes.".to_string()]
    );
}

#[test]
fn test_stale_timer_is_ignored() {
    let solution = TestSolution::chain();
    let mut builder = watching(&solution);
    let input = solution.path("core/index.tl");

    solution.write("core/index.tl", "export let version: string = \"2\"\n");
    notify(&solution, &mut builder, &input, WatchEventKind::Changed);
    let first = builder.pending_timer().unwrap();
    notify(&solution, &mut builder, &input, WatchEventKind::Changed);

    builder.on_timer(first);
    assert_eq!(solution.programs_created(), 0);
    assert_ne!(builder.pending_timer(), Some(first));
}

#[test]
fn test_config_change_is_a_full_reload() {
    let solution = TestSolution::chain();
    let mut builder = watching(&solution);
    let config = solution.config("core");

    solution.write(
        "core/tlconfig.json",
        r#"{ "compilerOptions": { "composite": true, "outDir": "build" }, "include": ["*.tl"] }"#,
    );
    notify(&solution, &mut builder, &config, WatchEventKind::Changed);
    assert_eq!(builder.pending_reload_level(&config), Some(ReloadLevel::Full));

    drain(&solution, &mut builder);
    assert!(solution.exists("core/build/index.lua"));
    assert!(builder.pending_reload_level(&config).is_none());
}

#[test]
fn test_added_input_is_a_partial_reload() {
    let solution = TestSolution::chain();
    let mut builder = watching(&solution);
    let added = solution.path("core/extra.tl");

    solution.write("core/extra.tl", "export let extra: number = 1\n");
    notify(&solution, &mut builder, &added, WatchEventKind::Created);
    assert_eq!(
        builder.pending_reload_level(&solution.config("core")),
        Some(ReloadLevel::Partial)
    );

    drain(&solution, &mut builder);
    assert!(solution.exists("core/dist/extra.lua"));
    assert!(solution.watch_host.is_watching(&added));
}

#[test]
fn test_output_and_unrelated_files_are_ignored() {
    let solution = TestSolution::chain();
    let mut builder = watching(&solution);

    for relative in ["core/dist/new.d.tl", "core/notes.md"] {
        solution.write(relative, "");
        notify(&solution, &mut builder, &solution.path(relative), WatchEventKind::Created);
    }
    assert!(builder.pending_reload_level(&solution.config("core")).is_none());
    assert!(solution.watch_host.pending_timer().is_none());
}

#[test]
fn test_created_module_resolves_on_rebuild() {
    let solution = TestSolution::chain();
    solution.write("app/main.tl", "import \"helpers\"\nlet run = 1\n");
    let mut builder = solution.builder(&["app"], watch_options());
    assert_eq!(
        builder.build(None, None).unwrap(),
        ExitStatus::DiagnosticsPresentOutputsGenerated
    );
    let node_modules = solution.path("node_modules");
    assert!(builder
        .resolution_cache()
        .watched_directory_ref_count(&node_modules)
        .is_some());
    assert!(solution.watch_host.is_watching(&node_modules));

    let created = solution.path("node_modules/helpers.tl");
    solution.write("node_modules/helpers.tl", "export let help: number = 1\n");
    notify(&solution, &mut builder, &created, WatchEventKind::Created);
    assert_eq!(
        builder.pending_reload_level(&solution.config("app")),
        Some(ReloadLevel::None)
    );

    drain(&solution, &mut builder);
    assert!(builder.project_diagnostics(&solution.config("app")).is_empty());
    assert!(solution.exists("app/dist/main.lua"));
    assert_eq!(
        builder.resolution_cache().watched_directory_ref_count(&node_modules),
        None
    );
    assert_eq!(solution.watch_host.close_count(&node_modules), 1);
}

#[test]
fn test_closer_module_rebuilds_up_to_date_project() {
    let solution = TestSolution::chain();
    solution.write("node_modules/helpers.tl", "export let help: number = 1\n");
    solution.write("app/main.tl", "import \"helpers\"\nlet run = 1\n");
    let mut builder = watching(&solution);

    let main = solution.path("app/main.tl");
    let resolved = |builder: &SolutionBuilder| {
        builder
            .resolution_cache()
            .get_cached_module(&main, "helpers")
            .and_then(|resolution| resolution.resolved.as_ref())
            .map(|module| module.resolved_file_name.clone())
    };
    assert_eq!(resolved(&builder), Some(solution.path("node_modules/helpers.tl")));

    let closer = solution.path("app/node_modules/helpers.tl");
    solution.write("app/node_modules/helpers.tl", "export let help: number = 2\n");
    notify(&solution, &mut builder, &closer, WatchEventKind::Created);
    assert_eq!(
        builder.pending_reload_level(&solution.config("app")),
        Some(ReloadLevel::None)
    );

    drain(&solution, &mut builder);
    assert_eq!(solution.programs_created(), 1);
    assert_eq!(resolved(&builder), Some(closer));
    assert!(!builder
        .resolution_cache()
        .has_invalidated_resolution(&main));
    assert!(builder.project_diagnostics(&solution.config("app")).is_empty());
}

#[test]
fn test_close_watchers_releases_everything() {
    let solution = TestSolution::chain();
    let mut builder = watching(&solution);
    assert!(solution.watch_host.open_watcher_count() > 0);

    builder.close_watchers();
    assert_eq!(solution.watch_host.open_watcher_count(), 0);
    assert!(!builder.is_watching());
}
