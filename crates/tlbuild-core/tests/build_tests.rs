use tlbuild_core::build::StepEvent;
use tlbuild_core::{
    codes, BuildError, BuildOptions, BuildResultFlags, BuildStep, CancellationToken,
    DiagnosticHandler, ExitStatus, FileSystem, InvalidatedProjectKind, ReloadLevel, UpToDateStatus,
};
use tlbuild_test_helpers::fixtures::{bundle_config, composite_config};
use tlbuild_test_helpers::{DeclarationWarningCompiler, TestSolution};

/// `core` and `logic`, where `logic` references `core`
fn two_projects() -> TestSolution {
    let solution = TestSolution::new();
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
    solution
}

fn build_all(solution: &TestSolution, roots: &[&str]) -> ExitStatus {
    solution
        .builder(roots, BuildOptions::default())
        .build(None, None)
        .unwrap()
}

// ============================================================================
// Full builds
// ============================================================================

#[test]
fn test_initial_build_writes_every_output() {
    let solution = TestSolution::chain();

    assert_eq!(build_all(&solution, &["app"]), ExitStatus::Success);
    assert_eq!(solution.programs_created(), 3);

    for project in ["core", "logic"] {
        assert!(solution.exists(&format!("{}/dist/index.lua", project)));
        assert!(solution.exists(&format!("{}/dist/index.d.tl", project)));
        assert!(solution.exists(&format!("{}/dist/tlconfig.tlbuildinfo", project)));
    }
    assert_eq!(
        solution.read("app/dist/main.lua").unwrap(),
        "require(\"../logic/index\")\nlocal run = 1\n"
    );
    assert_eq!(
        solution.read("core/dist/index.d.tl").unwrap(),
        "export let version: string\n"
    );
    assert!(solution.error_codes().is_empty());
}

#[test]
fn test_build_order_is_dependency_first() {
    let solution = TestSolution::chain();
    let mut builder = solution.builder(&["app"], BuildOptions::default());

    let order = builder.get_build_order();
    assert!(!order.is_circular());
    assert_eq!(
        order.projects(),
        &[
            solution.config("core"),
            solution.config("logic"),
            solution.config("app")
        ]
    );
}

#[test]
fn test_second_build_is_idempotent() {
    let solution = TestSolution::chain();
    assert_eq!(build_all(&solution, &["app"]), ExitStatus::Success);
    solution.reset_programs_created();
    solution.fs.reset_counters();

    let mut builder = solution.builder(&["app"], BuildOptions::default());
    for project in ["core", "logic", "app"] {
        assert!(matches!(
            builder.get_up_to_date_status_of_project(&solution.config(project)),
            UpToDateStatus::UpToDate(_)
        ));
    }
    assert_eq!(builder.build(None, None).unwrap(), ExitStatus::Success);
    assert_eq!(solution.programs_created(), 0);
    assert_eq!(solution.fs.write_file_calls(), 0);
}

#[test]
fn test_force_rebuilds_up_to_date_projects() {
    let solution = TestSolution::chain();
    build_all(&solution, &["app"]);
    solution.reset_programs_created();

    let options = BuildOptions {
        force: true,
        ..BuildOptions::default()
    };
    let status = solution.builder(&["app"], options).build(None, None).unwrap();
    assert_eq!(status, ExitStatus::Success);
    assert_eq!(solution.programs_created(), 3);
}

#[test]
fn test_build_single_project_builds_only_its_references() {
    let solution = TestSolution::chain();
    let mut builder = solution.builder(&["app"], BuildOptions::default());

    let status = builder.build(Some(&solution.config("logic")), None).unwrap();
    assert_eq!(status, ExitStatus::Success);
    assert!(solution.exists("logic/dist/index.lua"));
    assert!(!solution.exists("app/dist/main.lua"));
}

#[test]
fn test_unknown_project_is_invalid() {
    let solution = TestSolution::chain();
    let mut builder = solution.builder(&["app"], BuildOptions::default());

    let status = builder.build(Some(&solution.config("elsewhere")), None).unwrap();
    assert_eq!(status, ExitStatus::InvalidProjectOutputsSkipped);
    assert_eq!(solution.error_codes(), vec![codes::FILE_NOT_FOUND]);
}

// ============================================================================
// Incremental rebuilds
// ============================================================================

#[test]
fn test_touched_upstream_only_refreshes_dependent_timestamps() {
    let solution = two_projects();
    build_all(&solution, &["logic"]);
    solution.reset_programs_created();
    let logic_output = solution.path("logic/dist/index.lua");
    let before = solution.fs.modified_time(&logic_output).unwrap();

    solution.fs.touch(solution.path("core/index.tl"));
    let mut builder = solution.builder(&["logic"], BuildOptions::default());
    assert!(matches!(
        builder.get_up_to_date_status_of_project(&solution.config("core")),
        UpToDateStatus::OutOfDateWithSelf { .. }
    ));

    let core = builder.get_next_invalidated_project(None).unwrap().unwrap();
    assert_eq!(core.project(), solution.config("core").as_path());
    assert_eq!(core.kind(), InvalidatedProjectKind::Build);
    let result = core.done(None).unwrap();
    assert!(result.contains(BuildResultFlags::DECLARATION_OUTPUT_UNCHANGED));
    assert!(matches!(
        builder.get_up_to_date_status_of_project(&solution.config("core")),
        UpToDateStatus::UpToDate(_)
    ));

    assert!(matches!(
        builder.get_up_to_date_status_of_project(&solution.config("logic")),
        UpToDateStatus::UpToDateWithUpstreamTypes(_)
    ));
    let logic = builder.get_next_invalidated_project(None).unwrap().unwrap();
    assert_eq!(logic.project(), solution.config("logic").as_path());
    assert_eq!(logic.kind(), InvalidatedProjectKind::UpdateOutputFileStamps);
    logic.done(None).unwrap();

    assert!(builder.get_next_invalidated_project(None).unwrap().is_none());
    assert_eq!(solution.programs_created(), 1);
    assert!(solution.fs.modified_time(&logic_output).unwrap() > before);
}

#[test]
fn test_changed_upstream_declaration_rebuilds_dependent() {
    let solution = two_projects();
    build_all(&solution, &["logic"]);
    solution.reset_programs_created();

    solution.write("core/index.tl", "export let version: number = 2\n");
    let mut builder = solution.builder(&["logic"], BuildOptions::default());

    let core = builder.get_next_invalidated_project(None).unwrap().unwrap();
    let result = core.done(None).unwrap();
    assert!(!result.contains(BuildResultFlags::DECLARATION_OUTPUT_UNCHANGED));
    assert_eq!(
        solution.read("core/dist/index.d.tl").unwrap(),
        "export let version: number\n"
    );

    assert!(matches!(
        builder.get_up_to_date_status_of_project(&solution.config("logic")),
        UpToDateStatus::OutOfDateWithUpstream { ref newer_project, .. }
            if *newer_project == solution.config("core")
    ));
    let logic = builder.get_next_invalidated_project(None).unwrap().unwrap();
    assert_eq!(logic.kind(), InvalidatedProjectKind::Build);
    logic.done(None).unwrap();
    assert_eq!(solution.programs_created(), 2);
}

#[test]
fn test_cached_dependent_status_keeps_upstream_types() {
    let solution = two_projects();
    build_all(&solution, &["logic"]);
    solution.reset_programs_created();

    let mut builder = solution.builder(&["logic"], BuildOptions::default());
    let cached = builder.get_up_to_date_status_of_project(&solution.config("logic"));
    assert!(matches!(cached, UpToDateStatus::UpToDate(_)));

    solution.fs.touch(solution.path("core/index.tl"));
    builder.invalidate_project(&solution.config("core"), ReloadLevel::None);
    let core = builder.get_next_invalidated_project(None).unwrap().unwrap();
    assert_eq!(core.project(), solution.config("core").as_path());
    assert!(core
        .done(None)
        .unwrap()
        .contains(BuildResultFlags::DECLARATION_OUTPUT_UNCHANGED));

    let UpToDateStatus::UpToDate(before) = cached else {
        unreachable!()
    };
    assert_eq!(
        builder.get_up_to_date_status_of_project(&solution.config("logic")),
        UpToDateStatus::UpToDateWithUpstreamTypes(before)
    );
    let logic = builder.get_next_invalidated_project(None).unwrap().unwrap();
    assert_eq!(logic.kind(), InvalidatedProjectKind::UpdateOutputFileStamps);
    logic.done(None).unwrap();
    assert_eq!(solution.programs_created(), 1);
}

#[test]
fn test_cached_dependent_status_sees_changed_declarations() {
    let solution = two_projects();
    build_all(&solution, &["logic"]);
    solution.reset_programs_created();

    let mut builder = solution.builder(&["logic"], BuildOptions::default());
    assert!(matches!(
        builder.get_up_to_date_status_of_project(&solution.config("logic")),
        UpToDateStatus::UpToDate(_)
    ));

    solution.write(
        "core/index.tl",
        "export let version: string = \"1\"\nexport let major: number = 1\n",
    );
    builder.invalidate_project(&solution.config("core"), ReloadLevel::None);
    let core = builder.get_next_invalidated_project(None).unwrap().unwrap();
    assert!(!core
        .done(None)
        .unwrap()
        .contains(BuildResultFlags::DECLARATION_OUTPUT_UNCHANGED));

    assert!(matches!(
        builder.get_up_to_date_status_of_project(&solution.config("logic")),
        UpToDateStatus::OutOfDateWithUpstream { ref newer_project, .. }
            if *newer_project == solution.config("core")
    ));
    let logic = builder.get_next_invalidated_project(None).unwrap().unwrap();
    assert_eq!(logic.kind(), InvalidatedProjectKind::Build);
    logic.done(None).unwrap();
    assert_eq!(solution.programs_created(), 2);
}

#[test]
fn test_cached_dependent_status_prepends_upstream_bundle() {
    let solution = TestSolution::new();
    solution.add_project(
        "core",
        &bundle_config("core", &[]),
        &[("src/core.tl", "export let a: number = 1\n")],
    );
    solution.add_project(
        "logic",
        &bundle_config("logic", &["../core"]),
        &[("src/logic.tl", "export let b: number = 2\n")],
    );
    assert_eq!(build_all(&solution, &["logic"]), ExitStatus::Success);
    solution.reset_programs_created();

    let mut builder = solution.builder(&["logic"], BuildOptions::default());
    assert!(matches!(
        builder.get_up_to_date_status_of_project(&solution.config("logic")),
        UpToDateStatus::UpToDate(_)
    ));

    solution.write("core/src/core.tl", "export let a: number = 7\n");
    builder.invalidate_project(&solution.config("core"), ReloadLevel::None);
    let core = builder.get_next_invalidated_project(None).unwrap().unwrap();
    assert!(core
        .done(None)
        .unwrap()
        .contains(BuildResultFlags::DECLARATION_OUTPUT_UNCHANGED));

    assert!(matches!(
        builder.get_up_to_date_status_of_project(&solution.config("logic")),
        UpToDateStatus::OutOfDateWithPrepend { ref newer_project, .. }
            if *newer_project == solution.config("core")
    ));
    let logic = builder.get_next_invalidated_project(None).unwrap().unwrap();
    assert_eq!(logic.kind(), InvalidatedProjectKind::UpdateBundle);
    logic.done(None).unwrap();

    assert_eq!(solution.programs_created(), 1);
    assert!(solution
        .read("logic/out/logic.lua")
        .unwrap()
        .contains("local a = 7"));
}

#[test]
fn test_stepping_through_a_build() {
    let solution = two_projects();
    let mut builder = solution.builder(&["logic"], BuildOptions::default());

    let mut project = builder.get_next_invalidated_project(None).unwrap().unwrap();
    assert_eq!(project.current_step(), BuildStep::CreateProgram);
    let mut steps = vec![project.current_step()];
    while project.current_step() != BuildStep::Done {
        steps.push(project.step(None).unwrap());
    }
    assert_eq!(
        steps,
        vec![
            BuildStep::CreateProgram,
            BuildStep::SyntaxDiagnostics,
            BuildStep::SemanticDiagnostics,
            BuildStep::Emit,
            BuildStep::QueueReferencingProjects,
            BuildStep::Done,
        ]
    );
    assert!(project.result().contains(BuildResultFlags::SUCCESS));
}

#[test]
fn test_dropped_project_stays_queued() {
    let solution = two_projects();
    let mut builder = solution.builder(&["logic"], BuildOptions::default());

    let mut project = builder.get_next_invalidated_project(None).unwrap().unwrap();
    project.step(None).unwrap();
    drop(project);

    let again = builder.get_next_invalidated_project(None).unwrap().unwrap();
    assert_eq!(again.project(), solution.config("core").as_path());
    assert_eq!(again.current_step(), BuildStep::CreateProgram);
}

#[test]
fn test_prepend_reference_updates_bundle_without_compiling() {
    let solution = TestSolution::new();
    solution.add_project(
        "core",
        &bundle_config("core", &[]),
        &[("src/core.tl", "export let a: number = 1\n")],
    );
    solution.add_project(
        "logic",
        &bundle_config("logic", &["../core"]),
        &[("src/logic.tl", "export let b: number = 2\n")],
    );
    assert_eq!(build_all(&solution, &["logic"]), ExitStatus::Success);
    let bundle = solution.read("logic/out/logic.lua").unwrap();
    assert!(bundle.contains("local a = 1"));
    assert!(bundle.contains("local b = 2"));
    solution.reset_programs_created();

    solution.write("core/src/core.tl", "export let a: number = 5\n");
    let mut builder = solution.builder(&["logic"], BuildOptions::default());
    let core = builder.get_next_invalidated_project(None).unwrap().unwrap();
    assert!(core
        .done(None)
        .unwrap()
        .contains(BuildResultFlags::DECLARATION_OUTPUT_UNCHANGED));

    assert!(matches!(
        builder.get_up_to_date_status_of_project(&solution.config("logic")),
        UpToDateStatus::OutOfDateWithPrepend { .. }
    ));
    let logic = builder.get_next_invalidated_project(None).unwrap().unwrap();
    assert_eq!(logic.kind(), InvalidatedProjectKind::UpdateBundle);
    logic.done(None).unwrap();

    assert_eq!(solution.programs_created(), 1);
    let bundle = solution.read("logic/out/logic.lua").unwrap();
    assert!(bundle.contains("local a = 5"));
    assert!(bundle.contains("local b = 2"));
}

#[test]
fn test_canceled_build_can_resume() {
    let solution = TestSolution::chain();
    let mut builder = solution.builder(&["app"], BuildOptions::default());
    let token = CancellationToken::new();
    token.cancel();

    assert!(matches!(
        builder.build(None, Some(&token)),
        Err(BuildError::Canceled)
    ));
    assert_eq!(solution.programs_created(), 0);
    assert_eq!(builder.build(None, None).unwrap(), ExitStatus::Success);
    assert_eq!(solution.programs_created(), 3);
}

// ============================================================================
// Reload levels
// ============================================================================

#[test]
fn test_reload_levels_are_never_downgraded() {
    let solution = TestSolution::chain();
    let mut builder = solution.builder(&["app"], BuildOptions::default());
    let core = solution.config("core");

    builder.invalidate_project(&core, ReloadLevel::None);
    assert_eq!(builder.pending_reload_level(&core), Some(ReloadLevel::None));
    builder.invalidate_project(&core, ReloadLevel::Partial);
    builder.invalidate_project(&core, ReloadLevel::None);
    assert_eq!(builder.pending_reload_level(&core), Some(ReloadLevel::Partial));
    builder.invalidate_project(&core, ReloadLevel::Full);
    builder.invalidate_project(&core, ReloadLevel::Partial);
    assert_eq!(builder.pending_reload_level(&core), Some(ReloadLevel::Full));
}

#[test]
fn test_partial_reload_picks_up_new_files() {
    let solution = two_projects();
    build_all(&solution, &["logic"]);

    let mut builder = solution.builder(&["logic"], BuildOptions::default());
    builder.build(None, None).unwrap();
    solution.write("core/extra.tl", "export let extra: number = 3\n");
    builder.invalidate_project(&solution.config("core"), ReloadLevel::Partial);
    assert_eq!(builder.build(None, None).unwrap(), ExitStatus::Success);

    assert_eq!(
        solution.read("core/dist/extra.lua").unwrap(),
        "local extra = 3\nreturn { extra = extra }\n"
    );
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_cycle_builds_nothing() {
    let solution = TestSolution::new();
    solution.add_project(
        "a",
        &composite_config(&["../b"]),
        &[("index.tl", "let a = 1\n")],
    );
    solution.add_project(
        "b",
        &composite_config(&["../a"]),
        &[("index.tl", "let b = 1\n")],
    );
    let mut builder = solution.builder(&["a"], BuildOptions::default());

    assert!(builder.get_build_order().is_circular());
    let status = builder.build(None, None).unwrap();
    assert_eq!(status, ExitStatus::ProjectReferenceCycleOutputsSkipped);
    assert_eq!(status.code(), 4);
    assert!(!solution.exists("a/dist/index.lua"));
    assert!(!solution.exists("b/dist/index.lua"));
    assert!(solution.error_codes().contains(&codes::CIRCULAR_REFERENCES));
}

#[test]
fn test_semantic_errors_block_dependents() {
    let solution = TestSolution::chain();
    solution.write(
        "logic/index.tl",
        "import \"no-such-module\"\nexport let double: number = 2\n",
    );
    let mut builder = solution.builder(&["app"], BuildOptions::default());

    let status = builder.build(None, None).unwrap();
    assert_eq!(status, ExitStatus::DiagnosticsPresentOutputsGenerated);
    assert_eq!(status.code(), 2);
    assert!(solution.exists("core/dist/index.lua"));
    assert!(!solution.exists("logic/dist/index.lua"));
    assert!(!solution.exists("app/dist/main.lua"));

    let logic_errors = builder.project_diagnostics(&solution.config("logic"));
    assert_eq!(logic_errors.len(), 1);
    assert_eq!(logic_errors[0].code, codes::CANNOT_FIND_MODULE);
    assert!(matches!(
        builder.get_up_to_date_status_of_project(&solution.config("app")),
        UpToDateStatus::UpstreamBlocked { .. }
    ));
    let skipped = solution
        .status
        .messages_with_code(codes::SKIPPING_BUILD_UPSTREAM_ERRORS);
    assert_eq!(skipped.len(), 1);
    assert!(skipped[0].contains("app"));
    assert_eq!(
        solution.status.messages_with_code(codes::FOUND_ERRORS),
        vec!["Found 1 error.".to_string()]
    );
}

#[test]
fn test_invalid_config_blocks_dependents() {
    let solution = two_projects();
    solution.write("core/tlconfig.json", "{ not json");
    let mut builder = solution.builder(&["logic"], BuildOptions::default());

    let status = builder.build(None, None).unwrap();
    assert_eq!(status, ExitStatus::DiagnosticsPresentOutputsSkipped);
    assert_eq!(solution.error_codes(), vec![codes::INVALID_CONFIG]);
    assert!(matches!(
        builder.get_up_to_date_status_of_project(&solution.config("logic")),
        UpToDateStatus::UpstreamBlocked {
            upstream_project_blocked: false,
            ..
        }
    ));
    assert_eq!(solution.programs_created(), 0);
}

#[test]
fn test_syntax_error_stops_before_emit() {
    let solution = two_projects();
    solution.write("core/index.tl", "export let version: string = \"1\"\nif x then {\n");
    let mut builder = solution.builder(&["logic"], BuildOptions::default());

    let core = builder.get_next_invalidated_project(None).unwrap().unwrap();
    let result = core.done(None).unwrap();
    assert!(result.contains(BuildResultFlags::SYNTAX_ERRORS));
    assert!(!result.contains(BuildResultFlags::SUCCESS));
    assert!(!solution.exists("core/dist/index.lua"));
    assert_eq!(solution.error_codes(), vec![codes::EXPECTED_TOKEN]);
}

#[test]
fn test_declaration_errors_fail_the_project() {
    let solution = two_projects();
    solution.write("core/index.tl", "export let version = \"1\"\n");
    let mut builder = solution.builder(&["logic"], BuildOptions::default());

    let core = builder.get_next_invalidated_project(None).unwrap().unwrap();
    let result = core.done(None).unwrap();
    assert!(result.contains(BuildResultFlags::DECLARATION_EMIT_ERRORS));
    assert_eq!(result.error_kind(), Some("Declaration file"));
    assert!(!solution.exists("core/dist/index.d.tl"));
    assert_eq!(
        solution.error_codes(),
        vec![codes::EXPORT_NEEDS_TYPE_ANNOTATION]
    );
}

#[test]
fn test_declaration_warnings_still_write_outputs() {
    const INFERRED_TYPE: u32 = 9005;
    let solution = two_projects();
    let compiler = DeclarationWarningCompiler::new(solution.counting_compiler(), INFERRED_TYPE);
    let mut builder =
        solution.builder_with_compiler(&["logic"], BuildOptions::default(), Box::new(compiler));

    assert_eq!(builder.build(None, None).unwrap(), ExitStatus::Success);
    for project in ["core", "logic"] {
        assert!(solution.exists(&format!("{}/dist/index.lua", project)));
        assert!(solution.exists(&format!("{}/dist/index.d.tl", project)));
        assert!(solution.exists(&format!("{}/dist/tlconfig.tlbuildinfo", project)));
    }
    let warnings = solution
        .diagnostics
        .get_diagnostics()
        .into_iter()
        .filter(|d| d.code == INFERRED_TYPE)
        .count();
    assert_eq!(warnings, 2);
    assert!(solution.error_codes().is_empty());

    let mut fresh = solution.builder(&["logic"], BuildOptions::default());
    for project in ["core", "logic"] {
        assert!(matches!(
            fresh.get_up_to_date_status_of_project(&solution.config(project)),
            UpToDateStatus::UpToDate(_)
        ));
    }
}

#[test]
fn test_non_composite_reference_is_a_config_error() {
    let solution = TestSolution::new();
    solution.add_project(
        "core",
        r#"{ "compilerOptions": { "outDir": "dist" } }"#,
        &[("index.tl", "let a = 1\n")],
    );
    solution.add_project(
        "logic",
        &composite_config(&["../core"]),
        &[("index.tl", "let b = 2\n")],
    );

    let status = build_all(&solution, &["logic"]);
    assert_eq!(status, ExitStatus::DiagnosticsPresentOutputsGenerated);
    assert!(solution
        .error_codes()
        .contains(&codes::REFERENCED_PROJECT_NOT_COMPOSITE));
    assert!(!solution.exists("logic/dist/index.lua"));
}

// ============================================================================
// Dry runs and clean
// ============================================================================

#[test]
fn test_dry_build_reports_without_writing() {
    let solution = TestSolution::chain();
    let options = BuildOptions {
        dry: true,
        ..BuildOptions::default()
    };

    let status = solution.builder(&["app"], options).build(None, None).unwrap();
    assert_eq!(status, ExitStatus::Success);
    assert_eq!(
        solution.status.messages_with_code(codes::DRY_WOULD_BUILD).len(),
        3
    );
    assert_eq!(solution.fs.write_file_calls(), 0);
    assert_eq!(solution.programs_created(), 0);
}

#[test]
fn test_clean_removes_outputs_and_requeues() {
    let solution = TestSolution::chain();
    let mut builder = solution.builder(&["app"], BuildOptions::default());
    builder.build(None, None).unwrap();

    assert_eq!(builder.clean(None), ExitStatus::Success);
    assert!(!solution.exists("core/dist/index.lua"));
    assert!(!solution.exists("core/dist/tlconfig.tlbuildinfo"));
    assert!(!solution.exists("app/dist/main.lua"));
    assert!(solution.exists("core/index.tl"));

    solution.reset_programs_created();
    assert_eq!(builder.build(None, None).unwrap(), ExitStatus::Success);
    assert_eq!(solution.programs_created(), 3);
}

#[test]
fn test_dry_clean_lists_files() {
    let solution = TestSolution::chain();
    build_all(&solution, &["app"]);
    let options = BuildOptions {
        dry: true,
        ..BuildOptions::default()
    };

    assert_eq!(
        solution.builder(&["app"], options).clean(None),
        ExitStatus::Success
    );
    let listing = solution.status.messages_with_code(codes::DRY_WOULD_DELETE);
    assert_eq!(listing.len(), 1);
    assert!(listing[0].contains("core/dist/index.lua"));
    assert!(solution.exists("core/dist/index.lua"));
}

#[test]
fn test_step_events_are_public() {
    assert_eq!(
        tlbuild_core::build::next_step(BuildStep::EmitBundle, StepEvent::BundleUnavailable),
        BuildStep::BuildInvalidatedProjectOfBundle
    );
}
