//! Test: Failure Handling - aborting runs and rejecting bad references

use crate::helpers::*;
use buildline::core::{
    BuildConfig, ConfigError, Pipeline, RunError, StepError, TaskError, TaskRef,
};

const LINT_THEN_CONCAT: &str = r#"
tasks:
  - name: copy
    target: app_scripts
    operations:
      - kind: copy
        src: "src/**/*.js"
        dest: build/scripts/
        expand: true
  - name: jshint
    target: src
    operations:
      - kind: lint
        src: "src/**/*.js"
        options:
          forbid: ['\bdebugger\b']
  - name: concat
    target: app_css
    operations:
      - kind: concatenate
        src: "src/css/*.css"
        dest: build/app.css
aliases:
  - name: development-build
    tasks: ["copy:app_scripts", "jshint:src", "concat:app_css"]
"#;

#[test]
fn test_lint_failure_aborts_before_concatenate() {
    let project = TestProject::new();
    project
        .write("Buildfile.yml", LINT_THEN_CONCAT)
        .write("src/app.js", "debugger;\n")
        .write("src/css/a.css", ".a{}");

    let result = project.run("development-build");

    assert_build_failed_at(&result, "jshint:src");
    assert_eq!(result.task_order(), vec!["copy:app_scripts", "jshint:src"]);
    assert!(matches!(
        result.result.error,
        Some(RunError::Step { source: StepError::Lint { count: 1, .. }, .. })
    ));

    // Earlier outputs stay, later ones never appear
    assert!(project.exists("build/scripts/src/app.js"));
    assert!(!project.exists("build/app.css"));
}

#[test]
fn test_failure_names_the_failing_task() {
    let project = TestProject::new();
    project
        .write("Buildfile.yml", LINT_THEN_CONCAT)
        .write("src/app.js", "ok();\n");

    let result = project.run("development-build");

    assert_build_failed_at(&result, "concat:app_css");
    let message = result.error_message();
    assert!(message.contains("concat:app_css"), "{}", message);
    assert!(message.contains("No files matched"), "{}", message);
}

#[test]
fn test_unknown_task_does_no_writes() {
    let project = TestProject::frontend();
    let engine = project.engine();

    let pipeline = Pipeline::new(
        "adhoc",
        vec![TaskRef::with_target("copy", "app_scripts"), TaskRef::new("uglify")],
    );
    let result = engine.run_pipeline(&pipeline);

    assert!(!result.succeeded);
    assert!(result.is_usage_error());
    assert!(matches!(
        result.error,
        Some(RunError::Task(TaskError::Unknown(ref task))) if task.name == "uglify"
    ));
    assert!(!project.exists("development-build"));
}

#[test]
fn test_unknown_pipeline_name_is_usage_error() {
    let project = TestProject::frontend();
    let result = project.run("deploy");

    assert!(result.result.is_usage_error());
    assert!(result.task_order().is_empty());
}

#[test]
fn test_unknown_alias_reference_rejected_at_load() {
    let yaml = r#"
tasks:
  - name: clean
    operations:
      - kind: delete
        src: build
aliases:
  - name: development-build
    tasks: [clean, "copy:missing"]
"#;
    let err = BuildConfig::from_yaml(yaml).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(ref msg) if msg.contains("copy:missing")));
}

#[test]
fn test_placeholder_cycle_rejected_before_any_task() {
    let project = TestProject::new();
    project.write(
        "Buildfile.yml",
        r#"
a: "<%= b %>"
b: "x<%= a %>"
tasks:
  - name: clean
    operations:
      - kind: delete
        src: "<%= a %>"
"#,
    );

    let err = BuildConfig::from_file(project.path("Buildfile.yml")).unwrap_err();
    assert!(matches!(err, ConfigError::Cycle { .. }), "got {:?}", err);
}

#[test]
fn test_failed_run_leaves_registry_usable() {
    let project = TestProject::new();
    project
        .write("Buildfile.yml", LINT_THEN_CONCAT)
        .write("src/app.js", "debugger;\n")
        .write("src/css/a.css", ".a{}");

    let engine = project.engine();
    assert!(!engine.run("development-build").succeeded);

    project.write("src/app.js", "ok();\n");
    assert!(engine.run("development-build").succeeded);
    assert_eq!(project.read("build/app.css"), ".a{}");
}
