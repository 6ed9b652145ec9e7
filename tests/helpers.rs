//! Test utility functions for buildline
#![allow(dead_code)]

use buildline::core::{BuildConfig, Pipeline, RunResult, TaskRef, TaskRegistry};
use buildline::execution::{ExecutionEngine, ExecutionEvent, PipelineRunner, WatchEvent};

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

/// A small front-end build covering every operation kind
pub const FRONTEND_BUILD: &str = r#"
name: frontend
build_dir: development-build
static_dir: "<%= build_dir %>/static"
app_files:
  js: ["src/**/*.js", "!src/**/*.spec.js"]
  atpl: ["src/app/**/*.tpl.html"]
  css: ["src/css/*.css"]
  index: src/index.html

tasks:
  - name: clean
    operations:
      - kind: delete
        src: ["<%= build_dir %>"]
  - name: jshint
    target: src
    operations:
      - kind: lint
        src: "<%= app_files.js %>"
        options:
          trailing_whitespace: true
          forbid: ['\bdebugger\b']
  - name: html2js
    target: app
    operations:
      - kind: compile-template
        src: "<%= app_files.atpl %>"
        dest: "<%= static_dir %>/scripts/templates-app.js"
        base: src/app
  - name: copy
    target: app_scripts
    operations:
      - kind: copy
        src: "<%= app_files.js %>"
        dest: "<%= static_dir %>/scripts/"
        expand: true
  - name: concat
    target: app_css
    operations:
      - kind: concatenate
        src: "<%= app_files.css %>"
        dest: "<%= static_dir %>/css/app.css"
  - name: includeSource
    target: development
    operations:
      - kind: inject-reference
        src: "<%= app_files.index %>"
        dest: "<%= build_dir %>/index.html"
        base_path: "<%= build_dir %>"
        base_url: ""

aliases:
  - name: lint
    tasks: [jshint]
  - name: development-build
    tasks: [clean, lint, html2js, "copy:app_scripts", "concat:app_css", "includeSource:development"]
  - name: default
    tasks: [development-build]
  - name: production-build
    tasks: []

watch:
  debounce_ms: 50
  livereload: true
  rules:
    - name: buildfile
      files: Buildfile.yml
      tasks: ["jshint:src"]
      livereload: false
      full_rebuild: true
    - name: jssrc
      files: "<%= app_files.js %>"
      tasks: ["jshint:src", "copy:app_scripts"]
    - name: css
      files: "<%= app_files.css %>"
      tasks: ["concat:app_css"]
"#;

/// A scratch project directory
pub struct TestProject {
    dir: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp dir"),
        }
    }

    /// A project holding the sources `FRONTEND_BUILD` expects
    pub fn frontend() -> Self {
        let project = Self::new();
        project
            .write("Buildfile.yml", FRONTEND_BUILD)
            .write("src/app/app.js", "angular.module(\"app\", [\"templates-app\"]);\n")
            .write(
                "src/app/home/home.js",
                "angular.module(\"app\").controller(\"Home\", function () {});\n",
            )
            .write("src/app/home/home.spec.js", "describe(\"home\", function () {});\n")
            .write("src/app/home/home.tpl.html", "<h1>Home</h1>\n")
            .write("src/css/b.css", ".b{}")
            .write("src/css/a.css", ".a{}")
            .write(
                "src/index.html",
                "<head>\n  <!-- include: \"type\": \"css\", \"files\": \"static/css/*.css\" -->\n</head>\n<body>\n  <!-- include: \"type\": \"js\", \"files\": [\"static/scripts/templates-app.js\", \"static/scripts/**/*.js\"] -->\n</body>\n",
            );
        project
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root().join(relative)
    }

    pub fn write(&self, relative: &str, contents: &str) -> &Self {
        let path = self.path(relative);
        fs::create_dir_all(path.parent().expect("parent dir")).expect("create dirs");
        fs::write(path, contents).expect("write file");
        self
    }

    pub fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.path(relative))
            .unwrap_or_else(|e| panic!("read {}: {}", relative, e))
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.path(relative).exists()
    }

    /// Every file under `relative`, keyed by its path
    pub fn snapshot(&self, relative: &str) -> BTreeMap<String, Vec<u8>> {
        fn walk(dir: &Path, base: &Path, out: &mut BTreeMap<String, Vec<u8>>) {
            let Ok(entries) = fs::read_dir(dir) else { return };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    walk(&path, base, out);
                } else {
                    let key = path.strip_prefix(base).unwrap().to_string_lossy().replace('\\', "/");
                    out.insert(key, fs::read(&path).unwrap());
                }
            }
        }
        let mut out = BTreeMap::new();
        walk(&self.path(relative), self.root(), &mut out);
        out
    }

    /// Copy a directory tree from disk into the project
    pub fn copy_tree(&self, from: &Path) -> &Self {
        fn walk(dir: &Path, base: &Path, project: &TestProject) {
            for entry in fs::read_dir(dir).expect("read demo dir").flatten() {
                let path = entry.path();
                if path.is_dir() {
                    walk(&path, base, project);
                } else {
                    let relative = path
                        .strip_prefix(base)
                        .unwrap()
                        .to_string_lossy()
                        .replace('\\', "/");
                    project.write(&relative, &fs::read_to_string(&path).unwrap());
                }
            }
        }
        walk(from, from, self);
        self
    }

    pub fn config(&self) -> BuildConfig {
        BuildConfig::from_file(self.path("Buildfile.yml")).expect("load Buildfile.yml")
    }

    pub fn engine(&self) -> ExecutionEngine {
        let registry = self.config().to_registry().expect("build registry");
        ExecutionEngine::new(Arc::new(registry), self.root())
    }

    /// Run a pipeline, recording the tasks started along the way
    pub fn run(&self, name: &str) -> BuildTestResult {
        let mut engine = self.engine();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        engine.add_event_handler(move |event| sink.lock().unwrap().push(event));

        let result = engine.run(name);
        let events = events.lock().unwrap().clone();
        BuildTestResult { result, events }
    }
}

/// Outcome of a pipeline run under test
pub struct BuildTestResult {
    pub result: RunResult,
    pub events: Vec<ExecutionEvent>,
}

impl BuildTestResult {
    pub fn is_success(&self) -> bool {
        self.result.succeeded
    }

    /// Task references in the order they started
    pub fn task_order(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ExecutionEvent::TaskStarted { task, .. } => Some(task.to_string()),
                _ => None,
            })
            .collect()
    }

    pub fn error_message(&self) -> String {
        self.result
            .error
            .as_ref()
            .map(|e| e.to_string())
            .unwrap_or_default()
    }
}

pub fn assert_build_succeeded(result: &BuildTestResult) {
    assert!(
        result.is_success(),
        "Expected build to succeed, got: {}",
        result.error_message()
    );
}

pub fn assert_build_failed_at(result: &BuildTestResult, task: &str) {
    assert!(!result.is_success(), "Expected build to fail at {}", task);
    let expected: TaskRef = task.parse().unwrap();
    assert_eq!(
        result.result.failed_at.as_ref(),
        Some(&expected),
        "Expected failure at {}, error: {}",
        task,
        result.error_message()
    );
}

/// Pipeline runner that counts runs and holds each watch run for a while
pub struct SlowRunner {
    pub inner: ExecutionEngine,
    pub delay: Duration,
    pub runs: AtomicUsize,
}

impl SlowRunner {
    pub fn new(inner: ExecutionEngine, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            runs: AtomicUsize::new(0),
        }
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl PipelineRunner for SlowRunner {
    fn run_pipeline(&self, pipeline: &Pipeline) -> RunResult {
        if pipeline.name.starts_with("watch:") {
            self.runs.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
        }
        self.inner.run_pipeline(pipeline)
    }
}

pub fn registry_of(project: &TestProject) -> TaskRegistry {
    project.config().to_registry().expect("build registry")
}

/// Wait for a matching watch event, recording everything seen
pub async fn wait_for<F>(
    rx: &mut UnboundedReceiver<WatchEvent>,
    seen: &mut Vec<WatchEvent>,
    predicate: F,
) -> WatchEvent
where
    F: Fn(&WatchEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let event = rx.recv().await.expect("watch event channel closed");
            seen.push(event.clone());
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for watch event")
}

/// Collect events still buffered on the channel
pub fn drain(rx: &mut UnboundedReceiver<WatchEvent>, seen: &mut Vec<WatchEvent>) {
    while let Ok(event) = rx.try_recv() {
        seen.push(event);
    }
}

pub fn count_runs(events: &[WatchEvent], rule: &str) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, WatchEvent::RunStarted { rule: r, .. } if r == rule))
        .count()
}
