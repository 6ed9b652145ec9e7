//! Test: Watch Session - debounced, serialized re-runs driven by file changes

use crate::helpers::*;
use buildline::core::{Pipeline, WatchError};
use buildline::execution::{PipelineRunner, WatchEvent, WatchScheduler};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

struct Session {
    changes: mpsc::UnboundedSender<PathBuf>,
    events: mpsc::UnboundedReceiver<WatchEvent>,
    handle: JoinHandle<Result<(), WatchError>>,
    seen: Vec<WatchEvent>,
}

impl Session {
    fn start<R: PipelineRunner>(project: &TestProject, runner: Arc<R>, baseline: Pipeline) -> Self {
        let config = project.config();
        let (change_tx, change_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let scheduler = WatchScheduler::new(
            runner,
            project.root(),
            config.watch_rules(),
            config.watch.debounce(),
        )
        .with_events(event_tx);
        let handle = tokio::spawn(async move { scheduler.run(&baseline, change_rx).await });

        Self {
            changes: change_tx,
            events: event_rx,
            handle,
            seen: Vec::new(),
        }
    }

    fn change(&self, project: &TestProject, relative: &str) {
        self.changes.send(project.path(relative)).unwrap();
    }

    async fn wait_for<F: Fn(&WatchEvent) -> bool>(&mut self, predicate: F) -> WatchEvent {
        wait_for(&mut self.events, &mut self.seen, predicate).await
    }

    /// Close the change stream and wait for pending runs to finish
    async fn finish(mut self) -> (Result<(), WatchError>, Vec<WatchEvent>) {
        drop(self.changes);
        let result = tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("watch session did not stop")
            .expect("watch session panicked");
        drain(&mut self.events, &mut self.seen);
        (result, self.seen)
    }
}

fn baseline_of(project: &TestProject) -> Pipeline {
    registry_of(project).pipeline("development-build").unwrap()
}

fn succeeded(rule: &'static str) -> impl Fn(&WatchEvent) -> bool {
    move |e| matches!(e, WatchEvent::RunSucceeded { rule: r } if r == rule)
}

fn failed(rule: &'static str) -> impl Fn(&WatchEvent) -> bool {
    move |e| matches!(e, WatchEvent::RunFailed { rule: r, .. } if r == rule)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_baseline_runs_before_rules() {
    let project = TestProject::frontend();
    let mut session = Session::start(&project, Arc::new(project.engine()), baseline_of(&project));

    session
        .wait_for(|e| matches!(e, WatchEvent::BaselineCompleted { .. }))
        .await;
    assert!(project.exists("development-build/index.html"));

    let (result, events) = session.finish().await;
    assert!(result.is_ok());
    assert!(matches!(
        events[0],
        WatchEvent::BaselineCompleted { ref pipeline } if pipeline == "development-build"
    ));
    assert_eq!(count_runs(&events, "jssrc"), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rapid_changes_debounce_into_one_run() {
    let project = TestProject::frontend();
    let mut session = Session::start(&project, Arc::new(project.engine()), baseline_of(&project));
    session
        .wait_for(|e| matches!(e, WatchEvent::BaselineCompleted { .. }))
        .await;

    project.write("src/app/app.js", "angular.module(\"app\", []);\n");
    session.change(&project, "src/app/app.js");
    tokio::time::sleep(Duration::from_millis(10)).await;
    session.change(&project, "src/app/app.js");

    session.wait_for(succeeded("jssrc")).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let (result, events) = session.finish().await;
    assert!(result.is_ok());
    assert_eq!(count_runs(&events, "jssrc"), 1);
    assert_eq!(count_runs(&events, "css"), 0);
    assert_eq!(
        project.read("development-build/static/scripts/src/app/app.js"),
        "angular.module(\"app\", []);\n"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_run_keeps_session_alive() {
    let project = TestProject::frontend();
    let mut session = Session::start(&project, Arc::new(project.engine()), baseline_of(&project));
    session
        .wait_for(|e| matches!(e, WatchEvent::BaselineCompleted { .. }))
        .await;

    project.write("src/app/app.js", "debugger;\n");
    session.change(&project, "src/app/app.js");
    let failure = session.wait_for(failed("jssrc")).await;
    match failure {
        WatchEvent::RunFailed { reason, .. } => {
            assert!(reason.contains("jshint:src"), "{}", reason)
        }
        other => panic!("Expected failure, got {:?}", other),
    }

    project.write("src/css/c.css", ".c{}");
    session.change(&project, "src/css/c.css");
    session.wait_for(succeeded("css")).await;

    let (result, events) = session.finish().await;
    assert!(result.is_ok());
    assert_eq!(project.read("development-build/static/css/app.css"), ".a{}\n.b{}\n.c{}");
    assert!(events.iter().any(|e| matches!(e, WatchEvent::Reload { rule, .. } if rule == "css")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_changes_during_run_queue_one_follow_up() {
    let project = TestProject::frontend();
    let runner = Arc::new(SlowRunner::new(project.engine(), Duration::from_millis(400)));
    let mut session = Session::start(&project, runner.clone(), baseline_of(&project));
    session
        .wait_for(|e| matches!(e, WatchEvent::BaselineCompleted { .. }))
        .await;

    session.change(&project, "src/app/app.js");
    session
        .wait_for(|e| matches!(e, WatchEvent::RunStarted { rule, .. } if rule == "jssrc"))
        .await;

    // Both arrive while the first run is still in progress
    session.change(&project, "src/app/app.js");
    session.change(&project, "src/app/home/home.js");

    let (result, events) = session.finish().await;
    assert!(result.is_ok());
    assert_eq!(runner.runs(), 2);
    assert_eq!(count_runs(&events, "jssrc"), 2);

    let follow_up = events
        .iter()
        .filter_map(|e| match e {
            WatchEvent::RunStarted { rule, paths } if rule == "jssrc" => Some(paths.clone()),
            _ => None,
        })
        .nth(1)
        .unwrap();
    assert_eq!(follow_up, vec!["src/app/app.js", "src/app/home/home.js"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_exclusive_rule_preempts_others() {
    let project = TestProject::frontend();
    project.write(
        "Buildfile.yml",
        &FRONTEND_BUILD.replace(
            "      files: \"<%= app_files.css %>\"",
            "      files: [\"<%= app_files.css %>\", Buildfile.yml]",
        ),
    );
    let mut session = Session::start(&project, Arc::new(project.engine()), baseline_of(&project));
    session
        .wait_for(|e| matches!(e, WatchEvent::BaselineCompleted { .. }))
        .await;

    session.change(&project, "Buildfile.yml");
    session.wait_for(succeeded("buildfile")).await;
    session.change(&project, "src/css/a.css");
    session.wait_for(succeeded("css")).await;

    let (result, events) = session.finish().await;
    assert!(result.is_ok());
    assert_eq!(count_runs(&events, "buildfile"), 1);
    assert_eq!(count_runs(&events, "css"), 1);

    let css_paths: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            WatchEvent::RunStarted { rule, paths } if rule == "css" => Some(paths.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(css_paths, vec![vec!["src/css/a.css".to_string()]]);

    // The build-description rule does not reload browsers
    assert!(!events
        .iter()
        .any(|e| matches!(e, WatchEvent::Reload { rule, .. } if rule == "buildfile")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failing_baseline_ends_session() {
    let project = TestProject::frontend();
    project.write("src/app/app.js", "debugger;\n");

    let session = Session::start(&project, Arc::new(project.engine()), baseline_of(&project));

    let (result, events) = session.finish().await;
    assert!(matches!(
        result,
        Err(WatchError::Baseline { ref pipeline, .. }) if pipeline == "development-build"
    ));
    assert_eq!(count_runs(&events, "jssrc"), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_changes_outside_rules_are_ignored() {
    let project = TestProject::frontend();
    let mut session = Session::start(&project, Arc::new(project.engine()), baseline_of(&project));
    session
        .wait_for(|e| matches!(e, WatchEvent::BaselineCompleted { .. }))
        .await;

    session.change(&project, "README.md");
    session.change(&project, "development-build/static/scripts/src/app/app.js");
    session.changes.send(PathBuf::from("/somewhere/else/app.js")).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let (result, events) = session.finish().await;
    assert!(result.is_ok());
    assert!(!events.iter().any(|e| matches!(e, WatchEvent::RunStarted { .. })));
}
