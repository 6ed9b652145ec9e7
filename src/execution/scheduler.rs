//! Watch scheduler - turns file changes into serialized pipeline re-runs
//!
//! A dispatcher reads changed paths from a channel and routes each to the
//! rules whose patterns select it. Every rule owns a worker task that
//! debounces its changes and runs its pipeline on the blocking pool, one run
//! at a time.

use crate::{
    core::{config::WatchRule, error::WatchError, Pipeline},
    execution::{
        engine::PipelineRunner,
        files::{slash_path, PatternSet},
    },
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Per-rule scheduling state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// Waiting for a matching change
    Idle,
    /// Collecting changes until the quiet window elapses
    Debounced,
    /// The rule's pipeline is running
    Running,
    /// The last run failed
    Failed,
}

impl WatchState {
    /// A matching change arrived
    pub fn on_change(self) -> Self {
        match self {
            WatchState::Idle | WatchState::Failed => WatchState::Debounced,
            other => other,
        }
    }

    /// The debounce window elapsed without further changes
    pub fn on_quiet(self) -> Self {
        match self {
            WatchState::Debounced => WatchState::Running,
            other => other,
        }
    }

    /// The pipeline run finished
    pub fn on_finished(self, succeeded: bool) -> Self {
        match (self, succeeded) {
            (WatchState::Running, true) => WatchState::Idle,
            (WatchState::Running, false) => WatchState::Failed,
            (other, _) => other,
        }
    }

    /// Failure has been reported
    pub fn recover(self) -> Self {
        match self {
            WatchState::Failed => WatchState::Idle,
            other => other,
        }
    }
}

/// Notifications emitted by a watch session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    BaselineCompleted { pipeline: String },
    RunStarted { rule: String, paths: Vec<String> },
    RunSucceeded { rule: String },
    RunFailed { rule: String, reason: String },
    /// A livereload rule finished; connected browsers should refresh `paths`
    Reload { rule: String, paths: Vec<String> },
}

type EventSender = Option<UnboundedSender<WatchEvent>>;

fn emit(events: &EventSender, event: WatchEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}

/// Rules that should run for one changed path
///
/// When an exclusive rule matches, only exclusive rules run.
pub fn route(rules: &[(bool, PatternSet)], relative: &str) -> Vec<usize> {
    let matched: Vec<usize> = rules
        .iter()
        .enumerate()
        .filter(|(_, (_, set))| set.matches(relative))
        .map(|(i, _)| i)
        .collect();

    if matched.iter().any(|&i| rules[i].0) {
        matched.into_iter().filter(|&i| rules[i].0).collect()
    } else {
        matched
    }
}

/// Long-lived watch loop over a set of rules
pub struct WatchScheduler<R> {
    runner: Arc<R>,
    root: PathBuf,
    rules: Vec<WatchRule>,
    debounce: Duration,
    events: EventSender,
}

impl<R: PipelineRunner> WatchScheduler<R> {
    pub fn new(
        runner: Arc<R>,
        root: impl Into<PathBuf>,
        rules: Vec<WatchRule>,
        debounce: Duration,
    ) -> Self {
        Self {
            runner,
            root: root.into(),
            rules,
            debounce,
            events: None,
        }
    }

    /// Report session progress on `tx`
    pub fn with_events(mut self, tx: UnboundedSender<WatchEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Run the session until `changes` closes
    ///
    /// `baseline` runs to completion first; if it fails the session ends
    /// before any rule is armed.
    pub async fn run(
        self,
        baseline: &Pipeline,
        mut changes: UnboundedReceiver<PathBuf>,
    ) -> Result<(), WatchError> {
        let matchers = self
            .rules
            .iter()
            .map(|rule| {
                PatternSet::new(&rule.files)
                    .map(|set| (rule.exclusive, set))
                    .map_err(|source| WatchError::InvalidPattern {
                        rule: rule.name.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.run_baseline(baseline).await?;

        let mut senders = Vec::with_capacity(self.rules.len());
        let mut workers: Vec<JoinHandle<()>> = Vec::with_capacity(self.rules.len());
        for rule in &self.rules {
            let (tx, rx) = mpsc::unbounded_channel();
            senders.push(tx);
            workers.push(tokio::spawn(rule_worker(
                rule.clone(),
                self.runner.clone(),
                self.debounce,
                rx,
                self.events.clone(),
            )));
        }
        info!("Watching {} with {} rules", self.root.display(), self.rules.len());

        while let Some(path) = changes.recv().await {
            let Some(relative) = self.relative(&path) else {
                debug!("ignoring change outside project: {}", path.display());
                continue;
            };

            for index in route(&matchers, &relative) {
                debug!("{} -> rule {}", relative, self.rules[index].name);
                let _ = senders[index].send(relative.clone());
            }
        }

        drop(senders);
        for worker in workers {
            if let Err(e) = worker.await {
                error!("Watch worker stopped unexpectedly: {}", e);
            }
        }
        info!("Watch session ended");
        Ok(())
    }

    async fn run_baseline(&self, baseline: &Pipeline) -> Result<(), WatchError> {
        info!("Running baseline pipeline: {}", baseline.name);

        let runner = self.runner.clone();
        let pipeline = baseline.clone();
        let outcome = tokio::task::spawn_blocking(move || runner.run_pipeline(&pipeline)).await;

        let reason = match outcome {
            Ok(result) if result.succeeded => None,
            Ok(result) => Some(
                result
                    .error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "unknown error".to_string()),
            ),
            Err(e) => Some(e.to_string()),
        };

        match reason {
            None => {
                emit(
                    &self.events,
                    WatchEvent::BaselineCompleted {
                        pipeline: baseline.name.clone(),
                    },
                );
                Ok(())
            }
            Some(reason) => Err(WatchError::Baseline {
                pipeline: baseline.name.clone(),
                reason,
            }),
        }
    }

    /// Root-relative, `/`-separated form of a changed path
    fn relative(&self, path: &Path) -> Option<String> {
        let relative = if path.is_absolute() {
            path.strip_prefix(&self.root).ok()?
        } else {
            path
        };
        let relative = slash_path(relative);
        (!relative.is_empty()).then_some(relative)
    }
}

/// Debounce and run one rule until its channel closes
async fn rule_worker<R: PipelineRunner>(
    rule: WatchRule,
    runner: Arc<R>,
    debounce: Duration,
    mut rx: UnboundedReceiver<String>,
    events: EventSender,
) {
    let mut state = WatchState::Idle;
    let mut pending: Vec<String> = Vec::new();

    loop {
        if pending.is_empty() {
            match rx.recv().await {
                Some(path) => pending.push(path),
                None => break,
            }
        }
        state = transition(&rule.name, state, state.on_change());

        while let Ok(next) = timeout(debounce, rx.recv()).await {
            match next {
                Some(path) => {
                    if !pending.contains(&path) {
                        pending.push(path);
                    }
                }
                None => break,
            }
        }
        state = transition(&rule.name, state, state.on_quiet());

        let paths = std::mem::take(&mut pending);
        info!("Change in {:?}, running {}", paths, rule.name);
        emit(
            &events,
            WatchEvent::RunStarted {
                rule: rule.name.clone(),
                paths: paths.clone(),
            },
        );

        let task_runner = runner.clone();
        let pipeline = rule.pipeline.clone();
        let outcome =
            tokio::task::spawn_blocking(move || task_runner.run_pipeline(&pipeline)).await;
        let failure = match outcome {
            Ok(result) if result.succeeded => None,
            Ok(result) => Some(
                result
                    .error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "unknown error".to_string()),
            ),
            Err(e) => Some(e.to_string()),
        };
        state = transition(&rule.name, state, state.on_finished(failure.is_none()));

        match failure {
            None => {
                emit(&events, WatchEvent::RunSucceeded { rule: rule.name.clone() });
                if rule.livereload {
                    emit(
                        &events,
                        WatchEvent::Reload {
                            rule: rule.name.clone(),
                            paths,
                        },
                    );
                }
            }
            Some(reason) => {
                let err = WatchError::Run {
                    rule: rule.name.clone(),
                    reason: reason.clone(),
                };
                warn!("{}", err);
                emit(
                    &events,
                    WatchEvent::RunFailed {
                        rule: rule.name.clone(),
                        reason,
                    },
                );
                state = transition(&rule.name, state, state.recover());
            }
        }

        // Changes that arrived mid-run become a single follow-up batch
        while let Ok(path) = rx.try_recv() {
            if !pending.contains(&path) {
                pending.push(path);
            }
        }
    }

    debug!("rule {} stopped in state {:?}", rule.name, state);
}

fn transition(rule: &str, from: WatchState, to: WatchState) -> WatchState {
    if from != to {
        debug!("rule {}: {:?} -> {:?}", rule, from, to);
    }
    to
}
