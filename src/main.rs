use anyhow::{Context, Result};
use buildline::{
    cli::{
        commands::{ListCommand, RunCommand, ValidateCommand, WatchCommand},
        output::*,
        Cli, Command,
    },
    core::{BuildConfig, RunError, WatchError},
    execution::{watch_project, ExecutionEngine, WatchScheduler},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

const EXIT_FAILURE: i32 = 1;
const EXIT_USAGE: i32 = 2;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    // Execute command
    let code = match &cli.command {
        Command::Run(cmd) => run_pipeline(&cli, cmd).await?,
        Command::Watch(cmd) => watch(&cli, cmd).await?,
        Command::List(cmd) => list(&cli, cmd)?,
        Command::Validate(cmd) => validate(&cli, cmd)?,
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

/// Load the build description; the project root is the file's directory
fn load(cli: &Cli) -> Result<(BuildConfig, PathBuf)> {
    let path = Path::new(&cli.file);
    let config = BuildConfig::from_file_with_overrides(path, &cli.overrides)
        .with_context(|| format!("Failed to load build description {}", path.display()))?;

    let root = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let root = root
        .canonicalize()
        .with_context(|| format!("Failed to resolve project root {}", root.display()))?;

    Ok((config, root))
}

fn engine_for(config: &BuildConfig, root: &Path, verbose: bool) -> Result<ExecutionEngine> {
    let registry = config.to_registry().context("Failed to build task registry")?;
    let mut engine = ExecutionEngine::new(Arc::new(registry), root);
    engine.add_event_handler(move |event| {
        if let Some(line) = format_execution_event(&event, verbose) {
            println!("{}", line);
        }
    });
    Ok(engine)
}

async fn run_pipeline(cli: &Cli, cmd: &RunCommand) -> Result<i32> {
    let (config, root) = load(cli)?;
    let engine = engine_for(&config, &root, cli.verbose)?;

    let name = cmd.pipeline.clone();
    let result = tokio::task::spawn_blocking(move || engine.run(&name))
        .await
        .context("Pipeline run panicked")?;

    if result.succeeded {
        let duration = result.run.duration().unwrap_or_default();
        println!(
            "\n{} {} completed {} in {}",
            CHECK,
            style(&cmd.pipeline).bold(),
            style("successfully").green(),
            format_duration(duration)
        );
        return Ok(0);
    }

    match &result.error {
        Some(RunError::Task(e)) => {
            println!("{} {}", CROSS, style(e).red());
            println!(
                "{} Available: {}",
                INFO,
                style(config.alias_names().join(", ")).dim()
            );
            Ok(EXIT_USAGE)
        }
        Some(e) => {
            println!(
                "\n{} {} {}: {}",
                CROSS,
                style(&cmd.pipeline).bold(),
                style("failed").red(),
                e
            );
            Ok(EXIT_FAILURE)
        }
        None => Ok(EXIT_FAILURE),
    }
}

async fn watch(cli: &Cli, cmd: &WatchCommand) -> Result<i32> {
    let (config, root) = load(cli)?;
    let engine = engine_for(&config, &root, cli.verbose)?;

    let baseline_name = cmd
        .baseline
        .clone()
        .unwrap_or_else(|| config.watch.baseline.clone());
    let baseline = match engine.registry().pipeline(&baseline_name) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            println!("{} Baseline: {}", CROSS, style(e).red());
            return Ok(EXIT_USAGE);
        }
    };

    let rules = config.watch_rules();
    if rules.is_empty() {
        println!("{} No watch rules declared", WARN);
    }

    let (change_tx, change_rx) = mpsc::unbounded_channel();
    let _watcher = watch_project(&root, change_tx).context("Failed to start file watcher")?;

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            println!("{}", format_watch_event(&event));
        }
    });

    let scheduler = WatchScheduler::new(Arc::new(engine), &root, rules, config.watch.debounce())
        .with_events(event_tx);

    let outcome = tokio::select! {
        outcome = scheduler.run(&baseline, change_rx) => outcome,
        _ = tokio::signal::ctrl_c() => {
            println!("\n{} Stopping watch", INFO);
            Ok(())
        }
    };
    printer.abort();

    match outcome {
        Ok(()) => Ok(0),
        Err(e @ WatchError::Baseline { .. }) => {
            println!("{} {}", CROSS, style(e).red());
            Ok(EXIT_FAILURE)
        }
        Err(e) => Err(e).context("Watch session failed"),
    }
}

fn list(cli: &Cli, cmd: &ListCommand) -> Result<i32> {
    let (config, _) = load(cli)?;
    let registry = config.to_registry().context("Failed to build task registry")?;

    if cmd.json {
        let tasks: Vec<_> = registry
            .definitions()
            .iter()
            .map(|d| {
                serde_json::json!({
                    "task": d.task,
                    "operations": d.operations.iter().map(|op| op.kind()).collect::<Vec<_>>(),
                })
            })
            .collect();
        let aliases: Vec<_> = config
            .aliases
            .iter()
            .map(|a| serde_json::json!({ "name": a.name, "tasks": a.tasks }))
            .collect();
        let rules: Vec<_> = config
            .watch_rules()
            .iter()
            .map(|r| {
                serde_json::json!({
                    "name": r.name,
                    "files": r.files,
                    "tasks": r.pipeline.tasks,
                    "livereload": r.livereload,
                    "exclusive": r.exclusive,
                })
            })
            .collect();
        let data = serde_json::json!({ "tasks": tasks, "aliases": aliases, "watch": rules });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(0);
    }

    println!("{} Tasks:", INFO);
    for definition in registry.definitions() {
        let kinds: Vec<String> = definition
            .operations
            .iter()
            .map(|op| op.kind().to_string())
            .collect();
        println!(
            "  {} {}",
            style(&definition.task).bold(),
            style(kinds.join(", ")).dim()
        );
    }

    println!("{} Aliases:", INFO);
    for alias in &config.aliases {
        let tasks: Vec<String> = alias.tasks.iter().map(|t| t.to_string()).collect();
        let tasks = if tasks.is_empty() {
            "(empty)".to_string()
        } else {
            tasks.join(" → ")
        };
        println!("  {} {}", style(&alias.name).cyan(), style(tasks).dim());
    }

    let rules = config.watch_rules();
    if !rules.is_empty() {
        println!("{} Watch rules:", INFO);
        for rule in rules {
            let tasks: Vec<String> = rule.pipeline.tasks.iter().map(|t| t.to_string()).collect();
            println!(
                "  {} {} → {}",
                style(&rule.name).yellow(),
                style(rule.files.0.join(", ")).dim(),
                tasks.join(", ")
            );
        }
    }

    Ok(0)
}

fn validate(cli: &Cli, cmd: &ValidateCommand) -> Result<i32> {
    println!("{} Validating {}...", INFO, style(&cli.file).bold());

    match BuildConfig::from_file_with_overrides(&cli.file, &cli.overrides) {
        Ok(config) => {
            println!("{} Build description is valid!", CHECK);
            if let Some(name) = &config.name {
                println!("  Name: {}", style(name).bold());
            }
            println!("  Tasks: {}", style(config.tasks.len()).cyan());
            println!("  Aliases: {}", style(config.aliases.len()).cyan());
            println!("  Watch rules: {}", style(config.watch.rules.len()).cyan());

            if cmd.json {
                let json = serde_json::to_string_pretty(&config.tree)?;
                println!("\n{}", json);
            }
            Ok(0)
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(e).red());
            Ok(EXIT_FAILURE)
        }
    }
}
