//! CLI command definitions

use clap::Args;

/// Run a pipeline, alias or single task
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Alias, task or `task:target` to run
    #[arg(default_value = "default")]
    pub pipeline: String,
}

/// Run the baseline build, then rebuild on file changes
#[derive(Debug, Args, Clone)]
pub struct WatchCommand {
    /// Pipeline to run before watching (overrides `watch.baseline`)
    #[arg(long)]
    pub baseline: Option<String>,
}

/// List tasks, aliases and watch rules
#[derive(Debug, Args, Clone)]
pub struct ListCommand {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Validate a build description
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Print the resolved configuration tree as JSON
    #[arg(long)]
    pub json: bool,
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let parts: Vec<&str> = s.splitn(2, '=').collect();
    if parts.len() != 2 || parts[0].is_empty() {
        return Err(format!("Invalid key=value pair: {}", s));
    }
    Ok((parts[0].to_string(), parts[1].to_string()))
}
