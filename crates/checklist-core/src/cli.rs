use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "checklist",
    version,
    about = "Checklist: categorized tasks with deadlines and reminders",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "checklistrc", global = true)]
    pub checklistrc: Option<PathBuf>,

    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    /// Active view: All, or a category name.
    #[arg(short = 'c', long = "view", global = true)]
    pub view: Option<String>,

    /// Skip delete confirmations.
    #[arg(short = 'y', long = "yes", global = true)]
    pub yes: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Show tasks in the active view.
    List,
    /// Add a task to the active category.
    Add(AddArgs),
    /// Edit an existing task.
    Edit(EditArgs),
    /// Flip a task between done and not done.
    Toggle { task: String },
    /// Delete one task.
    Delete { task: String },
    /// Delete several tasks at once.
    BulkDelete(BulkDeleteArgs),
    /// Run the reminder check once and exit.
    Tick,
    /// Follow the store and run the reminder check until interrupted.
    Watch,
    /// List the available categories.
    Categories,
    /// Print the effective configuration.
    Show,
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    pub name: String,

    #[arg(short = 'd', long)]
    pub description: Option<String>,

    /// YYYY-MM-DD, today, tomorrow or +Nd.
    #[arg(long)]
    pub deadline: Option<String>,

    /// YYYY-MM-DDTHH:MM, repeatable.
    #[arg(short = 'r', long = "reminder", action = ArgAction::Append)]
    pub reminders: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    pub task: String,

    #[arg(long)]
    pub name: Option<String>,

    #[arg(short = 'd', long)]
    pub description: Option<String>,

    #[arg(long)]
    pub deadline: Option<String>,

    #[arg(short = 'r', long = "reminder", action = ArgAction::Append)]
    pub add_reminders: Vec<String>,

    #[arg(long = "drop-reminder", action = ArgAction::Append)]
    pub drop_reminders: Vec<String>,

    #[arg(long = "clear-reminders")]
    pub clear_reminders: bool,
}

#[derive(Args, Debug, Clone)]
pub struct BulkDeleteArgs {
    /// Task ids or id prefixes.
    pub tasks: Vec<String>,

    /// Select every task in the active view.
    #[arg(long, conflicts_with = "tasks")]
    pub all: bool,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls positional `rc.key=value` / `rc.key:value` overrides out of argv.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = if let Some((k, v)) = rest.split_once('=') {
                Some((format!("rc.{k}"), v.to_string()))
            } else if let Some((k, v)) = rest.split_once(':') {
                Some((format!("rc.{k}"), v.to_string()))
            } else {
                None
            };

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}
