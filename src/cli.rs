use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stackwright")]
#[command(version)]
#[command(about = "Declarative resource stacks with a per-resource lifecycle", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Directory holding resource records
    #[arg(long, global = true, env = "STACKWRIGHT_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Engine settings file (default: <config dir>/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the number of retries for failed create/update actions
    #[arg(long, global = true)]
    pub retry_limit: Option<u32>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Validate a template against the registered resource types
    Validate {
        /// Template file (TOML or JSON)
        template: PathBuf,
    },

    /// Show the dependency order of a template
    Deps {
        /// Template file (TOML or JSON)
        template: PathBuf,
    },

    /// Create or update a stack to match a template
    Apply(ApplyArgs),

    /// Delete every resource of a stack
    Destroy {
        /// Template file (TOML or JSON)
        template: PathBuf,

        /// Don't ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Show stored resources and their state
    Status {
        /// Only this stack
        stack: Option<String>,
    },

    /// Suspend a resource
    Suspend(ResourceArgs),

    /// Resume a suspended resource
    Resume(ResourceArgs),

    /// Verify a resource against the provider
    Check(ResourceArgs),

    /// Send a signal to a resource
    Signal(SignalArgs),

    /// Export a resource's data so it can be adopted elsewhere
    Abandon(ResourceArgs),

    /// Adopt an existing provider object into a stack
    Adopt(AdoptArgs),

    /// Show what a physical name shortens to
    Shorten {
        /// Physical resource name
        name: String,

        /// Maximum length
        #[arg(short, long, default_value = "32")]
        limit: usize,
    },

    /// List the registered resource types
    Types,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, clap::Args)]
pub struct ApplyArgs {
    /// Template file (TOML or JSON)
    pub template: PathBuf,

    /// Show what would change without touching anything
    #[arg(long)]
    pub dry_run: bool,

    /// Don't ask for confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Override a template parameter (key=value), repeatable
    #[arg(short, long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,
}

#[derive(Debug, clap::Args)]
pub struct ResourceArgs {
    /// Stack name
    pub stack: String,

    /// Resource name
    pub name: String,
}

#[derive(Debug, clap::Args)]
pub struct SignalArgs {
    /// Stack name
    pub stack: String,

    /// Resource name
    pub name: String,

    /// Clear a hook the resource is paused on (pre-create, pre-update)
    #[arg(long, conflicts_with = "data")]
    pub unset_hook: Option<String>,

    /// JSON payload
    #[arg(long)]
    pub data: Option<String>,
}

#[derive(Debug, clap::Args)]
pub struct AdoptArgs {
    /// Template file (TOML or JSON)
    pub template: PathBuf,

    /// Resource name in the template
    pub name: String,

    /// Abandon data (JSON) as printed by `abandon`
    #[arg(long, value_name = "FILE")]
    pub data: PathBuf,
}
