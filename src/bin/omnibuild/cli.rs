//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

/// omnibuild - Build software components from recipes, in dependency order
#[derive(Parser)]
#[command(name = "omnibuild")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build components and everything they depend on
    Build(BuildArgs),

    /// Show the build order without building anything
    Plan(PlanArgs),

    /// Forget recorded builds
    Clean(CleanArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Options shared by commands that load recipes.
#[derive(Args, Clone)]
pub struct RecipeArgs {
    /// Directory containing recipe files
    #[arg(long)]
    pub recipes_dir: Option<PathBuf>,

    /// Target operating system (defaults to the host)
    #[arg(long)]
    pub os: Option<String>,

    /// Target architecture (defaults to the host)
    #[arg(long)]
    pub arch: Option<String>,

    /// Target platform family, e.g. debian or rhel
    #[arg(long)]
    pub family: Option<String>,

    /// Python runtime available on the target (repeatable)
    #[arg(long = "python-runtime", value_name = "VERSION")]
    pub python_runtimes: Vec<String>,

    /// Override a component's version (repeatable)
    #[arg(long = "version-override", value_name = "NAME=VERSION", value_parser = parse_key_value)]
    pub overrides: Vec<(String, String)>,

    /// Directory components install into
    #[arg(long)]
    pub install_dir: Option<PathBuf>,

    /// Cache directory for downloads and build records
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Args)]
pub struct BuildArgs {
    /// Components to build
    #[arg(required = true)]
    pub targets: Vec<String>,

    #[command(flatten)]
    pub recipes: RecipeArgs,

    /// Directory sources are unpacked into
    #[arg(long)]
    pub source_dir: Option<PathBuf>,

    /// Number of parallel jobs passed to make
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Environment variable passed to every step (repeatable)
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub env: Vec<(String, String)>,

    /// Output format for build events
    #[arg(long, value_enum, default_value_t = MessageFormat::Human)]
    pub message_format: MessageFormat,
}

#[derive(Args)]
pub struct PlanArgs {
    /// Component to plan (omit with --list)
    #[arg(required_unless_present = "list")]
    pub target: Option<String>,

    #[command(flatten)]
    pub recipes: RecipeArgs,

    /// List every known component
    #[arg(long)]
    pub list: bool,

    /// Print the dependency graph in Graphviz dot format
    #[arg(long, conflicts_with = "list")]
    pub dot: bool,

    /// Print the plan as JSON
    #[arg(long, conflicts_with_all = ["list", "dot"])]
    pub json: bool,
}

#[derive(Args)]
pub struct CleanArgs {
    /// Cache directory to clean
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Also remove downloaded sources
    #[arg(long)]
    pub downloads: bool,

    /// Also remove unpacked sources
    #[arg(long)]
    pub sources: bool,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum MessageFormat {
    Human,
    Json,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got `{}`", s)),
    }
}
