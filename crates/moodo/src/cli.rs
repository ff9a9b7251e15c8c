//! Clap derive structures for the `moodo` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// moodo -- control Moodo scent-diffusion boxes from the command line
#[derive(Debug, Parser)]
#[command(
    name = "moodo",
    version,
    about = "Control Moodo scent-diffusion boxes from the command line",
    long_about = "Inspect and control Moodo boxes through the Moodo cloud API.\n\n\
        Writes go through the same reconciliation core as the long-running\n\
        bridge: unchanged values are never sent, and capsule changes are\n\
        merged with the box's current state.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Path to the config file (defaults to the platform config dir)
    #[arg(long, env = "MOODO_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Moodo account token (overrides config and keyring)
    #[arg(long, env = "MOODO_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Output format
    #[arg(long, short = 'o', default_value = "table", global = true)]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PowerState {
    On,
    Off,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Inspect configured boxes
    #[command(alias = "box", alias = "b")]
    Boxes(BoxesArgs),

    /// Turn a box on or off
    Power {
        /// Device key
        key: u64,
        state: PowerState,
    },

    /// Set a box's fan intensity (0 turns it off)
    Intensity {
        /// Device key
        key: u64,
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        value: u8,
    },

    /// Change one capsule slot
    Slot(SlotArgs),

    /// Follow live state changes until interrupted
    Watch(WatchArgs),

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Boxes ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct BoxesArgs {
    #[command(subcommand)]
    pub command: BoxesCommand,
}

#[derive(Debug, Subcommand)]
pub enum BoxesCommand {
    /// List configured boxes
    #[command(alias = "ls")]
    List,

    /// Show one box in detail
    Get {
        /// Device key
        key: u64,
    },

    /// Show the accessory view of a box
    Accessory {
        /// Device key
        key: u64,
    },
}

// ── Slot ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
#[command(group(ArgGroup::new("change").required(true).args(["active", "speed"])))]
pub struct SlotArgs {
    /// Device key
    pub key: u64,

    /// Capsule slot (1-4)
    #[arg(value_parser = clap::value_parser!(u8).range(1..=4))]
    pub slot: u8,

    /// Turn the capsule on or off
    #[arg(long)]
    pub active: Option<PowerState>,

    /// Capsule fan speed (0 turns the capsule off)
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub speed: Option<u8>,
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Only poll the initial snapshot; skip the push channel
    #[arg(long)]
    pub no_push: bool,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Interactive setup wizard
    Init,

    /// Show the effective configuration (token redacted)
    Show,

    /// Print the config file path
    Path,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Target shell
    pub shell: clap_complete::Shell,
}
