//! Clap derive structures for the `shelly` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use std::net::Ipv4Addr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use shelly_core::{DeviceGeneration, PropertyKey};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// shelly -- discover and control Shelly devices on the local network
#[derive(Debug, Parser)]
#[command(
    name = "shelly",
    version,
    about = "Discover and control Shelly devices on the local network",
    long_about = "Talks to Shelly Gen1 and Gen2 devices directly: mDNS discovery,\n\
        HTTP and WebSocket status reads, CoAP status pushes, and writes for\n\
        switches, covers and lights. No cloud account involved.",
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
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "SHELLY_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "SHELLY_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Request timeout in seconds (overrides the config file)
    #[arg(long, env = "SHELLY_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON (one object per line when streaming)
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Find devices on the local network via mDNS
    #[command(alias = "scan")]
    Discover(DiscoverArgs),

    /// Show a device's identity and channels
    Info(DeviceArgs),

    /// Read a device's current status
    #[command(alias = "st")]
    Status(DeviceArgs),

    /// Write a property, e.g. `shelly set plug switch_0_on true`
    Set(SetArgs),

    /// Poll the configured devices and stream their messages
    Run(RunArgs),

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Shared Device Target ─────────────────────────────────────────────

/// A device named by its configured identifier, or an address.
#[derive(Debug, Args)]
pub struct TargetArgs {
    /// Configured device identifier, IP address (optionally with port) or host name
    pub device: String,

    /// Device generation when the target is not in the config file
    #[arg(long = "gen", value_parser = parse_generation)]
    pub generation: Option<DeviceGeneration>,
}

fn parse_generation(raw: &str) -> Result<DeviceGeneration, String> {
    match raw {
        "1" => Ok(DeviceGeneration::Gen1),
        "2" => Ok(DeviceGeneration::Gen2),
        other => other
            .parse()
            .map_err(|_| format!("expected gen1, gen2, 1 or 2, got '{other}'")),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  DISCOVER
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct DiscoverArgs {
    /// Time limit for the whole run in seconds (overrides the config file)
    #[arg(long, short = 't')]
    pub wait: Option<u64>,

    /// Local interface address for the multicast socket
    #[arg(long)]
    pub interface: Option<Ipv4Addr>,

    /// Append newly found devices to the config file
    #[arg(long)]
    pub save: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  INFO / STATUS / SET
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct DeviceArgs {
    #[command(flatten)]
    pub target: TargetArgs,
}

#[derive(Debug, Args)]
pub struct SetArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Property identifier, e.g. `switch_0_on` or `cover_1_position`
    pub property: PropertyKey,

    /// New value (`on`/`off`/`true`/`false`, a number, or a cover state)
    pub value: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  RUN
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Do not listen for Gen1 CoAP status pushes
    #[arg(long)]
    pub no_coap: bool,

    /// Only manage these device identifiers (default: all configured)
    #[arg(long = "device", short = 'd')]
    pub devices: Vec<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Write a config file with default settings
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Display current resolved configuration
    Show,

    /// Print the config file path
    Path,

    /// Store a device password in the system keyring
    SetPassword {
        /// Device identifier (default: the password shared by all devices)
        #[arg(long)]
        device: Option<String>,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
