//! Clap derive structures for the `hausync` CLI.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// hausync -- watch and drive a home-automation controller
#[derive(Debug, Parser)]
#[command(
    name = "hausync",
    version,
    about = "Watch and control home-automation controllers from the command line",
    long_about = "Lists rooms and controls from the controller's structure document,\n\
        reads and sends commands over HTTP, and streams live state changes\n\
        over the realtime socket.",
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
    /// Controller profile to use
    #[arg(long, short = 'p', env = "HAUSYNC_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Local (home network) address (overrides profile)
    #[arg(long, env = "HAUSYNC_LOCAL", global = true)]
    pub local: Option<String>,

    /// Remote address (overrides profile)
    #[arg(long, env = "HAUSYNC_REMOTE", global = true)]
    pub remote: Option<String>,

    /// Which address to use
    #[arg(long, short = 'm', global = true)]
    pub mode: Option<ModeArg>,

    /// Username (overrides profile)
    #[arg(long, short = 'u', env = "HAUSYNC_USERNAME", global = true)]
    pub username: Option<String>,

    /// Password (prefer the keyring: `hausync config set-password`)
    #[arg(long, env = "HAUSYNC_PASSWORD", global = true, hide_env_values = true)]
    pub password: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "HAUSYNC_OUTPUT",
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

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "HAUSYNC_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "HAUSYNC_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output, Color & Mode Enums ───────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
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

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
    /// Home network address only
    Local,
    /// Remote address only
    Remote,
    /// Local when reachable, else remote
    Automatic,
}

impl ModeArg {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
            Self::Automatic => "automatic",
        }
    }
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List rooms
    #[command(alias = "r")]
    Rooms,

    /// List controls
    #[command(alias = "c", alias = "ls")]
    Controls(ControlsArgs),

    /// Read the current value of a control's states, or of one state
    #[command(alias = "get")]
    State(StateArgs),

    /// Send a command to a control
    Send(SendArgs),

    /// Stream live state changes until interrupted
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Per-command arguments ────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ControlsArgs {
    /// Only controls in this room (id or name)
    #[arg(long, short = 'r')]
    pub room: Option<String>,

    /// Only favorites
    #[arg(long, short = 'f')]
    pub favorites: bool,
}

#[derive(Debug, Args)]
pub struct StateArgs {
    /// Control id or state id
    pub id: String,
}

#[derive(Debug, Args)]
pub struct SendArgs {
    /// Control id
    pub control: String,

    /// on, off, toggle, pulse, up, down, fullup, fulldown, stop, or a level 0-100
    #[arg(allow_hyphen_values = true)]
    pub command: String,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Poll this room (id or name) in addition to realtime updates
    #[arg(long, short = 'r')]
    pub room: Option<String>,

    /// Exit after this many updates
    #[arg(long, short = 'n')]
    pub count: Option<usize>,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration (passwords redacted)
    Show,

    /// Print the config file path
    Path,

    /// Store a profile's password in the system keyring
    SetPassword {
        /// Write the password into the config file instead
        #[arg(long)]
        plaintext: bool,
    },
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Target shell
    pub shell: clap_complete::Shell,
}
