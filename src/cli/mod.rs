//! Command-line interface definitions for the `pbmachine` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Args, Parser, Subcommand};

/// Top-level CLI for the `pbmachine` binary.
#[derive(Debug, Parser)]
#[command(
    name = "pbmachine",
    about = "Provision and manage Docker hosts on ProfitBricks",
    arg_required_else_help = true
)]
pub(crate) struct Cli {
    /// Directory holding machine records and SSH keys.
    ///
    /// Defaults to `$HOME/.pbmachine`.
    #[arg(long, global = true, value_name = "DIR", env = "PBMACHINE_STORE_DIR")]
    pub(crate) store_dir: Option<String>,
    /// Operation to run.
    #[command(subcommand)]
    pub(crate) command: Command,
}

/// Subcommands of `pbmachine`.
#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Provision a new machine and record it.
    #[command(name = "create", about = "Provision a new machine and record it")]
    Create(CreateCommand),
    /// Validate credentials, datacenter, and image without creating anything.
    #[command(
        name = "check",
        about = "Validate credentials, datacenter, and image without creating anything"
    )]
    Check(SpecOverrides),
    /// Power a machine on.
    #[command(name = "start", about = "Power a machine on")]
    Start(MachineArg),
    /// Power a machine off.
    #[command(name = "stop", about = "Power a machine off")]
    Stop(MachineArg),
    /// Reboot a machine.
    #[command(name = "restart", about = "Reboot a machine")]
    Restart(MachineArg),
    /// Force a machine off.
    #[command(name = "kill", about = "Force a machine off")]
    Kill(MachineArg),
    /// Delete a machine's provider resources and its record.
    #[command(name = "remove", about = "Delete a machine's provider resources and its record")]
    Remove(MachineArg),
    /// Print a machine's public IP address.
    #[command(name = "ip", about = "Print a machine's public IP address")]
    Ip(MachineArg),
    /// Print a machine's state.
    #[command(name = "state", about = "Print a machine's state")]
    State(MachineArg),
    /// Print a machine's Docker URL.
    #[command(name = "url", about = "Print a machine's Docker URL")]
    Url(MachineArg),
}

/// Names an existing machine.
#[derive(Debug, Args)]
pub(crate) struct MachineArg {
    /// Machine name as given at creation.
    pub(crate) name: String,
}

/// Arguments for `pbmachine create`.
#[derive(Debug, Args)]
pub(crate) struct CreateCommand {
    /// Machine name. A random name is generated when omitted.
    pub(crate) name: Option<String>,
    /// Per-run overrides of configured creation parameters.
    #[command(flatten)]
    pub(crate) overrides: SpecOverrides,
}

/// Per-run overrides layered over the loaded configuration.
#[derive(Debug, Default, Args)]
pub(crate) struct SpecOverrides {
    /// Region code, for example `us/las` or `de/fra`.
    #[arg(long, value_name = "LOCATION")]
    pub(crate) location: Option<String>,
    /// Image alias or catalog name fragment.
    #[arg(long, value_name = "IMAGE")]
    pub(crate) image: Option<String>,
    /// Boot volume storage class, `HDD` or `SSD`.
    #[arg(long, value_name = "TYPE")]
    pub(crate) disk_type: Option<String>,
    /// Boot volume size in gigabytes.
    #[arg(long, value_name = "GB")]
    pub(crate) disk_size: Option<u32>,
    /// Memory in megabytes.
    #[arg(long, value_name = "MB")]
    pub(crate) ram: Option<u32>,
    /// Number of cores.
    #[arg(long, value_name = "COUNT")]
    pub(crate) cores: Option<u32>,
    /// CPU family, `AMD_OPTERON` or `INTEL_XEON`.
    #[arg(long, value_name = "FAMILY")]
    pub(crate) cpu_family: Option<String>,
    /// Existing datacenter to create the machine in.
    #[arg(long, value_name = "ID")]
    pub(crate) datacenter_id: Option<String>,
    /// Server creation strategy, `composite` or `stepwise`.
    #[arg(long, value_name = "STRATEGY")]
    pub(crate) server_strategy: Option<String>,
}
