//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "pump", version, about = "Reciprocating actuator controller")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/pump_config.toml")]
    pub config: PathBuf,

    /// Emit status, results and errors as JSON lines
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Memory locking mode for real-time operation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum RtLock {
    /// Do not lock memory
    None,
    /// Lock currently resident pages
    Current,
    /// Lock current and future pages
    All,
}

impl RtLock {
    #[inline]
    pub fn os_default() -> Self {
        #[cfg(target_os = "linux")]
        {
            return RtLock::Current;
        }
        #[allow(unreachable_code)]
        RtLock::None
    }
}

/// Options for `pump run`.
#[derive(clap::Args, Debug, Clone)]
pub struct RunArgs {
    /// Drive the simulated rig instead of GPIO
    #[arg(long, action = ArgAction::SetTrue)]
    pub sim: bool,

    /// Operator script for the simulated rig (one event per line)
    #[arg(long, value_name = "FILE", requires = "sim")]
    pub script: Option<PathBuf>,

    /// Run the simulation on a virtual clock (as fast as possible)
    #[arg(long, action = ArgAction::SetTrue, requires_all = ["sim", "duration_ms"])]
    pub virtual_time: bool,

    /// Stop after this many milliseconds instead of waiting for Ctrl-C
    #[arg(long, value_name = "MS")]
    pub duration_ms: Option<u64>,

    /// Write the final stroke history to this CSV file
    #[arg(long, value_name = "FILE")]
    pub stroke_log: Option<PathBuf>,

    /// Enable real-time mode (SCHED_FIFO, affinity, mlockall)
    #[arg(
        long,
        action = ArgAction::SetTrue,
        long_help = "Enable real-time mode (Linux only).\n\nAttempts SCHED_FIFO priority, pins to one CPU, and calls mlockall to keep the control loop out of page faults. May require CAP_SYS_NICE / CAP_IPC_LOCK or root."
    )]
    pub rt: bool,

    /// Real-time priority for SCHED_FIFO (1..=max)
    #[arg(long, value_name = "PRIO")]
    pub rt_prio: Option<i32>,

    /// Memory locking mode for --rt: none, current, or all
    #[arg(long, value_enum, value_name = "MODE")]
    pub rt_lock: Option<RtLock>,

    /// CPU index to pin the process to when --rt is enabled (default 0)
    #[arg(long, value_name = "CPU")]
    pub rt_cpu: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the control loop until Ctrl-C (or --duration-ms)
    Run(RunArgs),
    /// Validate the config and open the I/O backend without moving anything
    SelfCheck {
        /// Check the simulated backend instead of GPIO
        #[arg(long, action = ArgAction::SetTrue)]
        sim: bool,
    },
    /// Show or edit the persisted operator settings
    Settings {
        #[command(subcommand)]
        cmd: SettingsCmd,
    },
}

#[derive(Subcommand, Debug)]
pub enum SettingsCmd {
    /// Print the effective timeout settings
    Show,
    /// Validate and persist new timeout settings
    Set {
        /// Cycle timeout in milliseconds (1000..=300000)
        #[arg(long, value_name = "MS")]
        timeout_ms: Option<u64>,
        /// Whether the cycle timeout is enforced
        #[arg(long, value_name = "BOOL", action = ArgAction::Set)]
        timeout_enabled: Option<bool>,
    },
}
