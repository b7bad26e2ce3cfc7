use std::path::PathBuf;

use clap::Parser;

/// Default timeout for a single sampling task, milliseconds. `0` disables
/// per-task timeouts entirely.
const DEFAULT_TIMEOUT_MS: u64 = 1000;
const DEFAULT_MAX_THREADS: usize = 5;
const DEFAULT_MAX_TASKS: usize = DEFAULT_MAX_THREADS * 200;

/// Command-line surface, mirroring the original's GOption flag table
/// one-for-one (`vmon --help` reads the same as the original tool's).
#[derive(Debug, Clone, Parser)]
#[command(name = "vmon", version, about = "Virtual machine stats sampling speedup daemon")]
pub struct Cli {
    /// Per-task timeout, milliseconds. 0 disables timeout.
    #[arg(short = 'T', long, default_value_t = DEFAULT_TIMEOUT_MS)]
    pub timeout: u64,

    /// Maximum number of tasks that may be queued at once.
    #[arg(short = 't', long = "max-tasks", default_value_t = DEFAULT_MAX_TASKS)]
    pub max_tasks: usize,

    /// Maximum worker threads.
    #[arg(short = 'c', long = "max-threads", default_value_t = DEFAULT_MAX_THREADS)]
    pub max_threads: usize,

    /// Autonomously poll libvirt every N seconds instead of reading stdin.
    #[arg(short = 'p', long = "polling-period", default_value_t = 0)]
    pub polling_period: u64,

    /// Logging verbosity, 0 (quiet) through 5 (trace).
    #[arg(
        short = 'd',
        long = "log-level",
        default_value_t = 0,
        value_parser = clap::value_parser!(u8).range(0..=5)
    )]
    pub log_level: u8,

    /// Send log output to this file instead of stderr.
    #[arg(short = 'l', long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Use a single bulk hypervisor call instead of one call per domain.
    #[arg(short = 'B', long = "bulk-sampling", default_value_t = false)]
    pub bulk_sampling: bool,

    /// Emit events once a domain's disk usage exceeds this percentage.
    /// Accepted for CLI-surface parity; no notification transport exists.
    #[arg(
        short = 'U',
        long = "disk-usage-monitor",
        value_parser = clap::value_parser!(u8).range(0..=99)
    )]
    pub disk_usage_monitor: Option<u8>,

    /// Only emit events, not full sampling records. CLI-surface parity only.
    #[arg(short = 'E', long = "events-only", default_value_t = false)]
    pub events_only: bool,
}

impl Cli {
    /// Additional validation clap's declarative parser can't express
    /// (cross-field constraints), mirroring `config_parse_cmdline`'s checks.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_threads == 0 {
            return Err("--max-threads cannot be zero".to_string());
        }
        if self.max_tasks == 0 {
            return Err("--max-tasks cannot be zero".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_original_tool() {
        let cli = Cli::parse_from(["vmon"]);
        assert_eq!(cli.timeout, 1000);
        assert_eq!(cli.max_threads, 5);
        assert_eq!(cli.max_tasks, 1000);
        assert_eq!(cli.polling_period, 0);
        assert!(!cli.bulk_sampling);
        cli.validate().unwrap();
    }

    #[test]
    fn disk_usage_monitor_out_of_range_is_rejected() {
        assert!(Cli::try_parse_from(["vmon", "--disk-usage-monitor", "100"]).is_err());
        assert!(Cli::try_parse_from(["vmon", "--disk-usage-monitor", "99"]).is_ok());
    }

    #[test]
    fn zero_max_threads_fails_validation() {
        let cli = Cli::parse_from(["vmon", "--max-threads", "0"]);
        assert!(cli.validate().is_err());
    }

    #[test]
    fn zero_max_tasks_fails_validation() {
        let cli = Cli::parse_from(["vmon", "--max-tasks", "0"]);
        assert!(cli.validate().is_err());
    }
}
