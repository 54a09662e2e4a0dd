//! Command-line argument parsing

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

use crate::constants::DISPLAY_NAME;
use crate::optimizer::OptimizeConditions;

/// Parsed command-line arguments
#[derive(Debug, Parser)]
#[command(
    version,
    about = DISPLAY_NAME,
    long_about = "
Lowers the priority of everything that is not a game or a whitelisted
process, optionally boosts whitelisted processes and moves games onto
their own CPU cores. Every change is recorded so it can be restored.

Whitelisted processes and games are listed in process_whitelist.txt:
  <Whitelisted>   following names are left alone (the default section)
  <Games>         following names are games (implicitly whitelisted)
  #               starts a comment
"
)]
pub struct Args {
    /// Directory holding the whitelist, config and restore files
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Skip the delay before optimizing
    #[arg(long, global = true)]
    pub no_delay: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Optimize running processes for gaming
    Optimize(OptimizeArgs),

    /// Undo the changes of the last optimize pass
    Restore {
        /// Ignore the restore records and reset every process to Normal
        /// priority on all cores
        #[arg(long)]
        force: bool,
    },

    /// Show whether the system is currently optimized
    Status,

    /// Toggle per-process error messages
    ToggleErrors,

    /// Write the default whitelist and config files
    Init,
}

#[derive(Debug, Default, ClapArgs)]
pub struct OptimizeArgs {
    /// Kill explorer.exe until the next restore
    #[arg(short = 'k', long)]
    pub kill_explorer: bool,

    /// Keep the console window visible
    #[arg(long)]
    pub no_hide: bool,

    /// Raise whitelisted processes to Above Normal
    #[arg(short = 'b', long)]
    pub boost: bool,

    /// Leave non-whitelisted processes at their priority
    #[arg(short = 'i', long)]
    pub ignore_ordinary: bool,

    /// Move games onto the priority cores and everything else off them
    #[arg(short = 'a', long)]
    pub affinity: bool,

    /// Pin streaming software to the configured cores
    #[arg(short = 's', long)]
    pub streamer: bool,

    /// Switches in the classic form, e.g. "-k -b --optimizeaffinity"
    #[arg(long, value_name = "SWITCHES", allow_hyphen_values = true)]
    pub flags: Option<String>,
}

impl OptimizeArgs {
    /// Flags from the switches, combined with any classic `--flags` string.
    pub fn conditions(&self) -> OptimizeConditions {
        let classic = self
            .flags
            .as_deref()
            .map(OptimizeConditions::parse_flags)
            .unwrap_or_default();

        [
            (self.kill_explorer, OptimizeConditions::KILL_EXPLORER_EXE),
            (self.no_hide, OptimizeConditions::NO_HIDE),
            (self.boost, OptimizeConditions::BOOST_PRIORITIES),
            (self.ignore_ordinary, OptimizeConditions::IGNORE_ORDINARY_PROCESSES),
            (self.affinity, OptimizeConditions::OPTIMIZE_AFFINITY),
            (self.streamer, OptimizeConditions::STREAMER_MODE),
        ]
        .into_iter()
        .filter(|(enabled, _)| *enabled)
        .fold(classic, |flags, (_, flag)| flags | flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_optimize_switches() {
        let args = Args::try_parse_from(["game_optimizer_cli", "optimize", "-b", "--affinity"]).unwrap();
        let Command::Optimize(optimize) = args.command else {
            panic!("expected optimize");
        };
        assert_eq!(
            optimize.conditions(),
            OptimizeConditions::BOOST_PRIORITIES | OptimizeConditions::OPTIMIZE_AFFINITY
        );
    }

    #[test]
    fn test_classic_flag_string() {
        let args = Args::try_parse_from([
            "game_optimizer_cli",
            "optimize",
            "--flags",
            "-k --streamermode",
            "-i",
        ])
        .unwrap();
        let Command::Optimize(optimize) = args.command else {
            panic!("expected optimize");
        };
        assert_eq!(
            optimize.conditions(),
            OptimizeConditions::KILL_EXPLORER_EXE
                | OptimizeConditions::STREAMER_MODE
                | OptimizeConditions::IGNORE_ORDINARY_PROCESSES
        );
    }

    #[test]
    fn test_global_options_after_subcommand() {
        let args =
            Args::try_parse_from(["game_optimizer_cli", "restore", "--force", "--no-delay"]).unwrap();
        assert!(args.no_delay);
        assert!(matches!(args.command, Command::Restore { force: true }));
    }
}
