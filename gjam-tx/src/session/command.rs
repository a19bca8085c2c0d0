//! Console command parsing
//!
//! Each console line is parsed as a clap command line without a binary name,
//! so arguments share the value parsers used by the process arguments.

use crate::config::{GnssBand, JammerType, TxGain};
use crate::error::{Error, Result};
use clap::builder::BoolishValueParser;
use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use std::str::FromStr;

/// One line typed at the console
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Start transmitting the selected waveform
    Start,
    /// Stop transmitting
    Stop,
    /// Start when stopped, stop otherwise
    #[command(alias = "t")]
    Toggle,
    /// Set TX gain in dB (0-47)
    Gain { gain: TxGain },
    /// Select the GNSS band (L1, L2, L5)
    Band { band: GnssBand },
    /// Select the jammer type (LWF, LN, TRI, TW, TICK)
    Jammer { jammer: JammerType },
    /// Loop the waveform at end of file (on/off)
    Loop {
        #[arg(action = ArgAction::Set, value_parser = BoolishValueParser::new())]
        enabled: bool,
    },
    /// Show session status
    #[command(alias = "s")]
    Status,
    /// Show this help
    #[command(alias = "?")]
    Help,
    /// Stop and exit
    #[command(aliases = ["exit", "q"])]
    Quit,
}

#[derive(Parser, Debug)]
#[command(
    name = "console",
    no_binary_name = true,
    disable_help_flag = true,
    disable_help_subcommand = true,
    disable_version_flag = true,
    help_template = "commands:\n{subcommands}"
)]
struct ConsoleLine {
    #[command(subcommand)]
    command: ConsoleCommand,
}

impl ConsoleCommand {
    /// Command summary for the console
    pub fn usage() -> String {
        ConsoleLine::command().render_help().to_string()
    }
}

impl FromStr for ConsoleCommand {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self> {
        ConsoleLine::try_parse_from(line.split_whitespace())
            .map(|parsed| parsed.command)
            .map_err(|e| {
                let rendered = e.to_string();
                let first = rendered.lines().next().unwrap_or_default();
                Error::InvalidInput(first.trim_start_matches("error: ").to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!("start".parse::<ConsoleCommand>().unwrap(), ConsoleCommand::Start);
        assert_eq!("  stop ".parse::<ConsoleCommand>().unwrap(), ConsoleCommand::Stop);
        assert_eq!("t".parse::<ConsoleCommand>().unwrap(), ConsoleCommand::Toggle);
        assert_eq!("?".parse::<ConsoleCommand>().unwrap(), ConsoleCommand::Help);
        assert_eq!("exit".parse::<ConsoleCommand>().unwrap(), ConsoleCommand::Quit);
    }

    #[test]
    fn test_parse_arguments() {
        assert_eq!(
            "gain 30".parse::<ConsoleCommand>().unwrap(),
            ConsoleCommand::Gain {
                gain: TxGain::new(30).unwrap()
            }
        );
        assert_eq!(
            "band l5".parse::<ConsoleCommand>().unwrap(),
            ConsoleCommand::Band { band: GnssBand::L5 }
        );
        assert_eq!(
            "jammer TRI".parse::<ConsoleCommand>().unwrap(),
            ConsoleCommand::Jammer {
                jammer: JammerType::Triangular
            }
        );
        assert_eq!(
            "loop off".parse::<ConsoleCommand>().unwrap(),
            ConsoleCommand::Loop { enabled: false }
        );
        assert_eq!(
            "loop 1".parse::<ConsoleCommand>().unwrap(),
            ConsoleCommand::Loop { enabled: true }
        );
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        for line in [
            "",
            "gain",
            "gain 48",
            "gain loud",
            "band L3",
            "loop maybe",
            "start now",
            "gain 1 2",
            "launch",
            "--help",
        ] {
            let result = line.parse::<ConsoleCommand>();
            assert!(
                matches!(result, Err(Error::InvalidInput(_))),
                "{:?} parsed as {:?}",
                line,
                result
            );
        }
    }

    #[test]
    fn test_usage_lists_commands() {
        let usage = ConsoleCommand::usage();
        for name in ["start", "stop", "toggle", "gain", "band", "jammer", "loop", "status", "quit"] {
            assert!(usage.contains(name), "{} missing from usage", name);
        }
    }
}
