//! Debug console commands.
//!
//! The serial/stdin transport is the host's business. This module only parses
//! a line into a [`Command`]; [`ControlLoop::apply`] executes it between ticks.
//!
//! | Input | Command |
//! |-------|---------|
//! | `d`, `debug` | toggle telemetry emission |
//! | `r`, `reset` | zero the sample counter |
//! | `h`, `help`, `?` | list commands |
//!
//! [`ControlLoop::apply`]: crate::driver::ControlLoop::apply

use core::fmt;

use crate::error::CommandError;

/// Text returned by [`Command::Help`].
pub const HELP_TEXT: &str = "commands: d = toggle telemetry, r = reset sample counter, h = help";

/// A parsed console command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Command {
    /// Turn telemetry emission on if off, off if on.
    ToggleTelemetry,
    /// Zero the sample counter.
    ResetCounter,
    /// Report the available commands.
    Help,
}

impl Command {
    /// Parse one console line. Case-insensitive; surrounding whitespace ignored.
    pub fn parse(input: &str) -> Result<Command, CommandError> {
        let word = input.trim();
        if word.is_empty() {
            return Err(CommandError::Empty);
        }
        const TABLE: &[(&str, Command)] = &[
            ("d", Command::ToggleTelemetry),
            ("debug", Command::ToggleTelemetry),
            ("r", Command::ResetCounter),
            ("reset", Command::ResetCounter),
            ("h", Command::Help),
            ("help", Command::Help),
            ("?", Command::Help),
        ];
        TABLE
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(word))
            .map(|&(_, cmd)| cmd)
            .ok_or(CommandError::Unknown)
    }
}

impl core::str::FromStr for Command {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::parse(s)
    }
}

/// What a command did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandResponse {
    /// Telemetry emission is now on (`true`) or off (`false`).
    Telemetry(bool),
    /// The counter was reset; it read `previous` before.
    CounterReset {
        /// Counter value before the reset.
        previous: u32,
    },
    /// The help text.
    Help(&'static str),
}

impl fmt::Display for CommandResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandResponse::Telemetry(true) => f.write_str("telemetry ON"),
            CommandResponse::Telemetry(false) => f.write_str("telemetry OFF"),
            CommandResponse::CounterReset { previous } => {
                write!(f, "sample counter reset (was {})", previous)
            }
            CommandResponse::Help(text) => f.write_str(text),
        }
    }
}
