//! Line-oriented debug console used to drive the lock from the emulator.
//!
//! Lines are parsed by [`grammar`] against the command table in [`catalog`].

use core::fmt;

pub mod catalog;
pub mod grammar;

pub use grammar::{ButtonSelection, Command, ParseError, Side, parse};

/// Writes the command list, or the usage of one command when `topic` names it.
pub fn write_help<W: fmt::Write>(out: &mut W, topic: Option<&str>) -> fmt::Result {
    match topic {
        Some(name) => match catalog::find(name) {
            Some(spec) => writeln!(out, "{}\n  {}", spec.usage, spec.summary),
            None => writeln!(out, "no help for `{name}`"),
        },
        None => {
            for spec in &catalog::COMMANDS {
                writeln!(out, "{:<30} {}", spec.usage, spec.summary)?;
            }
            Ok(())
        }
    }
}
