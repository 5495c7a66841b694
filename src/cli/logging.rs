//! Logging utilities for CLI output

/// Log level for CLI output
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogLevel {
    /// Suppress all output
    Quiet,
    /// Normal output level
    #[default]
    Normal,
    /// Verbose output with additional details
    Verbose,
}

impl LogLevel {
    /// Level selected by the global `--quiet` and `--verbose` flags; quiet wins
    pub fn from_flags(quiet: bool, verbose: bool) -> Self {
        if quiet {
            LogLevel::Quiet
        } else if verbose {
            LogLevel::Verbose
        } else {
            LogLevel::Normal
        }
    }
}

/// Print `msg` to stdout if the current level permits it
///
/// Normal messages show at every level but `Quiet`; verbose messages only at `Verbose`.
pub fn log(level: LogLevel, required: LogLevel, msg: &str) {
    if enabled(level, required) {
        println!("{msg}");
    }
}

fn enabled(level: LogLevel, required: LogLevel) -> bool {
    match required {
        LogLevel::Quiet => false,
        LogLevel::Normal => level != LogLevel::Quiet,
        LogLevel::Verbose => level == LogLevel::Verbose,
    }
}
