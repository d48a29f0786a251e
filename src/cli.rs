//! Shared CLI flags used across the crate's six binaries.

use clap::Parser;

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum LogFormat {
    /// Compact `event=<name> key=value` lines.
    Pretty,
    /// One JSON object per line.
    Json,
}

#[cfg(debug_assertions)]
const DEFAULT_LOG_FORMAT: LogFormat = LogFormat::Pretty;
#[cfg(not(debug_assertions))]
const DEFAULT_LOG_FORMAT: LogFormat = LogFormat::Json;

fn default_log_format() -> LogFormat {
    DEFAULT_LOG_FORMAT
}

/// Flags shared by every binary.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CommonArgs {
    #[arg(long, value_enum, default_value_t = default_log_format())]
    pub log_format: LogFormat,
}

/// Flags for `upload-tasks`/`upload-proxies`: the interactive
/// append/overwrite prompt can be skipped with an explicit mode.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum LoadMode {
    Append,
    Overwrite,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct LoaderArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Path to the input file (one item per line).
    pub path: String,

    /// Skip the interactive prompt and use this mode directly.
    #[arg(long, value_enum)]
    pub mode: Option<LoadMode>,
}
