//! Command-line interface for eve-l-monitor

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level as TraceLevel;

use crate::config::LayoutSettings;
use crate::constants::layout::CASCADE_SIZE_FRACTION;
use crate::layout::{GridPattern, SideEdge};
use crate::types::Rect;

/// eve-l-monitor - watches EVE Online clients for alerts and tiles them
#[derive(Parser, Debug)]
#[command(name = "eve-l-monitor")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file to use instead of the default location
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (overrides LOG_LEVEL and config)
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevelArg>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for TraceLevel {
    fn from(arg: LogLevelArg) -> Self {
        match arg {
            LogLevelArg::Error => TraceLevel::ERROR,
            LogLevelArg::Warn => TraceLevel::WARN,
            LogLevelArg::Info => TraceLevel::INFO,
            LogLevelArg::Debug => TraceLevel::DEBUG,
            LogLevelArg::Trace => TraceLevel::TRACE,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print windows matching the title filter
    List,

    /// Monitor matching windows until Ctrl-C
    Watch {
        /// Seconds between window list refreshes
        #[arg(long, value_name = "SECONDS", default_value_t = 2)]
        reconcile_secs: u64,

        /// Do not serve the IPC socket
        #[arg(long)]
        no_ipc: bool,
    },

    /// Tile matching windows over the screen
    Layout {
        /// grid, grid:RxC (or RxC), row, column, main, main-bottom, cascade
        pattern: String,

        /// Print the placements without moving any window
        #[arg(long)]
        dry_run: bool,
    },

    /// Write one PNG per matching window
    Snapshot {
        #[arg(long, value_name = "DIR")]
        out: PathBuf,
    },

    /// Print events from a running watch daemon
    Monitor,
}

/// Parse a log level name the way LOG_LEVEL is read; unknown names are INFO
pub fn parse_level(name: &str) -> TraceLevel {
    match name.to_lowercase().as_str() {
        "trace" => TraceLevel::TRACE,
        "debug" => TraceLevel::DEBUG,
        "warn" => TraceLevel::WARN,
        "error" => TraceLevel::ERROR,
        _ => TraceLevel::INFO,
    }
}

/// `--log-level`, else `LOG_LEVEL`, else the config file
pub fn resolve_log_level(arg: Option<LogLevelArg>, env: Option<&str>, config: &str) -> TraceLevel {
    match (arg, env) {
        (Some(arg), _) => arg.into(),
        (None, Some(env)) => parse_level(env),
        (None, None) => parse_level(config),
    }
}

/// Turn a `layout` argument into a pattern for `count` windows on `screen`
pub fn parse_pattern(spec: &str, settings: &LayoutSettings, screen: Rect, count: usize) -> Result<GridPattern> {
    let spec = spec.trim().to_lowercase();
    let pattern = match spec.as_str() {
        "grid" | "auto" => GridPattern::auto_grid(count),
        "row" => GridPattern::Row,
        "column" | "col" => GridPattern::Column,
        "main" | "main-right" => GridPattern::MainPlusSides {
            main_fraction: settings.main_fraction,
            edge: SideEdge::Right,
        },
        "main-bottom" => GridPattern::MainPlusSides {
            main_fraction: settings.main_fraction,
            edge: SideEdge::Bottom,
        },
        "cascade" => GridPattern::Cascade {
            step_x: settings.cascade_step,
            step_y: settings.cascade_step,
            width: (screen.width as f32 * CASCADE_SIZE_FRACTION) as u32,
            height: (screen.height as f32 * CASCADE_SIZE_FRACTION) as u32,
        },
        other => {
            let dims = other.strip_prefix("grid:").unwrap_or(other);
            let Some((rows, cols)) = dims.split_once('x') else {
                bail!("Unknown layout pattern '{other}'");
            };
            let (Ok(rows), Ok(cols)) = (rows.parse::<u32>(), cols.parse::<u32>()) else {
                bail!("Invalid grid size '{dims}', expected RxC");
            };
            if rows == 0 || cols == 0 {
                bail!("Grid size must be at least 1x1, got {dims}");
            }
            GridPattern::Grid { rows, cols }
        }
    };
    Ok(pattern)
}
