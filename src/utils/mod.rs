//! Utilities: logging setup (verbosity flags -> tracing level).
//!
//! Logs always go to stderr; stdout carries the MCP protocol stream.
//! `RUST_LOG` directives are layered on top of the level derived from -v / -q.
//! ANSI colors only when stderr is a terminal and NO_COLOR is unset.

use std::io::IsTerminal;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

/// Map `-v` count and `-q` to a level. Quiet wins.
pub fn derive_level(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::ERROR;
    }
    match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

pub fn init_logging(level: LevelFilter) {
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    let ansi = std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none();

    // A second init (tests) is harmless.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(ansi)
        .with_target(false)
        .try_init();
}
