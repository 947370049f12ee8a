use log::LevelFilter;
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

use crate::config::Verboseness;

/// Install a terminal logger on stderr at the given level.
///
/// Best-effort: if a logger is already installed only the level is changed.
pub fn init(verboseness: Verboseness) {
    let level = verboseness.level_filter();
    let config = ConfigBuilder::new()
        .set_time_level(LevelFilter::Off)
        .set_target_level(LevelFilter::Off)
        .set_thread_level(LevelFilter::Off)
        .build();
    if TermLogger::init(level, config, TerminalMode::Stderr, ColorChoice::Auto).is_err() {
        set_level(verboseness);
    }
}

/// Change the level of whatever logger is installed.
pub fn set_level(verboseness: Verboseness) {
    log::set_max_level(verboseness.level_filter());
}
