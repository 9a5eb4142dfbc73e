//! Logging setup.

use log::LevelFilter;

/// Install a stderr [`log`] logger. `verbose` raises the level from Info to Debug.
pub fn install(verbose: bool) -> Result<(), log::SetLoggerError> {
    let level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };

    // wgpu and naga are very chatty at Info and below.
    let config = simplelog::ConfigBuilder::new()
        .set_target_level(LevelFilter::Off)
        .set_location_level(LevelFilter::Off)
        .set_time_level(LevelFilter::Error)
        .add_filter_ignore_str("wgpu")
        .add_filter_ignore_str("naga")
        .build();

    simplelog::WriteLogger::init(level, config, std::io::stderr())
}
