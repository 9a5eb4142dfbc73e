use std::process::ExitCode;

use clap::Parser as _;

use cave_vr::config::CaveArgs;
use cave_vr::logging;

fn main() -> ExitCode {
    let args = CaveArgs::parse();
    if let Err(e) = logging::install(args.verbose) {
        eprintln!("failed to install logger: {e}");
    }

    log::info!("CAVE VR starting...");
    match cave_vr::run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e:?}");
            ExitCode::FAILURE
        }
    }
}
