use std::env;
use std::process::ExitCode;

use navie_cfd::logging::init_logging;
use navie_cfd::{RunConfig, SimulationContext};
use tracing::{error, info};

fn main() -> ExitCode {
    init_logging();

    // usage: navie-cfd [config.json] [summary.json]
    let mut args = env::args().skip(1);
    let config = match args.next() {
        Some(path) => match RunConfig::from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                error!("{}", e);
                return ExitCode::FAILURE;
            }
        },
        None => {
            info!("No configuration given, running the default lid-driven cavity");
            RunConfig::default()
        }
    };
    let output = args.next();

    let ctx = SimulationContext::new();
    info!(
        "Registered solvers: {:?}",
        ctx.registry().list(16).names
    );

    let summary = match ctx.run(&config) {
        Ok(summary) => summary,
        Err(e) => {
            error!(status = ctx.last_status().code(), "{}", e);
            return ExitCode::FAILURE;
        }
    };

    let written = match &output {
        Some(path) => summary.write_json(path),
        None => summary.to_json().map(|json| println!("{}", json)),
    };
    if let Err(e) = written {
        error!("{}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
