use compound_space::{Config, Pipeline};

use std::env;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("entering program...");
    let args: Vec<String> = env::args().collect();

    info!("building parameters...");
    let config = match Config::new(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE
        }
    };

    // the space only lives for the summary, nothing is written out
    match Pipeline::run(config) {
        Ok(space) => {
            info!(
                name = space.space_name(),
                words = space.word_count(),
                compounds = space.compound_count(),
                vector_length = space.vector_length(),
                "space ready"
            );
            ExitCode::SUCCESS
        },
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
