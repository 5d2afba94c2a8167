use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use weather_pipeline::config::{DEFAULT_CONFIG_PATH, load_config};
use weather_pipeline::logging::{Log, Stage};
use weather_pipeline::pipeline::run;

/// Monthly temperature averages from daily weather observations.
#[derive(Debug, Parser)]
#[command(name = "weather_pipeline", version, about)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, env = "WEATHER_PIPELINE_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Write a JSON run report to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let logger = config.logging.build_logger();

    let output = match run(&config, &logger) {
        Ok(output) => output,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("Monthly average temperatures ({}):", output.report.destination);
    println!("{}", output.aggregate);

    if let Some(path) = cli.report {
        if let Err(e) = output.report.write_json(&path) {
            logger.warn(
                Stage::Pipeline,
                None,
                &format!("Could not write run report to {}: {}", path.display(), e),
            );
        }
    }

    ExitCode::SUCCESS
}
