mod api;
mod cli;
mod cluster;
mod config;
mod database;
mod error;
mod indices;
mod schedules;
mod schema;
mod server;
mod snapshot;

use std::path::Path;

use cli::Cli;
use flexi_logger::{
    detailed_format, Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming,
};
use log::{debug, error, info};

use crate::config::Config;
use crate::database::Database;
use crate::error::SnapSchedError;

const LOG_FILE_SIZE: u64 = 10 * 1024 * 1024;
const LOG_FILES_KEPT: usize = 7;

fn setup_logging(data_dir: &Path, config: &Config) -> Result<LoggerHandle, SnapSchedError> {
    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    Logger::try_with_str(config.logging.log_spec())
        .and_then(|logger| {
            logger
                .log_to_file(
                    FileSpec::default()
                        .directory(&log_dir)
                        .basename("snapsched"),
                )
                .format_for_files(detailed_format)
                .rotate(
                    Criterion::Size(LOG_FILE_SIZE),
                    Naming::Timestamps,
                    Cleanup::KeepLogFiles(LOG_FILES_KEPT),
                )
                .duplicate_to_stderr(Duplicate::Warn)
                .start()
        })
        .map_err(|e| SnapSchedError::Error(format!("Failed to start logger: {}", e)))
}

fn run() -> Result<(), SnapSchedError> {
    let data_dir = Config::data_dir()?;
    let config = Config::load_config(&data_dir);

    // Keep the handle alive for the lifetime of the process
    let _logger = setup_logging(&data_dir, &config)?;

    info!(
        "snapsched {} starting, data directory: {}",
        env!("CARGO_PKG_VERSION"),
        data_dir.display()
    );
    debug!("Command-line args: {:?}", std::env::args_os().collect::<Vec<_>>());

    Config::init(config);
    Database::init(&data_dir)?;

    Cli::handle_command_line()
}

fn main() {
    if let Err(err) = run() {
        error!("{:?}", err);
        eprintln!("{}", err);
        std::process::exit(1);
    }
}
