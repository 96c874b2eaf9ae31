use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::info;

use crate::cluster::{HttpCluster, SnapshotCluster};
use crate::config::Config;
use crate::database::Database;
use crate::error::SnapSchedError;
use crate::schedules::SnapshotSchedule;
use crate::snapshot::{
    cleanup_all_enabled_schedules, execute_all_enabled_schedules, get_indices_needing_snapshot,
};

#[derive(Parser)]
#[command(
    name = "snapsched",
    version,
    about = "snapsched: scheduled index snapshots for a search cluster"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the server (default if no command specified)
    Serve,

    /// Execute every enabled schedule once, then apply retention
    Run,

    /// Print what a schedule would snapshot right now, without creating anything
    Plan {
        /// Schedule ID
        #[arg(long = "id", short = 'i')]
        id: i64,
    },
}

impl Cli {
    pub fn handle_command_line() -> Result<(), SnapSchedError> {
        let args = Cli::parse();

        // Default to Serve if no command specified
        match args.command.unwrap_or(Command::Serve) {
            Command::Serve => Self::start_server(),
            Command::Run => Self::run_once(),
            Command::Plan { id } => Self::print_plan(id),
        }
    }

    fn runtime() -> Result<tokio::runtime::Runtime, SnapSchedError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| SnapSchedError::Error(format!("Failed to create runtime: {}", e)))
    }

    fn cluster() -> Result<Arc<dyn SnapshotCluster>, SnapSchedError> {
        let config = Config::get();
        Ok(Arc::new(HttpCluster::new(
            &config.cluster,
            config.snapshots.partial,
        )?))
    }

    fn start_server() -> Result<(), SnapSchedError> {
        let host = Config::get_server_host();
        let port = Config::get_server_port();

        info!("Starting server on {}:{}", host, port);

        Self::runtime()?.block_on(async {
            let web_server = crate::server::WebServer::new(host, port);
            web_server.start().await
        })
    }

    fn run_once() -> Result<(), SnapSchedError> {
        let config = Config::get();
        let cluster = Self::cluster()?;

        Self::runtime()?.block_on(async {
            let mut conn = Database::get_connection()?;

            let summary = execute_all_enabled_schedules(
                cluster.as_ref(),
                &mut conn,
                &config.snapshots,
                config.scheduler.execution_timeout(),
            )
            .await?;

            for result in &summary.results {
                let status = if result.success { "ok" } else { "FAILED" };
                println!(
                    "[{}] {} (id {}): {}",
                    status, result.schedule_name, result.schedule_id, result.message
                );
            }
            println!(
                "{} schedules executed: {} succeeded, {} failed",
                summary.total, summary.succeeded, summary.failed
            );

            let retention = cleanup_all_enabled_schedules(cluster.as_ref(), &mut conn).await?;
            println!(
                "Retention: {} schedules checked, {} snapshots deleted, {} failures",
                retention.schedules_checked, retention.deleted, retention.failed
            );

            Ok(())
        })
    }

    fn print_plan(schedule_id: i64) -> Result<(), SnapSchedError> {
        let schedule = {
            let conn = Database::get_connection()?;
            SnapshotSchedule::get_by_id(&conn, schedule_id)?.ok_or_else(|| {
                SnapSchedError::NotFound(format!("Schedule {} not found", schedule_id))
            })?
        };
        let cluster = Self::cluster()?;

        let plan = Self::runtime()?
            .block_on(async { get_indices_needing_snapshot(cluster.as_ref(), &schedule).await })?;

        println!("{}", serde_json::to_string_pretty(&plan)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_parsing_no_command_defaults_to_serve() {
        let result = Cli::try_parse_from(["snapsched"]);
        assert!(result.is_ok(), "Should accept no command");

        let cli = result.unwrap();
        assert!(cli.command.is_none());
        // Verify default behavior
        assert!(matches!(cli.command.unwrap_or(Command::Serve), Command::Serve));
    }

    #[test]
    fn test_cli_parsing_explicit_serve_command() {
        let result = Cli::try_parse_from(["snapsched", "serve"]);
        assert!(result.is_ok(), "Should accept explicit serve command");

        let cli = result.unwrap();
        assert!(matches!(cli.command, Some(Command::Serve)));
    }

    #[test]
    fn test_cli_parsing_run_and_plan() {
        let cli = Cli::try_parse_from(["snapsched", "run"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Run)));

        let cli = Cli::try_parse_from(["snapsched", "plan", "--id", "7"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Plan { id: 7 })));

        let cli = Cli::try_parse_from(["snapsched", "plan", "-i", "3"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Plan { id: 3 })));
    }

    #[test]
    fn test_cli_parsing_invalid_arguments() {
        let result = Cli::try_parse_from(["snapsched", "nonexistent-command"]);
        assert!(result.is_err(), "Should reject unknown commands");

        let result = Cli::try_parse_from(["snapsched", "serve", "--invalid-flag"]);
        assert!(result.is_err(), "Should reject unknown flags on serve");

        let result = Cli::try_parse_from(["snapsched", "plan"]);
        assert!(result.is_err(), "Plan requires an id");

        let result = Cli::try_parse_from(["snapsched", "plan", "--id", "abc"]);
        assert!(result.is_err(), "Plan id must be numeric");
    }
}
