//! Tollgate CLI
//!
//! 分布式锁命令行入口点。

use clap::Parser;
use tollgate_cli::cli::{Cli, CommandRunner, Commands};
use tollgate_shared::config::AppConfig;
use tollgate_shared::observability;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load("tollgate")?;
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }

    observability::init(&config.service_name, &config.observability)?;

    let runner = CommandRunner::connect(&config).await?;

    let code = match cli.command {
        Commands::Run {
            name,
            ttl,
            timeout,
            min_gap_ms,
            command,
        } => {
            runner
                .run_blocking(&name, ttl, timeout, min_gap_ms, &command)
                .await?
        }
        Commands::Try { name, ttl, command } => runner.run_once(&name, ttl, &command).await?,
        Commands::Owner { name } => {
            runner.show_owner(&name).await?;
            0
        }
        Commands::Release { name, owner } => {
            runner.release(&name, &owner).await?;
            0
        }
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
