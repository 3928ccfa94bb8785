//! Command-line entry point: start the server, or inspect/edit the
//! on-disk config, including the partial-results canary rollout knob
//! (percentage of sessions that get partial results) ported from the
//! original deployment's standalone rollout-management script.

use crate::config::Config;
use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "babelcast")]
#[command(about = "Real-time multilingual audio broadcasting server", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the websocket/REST server (default when no command is given).
    Serve,
    /// Inspect or edit the on-disk configuration.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration as TOML.
    Show,
    /// Write the default configuration to disk.
    Init,
    /// Set the partial-results canary rollout percentage (0-100).
    Rollout {
        percentage: u32,
    },
    /// Emergency-disable partial results for all sessions.
    Disable,
    /// Re-enable partial results at the given percentage (default 100).
    Enable {
        #[arg(default_value_t = 100)]
        percentage: u32,
    },
    /// Show the current partial-results rollout status.
    Status,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let config = Config::load()?;
            crate::server::serve(config).await
        }
        Commands::Config { command } => run_config(command),
    }
}

fn run_config(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            let config = Config::load()?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        ConfigCommands::Init => {
            let config = Config::default();
            config.save()?;
            println!("wrote default configuration");
            Ok(())
        }
        ConfigCommands::Rollout { percentage } => {
            if percentage > 100 {
                bail!("percentage must be between 0 and 100, got {percentage}");
            }
            let mut config = Config::load()?;
            let old = config.partial_results.rollout_percentage;
            config.partial_results.rollout_percentage = percentage;
            config.save()?;
            println!("rollout percentage updated: {old}% -> {percentage}%");
            if percentage == 0 {
                println!("warning: 0% rollout disables partial results for all new sessions");
            } else if percentage == 100 {
                println!("full rollout: partial results enabled for all sessions");
            }
            Ok(())
        }
        ConfigCommands::Disable => {
            let mut config = Config::load()?;
            config.partial_results.enabled = false;
            config.partial_results.rollout_percentage = 0;
            config.save()?;
            println!("partial results disabled; sessions fall back to final-result-only mode");
            Ok(())
        }
        ConfigCommands::Enable { percentage } => {
            if percentage > 100 {
                bail!("percentage must be between 0 and 100, got {percentage}");
            }
            let mut config = Config::load()?;
            config.partial_results.enabled = true;
            config.partial_results.rollout_percentage = percentage;
            config.save()?;
            println!("partial results enabled at {percentage}%");
            Ok(())
        }
        ConfigCommands::Status => {
            let config = Config::load()?;
            let p = &config.partial_results;
            println!("enabled: {}", p.enabled);
            println!("rollout percentage: {}%", p.rollout_percentage);
            if !p.enabled {
                println!("feature is DISABLED - all sessions use final-result-only mode");
            } else if p.rollout_percentage == 0 {
                println!("rollout at 0% - partial results disabled for all sessions");
            } else if p.rollout_percentage == 100 {
                println!("full rollout - partial results enabled for all sessions");
            } else {
                println!("canary deployment - {}% of sessions use partial results", p.rollout_percentage);
            }
            Ok(())
        }
    }
}
