mod commands;
mod config;
mod messages;
mod persist;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use engine_logging::{engine_error, LogDestination};
use log::LevelFilter;

#[derive(Debug, Parser)]
#[command(name = "danmaku", about = "Paced live-chat message sender")]
struct Cli {
    /// Config file (RON).
    #[arg(long, global = true, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log file, appended to on every run.
    #[arg(long, global = true, default_value = config::DEFAULT_LOG_PATH)]
    log_file: PathBuf,

    /// Also mirror the log file on the terminal.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the paced send loop; type `stop` to end it.
    Run {
        #[arg(long)]
        room: Option<String>,
        #[arg(long)]
        interval: Option<f64>,
        #[arg(long)]
        random: bool,
        /// Keep sending even if the cookie does not pass the login check.
        #[arg(long)]
        allow_logged_out: bool,
    },
    /// Check whether the configured cookie is logged in.
    Validate,
    /// Send only the first message once.
    SendOnce {
        #[arg(long)]
        room: Option<String>,
        #[arg(long)]
        message: Option<String>,
    },
    /// Print the messages a run would send.
    Preview,
    /// Write a default config file.
    InitConfig {
        #[arg(long)]
        force: bool,
    },
    /// Remove the saved config file.
    DeleteConfig,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let destination = if cli.verbose {
        LogDestination::Both
    } else {
        LogDestination::File
    };
    engine_logging::initialize(destination, LevelFilter::Info, &cli.log_file);
    let app_config = config::load(&cli.config);

    let result = match cli.command {
        Command::Run {
            room,
            interval,
            random,
            allow_logged_out,
        } => {
            let mut app_config = app_config;
            if let Some(room) = room {
                app_config.room_id = room;
            }
            if let Some(interval) = interval {
                app_config.interval_secs = interval;
            }
            app_config.randomize |= random;
            app_config.require_login &= !allow_logged_out;
            commands::run(&app_config)
        }
        Command::Validate => commands::validate(&app_config),
        Command::SendOnce { room, message } => {
            let mut app_config = app_config;
            if let Some(room) = room {
                app_config.room_id = room;
            }
            commands::send_once(&app_config, message)
        }
        Command::Preview => commands::preview(&app_config),
        Command::InitConfig { force } => commands::init_config(&cli.config, force),
        Command::DeleteConfig => commands::delete_config(&cli.config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            engine_error!("{:#}", err);
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
