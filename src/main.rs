use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use kitcon::{
    catalog::KitCatalog,
    client::{Client, DeliveryOptions},
    config::Config,
    server::{Behavior, Server},
};
use log::{error, info, Level, LevelFilter, Metadata, Record};
use tokio::signal;

struct SimpleLogger;

impl log::Log for SimpleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            match record.level() {
                Level::Error | Level::Warn => eprintln!("{} - {}", record.level(), record.args()),
                _ => println!("{} - {}", record.level(), record.args()),
            }
        }
    }

    fn flush(&self) {}
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file; RCON_HOST, RCON_PORT and RCON_PASSWORD override it.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// More output, repeat for trace level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Hand a kit to a player.
    Deliver {
        /// In-game name or id of the player.
        destination: String,
        /// Kit name from the catalog.
        #[arg(required_unless_present = "raw")]
        kit: Option<String>,
        /// Send this console command instead of a catalog kit.
        #[arg(long, conflicts_with = "kit")]
        raw: Option<String>,
        /// Override the configured post-command grace period.
        #[arg(long, value_parser = humantime::parse_duration)]
        grace: Option<Duration>,
    },
    /// List the kits and the commands they run.
    Kits,
    /// Run a local rcon console that logs what it receives.
    Serve {
        #[arg(long, default_value = "127.0.0.1:28016")]
        addr: String,
        /// Only accept this password; any password is accepted if omitted.
        #[arg(long)]
        password: Option<String>,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<Config, Box<dyn Error>> {
    let config = match path {
        Some(path) => Config::load(path)?,
        None => Config::from_env()?,
    };
    config.validate()?;
    Ok(config)
}

fn catalog(config: Option<&Config>) -> KitCatalog {
    let mut catalog = KitCatalog::stock();
    if let Some(config) = config {
        catalog.extend(config.kits.clone());
    }
    catalog
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let level = match args.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let _ = log::set_logger(&SimpleLogger).map(|()| log::set_max_level(level));

    match args.command {
        Command::Deliver {
            destination,
            kit,
            raw,
            grace,
        } => {
            let config = load_config(args.config.as_ref())?;
            let command = match (raw, kit) {
                (Some(raw), _) => raw,
                (None, Some(kit)) => catalog(Some(&config))
                    .command(&kit)
                    .map(str::to_owned)
                    .ok_or_else(|| format!("unknown kit: {}", kit))?,
                (None, None) => return Err("nothing to deliver".into()),
            };

            let mut options: DeliveryOptions = config.delivery_options();
            if let Some(grace) = grace {
                options.grace_period = grace;
            }

            if let Err(err) = Client::new(options)
                .deliver_to(&config.rcon, &destination, &command)
                .await
            {
                error!(
                    "delivery failed: {} (retryable: {})",
                    err,
                    err.is_retryable()
                );
                return Err(err.into());
            }
        }
        Command::Kits => {
            let config = match args.config.as_ref() {
                Some(path) => Some(Config::load(path)?),
                None => None,
            };
            for (name, command) in catalog(config.as_ref()).iter() {
                println!("{:<24} {}", name, command);
            }
        }
        Command::Serve { addr, password } => {
            let mut server = Server::start(
                &addr,
                Behavior {
                    password,
                    ..Behavior::default()
                },
            )
            .await?;

            tokio::select!(
                _ = server.wait() => {}
                _ = signal::ctrl_c() => {}
            );
        }
    }

    info!("bye");
    Ok(())
}
