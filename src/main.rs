use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, registry, EnvFilter};

mod cmd;
use cmd::prepare::PrepareArgs;

#[derive(Parser, Debug)]
#[command(
    name = "bootforge",
    version,
    about = "Unattended network-boot provisioning",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output - shows more detailed logs
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Runs the provisioning server (TFTP + HTTP listeners).
    Serve(ServeArgs),
    /// Downloads and unpacks the installer image (one-shot preparation).
    Prepare(PrepareArgs),
}

#[derive(Parser, Debug)]
struct ServeArgs {
    /// Path of the TOML configuration file
    #[arg(short, long, default_value = "/etc/bootforge/config.toml")]
    config: std::path::PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    // Respect RUST_LOG; fall back to per-crate directives keyed on --verbose.
    let level = if cli.verbose { "debug" } else { "info" };
    let directives = format!(
        "bootforge={level},bootforge_server={level},bootforge_tftp={level},tower_http=warn,hyper=warn,reqwest=warn",
        level = level
    );
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));
    registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Serve(args) => {
            let config = match bootforge_server::ServerConfig::load(&args.config) {
                Ok(config) => config,
                Err(e) => {
                    error!("invalid configuration: {:#}", e);
                    std::process::exit(1);
                }
            };
            info!("starting bootforge server - press Ctrl+C to stop");
            if let Err(e) = bootforge_server::run(config).await {
                error!("server failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Commands::Prepare(args) => {
            if let Err(e) = cmd::prepare::run(args).await {
                error!("preparation failed: {:#}", e);
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
