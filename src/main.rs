use anyhow::Context;
use clap::Parser;
use ripple::app::App;
use ripple::cli::{Cli, Commands};
use ripple::config::Config;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => {
            let mut config = Config::load(&args.config)
                .with_context(|| format!("loading config from {}", args.config.display()))?;
            if let Some(bind) = args.bind {
                config.gateway.bind_addr = bind;
            }
            if let Some(level) = args.log_level {
                config.logging.level = level;
            }
            if args.json_logs {
                config.logging.format = "json".into();
            }

            config.init_logging();
            info!("ripple starting");

            // Runs until the listener fails or a shutdown signal arrives.
            App::run(config).await.context("gateway terminated")?;

            info!("ripple stopped");
        }
        Commands::Check(args) => {
            Config::load(&args.config)
                .with_context(|| format!("invalid config {}", args.config.display()))?;
            println!("{} is valid", args.config.display());
        }
    }
    Ok(())
}
