//! tern - multi-capability chat in the terminal
//!
//! Main entry point: CLI parsing, configuration loading, tracing setup,
//! and dispatch to the interactive or one-shot front-end.

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tern::chat_mode;
use tern::cli::{Cli, Commands};
use tern::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_tracing(cli.verbose);

    let config = Config::load(&cli.config, &cli)?;
    config.validate()?;

    match cli.command {
        Commands::Chat => {
            tracing::info!("Starting interactive chat mode");
            chat_mode::run_chat(config).await
        }
        Commands::Ask { ref message } => {
            tracing::debug!("Submitting one-shot message");
            chat_mode::run_once(config, message.clone()).await
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "tern=debug" } else { "tern=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
