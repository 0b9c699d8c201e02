use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use premade_bots::bot::BotRuntime;
use premade_bots::bots;
use premade_bots::config::{validate_token, BotKind, Config};
use premade_bots::discord;
use premade_bots::platform::Platform;
use premade_bots::updater::{UpdateOutcome, UpdateSupervisor};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Premade Discord bots with self-updating installs
#[derive(Parser, Debug)]
#[command(name = "premade-bots", version, about)]
struct Args {
    /// Bot token (first startup argument on hosting panels)
    token: Option<String>,

    /// Path to the TOML config file
    #[arg(short, long, default_value = "bot.toml")]
    config: PathBuf,

    /// Bot variant; overrides the config file
    #[arg(short, long, value_enum)]
    bot: Option<BotKind>,

    /// Skip the startup update check
    #[arg(long)]
    no_update: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_level(true)
        .init();

    let args = Args::parse();

    let token = match validate_token(args.token.as_deref()) {
        Ok(t) => t.to_string(),
        Err(e) => {
            error!(error = %e, "cannot start");
            std::process::exit(1);
        }
    };

    let config = Config::load(&args.config, args.bot)?;
    info!(
        bot = ?config.bot,
        identifier = %config.identifier(),
        version = env!("CARGO_PKG_VERSION"),
        "🤖 premade bot starting"
    );

    if !args.no_update {
        match UpdateSupervisor::from_config(&config) {
            Ok(supervisor) => {
                info!(installed = %supervisor.installed_path().display(), "checking for updates");
                let outcome = supervisor.check().await;
                if let UpdateOutcome::Aborted(reason) = &outcome {
                    warn!(%reason, "update aborted, continuing with current build");
                }
                if let Some(code) = outcome.exit_code() {
                    info!(?outcome, "restarting into the new build");
                    std::process::exit(code);
                }
            }
            Err(e) => warn!(error = %e, "update check unavailable"),
        }
    }

    let (platform, events, mut client) = discord::connect(&token, config.bot).await?;
    let platform: Arc<dyn Platform> = platform;
    let profile = bots::build(&config, platform.clone())?;
    let runtime = BotRuntime::new(
        profile,
        platform,
        Duration::from_secs(config.status.interval_secs),
    );
    let runtime = tokio::spawn(runtime.run(events));
    let shards = client.shard_manager.clone();

    tokio::select! {
        result = client.start() => {
            if let Err(e) = result {
                error!(error = %e, "gateway client stopped");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, shutting down");
            shards.shutdown_all().await;
        }
    }

    // The client owns the event sender; dropping it closes the stream.
    drop(client);
    if tokio::time::timeout(SHUTDOWN_GRACE, runtime).await.is_err() {
        warn!("handlers still running after shutdown grace period");
    }

    Ok(())
}
