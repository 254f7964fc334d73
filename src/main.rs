use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use holo_auth::api::registration::DeviceRegistration;
use holo_auth::{ApiServerBuilder, Backoff, Config, RegistrationClient};

/// holo-auth - HoloPort onboarding relay for ZeroTier and Postmark
#[derive(Parser)]
#[command(name = "holo-auth", version, about)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, env = "HOLO_AUTH_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the relay server (default)
    Serve {
        /// Port to listen on (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Register this device with a relay, retrying until accepted
    Register {
        /// Relay base URL
        #[arg(long, env = "HOLO_AUTH_SERVER", default_value = "https://auth-server.holo.host")]
        server: String,
        /// Admin email
        #[arg(long)]
        email: String,
        /// Holochain agent id (base36)
        #[arg(long)]
        agent_id: String,
        /// ZeroTier node address
        #[arg(long)]
        zerotier_address: String,
        /// Public HoloPort URL
        #[arg(long)]
        holoport_url: Option<String>,
        /// Give up after this many attempts (default: retry forever)
        #[arg(long)]
        max_attempts: Option<u32>,
        /// Longest delay between attempts, in seconds
        #[arg(long, default_value = "300")]
        max_delay: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity; RUST_LOG wins when set
    let filter = match cli.verbose {
        0 => "info,holo_auth=info",
        1 => "info,holo_auth=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command.unwrap_or(Command::Serve { port: None }) {
        Command::Serve { port } => serve(cli.config, port).await,
        Command::Register {
            server,
            email,
            agent_id,
            zerotier_address,
            holoport_url,
            max_attempts,
            max_delay,
        } => {
            let device = DeviceRegistration {
                email,
                holochain_agent_id: agent_id,
                zerotier_address,
                holoport_url,
            };
            let backoff = Backoff {
                max_delay: Duration::from_secs(max_delay),
                max_attempts,
                ..Backoff::default()
            };

            tracing::info!(
                server = %server,
                zerotier_address = %device.zerotier_address,
                "registering device"
            );
            RegistrationClient::new(server)
                .register_with_backoff(&device, backoff)
                .await?;
            Ok(())
        }
    }
}

async fn serve(config_path: Option<PathBuf>, port: Option<u16>) -> anyhow::Result<()> {
    let config = Config::load(config_path.as_deref())?;
    tracing::debug!(?config, "loaded configuration");

    let mut builder = ApiServerBuilder::new(&config);
    if let Some(port) = port {
        builder = builder.port(port);
    }

    tracing::info!(
        port = port.unwrap_or(config.server.port),
        zerotier_api = %config.zerotier.api_url,
        postmark_api = %config.postmark.api_url,
        "starting holo-auth relay"
    );

    builder.build().run().await?;
    Ok(())
}
