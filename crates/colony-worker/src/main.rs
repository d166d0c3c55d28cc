use clap::Parser;
use colony_client::{ColonyClient, HttpColonyClient};
use colony_worker::{startup, EnvSettings, ServerSettings};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "colony-worker")]
#[command(about = "Colony runtime computing Fibonacci terms", long_about = None)]
struct Args {
    /// Any argument deregisters the runtime saved by a previous run and exits
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    deregister: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let settings = EnvSettings::from_env()?;

    if !args.deregister.is_empty() {
        return deregister(&settings).await;
    }

    let config = settings.worker_config()?;
    let client = connect(&config.server, config.assign_timeout)?;

    let mut worker = startup::start(&config, client).await?;

    // Handle shutdown signals
    let shutdown = worker.shutdown_token();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal");
        shutdown.cancel();
    });

    worker.run().await;

    Ok(ExitCode::SUCCESS)
}

async fn deregister(settings: &EnvSettings) -> anyhow::Result<ExitCode> {
    let config = settings.deregister_config()?;
    let client = connect(&config.server, Duration::from_secs(10))?;

    match startup::deregister(&config, client).await {
        Ok(runtime_id) => {
            tracing::info!("Runtime {} deregistered", runtime_id);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            tracing::error!("{}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn connect(
    server: &ServerSettings,
    assign_timeout: Duration,
) -> anyhow::Result<Arc<dyn ColonyClient>> {
    let client = HttpColonyClient::with_assign_timeout(
        &server.host,
        server.port,
        server.tls,
        assign_timeout,
    )?;
    tracing::info!("Using colony server at {}", client.endpoint());
    Ok(Arc::new(client))
}
