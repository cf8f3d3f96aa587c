//! Edge Authentication Gateway - Envoy ext_proc authorization and internal token issuance

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use edge_auth_gateway::{cli::Cli, config::Config, gateway::Gateway, setup_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    run_server(cli).await
}

async fn run_server(cli: Cli) -> ExitCode {
    let config = match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            // Apply CLI overrides
            if let Some(port) = cli.grpc_port {
                config.server.grpc_port = port;
            }
            if let Some(port) = cli.http_port {
                config.server.http_port = port;
            }
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        grpc_port = config.server.grpc_port,
        http_port = config.server.http_port,
        single_tenant = config.issuers.is_single_tenant(),
        "Starting edge auth gateway"
    );

    let gateway = match Gateway::new(config) {
        Ok(g) => g,
        Err(e) => {
            error!("Failed to create gateway: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = gateway.run().await {
        error!("Gateway error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Gateway shutdown complete");
    ExitCode::SUCCESS
}
