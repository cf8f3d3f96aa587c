//! Command-line interface

use std::path::PathBuf;

use clap::Parser;

/// Edge authentication gateway - Envoy ext_proc authorization and internal token issuance
#[derive(Parser, Debug)]
#[command(name = "edge-auth-gateway")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "EDGE_AUTH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Port for the ext_proc gRPC listener
    #[arg(long, env = "EDGE_AUTH_GRPC_PORT")]
    pub grpc_port: Option<u16>,

    /// Port for the HTTP listener
    #[arg(long, env = "EDGE_AUTH_HTTP_PORT")]
    pub http_port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "EDGE_AUTH_LOG_LEVEL")]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "EDGE_AUTH_LOG_FORMAT")]
    pub log_format: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_overrides() {
        let cli = Cli::parse_from([
            "edge-auth-gateway",
            "--config",
            "/etc/edge-auth/config.yaml",
            "--grpc-port",
            "9100",
            "--log-format",
            "json",
        ]);

        assert_eq!(cli.config, Some(PathBuf::from("/etc/edge-auth/config.yaml")));
        assert_eq!(cli.grpc_port, Some(9100));
        assert_eq!(cli.http_port, None);
        assert_eq!(cli.log_level, "info");
        assert_eq!(cli.log_format.as_deref(), Some("json"));
    }
}
