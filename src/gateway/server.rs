//! Gateway server

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tokio_stream::wrappers::TcpListenerStream;
use tracing::{info, warn};

use super::http::{AppState, JWKS_PATH, create_router};
use crate::authz::AuthorizationEngine;
use crate::cache::IdentityCache;
use crate::config::Config;
use crate::directory::GrpcDirectoryClient;
use crate::processor::ProcessorServer;
use crate::token::{JwkPublisher, KeyMaterial, TokenIssuer};
use crate::{Error, Result};

/// Edge authentication gateway: ext_proc gRPC listener plus HTTP surface
pub struct Gateway {
    config: Config,
    engine: Arc<AuthorizationEngine>,
    publisher: Arc<JwkPublisher>,
    cache: Arc<IdentityCache>,
}

impl Gateway {
    /// Build every component from configuration.
    ///
    /// Key material and the first key set publication must succeed; the
    /// Directory Service is connected lazily on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the keys cannot be loaded or the directory URL is invalid.
    pub fn new(config: Config) -> Result<Self> {
        let keys = Arc::new(KeyMaterial::load(
            &config.token.private_key_path,
            &config.token.public_key_path,
        )?);
        info!(kid = %keys.kid(), "Loaded signing key");

        let publisher = Arc::new(JwkPublisher::new(
            config.token.public_key_path.clone(),
            config.jwks.key_expiration,
        ));
        publisher.refresh()?;

        let directory = Arc::new(GrpcDirectoryClient::connect_lazy(
            &config.server.directory_url,
            config.server.directory_timeout,
        )?);

        // Cached internal tokens must not outlive their own expiry.
        let cache = Arc::new(IdentityCache::new(
            config.cache.ttl.min(config.token.ttl),
            config.cache.size_mb,
        ));

        let issuer = TokenIssuer::new(keys, config.token.ttl, config.token.audience.clone());
        let engine = Arc::new(AuthorizationEngine::new(
            Arc::clone(&directory) as _,
            directory as _,
            Arc::clone(&cache),
            issuer,
            config.issuers.clone(),
            config.routes.clone(),
        ));

        Ok(Self {
            config,
            engine,
            publisher,
            cache,
        })
    }

    /// Run until Ctrl-C or SIGTERM
    pub async fn run(self) -> Result<()> {
        let host = self
            .config
            .server
            .host
            .parse()
            .map_err(|e| Error::Config(format!("Invalid host: {e}")))?;
        let grpc_addr = SocketAddr::new(host, self.config.server.grpc_port);
        let http_addr = SocketAddr::new(host, self.config.server.http_port);

        let (shutdown_tx, _) = broadcast::channel(1);

        let refresher = Arc::clone(&self.publisher).spawn(
            self.config.jwks.refresh_interval,
            shutdown_tx.subscribe(),
        );

        let grpc_listener = TcpListener::bind(grpc_addr).await?;
        let http_listener = TcpListener::bind(http_addr).await?;

        info!("============================================================");
        info!("EDGE AUTH GATEWAY v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(addr = %grpc_addr, "ext_proc gRPC listening");
        info!(addr = %http_addr, "HTTP listening");
        info!("  GET  http://{http_addr}{JWKS_PATH}");
        info!("  POST http://{http_addr}{}", self.config.routes.cookie_exchange);
        info!(directory = %self.config.server.directory_url, "Directory Service");
        if self.config.issuers.is_single_tenant() {
            warn!("No issuers configured - single-tenant mode, issuer and audience are not checked");
        }
        info!("============================================================");

        let processor = ProcessorServer::new(Arc::clone(&self.engine));
        let grpc = tonic::transport::Server::builder()
            .add_service(processor.into_service())
            .serve_with_incoming_shutdown(
                TcpListenerStream::new(grpc_listener),
                wait_for_shutdown(shutdown_tx.subscribe()),
            );

        let state = Arc::new(AppState {
            publisher: Arc::clone(&self.publisher),
            cache: Arc::clone(&self.cache),
        });
        let app = create_router(state, &self.config.routes.cookie_exchange);
        let http = axum::serve(http_listener, app)
            .with_graceful_shutdown(wait_for_shutdown(shutdown_tx.subscribe()))
            .into_future();

        tokio::spawn(shutdown_signal(shutdown_tx));

        let (grpc, http) = tokio::join!(grpc, http);
        grpc?;
        http?;

        let _ = refresher.await;
        info!("Gateway stopped");
        Ok(())
    }
}

async fn wait_for_shutdown(mut shutdown: broadcast::Receiver<()>) {
    let _ = shutdown.recv().await;
}

/// Shutdown signal handler
async fn shutdown_signal(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}
