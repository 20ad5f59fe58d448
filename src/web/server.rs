//! Web server for gatehouse.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use crate::auth::{CsrfTokenManager, RefreshTokenStore, SessionService, TokenSigner};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::db::Database;
use crate::{GatehouseError, Result};

use super::handlers::{AppState, CookieSettings};
use super::router::{create_health_router, create_router};

/// Fallback when the configured sweep interval cannot be represented.
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// Build the shared application state from configuration.
///
/// Every time-dependent component receives the same clock, so tests can
/// drive token and CSRF expiry together.
pub fn build_state(config: &Config, db: &Database, clock: Arc<dyn Clock>) -> Result<Arc<AppState>> {
    let access_ttl = config.auth.access_ttl()?;
    let refresh_ttl = config.auth.refresh_ttl()?;

    let signer = Arc::new(TokenSigner::new(
        &config.auth.jwt_secret,
        access_ttl,
        refresh_ttl,
        clock.clone(),
    ));
    let refresh_tokens = RefreshTokenStore::new(
        db.pool().clone(),
        clock.clone(),
        refresh_ttl,
        config.auth.refresh_lookup_window,
    );
    let csrf = CsrfTokenManager::new(config.csrf.ttl()?, clock.clone());
    let sessions = SessionService::new(signer, refresh_tokens, csrf, db.pool().clone());

    Ok(Arc::new(AppState::new(
        sessions,
        CookieSettings::from_config(&config.auth),
        clock,
    )))
}

/// Web server for the API.
pub struct WebServer {
    /// Server address.
    addr: SocketAddr,
    /// Application state.
    state: Arc<AppState>,
    /// Allowed CORS origins.
    cors_origins: Vec<String>,
    /// CSRF sweep interval.
    sweep_interval: Duration,
}

impl WebServer {
    /// Create a new web server with the system clock.
    pub fn new(config: &Config, db: Database) -> Result<Self> {
        Self::with_clock(config, db, Arc::new(SystemClock))
    }

    /// Create a new web server with an explicit clock.
    pub fn with_clock(config: &Config, db: Database, clock: Arc<dyn Clock>) -> Result<Self> {
        let addr = format!("{}:{}", config.server.host, config.server.port)
            .parse()
            .map_err(|_| {
                GatehouseError::Config(format!(
                    "invalid server address {}:{}",
                    config.server.host, config.server.port
                ))
            })?;

        let state = build_state(config, &db, clock)?;
        let sweep_interval = config
            .csrf
            .sweep()?
            .to_std()
            .unwrap_or(DEFAULT_SWEEP_INTERVAL);

        Ok(Self {
            addr,
            state,
            cors_origins: config.server.cors_origins.clone(),
            sweep_interval,
        })
    }

    /// Get the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Start the refresh token cleanup background task.
    ///
    /// Runs every hour and removes expired refresh token records.
    fn start_token_cleanup_task(refresh_tokens: RefreshTokenStore) {
        tokio::spawn(async move {
            const CLEANUP_INTERVAL_SECS: u64 = 3600;

            let mut interval = tokio::time::interval(Duration::from_secs(CLEANUP_INTERVAL_SECS));

            // Skip the first immediate tick
            interval.tick().await;

            loop {
                interval.tick().await;

                match refresh_tokens.cleanup_expired().await {
                    Ok(count) => {
                        if count > 0 {
                            tracing::info!(
                                deleted_count = count,
                                "Cleaned up expired refresh tokens"
                            );
                        } else {
                            tracing::debug!("No expired refresh tokens to clean up");
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to cleanup refresh tokens");
                    }
                }
            }
        });
    }

    /// Run the web server until interrupted.
    pub async fn run(self) -> std::io::Result<()> {
        let router = create_router(self.state.clone(), &self.cors_origins)
            .merge(create_health_router());

        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;

        // Background tasks start after a successful bind
        self.state.sessions.csrf().start_sweeper(self.sweep_interval);
        Self::start_token_cleanup_task(self.state.sessions.refresh_tokens().clone());

        tracing::info!("Web server listening on http://{}", local_addr);

        let csrf = self.state.sessions.csrf().clone();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        // Process-local CSRF tokens do not survive a restart anyway
        csrf.shutdown();
        Ok(())
    }
}
