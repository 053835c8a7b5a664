// Lifeline - Safety Server Module
// HTTP daemon exposing detection, crisis resources and session escalation

mod handlers;
mod session;

pub use handlers::{create_router, AppError};
pub use session::{SessionManager, SessionSnapshot};

pub use crate::config::ServerConfig;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::audit::{AuditHandle, AuditRecorder, AuditWorker};
use crate::config::Config;
use crate::errors::daemon_unreachable_error;
use crate::crisis::{
    Detector, EscalationController, Language, RegionCode, RegionLocator, ResourceTable,
    SafetySession,
};
use crate::metrics::Metrics;

/// Request faults with a dedicated HTTP status
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Flag not found: {0}")]
    FlagNotFound(String),

    #[error("Maximum session limit reached ({active}/{max})")]
    SessionLimit { active: usize, max: usize },

    #[error("{0}")]
    BadRequest(String),
}

/// Shared daemon state
pub struct SafetyServer {
    detector: Arc<Detector>,
    resources: Arc<ResourceTable>,
    locator: RegionLocator,
    recorder: Arc<dyn AuditRecorder>,
    audit: AuditHandle,
    session_manager: SessionManager,
    metrics: Arc<Metrics>,
    config: Config,
}

impl SafetyServer {
    /// Build the server and spawn its audit worker; needs a Tokio runtime
    pub fn new(config: Config, recorder: Arc<dyn AuditRecorder>) -> Result<Self> {
        let detector = Arc::new(Detector::new(&config.lexicons()));
        let resources = Arc::new(config.resources());
        let metrics = Arc::new(Metrics::new()?);

        let locator = if config.geolocation.enabled {
            RegionLocator::new(
                config.geolocation.endpoint.clone(),
                Duration::from_millis(config.geolocation.timeout_ms),
                config.default_region.clone(),
            )?
        } else {
            RegionLocator::disabled(config.default_region.clone())
        };

        let audit = AuditWorker::spawn(Arc::clone(&recorder), Some(Arc::clone(&metrics)));
        let session_manager = SessionManager::new(
            config.server.max_sessions,
            config.server.session_timeout_minutes,
            Some(Arc::clone(&metrics)),
        );

        Ok(Self {
            detector,
            resources,
            locator,
            recorder,
            audit,
            session_manager,
            metrics,
            config,
        })
    }

    pub fn with_locator(mut self, locator: RegionLocator) -> Self {
        self.locator = locator;
        self
    }

    /// Start the HTTP server
    pub async fn serve(self) -> Result<()> {
        let addr: SocketAddr = self
            .config
            .server
            .bind_address
            .parse()
            .with_context(|| format!("Invalid bind address {}", self.config.server.bind_address))?;

        let app = create_router(Arc::new(self))
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

        tracing::info!("Starting Lifeline safety server on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| daemon_unreachable_error(&addr.to_string()))?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    /// New session for a user; region comes from geolocation when absent
    pub async fn open_session(
        &self,
        user_id: &str,
        region: Option<&str>,
        language: Option<&str>,
    ) -> Result<String, ServerError> {
        let region = match region {
            Some(code) => code.to_string(),
            None => self.locator.locate().await.to_string(),
        };

        let language = match language {
            Some(tag) => Language::resolve_or(tag, self.config.default_language),
            None => match RegionCode::parse(&region) {
                Ok(code) if Language::suggested_for(&code) == Language::Ja => Language::Ja,
                _ => self.config.default_language,
            },
        };

        let controller = EscalationController::new(
            Arc::clone(&self.resources),
            &region,
            self.config.surfaces,
            self.audit.clone(),
        );
        let session = SafetySession::new(user_id, Arc::clone(&self.detector), language, controller);

        let id = self.session_manager.create(session)?;
        self.metrics.set_active_sessions(self.session_manager.active_count());
        Ok(id)
    }

    pub fn detector(&self) -> &Arc<Detector> {
        &self.detector
    }

    pub fn resources(&self) -> &Arc<ResourceTable> {
        &self.resources
    }

    pub fn recorder(&self) -> &Arc<dyn AuditRecorder> {
        &self.recorder
    }

    pub fn session_manager(&self) -> &SessionManager {
        &self.session_manager
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
