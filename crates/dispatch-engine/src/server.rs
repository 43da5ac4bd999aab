//! Server assembly: wires config, persistence, metrics, the engine, and
//! the REST router into one runnable unit.

use std::sync::Arc;
use tracing::{info, warn};

use crate::api::{self, ApiState};
use crate::config::DispatchConfig;
use crate::database::DatabaseManager;
use crate::dispatch::DispatchEngine;
use crate::error::{DispatchError, Result};
use crate::intake::CallIntake;
use crate::metrics::MetricsAggregator;
use crate::notify::{LogNotifier, NotificationService};
use crate::presence::PresenceRegistry;

/// Builder for a [`DispatchServer`].
///
/// ```no_run
/// use juricall_dispatch_engine::prelude::*;
///
/// # async fn example() -> Result<()> {
/// let server = DispatchServerBuilder::new()
///     .with_config(DispatchConfig::default())
///     .build()
///     .await?;
/// server.run().await?;
/// # Ok(())
/// # }
/// ```
pub struct DispatchServerBuilder {
    config: DispatchConfig,
    notifier: Option<Arc<dyn NotificationService>>,
}

impl DispatchServerBuilder {
    pub fn new() -> Self {
        Self {
            config: DispatchConfig::default(),
            notifier: None,
        }
    }

    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_database_path(mut self, path: impl Into<String>) -> Self {
        self.config.database.path = Some(path.into());
        self
    }

    /// Swap in a real notification transport; defaults to [`LogNotifier`].
    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationService>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub async fn build(self) -> Result<DispatchServer> {
        self.config.validate()?;

        let db = match self.config.database.path.as_deref() {
            Some(path) => match DatabaseManager::new(path).await {
                Ok(db) => Some(Arc::new(db)),
                Err(e) => {
                    warn!(
                        "failed to open database ({}); continuing in-memory only",
                        e
                    );
                    None
                }
            },
            None => None,
        };

        let registry = Arc::new(PresenceRegistry::new());
        let metrics = MetricsAggregator::new(self.config.metrics.clone());
        let notifier = self.notifier.unwrap_or_else(|| Arc::new(LogNotifier));
        let engine = DispatchEngine::new(
            self.config.clone(),
            registry,
            metrics,
            notifier,
            db.clone(),
        );

        // Recover non-terminal calls: pending calls re-enter dispatch,
        // assigned calls get a fresh acceptance window.
        if let Some(db) = &db {
            match db.load_open_calls().await {
                Ok(open) => {
                    let count = open.len();
                    for call in open {
                        let attempts = db
                            .load_attempts(&call.id)
                            .await
                            .unwrap_or_default();
                        engine.restore_call(call, attempts);
                    }
                    if count > 0 {
                        info!("♻️ recovered {} open call(s) from the database", count);
                    }
                }
                Err(e) => warn!("recovery failed (continuing empty): {}", e),
            }
        }

        Ok(DispatchServer {
            config: self.config,
            engine,
        })
    }
}

impl Default for DispatchServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The assembled dispatch service.
pub struct DispatchServer {
    config: DispatchConfig,
    engine: DispatchEngine,
}

impl DispatchServer {
    pub fn engine(&self) -> &DispatchEngine {
        &self.engine
    }

    /// Serve the REST API until the task is cancelled.
    pub async fn run(&self) -> Result<()> {
        let state = ApiState {
            engine: self.engine.clone(),
            intake: CallIntake::new(self.engine.clone()),
        };
        let app = api::create_router(state);

        let addr = self.config.general.bind_addr;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| DispatchError::configuration(format!("cannot bind {}: {}", addr, e)))?;
        info!("⚖️ dispatch API listening on http://{}", addr);

        axum::serve(listener, app)
            .await
            .map_err(|e| DispatchError::internal(format!("server error: {}", e)))
    }
}
