//! Wires the registry, session manager and router together.

use crate::connection_registry::ConnectionRegistry;
use crate::dispatch::{Fanout, OutboundSink};
use crate::router::EventRouter;
use crate::rules::RuleBook;
use crate::session::{SessionFactory, SessionManager};
use crate::transport::ConnectionTransport;
use jaby_core::config::JabyConfig;
use jaby_core::error::Result;
use jaby_core::repository::{ContextRepository, FactRepository};
use jaby_infrastructure::{DirContextRepository, DirFactRepository, JabyPaths};
use std::sync::Arc;

/// A fully assembled server core.
pub struct Runtime {
    pub registry: Arc<ConnectionRegistry>,
    pub sessions: Arc<SessionManager>,
    pub router: Arc<EventRouter>,
}

impl Runtime {
    /// Builds a runtime persisting to the configured data directory.
    ///
    /// # Errors
    ///
    /// Returns an error when no data directory is configured and the
    /// platform one cannot be determined.
    pub fn from_config(
        config: &JabyConfig,
        transport: Arc<dyn ConnectionTransport>,
    ) -> Result<Self> {
        let data_dir = JabyPaths::resolve_data_dir(config.storage.data_dir.as_deref())?;
        tracing::info!(data_dir = %data_dir.display(), "using data directory");

        Ok(Self::assemble(
            config,
            Arc::new(DirFactRepository::new(&data_dir)),
            Arc::new(DirContextRepository::new(&data_dir)),
            transport,
        ))
    }

    /// Builds a runtime over explicit repositories and the core rule book.
    pub fn assemble(
        config: &JabyConfig,
        fact_repository: Arc<dyn FactRepository>,
        context_repository: Arc<dyn ContextRepository>,
        transport: Arc<dyn ConnectionTransport>,
    ) -> Self {
        let factory = SessionFactory::new(RuleBook::core())
            .with_max_firings(config.session.max_firings_per_match);
        Self::with_factory(config, factory, fact_repository, context_repository, transport)
    }

    pub fn with_factory(
        config: &JabyConfig,
        factory: SessionFactory,
        fact_repository: Arc<dyn FactRepository>,
        context_repository: Arc<dyn ContextRepository>,
        transport: Arc<dyn ConnectionTransport>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let outbound: Arc<dyn OutboundSink> =
            Arc::new(Fanout::new(Arc::clone(&registry), transport));

        let sessions = Arc::new(SessionManager::new(
            Arc::clone(&registry),
            fact_repository,
            Arc::clone(&outbound),
            factory,
            config.session.grace_window(),
        ));
        let router = Arc::new(EventRouter::new(
            Arc::clone(&sessions),
            outbound,
            context_repository,
            config.context.ttl(),
        ));

        tracing::debug!(
            grace_window_secs = config.session.grace_window_secs,
            max_firings = config.session.max_firings_per_match,
            "runtime assembled"
        );

        Self {
            registry,
            sessions,
            router,
        }
    }
}
