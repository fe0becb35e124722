//! Application state shared across request handlers.

use std::sync::Arc;

use crate::call::DomainClient;
use crate::config::Config;
use crate::correlator::Correlator;
use crate::dispatch::Dispatcher;
use crate::handlers::builtin_handlers;
use crate::registry::DomainRegistry;
use crate::supervisor::{LivenessProbe, ProcessSupervisor};

/// Shared application state.
///
/// This is passed to all request handlers via Axum's state extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    registry: Arc<DomainRegistry>,
    correlator: Arc<Correlator>,
    dispatcher: Dispatcher,
    client: DomainClient,
    supervisor: Arc<ProcessSupervisor>,
}

impl AppState {
    /// Wires registry, correlator, dispatcher and supervisor together.
    pub fn new(config: &Config, probe: Arc<dyn LivenessProbe>) -> Self {
        let registry = Arc::new(DomainRegistry::new());
        let correlator = Arc::new(Correlator::new(config.request_timeout));
        let handlers = Arc::new(builtin_handlers(Arc::clone(&registry)));

        let dispatcher = Dispatcher::new(Arc::clone(&registry), Arc::clone(&correlator), handlers)
            .fail_pending_on_disconnect(config.fail_pending_on_disconnect);
        let client = DomainClient::new(Arc::clone(&registry), Arc::clone(&correlator));
        let supervisor = Arc::new(ProcessSupervisor::new(
            config.supervisor(),
            probe,
            Arc::clone(&registry),
        ));

        Self {
            inner: Arc::new(AppStateInner {
                registry,
                correlator,
                dispatcher,
                client,
                supervisor,
            }),
        }
    }

    pub fn registry(&self) -> &Arc<DomainRegistry> {
        &self.inner.registry
    }

    pub fn correlator(&self) -> &Arc<Correlator> {
        &self.inner.correlator
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    /// Client for calling connected domains.
    pub fn client(&self) -> &DomainClient {
        &self.inner.client
    }

    pub fn supervisor(&self) -> &Arc<ProcessSupervisor> {
        &self.inner.supervisor
    }
}
