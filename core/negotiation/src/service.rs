use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use kontor_enforcement::{AccessCounterStore, InMemoryCounterStore};

use crate::audit::{AuditPublisher, LogPublisher};
use crate::automation::{AutoPilot, AutomationRules};
use crate::config::Config;
use crate::db::{AgreementStore, InMemoryStore, NegotiationStore, OfferStore};
use crate::negotiation::{CommonBroker, ConsumerBroker, ProviderBroker, StateNotifier};
use crate::protocol::{
    CallbackTransport, ConsumerApi, HttpCallbackTransport, InboundRouter, ProviderApi,
};
use crate::validation::{AcceptAllValidator, OfferValidator};

/// One connector's negotiation stack: both role brokers over one store,
/// wired to a callback transport, with the automation driver on the side.
pub struct NegotiationService {
    pub provider: ProviderBroker,
    pub consumer: ConsumerBroker,
    notifier: StateNotifier,
    rules: Arc<AutomationRules>,
    config: Arc<Config>,
    driver: Option<JoinHandle<()>>,
}

impl NegotiationService {
    /// Must run inside a tokio runtime when automation is enabled; the
    /// driver task is spawned right here.
    pub fn new<S>(
        config: Config,
        store: Arc<S>,
        transport: Arc<dyn CallbackTransport>,
        validator: Arc<dyn OfferValidator>,
        audit: Arc<dyn AuditPublisher>,
        counters: Arc<dyn AccessCounterStore>,
    ) -> NegotiationService
    where
        S: NegotiationStore + OfferStore + AgreementStore + 'static,
    {
        let config = Arc::new(config);
        let (auto_tx, auto_rx) = match config.automation.enabled {
            true => {
                let (tx, rx) = mpsc::channel(config.automation.queue_size);
                (Some(tx), Some(rx))
            }
            false => (None, None),
        };

        let common = CommonBroker::new(
            store.clone(),
            store.clone(),
            store,
            audit,
            auto_tx,
            config.clone(),
        );
        let notifier = common.notifier().clone();
        let provider = ProviderBroker::new(
            common.clone(),
            ProviderApi::new(transport.clone()),
            validator,
            counters,
        );
        let consumer = ConsumerBroker::new(common, ConsumerApi::new(transport));

        let rules = Arc::new(AutomationRules::new());
        let driver = auto_rx.map(|rx| {
            log::info!(
                "Starting negotiation automation driver for connector [{}].",
                config.connector.connector_id
            );
            AutoPilot::spawn(rules.clone(), provider.clone(), consumer.clone(), rx)
        });

        NegotiationService {
            provider,
            consumer,
            notifier,
            rules,
            config,
            driver,
        }
    }

    /// Stack with the default collaborators: in-memory stores, HTTP
    /// callbacks, accept-everything validation and the log audit sink.
    pub fn standalone(config: Config) -> anyhow::Result<NegotiationService> {
        let transport = Arc::new(HttpCallbackTransport::new(&config.callback)?);
        Ok(NegotiationService::new(
            config,
            Arc::new(InMemoryStore::new()),
            transport,
            Arc::new(AcceptAllValidator),
            Arc::new(LogPublisher),
            Arc::new(InMemoryCounterStore::new()),
        ))
    }

    /// Seam the embedding HTTP layer binds to.
    pub fn router(&self) -> InboundRouter {
        InboundRouter::new(self.provider.clone(), self.consumer.clone())
    }

    pub fn notifier(&self) -> &StateNotifier {
        &self.notifier
    }

    pub fn rules(&self) -> Arc<AutomationRules> {
        self.rules.clone()
    }

    pub fn config(&self) -> Arc<Config> {
        self.config.clone()
    }
}

impl Drop for NegotiationService {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}
