use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

use kontor_enforcement::InMemoryCounterStore;
use kontor_model::Offer;

use crate::audit::{AuditEvent, AuditEventKind, AuditPublisher};
use crate::config::Config;
use crate::db::InMemoryStore;
use crate::negotiation::{ConsumerBroker, ProviderBroker, StateNotifier};
use crate::protocol::error::http_status;
use crate::protocol::{CallbackResponse, CallbackTransport, InboundRouter, TransportError};
use crate::service::NegotiationService;
use crate::validation::{AcceptAllValidator, OfferValidator, Rejection};

/// Delivers callback posts straight to the registered peer's router. What a
/// node can't reach by address behaves like a network failure.
#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    routers: Arc<parking_lot::RwLock<HashMap<String, InboundRouter>>>,
}

impl LoopbackNetwork {
    pub fn new() -> LoopbackNetwork {
        Default::default()
    }

    pub fn register(&self, address: &str, router: InboundRouter) {
        self.routers.write().insert(normalize(address), router);
    }

    /// Simulates the peer going dark.
    pub fn disconnect(&self, address: &str) {
        self.routers.write().remove(&normalize(address));
    }
}

fn normalize(address: &str) -> String {
    address.trim_end_matches('/').to_string()
}

#[async_trait]
impl CallbackTransport for LoopbackNetwork {
    async fn post(
        &self,
        address: &str,
        path: &str,
        body: Value,
    ) -> Result<CallbackResponse, TransportError> {
        let router = self.routers.read().get(&normalize(address)).cloned();
        let router = router.ok_or_else(|| TransportError::Request {
            address: address.to_string(),
            reason: "No connector registered under this address.".to_string(),
        })?;

        match router.dispatch(path, body).await {
            Ok(ack) => Ok(CallbackResponse {
                status: 200,
                body: serde_json::to_value(ack).ok(),
            }),
            Err(error) => Ok(CallbackResponse {
                status: http_status(&error.code),
                body: serde_json::to_value(error).ok(),
            }),
        }
    }
}

pub struct RejectingValidator {
    reason: String,
}

impl RejectingValidator {
    pub fn new(reason: impl Into<String>) -> RejectingValidator {
        RejectingValidator {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl OfferValidator for RejectingValidator {
    async fn validate(&self, _offer: &Offer) -> Result<(), Rejection> {
        Err(Rejection::new(self.reason.clone()))
    }
}

/// Audit sink that keeps every event for assertions.
#[derive(Default)]
pub struct CountingAudit {
    events: parking_lot::Mutex<Vec<AuditEvent>>,
}

impl CountingAudit {
    pub fn new() -> CountingAudit {
        Default::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, kind: AuditEventKind) -> usize {
        self.events.lock().iter().filter(|e| e.kind == kind).count()
    }
}

impl AuditPublisher for CountingAudit {
    fn publish(&self, event: AuditEvent) {
        self.events.lock().push(event);
    }
}

/// One connector inside a [`TestDataspace`], with handles to everything a
/// test wants to inspect.
pub struct TestNode {
    pub name: String,
    pub address: String,
    pub service: NegotiationService,
    pub store: Arc<InMemoryStore>,
    pub counters: Arc<InMemoryCounterStore>,
    pub audit: Arc<CountingAudit>,
}

impl TestNode {
    pub fn provider(&self) -> &ProviderBroker {
        &self.service.provider
    }

    pub fn consumer(&self) -> &ConsumerBroker {
        &self.service.consumer
    }

    pub fn notifier(&self) -> &StateNotifier {
        self.service.notifier()
    }
}

/// N complete connectors wired through a [`LoopbackNetwork`]. Must be built
/// inside a tokio runtime, the automation nodes spawn their driver task on
/// creation.
#[derive(Default)]
pub struct TestDataspace {
    net: LoopbackNetwork,
    nodes: HashMap<String, TestNode>,
}

impl TestDataspace {
    pub fn new() -> TestDataspace {
        Default::default()
    }

    pub fn add_node(&mut self, name: &str) -> &TestNode {
        self.add_custom_node(name, Arc::new(AcceptAllValidator), |_| {})
    }

    /// Node with the automation driver running.
    pub fn add_auto_node(&mut self, name: &str) -> &TestNode {
        self.add_custom_node(name, Arc::new(AcceptAllValidator), |config| {
            config.automation.enabled = true;
        })
    }

    pub fn add_custom_node(
        &mut self,
        name: &str,
        validator: Arc<dyn OfferValidator>,
        customize: impl FnOnce(&mut Config),
    ) -> &TestNode {
        let address = format!("http://{}.mock/protocol", name);
        let mut config = Config::from_env().unwrap();
        config.connector.connector_id = format!("urn:connector:{}", name);
        config.connector.public_address = Url::parse(&address).unwrap();
        customize(&mut config);

        let store = Arc::new(InMemoryStore::new());
        let counters = Arc::new(InMemoryCounterStore::new());
        let audit = Arc::new(CountingAudit::new());
        let service = NegotiationService::new(
            config,
            store.clone(),
            Arc::new(self.net.clone()),
            validator,
            audit.clone(),
            counters.clone(),
        );
        self.net.register(&address, service.router());

        self.nodes.insert(
            name.to_string(),
            TestNode {
                name: name.to_string(),
                address,
                service,
                store,
                counters,
                audit,
            },
        );
        self.node(name)
    }

    pub fn node(&self, name: &str) -> &TestNode {
        self.nodes
            .get(name)
            .unwrap_or_else(|| panic!("Unknown test node [{}].", name))
    }

    pub fn net(&self) -> &LoopbackNetwork {
        &self.net
    }
}
