//! Bilateral contract negotiation for the Kontor connector. One
//! [`NegotiationService`] instance plays both protocol roles: the provider
//! broker admits incoming contract requests and emits agreements, the
//! consumer broker opens negotiations and confirms what it receives. All
//! state lives behind the store ports in [`db`]; everything that leaves the
//! connector goes through the callback transport in [`protocol`].

pub mod audit;
pub mod automation;
pub mod config;
pub mod db;
mod negotiation;
pub mod protocol;
mod service;
pub mod testing;
pub mod validation;
pub(crate) mod utils;

pub use config::Config;
pub use negotiation::error::NegotiationError;
pub use negotiation::{ConsumerBroker, ProviderBroker, StateNotifier};
pub use service::NegotiationService;
