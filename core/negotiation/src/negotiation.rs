mod common;
pub mod consumer;
pub mod error;
mod notifier;
pub mod provider;

pub use consumer::ConsumerBroker;
pub use notifier::{NotifierError, StateListener, StateNotifier};
pub use provider::ProviderBroker;

pub(crate) use common::CommonBroker;
