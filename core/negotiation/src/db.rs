pub mod mem;
pub mod store;

pub use mem::InMemoryStore;
pub use store::{AgreementStore, NegotiationStore, OfferStore, StoreError};
