use async_trait::async_trait;
use thiserror::Error;

use kontor_model::{Agreement, AgreementId, Negotiation, NegotiationId, Offer, OfferId, Pid, Role};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum StoreError {
    #[error("Negotiation [{0}] not found.")]
    NotFound(NegotiationId),
    #[error("Negotiation for consumer pid [{0}] is already tracked.")]
    PidsTaken(Pid),
    #[error("Negotiation [{id}] was modified concurrently. Revision {candidate} doesn't follow {stored}.")]
    RevisionConflict {
        id: NegotiationId,
        candidate: u64,
        stored: u64,
    },
    #[error("Offer [{0}] not found.")]
    OfferNotFound(OfferId),
    #[error("Agreement [{0}] not found.")]
    AgreementNotFound(AgreementId),
}

/// Negotiation records, stored as immutable snapshots. `update` swaps in a
/// successor snapshot and refuses anything that isn't revision + 1 of what
/// it currently holds, so racing writers can't silently overwrite each
/// other even if they slip past the broker locks.
#[async_trait]
pub trait NegotiationStore: Send + Sync {
    /// Uniqueness of the pid pair is checked under the same lock as the
    /// write. Two concurrent inserts for one consumer pid leave one winner.
    async fn insert(&self, negotiation: Negotiation) -> Result<Negotiation, StoreError>;

    async fn update(&self, negotiation: Negotiation) -> Result<Negotiation, StoreError>;

    async fn get(&self, id: &NegotiationId) -> Result<Negotiation, StoreError>;

    /// Provider side negotiation addressed the way the peer addresses it.
    async fn provider_by_pid(&self, provider_pid: &Pid)
        -> Result<Option<Negotiation>, StoreError>;

    /// Consumer side negotiation addressed the way the peer addresses it.
    async fn consumer_by_pid(&self, consumer_pid: &Pid)
        -> Result<Option<Negotiation>, StoreError>;

    /// Duplicate-request probe: the provider tracks at most one negotiation
    /// per remote consumer pid.
    async fn provider_by_consumer_pid(
        &self,
        consumer_pid: &Pid,
    ) -> Result<Option<Negotiation>, StoreError>;

    async fn list(&self, role: Option<Role>) -> Result<Vec<Negotiation>, StoreError>;
}

#[async_trait]
pub trait OfferStore: Send + Sync {
    async fn save_offer(&self, offer: Offer) -> Result<Offer, StoreError>;

    async fn get_offer(&self, id: &OfferId) -> Result<Offer, StoreError>;
}

#[async_trait]
pub trait AgreementStore: Send + Sync {
    async fn save_agreement(&self, agreement: Agreement) -> Result<Agreement, StoreError>;

    async fn get_agreement(&self, id: &AgreementId) -> Result<Agreement, StoreError>;
}
