use thiserror::Error;

use kontor_enforcement::EnforcementError;
use kontor_model::message::NegotiationEventType;
use kontor_model::{NegotiationId, Pid, StateError};

use crate::db::StoreError;
use crate::protocol::DispatchError;

/// Everything a broker operation can fail with. The protocol layer maps
/// these onto wire error codes; variants carrying internals are collapsed
/// there so storage and transport details never leak to the peer.
#[derive(Error, Debug)]
pub enum NegotiationError {
    #[error("Negotiation [{0}] not found.")]
    NotFound(NegotiationId),
    #[error("Negotiation for pid [{0}] not found.")]
    PidNotFound(Pid),
    #[error("Negotiation for consumer pid [{0}] already exists.")]
    Exists(Pid),
    #[error("Contract request must leave the provider pid blank.")]
    ProviderPidNotBlank,
    #[error("Contract request must carry a non blank consumer pid.")]
    MissingConsumerPid,
    #[error(transparent)]
    InvalidTransition(#[from] StateError),
    #[error("Negotiation [{id}] can't process a {event} event on this side.")]
    UnexpectedEvent {
        id: NegotiationId,
        event: NegotiationEventType,
    },
    #[error("Negotiation [{0}] was modified concurrently. Reload and retry.")]
    ConcurrentModification(NegotiationId),
    #[error("Offer was rejected: {0}.")]
    OfferNotValid(String),
    #[error("Negotiation [{0}] carries no Agreement yet.")]
    AgreementMissing(NegotiationId),
    #[error(transparent)]
    Enforcement(#[from] EnforcementError),
    #[error(transparent)]
    Protocol(#[from] DispatchError),
    #[error("Storage failure. {0}")]
    Store(StoreError),
    #[error("Internal error. {0}")]
    Internal(String),
}

impl From<StoreError> for NegotiationError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(id) => NegotiationError::NotFound(id),
            StoreError::PidsTaken(pid) => NegotiationError::Exists(pid),
            StoreError::RevisionConflict { id, .. } => {
                NegotiationError::ConcurrentModification(id)
            }
            error => NegotiationError::Store(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_map_store_conflicts() {
        let id = NegotiationId::generate();
        let mapped: NegotiationError = StoreError::RevisionConflict {
            id,
            candidate: 3,
            stored: 4,
        }
        .into();

        assert_eq!(
            format!(
                "Negotiation [{}] was modified concurrently. Reload and retry.",
                id
            ),
            mapped.to_string()
        );
    }

    #[test]
    fn should_keep_linkage_failures_internal() {
        let offer_id = kontor_model::OfferId::from("urn:uuid:gone");
        let mapped: NegotiationError = StoreError::OfferNotFound(offer_id).into();

        assert!(matches!(mapped, NegotiationError::Store(_)));
    }
}
