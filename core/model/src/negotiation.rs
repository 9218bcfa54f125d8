use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::{AgreementId, NegotiationId, Pid};
use crate::policy::Offer;

#[derive(
    strum_macros::EnumString,
    strum_macros::Display,
    PartialEq,
    Eq,
    Debug,
    Clone,
    Copy,
    Hash,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NegotiationState {
    /// Created from a contract request. Provider still has to react.
    Requested,
    /// Provider answered with a (counter) offer.
    Offered,
    /// Consumer accepted the last offer.
    Accepted,
    /// Provider issued the Agreement.
    Agreed,
    /// Consumer confirmed the received Agreement.
    Verified,
    /// Both sides consider the contract in force.
    Finalized,
    /// Closed by either side. Nothing can follow.
    Terminated,
}

impl NegotiationState {
    /// Forward-only edge set. Termination is reachable from every live state.
    pub fn can_transit_to(self, to: NegotiationState) -> bool {
        use NegotiationState::*;
        if self.is_terminal() {
            return false;
        }
        if to == Terminated {
            return true;
        }
        matches!(
            (self, to),
            (Requested, Offered)
                | (Requested, Agreed)
                | (Offered, Accepted)
                | (Accepted, Agreed)
                | (Agreed, Verified)
                | (Verified, Finalized)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NegotiationState::Finalized | NegotiationState::Terminated
        )
    }
}

#[derive(
    strum_macros::Display, PartialEq, Eq, Debug, Clone, Copy, Hash, Serialize, Deserialize,
)]
pub enum Role {
    Provider,
    Consumer,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum StateError {
    #[error("Negotiation [{id}] can't transit from {from} to {to}.")]
    InvalidTransition {
        id: NegotiationId,
        from: NegotiationState,
        to: NegotiationState,
    },
}

/// One side's record of a contract negotiation. Instances are immutable
/// snapshots. Every change goes through [`Negotiation::transit_to`] or
/// [`Negotiation::updated`], which produce the successor revision to be
/// swapped into the store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Negotiation {
    pub id: NegotiationId,
    pub consumer_pid: Pid,
    /// Stays empty until the provider admits the request and mints its pid.
    pub provider_pid: Option<Pid>,
    pub role: Role,
    pub state: NegotiationState,
    /// Base address of the counterparty, used for all outgoing messages.
    pub callback_address: String,
    /// Participant granting the offer, i.e. the provider side of the contract.
    pub assigner: String,
    pub offer: Offer,
    pub agreement_id: Option<AgreementId>,
    pub created_ts: DateTime<Utc>,
    pub updated_ts: DateTime<Utc>,
    /// Bumped on every snapshot. The store refuses to swap in a snapshot
    /// that isn't the direct successor of what it holds.
    pub revision: u64,
}

impl Negotiation {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        role: Role,
        state: NegotiationState,
        consumer_pid: Pid,
        provider_pid: Option<Pid>,
        offer: Offer,
        callback_address: String,
        assigner: String,
    ) -> Negotiation {
        let now = Utc::now();
        Negotiation {
            id: NegotiationId::generate(),
            consumer_pid,
            provider_pid,
            role,
            state,
            callback_address,
            assigner,
            offer,
            agreement_id: None,
            created_ts: now,
            updated_ts: now,
            revision: 0,
        }
    }

    /// Builds the successor snapshot in the target state. The current
    /// snapshot is left untouched, also when the transition is illegal.
    pub fn transit_to(&self, to: NegotiationState) -> Result<Negotiation, StateError> {
        if !self.state.can_transit_to(to) {
            return Err(StateError::InvalidTransition {
                id: self.id,
                from: self.state,
                to,
            });
        }
        let mut next = self.updated();
        next.state = to;
        Ok(next)
    }

    /// Successor snapshot without a state change, for pid adoption and
    /// offer replacement.
    pub fn updated(&self) -> Negotiation {
        let mut next = self.clone();
        next.updated_ts = Utc::now();
        next.revision += 1;
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::OfferId;
    use crate::policy::Offer;
    use rand::seq::SliceRandom;
    use NegotiationState::*;

    const ALL_STATES: [NegotiationState; 7] = [
        Requested, Offered, Accepted, Agreed, Verified, Finalized, Terminated,
    ];

    fn sample_offer() -> Offer {
        Offer {
            id: OfferId::generate(),
            original_id: None,
            assigner: None,
            assignee: None,
            target: "urn:dataset:test".to_string(),
            permission: vec![],
        }
    }

    fn sample_negotiation(state: NegotiationState) -> Negotiation {
        let mut negotiation = Negotiation::new(
            Role::Provider,
            NegotiationState::Requested,
            Pid::generate(),
            Some(Pid::generate()),
            sample_offer(),
            "http://localhost:7151".to_string(),
            "urn:connector:provider".to_string(),
        );
        negotiation.state = state;
        negotiation
    }

    #[test]
    fn should_allow_only_forward_edges() {
        let allowed = [
            (Requested, Offered),
            (Requested, Agreed),
            (Offered, Accepted),
            (Accepted, Agreed),
            (Agreed, Verified),
            (Verified, Finalized),
        ];
        for from in ALL_STATES {
            for to in ALL_STATES {
                let expected = allowed.contains(&(from, to)) || (!from.is_terminal() && to == Terminated);
                assert_eq!(
                    from.can_transit_to(to),
                    expected,
                    "edge {} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn should_terminate_from_every_live_state() {
        for from in ALL_STATES {
            assert_eq!(from.can_transit_to(Terminated), !from.is_terminal());
        }
    }

    #[test]
    fn should_keep_terminal_states_closed() {
        for to in ALL_STATES {
            assert!(!Finalized.can_transit_to(to));
            assert!(!Terminated.can_transit_to(to));
        }
    }

    #[test]
    fn should_snapshot_on_transition() {
        let negotiation = sample_negotiation(Requested);
        let next = negotiation.transit_to(Offered).unwrap();

        assert_eq!(negotiation.state, Requested);
        assert_eq!(negotiation.revision, 0);
        assert_eq!(next.state, Offered);
        assert_eq!(next.revision, 1);
        assert_eq!(next.id, negotiation.id);
    }

    #[test]
    fn should_not_mutate_on_illegal_transition() {
        let negotiation = sample_negotiation(Requested);
        let error = negotiation.transit_to(Finalized).unwrap_err();

        assert_eq!(
            error,
            StateError::InvalidTransition {
                id: negotiation.id,
                from: Requested,
                to: Finalized,
            }
        );
        assert_eq!(negotiation.state, Requested);
        assert_eq!(negotiation.revision, 0);
    }

    #[test]
    fn should_never_leave_terminal_state_in_random_walk() {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let mut negotiation = sample_negotiation(Requested);
            for _ in 0..20 {
                let to = *ALL_STATES.choose(&mut rng).unwrap();
                let was_terminal = negotiation.state.is_terminal();
                match negotiation.transit_to(to) {
                    Ok(next) => {
                        assert!(!was_terminal);
                        assert_eq!(next.revision, negotiation.revision + 1);
                        negotiation = next;
                    }
                    Err(_) => {
                        // Walk continues from the unchanged snapshot.
                    }
                }
            }
        }
    }

    #[test]
    fn should_serialize_state_spelling() {
        let json = serde_json::to_value(NegotiationState::Agreed).unwrap();
        assert_eq!(json, serde_json::json!("AGREED"));
        let state: NegotiationState = serde_json::from_value(serde_json::json!("VERIFIED")).unwrap();
        assert_eq!(state, NegotiationState::Verified);
    }
}
