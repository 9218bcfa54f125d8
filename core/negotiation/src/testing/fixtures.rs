//! Offers and protocol messages most tests start from.

use chrono::{Duration, Utc};

use kontor_model::message::ContractRequestMessage;
use kontor_model::{
    Action, Constraint, LeftOperand, Offer, OfferId, Operator, Permission, Pid,
};

/// Unconstrained USE offer for `target`.
pub fn sample_offer(target: &str) -> Offer {
    Offer {
        id: OfferId::generate(),
        original_id: None,
        assigner: None,
        assignee: None,
        target: target.to_string(),
        permission: vec![Permission::new(Action::Use, vec![])],
    }
}

/// Offer whose agreement allows strictly fewer than `limit` accesses.
pub fn count_limited_offer(target: &str, limit: u64) -> Offer {
    let mut offer = sample_offer(target);
    offer.permission = vec![Permission::new(
        Action::Use,
        vec![Constraint::new(
            LeftOperand::Count,
            Operator::Lt,
            limit.to_string(),
        )],
    )];
    offer
}

/// Offer whose agreement expires `valid_for` from now.
pub fn time_bounded_offer(target: &str, valid_for: Duration) -> Offer {
    let mut offer = sample_offer(target);
    offer.permission = vec![Permission::new(
        Action::Use,
        vec![Constraint::new(
            LeftOperand::DateTime,
            Operator::Lt,
            (Utc::now() + valid_for).to_rfc3339(),
        )],
    )];
    offer
}

pub fn contract_request(
    consumer_pid: &Pid,
    offer: Offer,
    callback_address: &str,
) -> ContractRequestMessage {
    ContractRequestMessage {
        consumer_pid: consumer_pid.clone(),
        provider_pid: None,
        offer,
        callback_address: callback_address.to_string(),
    }
}
