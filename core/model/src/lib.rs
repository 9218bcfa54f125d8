pub mod ids;
pub mod message;
pub mod negotiation;
pub mod policy;

pub use ids::{AgreementId, NegotiationId, NegotiationIdParseError, OfferId, Pid};
pub use negotiation::{Negotiation, NegotiationState, Role, StateError};
pub use policy::{Action, Agreement, Constraint, LeftOperand, Offer, Operator, Permission};
