//! Admission control for incoming contract requests. The provider broker
//! consults the validator before a negotiation row is created, so a rejected
//! offer leaves no trace beyond the audit trail.

use async_trait::async_trait;

use kontor_model::Offer;

#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
#[error("{reason}")]
pub struct Rejection {
    pub reason: String,
}

impl Rejection {
    pub fn new(reason: impl Into<String>) -> Rejection {
        Rejection {
            reason: reason.into(),
        }
    }
}

#[async_trait]
pub trait OfferValidator: Send + Sync {
    /// Decides whether an offer may enter negotiation.
    async fn validate(&self, offer: &Offer) -> Result<(), Rejection>;
}

/// Admits every offer. Deployments plug a catalog backed validator in here.
pub struct AcceptAllValidator;

#[async_trait]
impl OfferValidator for AcceptAllValidator {
    async fn validate(&self, _offer: &Offer) -> Result<(), Rejection> {
        Ok(())
    }
}
