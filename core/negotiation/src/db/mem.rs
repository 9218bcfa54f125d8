use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use kontor_model::{Agreement, AgreementId, Negotiation, NegotiationId, Offer, OfferId, Pid, Role};

use crate::db::store::{AgreementStore, NegotiationStore, OfferStore, StoreError};

/// The only storage backend shipped with the connector. Durable backends
/// hide behind the same traits.
#[derive(Default)]
pub struct InMemoryStore {
    negotiations: RwLock<HashMap<NegotiationId, Negotiation>>,
    offers: RwLock<HashMap<OfferId, Offer>>,
    agreements: RwLock<HashMap<AgreementId, Agreement>>,
}

impl InMemoryStore {
    pub fn new() -> InMemoryStore {
        Default::default()
    }
}

#[async_trait]
impl NegotiationStore for InMemoryStore {
    async fn insert(&self, negotiation: Negotiation) -> Result<Negotiation, StoreError> {
        let mut negotiations = self.negotiations.write().await;
        let taken = negotiations.values().any(|existing| {
            existing.role == negotiation.role && existing.consumer_pid == negotiation.consumer_pid
        });
        if taken {
            return Err(StoreError::PidsTaken(negotiation.consumer_pid));
        }
        negotiations.insert(negotiation.id, negotiation.clone());
        Ok(negotiation)
    }

    async fn update(&self, negotiation: Negotiation) -> Result<Negotiation, StoreError> {
        let mut negotiations = self.negotiations.write().await;
        let stored = negotiations
            .get(&negotiation.id)
            .ok_or(StoreError::NotFound(negotiation.id))?;
        if negotiation.revision != stored.revision + 1 {
            return Err(StoreError::RevisionConflict {
                id: negotiation.id,
                candidate: negotiation.revision,
                stored: stored.revision,
            });
        }
        negotiations.insert(negotiation.id, negotiation.clone());
        Ok(negotiation)
    }

    async fn get(&self, id: &NegotiationId) -> Result<Negotiation, StoreError> {
        self.negotiations
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound(*id))
    }

    async fn provider_by_pid(
        &self,
        provider_pid: &Pid,
    ) -> Result<Option<Negotiation>, StoreError> {
        Ok(self
            .negotiations
            .read()
            .await
            .values()
            .find(|negotiation| {
                negotiation.role == Role::Provider
                    && negotiation.provider_pid.as_ref() == Some(provider_pid)
            })
            .cloned())
    }

    async fn consumer_by_pid(
        &self,
        consumer_pid: &Pid,
    ) -> Result<Option<Negotiation>, StoreError> {
        Ok(self
            .negotiations
            .read()
            .await
            .values()
            .find(|negotiation| {
                negotiation.role == Role::Consumer && &negotiation.consumer_pid == consumer_pid
            })
            .cloned())
    }

    async fn provider_by_consumer_pid(
        &self,
        consumer_pid: &Pid,
    ) -> Result<Option<Negotiation>, StoreError> {
        Ok(self
            .negotiations
            .read()
            .await
            .values()
            .find(|negotiation| {
                negotiation.role == Role::Provider && &negotiation.consumer_pid == consumer_pid
            })
            .cloned())
    }

    async fn list(&self, role: Option<Role>) -> Result<Vec<Negotiation>, StoreError> {
        let negotiations = self.negotiations.read().await;
        let mut listed: Vec<Negotiation> = negotiations
            .values()
            .filter(|negotiation| role.map(|role| negotiation.role == role).unwrap_or(true))
            .cloned()
            .collect();
        listed.sort_by_key(|negotiation| negotiation.created_ts);
        Ok(listed)
    }
}

#[async_trait]
impl OfferStore for InMemoryStore {
    async fn save_offer(&self, offer: Offer) -> Result<Offer, StoreError> {
        self.offers.write().await.insert(offer.id.clone(), offer.clone());
        Ok(offer)
    }

    async fn get_offer(&self, id: &OfferId) -> Result<Offer, StoreError> {
        self.offers
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::OfferNotFound(id.clone()))
    }
}

#[async_trait]
impl AgreementStore for InMemoryStore {
    async fn save_agreement(&self, agreement: Agreement) -> Result<Agreement, StoreError> {
        self.agreements
            .write()
            .await
            .insert(agreement.id.clone(), agreement.clone());
        Ok(agreement)
    }

    async fn get_agreement(&self, id: &AgreementId) -> Result<Agreement, StoreError> {
        self.agreements
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::AgreementNotFound(id.clone()))
    }
}
