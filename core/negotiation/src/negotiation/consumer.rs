use metrics::counter;

use kontor_model::message::{
    ContractAgreementMessage, ContractEventMessage, ContractOfferMessage, ContractRequestMessage,
    ContractTerminationMessage, ContractVerificationMessage, NegotiationEventType,
};
use kontor_model::{Negotiation, NegotiationId, NegotiationState, Offer, Pid, Role};

use super::common::{require_provider_pid, CommonBroker};
use super::error::NegotiationError;
use crate::protocol::ConsumerApi;

/// Consumer half of the negotiation protocol: opens negotiations, decides on
/// received offers and confirms agreements. The provider pid is adopted from
/// the first message that carries it.
#[derive(Clone)]
pub struct ConsumerBroker {
    pub(super) common: CommonBroker,
    api: ConsumerApi,
}

impl ConsumerBroker {
    pub fn new(common: CommonBroker, api: ConsumerApi) -> ConsumerBroker {
        counter!("negotiation.consumer.started", 0);
        counter!("negotiation.consumer.offered", 0);
        counter!("negotiation.consumer.accepted", 0);
        counter!("negotiation.consumer.agreed", 0);
        counter!("negotiation.consumer.verified", 0);
        counter!("negotiation.consumer.finalized", 0);
        counter!("negotiation.consumer.terminated", 0);

        ConsumerBroker { common, api }
    }

    /// Opens a negotiation for `offer` with the provider behind
    /// `provider_address`. The REQUESTED snapshot is committed before the
    /// request goes out; when the dispatch fails the negotiation stays
    /// local until the provider side answers through another channel.
    pub async fn start_negotiation(
        &self,
        offer: Offer,
        provider_address: impl Into<String>,
    ) -> Result<Negotiation, NegotiationError> {
        let provider_address = provider_address.into();
        let assigner = offer
            .assigner
            .clone()
            .unwrap_or_else(|| provider_address.clone());
        self.common.offers.save_offer(offer.clone()).await?;

        let negotiation = Negotiation::new(
            Role::Consumer,
            NegotiationState::Requested,
            Pid::generate(),
            None,
            offer.clone(),
            provider_address.clone(),
            assigner,
        );
        let inserted = self.common.store.insert(negotiation).await?;
        counter!("negotiation.consumer.started", 1);
        log::info!(
            "Started negotiation [{}] with [{}] for target [{}].",
            inserted.id,
            provider_address,
            offer.target
        );
        self.common.after_insert(&inserted);

        let msg = ContractRequestMessage {
            consumer_pid: inserted.consumer_pid.clone(),
            provider_pid: None,
            offer,
            callback_address: self.common.config.connector.public_address.to_string(),
        };
        match self.api.send_request(&provider_address, &msg).await {
            Ok(ack) => {
                self.common
                    .adopt_provider_pid(&inserted.id, ack.provider_pid)
                    .await
            }
            Err(error) => {
                self.common.dispatch_failed(&inserted, &error);
                Ok(inserted)
            }
        }
    }

    /// Provider offer. With a known consumer pid this moves an open
    /// negotiation to OFFERED and replaces the held offer; without one the
    /// provider is opening the negotiation and a fresh consumer side row is
    /// created.
    pub async fn on_offer(
        &self,
        consumer_pid: Option<&Pid>,
        msg: ContractOfferMessage,
    ) -> Result<Negotiation, NegotiationError> {
        let consumer_pid = consumer_pid.cloned().or_else(|| msg.consumer_pid.clone());
        match consumer_pid {
            Some(consumer_pid) => {
                let negotiation = self.common.consumer_side(&consumer_pid).await?;
                let _hold = self.common.lock.lock(&negotiation.id).await;

                self.common.offers.save_offer(msg.offer.clone()).await?;
                let committed = self
                    .common
                    .commit_transition(&negotiation.id, NegotiationState::Offered, |next| {
                        next.offer = msg.offer;
                        next.provider_pid = Some(msg.provider_pid);
                    })
                    .await?;
                counter!("negotiation.consumer.offered", 1);
                Ok(committed)
            }
            None => {
                self.common.offers.save_offer(msg.offer.clone()).await?;
                let assigner = msg
                    .offer
                    .assigner
                    .clone()
                    .unwrap_or_else(|| msg.callback_address.clone());
                let negotiation = Negotiation::new(
                    Role::Consumer,
                    NegotiationState::Offered,
                    Pid::generate(),
                    Some(msg.provider_pid.clone()),
                    msg.offer,
                    msg.callback_address.clone(),
                    assigner,
                );
                let inserted = self.common.store.insert(negotiation).await?;
                counter!("negotiation.consumer.offered", 1);
                log::info!(
                    "Admitted offer from [{}]. Negotiation [{}], consumer pid [{}].",
                    msg.callback_address,
                    inserted.id,
                    inserted.consumer_pid
                );
                self.common.after_insert(&inserted);
                Ok(inserted)
            }
        }
    }

    /// OFFERED -> ACCEPTED, announced to the provider with an ACCEPTED
    /// event.
    pub async fn accept(&self, consumer_pid: &Pid) -> Result<Negotiation, NegotiationError> {
        let negotiation = self.common.consumer_side(consumer_pid).await?;
        let _hold = self.common.lock.lock(&negotiation.id).await;

        let committed = self
            .common
            .commit_transition(&negotiation.id, NegotiationState::Accepted, |_| {})
            .await?;
        counter!("negotiation.consumer.accepted", 1);

        let msg = ContractEventMessage {
            consumer_pid: committed.consumer_pid.clone(),
            provider_pid: require_provider_pid(&committed)?,
            event_type: NegotiationEventType::Accepted,
        };
        if let Err(error) = self.api.send_event(&committed.callback_address, &msg).await {
            self.common.dispatch_failed(&committed, &error);
        }
        Ok(committed)
    }

    /// Provider issued the Agreement. It is stored exactly as received;
    /// whether it can be acted on is the enforcement engine's call, made
    /// at usage time.
    pub async fn on_agreement(
        &self,
        consumer_pid: &Pid,
        msg: ContractAgreementMessage,
    ) -> Result<Negotiation, NegotiationError> {
        let negotiation = self.common.consumer_side(consumer_pid).await?;
        let _hold = self.common.lock.lock(&negotiation.id).await;

        self.common
            .agreements
            .save_agreement(msg.agreement.clone())
            .await?;
        let agreement_id = msg.agreement.id.clone();
        let committed = self
            .common
            .commit_transition(&negotiation.id, NegotiationState::Agreed, |next| {
                next.agreement_id = Some(agreement_id);
                if next.provider_pid.is_none() {
                    next.provider_pid = Some(msg.provider_pid);
                }
            })
            .await?;
        counter!("negotiation.consumer.agreed", 1);
        log::info!(
            "Negotiation [{}] received Agreement [{}].",
            committed.id,
            msg.agreement.id
        );
        Ok(committed)
    }

    /// AGREED -> VERIFIED, confirmed towards the provider.
    pub async fn verify(&self, consumer_pid: &Pid) -> Result<Negotiation, NegotiationError> {
        let negotiation = self.common.consumer_side(consumer_pid).await?;
        let _hold = self.common.lock.lock(&negotiation.id).await;

        let committed = self
            .common
            .commit_transition(&negotiation.id, NegotiationState::Verified, |_| {})
            .await?;
        counter!("negotiation.consumer.verified", 1);

        let msg = ContractVerificationMessage {
            consumer_pid: committed.consumer_pid.clone(),
            provider_pid: require_provider_pid(&committed)?,
        };
        if let Err(error) = self
            .api
            .send_verification(&committed.callback_address, &msg)
            .await
        {
            self.common.dispatch_failed(&committed, &error);
        }
        Ok(committed)
    }

    /// Only FINALIZED events land on the consumer side.
    pub async fn on_event(
        &self,
        consumer_pid: &Pid,
        msg: ContractEventMessage,
    ) -> Result<Negotiation, NegotiationError> {
        let negotiation = self.common.consumer_side(consumer_pid).await?;
        match msg.event_type {
            NegotiationEventType::Finalized => {
                let _hold = self.common.lock.lock(&negotiation.id).await;
                let committed = self
                    .common
                    .commit_transition(&negotiation.id, NegotiationState::Finalized, |_| {})
                    .await?;
                counter!("negotiation.consumer.finalized", 1);
                log::info!("Negotiation [{}] is in force.", committed.id);
                Ok(committed)
            }
            NegotiationEventType::Accepted => Err(NegotiationError::UnexpectedEvent {
                id: negotiation.id,
                event: msg.event_type,
            }),
        }
    }

    pub async fn on_termination(
        &self,
        consumer_pid: &Pid,
        msg: ContractTerminationMessage,
    ) -> Result<Negotiation, NegotiationError> {
        let negotiation = self.common.consumer_side(consumer_pid).await?;
        let committed = self.common.on_termination(&negotiation, &msg).await?;
        counter!("negotiation.consumer.terminated", 1);
        Ok(committed)
    }

    pub async fn terminate(
        &self,
        consumer_pid: &Pid,
        code: Option<String>,
        reason: Vec<String>,
    ) -> Result<Negotiation, NegotiationError> {
        let negotiation = self.common.consumer_side(consumer_pid).await?;
        let committed = self.common.terminate(&negotiation.id, &code, &reason).await?;
        counter!("negotiation.consumer.terminated", 1);

        match committed.provider_pid.clone() {
            Some(provider_pid) => {
                let msg = ContractTerminationMessage {
                    consumer_pid: committed.consumer_pid.clone(),
                    provider_pid,
                    code,
                    reason,
                };
                if let Err(error) = self
                    .api
                    .send_termination(&committed.callback_address, &msg)
                    .await
                {
                    self.common.dispatch_failed(&committed, &error);
                }
            }
            None => log::debug!(
                "Negotiation [{}] terminated before the provider acknowledged it. No peer to notify.",
                committed.id
            ),
        }
        Ok(committed)
    }

    pub async fn get_negotiation(
        &self,
        id: &NegotiationId,
    ) -> Result<Negotiation, NegotiationError> {
        self.common.get(id).await
    }

    pub async fn get_by_consumer_pid(
        &self,
        consumer_pid: &Pid,
    ) -> Result<Negotiation, NegotiationError> {
        self.common.consumer_side(consumer_pid).await
    }

    pub async fn list(&self) -> Result<Vec<Negotiation>, NegotiationError> {
        Ok(self.common.store.list(Some(Role::Consumer)).await?)
    }
}
