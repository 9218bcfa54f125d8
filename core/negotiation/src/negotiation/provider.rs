use chrono::Utc;
use metrics::counter;
use std::sync::Arc;

use kontor_enforcement::AccessCounterStore;
use kontor_model::message::{
    ContractAgreementMessage, ContractEventMessage, ContractOfferMessage, ContractRequestMessage,
    ContractTerminationMessage, ContractVerificationMessage, NegotiationEventType,
};
use kontor_model::{
    Agreement, Negotiation, NegotiationId, NegotiationState, Offer, OfferId, Pid, Role, StateError,
};

use super::common::{require_provider_pid, CommonBroker};
use super::error::NegotiationError;
use crate::audit::{AuditEvent, AuditEventKind};
use crate::protocol::ProviderApi;
use crate::utils::display;
use crate::validation::OfferValidator;

/// Provider half of the negotiation protocol: admits contract requests,
/// counter offers, issues agreements and finalizes. Keeps at most one live
/// negotiation per remote consumer pid.
#[derive(Clone)]
pub struct ProviderBroker {
    pub(super) common: CommonBroker,
    api: ProviderApi,
    validator: Arc<dyn OfferValidator>,
    counters: Arc<dyn AccessCounterStore>,
}

impl ProviderBroker {
    pub fn new(
        common: CommonBroker,
        api: ProviderApi,
        validator: Arc<dyn OfferValidator>,
        counters: Arc<dyn AccessCounterStore>,
    ) -> ProviderBroker {
        counter!("negotiation.provider.requested", 0);
        counter!("negotiation.provider.rejected", 0);
        counter!("negotiation.provider.offered", 0);
        counter!("negotiation.provider.accepted", 0);
        counter!("negotiation.provider.agreed", 0);
        counter!("negotiation.provider.verified", 0);
        counter!("negotiation.provider.finalized", 0);
        counter!("negotiation.provider.terminated", 0);
        counter!("negotiation.callback.failures", 0);

        ProviderBroker {
            common,
            api,
            validator,
            counters,
        }
    }

    /// Admits an incoming contract request. The negotiation is persisted at
    /// REQUESTED with a freshly minted provider pid; nothing is persisted
    /// when a guard or the validator turns the request down.
    pub async fn process_request(
        &self,
        msg: ContractRequestMessage,
    ) -> Result<Negotiation, NegotiationError> {
        if let Some(provider_pid) = &msg.provider_pid {
            if !provider_pid.is_blank() {
                log::warn!(
                    "Rejecting contract request of consumer pid [{}]. Provider pid [{}] must be left blank.",
                    msg.consumer_pid,
                    provider_pid
                );
                return Err(NegotiationError::ProviderPidNotBlank);
            }
        }
        if msg.consumer_pid.is_blank() {
            return Err(NegotiationError::MissingConsumerPid);
        }
        if self
            .common
            .store
            .provider_by_consumer_pid(&msg.consumer_pid)
            .await?
            .is_some()
        {
            log::warn!(
                "Rejecting contract request. Consumer pid [{}] is already negotiated.",
                msg.consumer_pid
            );
            return Err(NegotiationError::Exists(msg.consumer_pid));
        }

        if let Err(rejection) = self.validator.validate(&msg.offer).await {
            counter!("negotiation.provider.rejected", 1);
            log::info!(
                "Rejected offer [{}] for target [{}]: {}.",
                msg.offer.id,
                msg.offer.target,
                rejection
            );
            let mut event = AuditEvent::new(AuditEventKind::OfferRejected)
                .with_detail(rejection.reason.clone());
            event.consumer_pid = Some(msg.consumer_pid.clone());
            self.common.audit.publish(event);
            return Err(NegotiationError::OfferNotValid(rejection.reason));
        }

        let offer = self.canonical_offer(&msg.offer, &msg.callback_address);
        let assigner = offer
            .assigner
            .clone()
            .unwrap_or_else(|| self.common.config.connector.connector_id.clone());
        self.common.offers.save_offer(offer.clone()).await?;

        let negotiation = Negotiation::new(
            Role::Provider,
            NegotiationState::Requested,
            msg.consumer_pid.clone(),
            Some(Pid::generate()),
            offer,
            msg.callback_address.clone(),
            assigner,
        );
        let inserted = self.common.store.insert(negotiation).await?;
        counter!("negotiation.provider.requested", 1);
        log::info!(
            "Admitted contract request from [{}]. Negotiation [{}], provider pid [{}].",
            msg.callback_address,
            inserted.id,
            display::opt(&inserted.provider_pid)
        );
        self.common.after_insert(&inserted);
        Ok(inserted)
    }

    /// Counter offer: REQUESTED -> OFFERED. Without a replacement the held
    /// offer is repeated unchanged.
    pub async fn send_offer(
        &self,
        provider_pid: &Pid,
        replacement: Option<Offer>,
    ) -> Result<Negotiation, NegotiationError> {
        let negotiation = self.common.provider_side(provider_pid).await?;
        let _hold = self.common.lock.lock(&negotiation.id).await;

        let replacement =
            replacement.map(|offer| self.canonical_offer(&offer, &negotiation.callback_address));
        if let Some(offer) = &replacement {
            self.common.offers.save_offer(offer.clone()).await?;
        }
        let committed = self
            .common
            .commit_transition(&negotiation.id, NegotiationState::Offered, |next| {
                if let Some(offer) = replacement {
                    next.offer = offer;
                }
            })
            .await?;
        counter!("negotiation.provider.offered", 1);

        let msg = ContractOfferMessage {
            consumer_pid: Some(committed.consumer_pid.clone()),
            provider_pid: require_provider_pid(&committed)?,
            offer: committed.offer.clone(),
            callback_address: self.common.config.connector.public_address.to_string(),
        };
        if let Err(error) = self.api.send_offer(&committed.callback_address, &msg).await {
            self.common.dispatch_failed(&committed, &error);
        }
        Ok(committed)
    }

    /// Issues the Agreement: REQUESTED|ACCEPTED -> AGREED. The agreement and
    /// its enforcement counter are persisted before the transition commits,
    /// the message to the consumer goes out after.
    pub async fn approve(&self, provider_pid: &Pid) -> Result<Negotiation, NegotiationError> {
        let negotiation = self.common.provider_side(provider_pid).await?;
        let _hold = self.common.lock.lock(&negotiation.id).await;

        let fresh = self.common.get(&negotiation.id).await?;
        let assignee = fresh
            .offer
            .assignee
            .clone()
            .unwrap_or_else(|| fresh.callback_address.clone());
        let agreement =
            Agreement::from_offer(&fresh.offer, fresh.assigner.clone(), assignee, Utc::now());
        self.common
            .agreements
            .save_agreement(agreement.clone())
            .await?;
        self.counters
            .create(&agreement.id)
            .await
            .map_err(|error| NegotiationError::Internal(error.to_string()))?;

        let agreement_id = agreement.id.clone();
        let committed = self
            .common
            .commit_transition(&fresh.id, NegotiationState::Agreed, |next| {
                next.agreement_id = Some(agreement_id);
            })
            .await?;
        counter!("negotiation.provider.agreed", 1);
        log::info!(
            "Negotiation [{}] approved. Agreement [{}] issued.",
            committed.id,
            agreement.id
        );

        let msg = ContractAgreementMessage {
            consumer_pid: committed.consumer_pid.clone(),
            provider_pid: require_provider_pid(&committed)?,
            agreement,
            callback_address: self.common.config.connector.public_address.to_string(),
        };
        if let Err(error) = self
            .api
            .send_agreement(&committed.callback_address, &msg)
            .await
        {
            self.common.dispatch_failed(&committed, &error);
        }
        Ok(committed)
    }

    /// VERIFIED -> FINALIZED, announced to the consumer with a FINALIZED
    /// event.
    pub async fn finalize(&self, provider_pid: &Pid) -> Result<Negotiation, NegotiationError> {
        let negotiation = self.common.provider_side(provider_pid).await?;
        let _hold = self.common.lock.lock(&negotiation.id).await;

        let committed = self
            .common
            .commit_transition(&negotiation.id, NegotiationState::Finalized, |_| {})
            .await?;
        counter!("negotiation.provider.finalized", 1);

        let msg = ContractEventMessage {
            consumer_pid: committed.consumer_pid.clone(),
            provider_pid: require_provider_pid(&committed)?,
            event_type: NegotiationEventType::Finalized,
        };
        if let Err(error) = self.api.send_event(&committed.callback_address, &msg).await {
            self.common.dispatch_failed(&committed, &error);
        }
        Ok(committed)
    }

    pub async fn terminate(
        &self,
        provider_pid: &Pid,
        code: Option<String>,
        reason: Vec<String>,
    ) -> Result<Negotiation, NegotiationError> {
        let negotiation = self.common.provider_side(provider_pid).await?;
        let committed = self.common.terminate(&negotiation.id, &code, &reason).await?;
        counter!("negotiation.provider.terminated", 1);

        let msg = ContractTerminationMessage {
            consumer_pid: committed.consumer_pid.clone(),
            provider_pid: require_provider_pid(&committed)?,
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
        Ok(committed)
    }

    /// Consumer confirmed the Agreement: AGREED -> VERIFIED.
    pub async fn on_verification(
        &self,
        provider_pid: &Pid,
        msg: ContractVerificationMessage,
    ) -> Result<Negotiation, NegotiationError> {
        let negotiation = self.common.provider_side(provider_pid).await?;
        let _hold = self.common.lock.lock(&negotiation.id).await;

        let committed = self
            .common
            .commit_transition(&negotiation.id, NegotiationState::Verified, |_| {})
            .await?;
        counter!("negotiation.provider.verified", 1);
        log::info!(
            "Negotiation [{}] verified by consumer pid [{}].",
            committed.id,
            msg.consumer_pid
        );
        Ok(committed)
    }

    /// ACCEPTED moves the negotiation forward. A FINALIZED event is only
    /// acknowledged when this side already considers the contract final,
    /// which makes the finalization exchange idempotent.
    pub async fn on_event(
        &self,
        provider_pid: &Pid,
        msg: ContractEventMessage,
    ) -> Result<Negotiation, NegotiationError> {
        let negotiation = self.common.provider_side(provider_pid).await?;
        match msg.event_type {
            NegotiationEventType::Accepted => {
                let _hold = self.common.lock.lock(&negotiation.id).await;
                let committed = self
                    .common
                    .commit_transition(&negotiation.id, NegotiationState::Accepted, |_| {})
                    .await?;
                counter!("negotiation.provider.accepted", 1);
                Ok(committed)
            }
            NegotiationEventType::Finalized => {
                if negotiation.state == NegotiationState::Finalized {
                    Ok(negotiation)
                } else {
                    Err(StateError::InvalidTransition {
                        id: negotiation.id,
                        from: negotiation.state,
                        to: NegotiationState::Finalized,
                    }
                    .into())
                }
            }
        }
    }

    pub async fn on_termination(
        &self,
        provider_pid: &Pid,
        msg: ContractTerminationMessage,
    ) -> Result<Negotiation, NegotiationError> {
        let negotiation = self.common.provider_side(provider_pid).await?;
        let committed = self.common.on_termination(&negotiation, &msg).await?;
        counter!("negotiation.provider.terminated", 1);
        Ok(committed)
    }

    pub async fn get_negotiation(
        &self,
        id: &NegotiationId,
    ) -> Result<Negotiation, NegotiationError> {
        self.common.get(id).await
    }

    pub async fn get_by_provider_pid(
        &self,
        provider_pid: &Pid,
    ) -> Result<Negotiation, NegotiationError> {
        self.common.provider_side(provider_pid).await
    }

    pub async fn list(&self) -> Result<Vec<Negotiation>, NegotiationError> {
        Ok(self.common.store.list(Some(Role::Provider)).await?)
    }

    /// Provider-minted copy of a received offer. The wire id it arrived
    /// under stays visible as `original_id`.
    fn canonical_offer(&self, received: &Offer, consumer_callback: &str) -> Offer {
        Offer {
            id: OfferId::generate(),
            original_id: received
                .original_id
                .clone()
                .or_else(|| Some(received.id.clone())),
            assigner: received
                .assigner
                .clone()
                .or_else(|| Some(self.common.config.connector.connector_id.clone())),
            assignee: received
                .assignee
                .clone()
                .or_else(|| Some(consumer_callback.to_string())),
            target: received.target.clone(),
            permission: received.permission.clone(),
        }
    }
}
