use metrics::counter;
use std::sync::Arc;
use tokio::sync::mpsc;

use kontor_model::message::ContractTerminationMessage;
use kontor_model::{Negotiation, NegotiationId, NegotiationState, Pid};

use super::error::NegotiationError;
use super::notifier::StateNotifier;
use crate::audit::{AuditEvent, AuditEventKind, AuditPublisher};
use crate::automation::StateChange;
use crate::config::Config;
use crate::db::{AgreementStore, NegotiationStore, OfferStore};
use crate::utils::display;
use crate::utils::lock::NegotiationLock;

/// State shared by both role brokers: the stores, the per negotiation lock
/// map, the notifier and the audit sink. Cloning is cheap, both brokers and
/// the automation driver hold the same instance.
#[derive(Clone)]
pub struct CommonBroker {
    pub(super) store: Arc<dyn NegotiationStore>,
    pub(super) offers: Arc<dyn OfferStore>,
    pub(super) agreements: Arc<dyn AgreementStore>,
    pub(super) lock: NegotiationLock,
    pub(super) notifier: StateNotifier,
    pub(super) audit: Arc<dyn AuditPublisher>,
    pub(super) auto_tx: Option<mpsc::Sender<StateChange>>,
    pub(super) config: Arc<Config>,
}

impl CommonBroker {
    pub fn new(
        store: Arc<dyn NegotiationStore>,
        offers: Arc<dyn OfferStore>,
        agreements: Arc<dyn AgreementStore>,
        audit: Arc<dyn AuditPublisher>,
        auto_tx: Option<mpsc::Sender<StateChange>>,
        config: Arc<Config>,
    ) -> CommonBroker {
        CommonBroker {
            store,
            offers,
            agreements,
            lock: NegotiationLock::new(),
            notifier: StateNotifier::new(),
            audit,
            auto_tx,
            config,
        }
    }

    pub fn notifier(&self) -> &StateNotifier {
        &self.notifier
    }

    pub(super) async fn get(&self, id: &NegotiationId) -> Result<Negotiation, NegotiationError> {
        Ok(self.store.get(id).await?)
    }

    pub(super) async fn provider_side(
        &self,
        provider_pid: &Pid,
    ) -> Result<Negotiation, NegotiationError> {
        self.store
            .provider_by_pid(provider_pid)
            .await?
            .ok_or_else(|| NegotiationError::PidNotFound(provider_pid.clone()))
    }

    pub(super) async fn consumer_side(
        &self,
        consumer_pid: &Pid,
    ) -> Result<Negotiation, NegotiationError> {
        self.store
            .consumer_by_pid(consumer_pid)
            .await?
            .ok_or_else(|| NegotiationError::PidNotFound(consumer_pid.clone()))
    }

    /// Single write path for every state change. Reloads the current
    /// snapshot, validates the edge, lets `adjust` shape the successor and
    /// swaps it in. Callers hold the per id lock; the store's revision
    /// check catches whoever slips past it.
    pub(super) async fn commit_transition(
        &self,
        id: &NegotiationId,
        to: NegotiationState,
        adjust: impl FnOnce(&mut Negotiation),
    ) -> Result<Negotiation, NegotiationError> {
        let current = self.store.get(id).await?;
        let mut next = current.transit_to(to)?;
        adjust(&mut next);
        let committed = self.store.update(next).await?;
        self.after_commit(&committed).await;
        Ok(committed)
    }

    pub(super) async fn after_commit(&self, committed: &Negotiation) {
        log::info!(
            "Negotiation [{}] switched to state {}. Role: {}.",
            committed.id,
            committed.state,
            committed.role
        );
        self.audit.publish(AuditEvent::for_negotiation(
            AuditEventKind::StateChanged,
            committed,
        ));
        self.push_auto_event(committed);
        self.notifier.notify(committed.id, committed.state);
        if committed.state.is_terminal() {
            self.lock.clear_locks(&committed.id).await;
        }
    }

    /// Counterpart of [`CommonBroker::after_commit`] for freshly inserted
    /// negotiations.
    pub(super) fn after_insert(&self, inserted: &Negotiation) {
        self.audit.publish(AuditEvent::for_negotiation(
            AuditEventKind::NegotiationCreated,
            inserted,
        ));
        self.push_auto_event(inserted);
        self.notifier.notify(inserted.id, inserted.state);
    }

    /// Consumer learns its counterpart's pid from the first ack or offer.
    pub(super) async fn adopt_provider_pid(
        &self,
        id: &NegotiationId,
        provider_pid: Pid,
    ) -> Result<Negotiation, NegotiationError> {
        let _hold = self.lock.lock(id).await;

        let current = self.store.get(id).await?;
        if current.provider_pid.as_ref() == Some(&provider_pid) {
            return Ok(current);
        }
        log::info!(
            "Negotiation [{}] adopted provider pid [{}].",
            id,
            provider_pid
        );
        let mut next = current.updated();
        next.provider_pid = Some(provider_pid);
        Ok(self.store.update(next).await?)
    }

    /// Termination initiated by the remote side. Both roles run through
    /// here so the failure semantics stay identical.
    pub(super) async fn on_termination(
        &self,
        negotiation: &Negotiation,
        msg: &ContractTerminationMessage,
    ) -> Result<Negotiation, NegotiationError> {
        let _hold = self.lock.lock(&negotiation.id).await;

        let committed = self
            .commit_transition(&negotiation.id, NegotiationState::Terminated, |_| {})
            .await?;
        log::info!(
            "Negotiation [{}] terminated by the counterparty. Code: {}. Reason: {}.",
            committed.id,
            display::opt(&msg.code),
            msg.reason.join("; ")
        );
        self.publish_termination(
            AuditEventKind::TerminationReceived,
            &committed,
            &msg.code,
            &msg.reason,
        );
        Ok(committed)
    }

    /// Termination decided locally. Dispatching the message to the peer is
    /// the role broker's job, after this committed.
    pub(super) async fn terminate(
        &self,
        id: &NegotiationId,
        code: &Option<String>,
        reason: &[String],
    ) -> Result<Negotiation, NegotiationError> {
        let _hold = self.lock.lock(id).await;

        let committed = self
            .commit_transition(id, NegotiationState::Terminated, |_| {})
            .await?;
        self.publish_termination(AuditEventKind::TerminationSent, &committed, code, reason);
        Ok(committed)
    }

    fn publish_termination(
        &self,
        kind: AuditEventKind,
        committed: &Negotiation,
        code: &Option<String>,
        reason: &[String],
    ) {
        let mut event = AuditEvent::for_negotiation(kind, committed);
        if let Some(code) = code {
            event = event.with_detail(code.clone());
        }
        event = event.with_details(reason);
        self.audit.publish(event);
    }

    /// Callbacks are fire and forget. A failed dispatch leaves the local
    /// state committed and the peers temporarily divergent; the audit trail
    /// records the gap.
    pub(super) fn dispatch_failed(&self, negotiation: &Negotiation, error: &dyn std::fmt::Display) {
        counter!("negotiation.callback.failures", 1);
        log::warn!(
            "Negotiation [{}] callback to [{}] failed. {}",
            negotiation.id,
            negotiation.callback_address,
            error
        );
        self.audit.publish(
            AuditEvent::for_negotiation(AuditEventKind::CallbackFailed, negotiation)
                .with_detail(error.to_string()),
        );
    }

    fn push_auto_event(&self, committed: &Negotiation) {
        if let Some(tx) = &self.auto_tx {
            if let Err(error) = tx.try_send(StateChange::of(committed)) {
                counter!("negotiation.automation.dropped", 1);
                log::warn!(
                    "Dropping state change of negotiation [{}] for the automation driver. {}",
                    committed.id,
                    error
                );
            }
        }
    }
}

pub(super) fn require_provider_pid(negotiation: &Negotiation) -> Result<Pid, NegotiationError> {
    negotiation
        .provider_pid
        .clone()
        .ok_or_else(|| NegotiationError::Internal(format!(
            "Negotiation [{}] doesn't know its provider pid yet.",
            negotiation.id
        )))
}
