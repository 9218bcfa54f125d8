//! Rule driven negotiation. Operators register what should happen when a
//! negotiation for some target reaches a state; the driver task consumes
//! committed state changes and fires the matching broker operation. The
//! brokers push changes with `try_send` and never wait for the driver, so a
//! full queue costs automation coverage, not throughput.

use derive_more::Display;
use metrics::counter;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use kontor_model::{Negotiation, NegotiationId, NegotiationState, Pid, Role};

use crate::negotiation::error::NegotiationError;
use crate::negotiation::{ConsumerBroker, ProviderBroker};

/// Rule target matching every offer target.
pub const ANY_TARGET: &str = "*";

#[derive(Display, Clone, Copy, Debug, PartialEq, Eq)]
pub enum AutoAction {
    SendOffer,
    Approve,
    Accept,
    Verify,
    Finalize,
    Terminate,
}

impl AutoAction {
    /// Role the action belongs to. `Terminate` works for both sides.
    fn role(self) -> Option<Role> {
        match self {
            AutoAction::SendOffer | AutoAction::Approve | AutoAction::Finalize => {
                Some(Role::Provider)
            }
            AutoAction::Accept | AutoAction::Verify => Some(Role::Consumer),
            AutoAction::Terminate => None,
        }
    }
}

/// Projection of a committed snapshot, queued for the driver.
#[derive(Clone, Debug)]
pub struct StateChange {
    pub id: NegotiationId,
    pub role: Role,
    pub state: NegotiationState,
    pub target: String,
    pub consumer_pid: Pid,
    pub provider_pid: Option<Pid>,
}

impl StateChange {
    pub fn of(negotiation: &Negotiation) -> StateChange {
        StateChange {
            id: negotiation.id,
            role: negotiation.role,
            state: negotiation.state,
            target: negotiation.offer.target.clone(),
            consumer_pid: negotiation.consumer_pid.clone(),
            provider_pid: negotiation.provider_pid.clone(),
        }
    }
}

/// Rule table keyed by (offer target, reached state). An exact target rule
/// wins over an [`ANY_TARGET`] one.
#[derive(Default)]
pub struct AutomationRules {
    rules: RwLock<HashMap<(String, NegotiationState), AutoAction>>,
}

impl AutomationRules {
    pub fn new() -> AutomationRules {
        Default::default()
    }

    pub fn set_rule(
        &self,
        target: impl Into<String>,
        state: NegotiationState,
        action: AutoAction,
    ) {
        self.rules.write().insert((target.into(), state), action);
    }

    pub fn clear(&self) {
        self.rules.write().clear();
    }

    pub fn action_for(&self, target: &str, state: NegotiationState) -> Option<AutoAction> {
        let rules = self.rules.read();
        rules
            .get(&(target.to_string(), state))
            .copied()
            .or_else(|| rules.get(&(ANY_TARGET.to_string(), state)).copied())
    }

    /// Registers the whole happy path for `target`. A connector pair where
    /// both sides run these rules negotiates to FINALIZED without operator
    /// involvement.
    pub fn drive_to_finalized(&self, target: impl Into<String>) {
        use NegotiationState::*;
        let target = target.into();
        self.set_rule(target.clone(), Requested, AutoAction::Approve);
        self.set_rule(target.clone(), Offered, AutoAction::Accept);
        self.set_rule(target.clone(), Accepted, AutoAction::Approve);
        self.set_rule(target.clone(), Agreed, AutoAction::Verify);
        self.set_rule(target, Verified, AutoAction::Finalize);
    }
}

pub struct AutoPilot;

impl AutoPilot {
    /// Starts the driver task. It runs until the last holder of the sender
    /// side is gone. Each rule fires at most once per (negotiation, state);
    /// failures are logged and never bubble up.
    pub fn spawn(
        rules: Arc<AutomationRules>,
        provider: ProviderBroker,
        consumer: ConsumerBroker,
        mut rx: mpsc::Receiver<StateChange>,
    ) -> JoinHandle<()> {
        counter!("negotiation.automation.actions", 0);
        counter!("negotiation.automation.dropped", 0);

        tokio::spawn(async move {
            let mut fired: HashSet<(NegotiationId, NegotiationState)> = HashSet::new();
            while let Some(change) = rx.recv().await {
                let action = match rules.action_for(&change.target, change.state) {
                    Some(action) => action,
                    None => continue,
                };
                if let Some(required) = action.role() {
                    if required != change.role {
                        continue;
                    }
                }
                if !fired.insert((change.id, change.state)) {
                    continue;
                }

                counter!("negotiation.automation.actions", 1);
                log::info!(
                    "Automation fires {} for negotiation [{}] in state {}.",
                    action,
                    change.id,
                    change.state
                );
                if let Err(error) = run(&provider, &consumer, action, &change).await {
                    log::warn!(
                        "Automation {} for negotiation [{}] failed. {}",
                        action,
                        change.id,
                        error
                    );
                }
                if change.state.is_terminal() {
                    fired.retain(|(id, _)| *id != change.id);
                }
            }
            log::info!("Negotiation automation driver stopped.");
        })
    }
}

async fn run(
    provider: &ProviderBroker,
    consumer: &ConsumerBroker,
    action: AutoAction,
    change: &StateChange,
) -> Result<(), NegotiationError> {
    match action {
        AutoAction::SendOffer => {
            provider.send_offer(&provider_pid(change)?, None).await?;
        }
        AutoAction::Approve => {
            provider.approve(&provider_pid(change)?).await?;
        }
        AutoAction::Accept => {
            consumer.accept(&change.consumer_pid).await?;
        }
        AutoAction::Verify => {
            consumer.verify(&change.consumer_pid).await?;
        }
        AutoAction::Finalize => {
            provider.finalize(&provider_pid(change)?).await?;
        }
        AutoAction::Terminate => {
            let reason = vec!["Terminated by automation rule.".to_string()];
            match change.role {
                Role::Provider => {
                    provider
                        .terminate(&provider_pid(change)?, None, reason)
                        .await?;
                }
                Role::Consumer => {
                    consumer.terminate(&change.consumer_pid, None, reason).await?;
                }
            }
        }
    }
    Ok(())
}

fn provider_pid(change: &StateChange) -> Result<Pid, NegotiationError> {
    change.provider_pid.clone().ok_or_else(|| {
        NegotiationError::Internal(format!(
            "Negotiation [{}] has no provider pid for automation.",
            change.id
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use NegotiationState::*;

    #[test]
    fn should_prefer_exact_target_rule() {
        let rules = AutomationRules::new();
        rules.set_rule(ANY_TARGET, Requested, AutoAction::Terminate);
        rules.set_rule("urn:dataset:open", Requested, AutoAction::Approve);

        assert_eq!(
            Some(AutoAction::Approve),
            rules.action_for("urn:dataset:open", Requested)
        );
        assert_eq!(
            Some(AutoAction::Terminate),
            rules.action_for("urn:dataset:other", Requested)
        );
        assert_eq!(None, rules.action_for("urn:dataset:open", Offered));
    }

    #[test]
    fn should_register_full_happy_path() {
        let rules = AutomationRules::new();
        rules.drive_to_finalized("urn:dataset:auto");

        assert_eq!(
            Some(AutoAction::Approve),
            rules.action_for("urn:dataset:auto", Requested)
        );
        assert_eq!(
            Some(AutoAction::Accept),
            rules.action_for("urn:dataset:auto", Offered)
        );
        assert_eq!(
            Some(AutoAction::Approve),
            rules.action_for("urn:dataset:auto", Accepted)
        );
        assert_eq!(
            Some(AutoAction::Verify),
            rules.action_for("urn:dataset:auto", Agreed)
        );
        assert_eq!(
            Some(AutoAction::Finalize),
            rules.action_for("urn:dataset:auto", Verified)
        );
    }

    #[test]
    fn should_scope_actions_to_roles() {
        assert_eq!(Some(Role::Provider), AutoAction::Approve.role());
        assert_eq!(Some(Role::Consumer), AutoAction::Accept.role());
        assert_eq!(None, AutoAction::Terminate.role());
    }
}
