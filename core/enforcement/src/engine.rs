use metrics::counter;
use std::sync::Arc;
use thiserror::Error;

use kontor_model::{Agreement, AgreementId, LeftOperand};

use crate::constraint::{evaluate, UsageSnapshot};
use crate::counter::AccessCounterStore;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EnforcementError {
    #[error("Agreement [{id}] violates its policy: {reason}.")]
    Denied { id: AgreementId, reason: String },
}

/// Decides whether an agreement still permits usage. An agreement is valid
/// iff every constraint of every permission holds right now. The engine only
/// reads the usage counter; incrementing after a granted access is the
/// transfer layer's move.
pub struct EnforcementEngine {
    counters: Arc<dyn AccessCounterStore>,
}

impl EnforcementEngine {
    pub fn new(counters: Arc<dyn AccessCounterStore>) -> EnforcementEngine {
        counter!("enforcement.decisions.allowed", 0);
        counter!("enforcement.decisions.denied", 0);
        EnforcementEngine { counters }
    }

    pub async fn is_agreement_valid(&self, agreement: &Agreement) -> bool {
        self.validate_agreement(agreement).await.is_ok()
    }

    pub async fn validate_agreement(&self, agreement: &Agreement) -> Result<(), EnforcementError> {
        let usage = UsageSnapshot::new(self.read_access_count(agreement).await);

        for permission in &agreement.permission {
            for constraint in &permission.constraint {
                if !evaluate(constraint, &usage) {
                    counter!("enforcement.decisions.denied", 1);
                    log::info!(
                        "Usage denied for Agreement [{}]. Constraint [{}] not satisfied.",
                        agreement.id,
                        constraint
                    );
                    return Err(EnforcementError::Denied {
                        id: agreement.id.clone(),
                        reason: constraint.to_string(),
                    });
                }
            }
        }

        counter!("enforcement.decisions.allowed", 1);
        log::debug!("Usage allowed for Agreement [{}].", agreement.id);
        Ok(())
    }

    /// Counter rows are only read when some COUNT constraint needs one, so
    /// agreements without usage limits never trip on a missing row.
    async fn read_access_count(&self, agreement: &Agreement) -> Option<u64> {
        let needs_count = agreement
            .permission
            .iter()
            .flat_map(|permission| &permission.constraint)
            .any(|constraint| constraint.left_operand == LeftOperand::Count);
        if !needs_count {
            return None;
        }
        match self.counters.get(&agreement.id).await {
            Ok(count) => Some(count),
            Err(e) => {
                log::warn!(
                    "Can't read usage counter for Agreement [{}]: {}",
                    agreement.id,
                    e
                );
                None
            }
        }
    }
}
