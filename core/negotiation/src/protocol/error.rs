//! Wire projection of broker failures. Peers learn the failure class and a
//! short reason; storage, transport and other internal detail stays in the
//! local log.

use kontor_model::message::{codes, NegotiationErrorMessage};

use crate::negotiation::error::NegotiationError;

pub fn error_code(error: &NegotiationError) -> &'static str {
    match error {
        NegotiationError::NotFound(_)
        | NegotiationError::PidNotFound(_)
        | NegotiationError::AgreementMissing(_) => codes::NEGOTIATION_NOT_FOUND,
        NegotiationError::Exists(_) => codes::NEGOTIATION_EXISTS,
        NegotiationError::InvalidTransition(_) | NegotiationError::UnexpectedEvent { .. } => {
            codes::INVALID_STATE_TRANSITION
        }
        NegotiationError::OfferNotValid(_) => codes::OFFER_NOT_VALID,
        NegotiationError::ProviderPidNotBlank => codes::PROVIDER_PID_NOT_BLANK,
        NegotiationError::MissingConsumerPid => codes::MESSAGE_MALFORMED,
        NegotiationError::Enforcement(_) => codes::POLICY_ENFORCEMENT_FAILURE,
        NegotiationError::ConcurrentModification(_)
        | NegotiationError::Protocol(_)
        | NegotiationError::Store(_)
        | NegotiationError::Internal(_) => codes::INTERNAL_ERROR,
    }
}

pub fn to_error_message(error: &NegotiationError) -> NegotiationErrorMessage {
    let code = error_code(error);
    let message = NegotiationErrorMessage::new(code);
    match code {
        codes::INTERNAL_ERROR => message.with_reason("Internal error."),
        _ => message.with_reason(error.to_string()),
    }
}

/// Status the embedding HTTP layer (and the loopback harness) answers with.
pub fn http_status(code: &str) -> u16 {
    match code {
        codes::NEGOTIATION_NOT_FOUND => 404,
        codes::NEGOTIATION_EXISTS | codes::INVALID_STATE_TRANSITION => 409,
        codes::OFFER_NOT_VALID | codes::PROVIDER_PID_NOT_BLANK | codes::MESSAGE_MALFORMED => 400,
        codes::POLICY_ENFORCEMENT_FAILURE => 403,
        _ => 500,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StoreError;
    use kontor_model::Pid;

    #[test]
    fn should_expose_conflict_detail() {
        let pid = Pid::generate();
        let message = to_error_message(&NegotiationError::Exists(pid.clone()));

        assert_eq!(codes::NEGOTIATION_EXISTS, message.code);
        assert_eq!(
            vec![format!(
                "Negotiation for consumer pid [{}] already exists.",
                pid
            )],
            message.reason
        );
    }

    #[test]
    fn should_hide_internal_detail() {
        let error = NegotiationError::Store(StoreError::OfferNotFound(
            kontor_model::OfferId::from("urn:uuid:gone"),
        ));
        let message = to_error_message(&error);

        assert_eq!(codes::INTERNAL_ERROR, message.code);
        assert_eq!(vec!["Internal error.".to_string()], message.reason);
    }

    #[test]
    fn should_keep_status_classes_stable() {
        assert_eq!(404, http_status(codes::NEGOTIATION_NOT_FOUND));
        assert_eq!(409, http_status(codes::NEGOTIATION_EXISTS));
        assert_eq!(400, http_status(codes::PROVIDER_PID_NOT_BLANK));
        assert_eq!(403, http_status(codes::POLICY_ENFORCEMENT_FAILURE));
        assert_eq!(500, http_status(codes::INTERNAL_ERROR));
    }
}
