//! Outbound halves of the protocol, one per role. Every send serializes the
//! message, posts it to the peer's callback address and expects the peer's
//! view of the negotiation back as a [`NegotiationAck`].

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use kontor_model::message::{
    consumer, provider, ContractAgreementMessage, ContractEventMessage, ContractOfferMessage,
    ContractRequestMessage, ContractTerminationMessage, ContractVerificationMessage,
    NegotiationAck, NegotiationErrorMessage,
};

use super::transport::{CallbackResponse, CallbackTransport, TransportError};

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Failed to encode protocol message. {0}")]
    Encode(String),
    #[error("Peer rejected the message with status {status}: {}.", reject_detail(.message))]
    Rejected {
        status: u16,
        message: Option<NegotiationErrorMessage>,
    },
    #[error("Peer answered with a malformed ack. {0}")]
    MalformedAck(String),
}

fn reject_detail(message: &Option<NegotiationErrorMessage>) -> String {
    match message {
        Some(message) if !message.reason.is_empty() => {
            format!("[{}] {}", message.code, message.reason.join("; "))
        }
        Some(message) => format!("[{}]", message.code),
        None => "no error payload".to_string(),
    }
}

/// Messages the provider sends to the consumer's callback address.
#[derive(Clone)]
pub struct ProviderApi {
    transport: Arc<dyn CallbackTransport>,
}

impl ProviderApi {
    pub fn new(transport: Arc<dyn CallbackTransport>) -> ProviderApi {
        ProviderApi { transport }
    }

    /// Without a consumer pid the offer opens a fresh negotiation on the
    /// consumer side.
    pub async fn send_offer(
        &self,
        address: &str,
        msg: &ContractOfferMessage,
    ) -> Result<NegotiationAck, DispatchError> {
        let path = match &msg.consumer_pid {
            Some(consumer_pid) => consumer::offers_addr(consumer_pid),
            None => consumer::initial_offer_addr(),
        };
        post_for_ack(self.transport.as_ref(), address, &path, msg).await
    }

    pub async fn send_agreement(
        &self,
        address: &str,
        msg: &ContractAgreementMessage,
    ) -> Result<NegotiationAck, DispatchError> {
        let path = consumer::agreement_addr(&msg.consumer_pid);
        post_for_ack(self.transport.as_ref(), address, &path, msg).await
    }

    pub async fn send_event(
        &self,
        address: &str,
        msg: &ContractEventMessage,
    ) -> Result<NegotiationAck, DispatchError> {
        let path = consumer::events_addr(&msg.consumer_pid);
        post_for_ack(self.transport.as_ref(), address, &path, msg).await
    }

    pub async fn send_termination(
        &self,
        address: &str,
        msg: &ContractTerminationMessage,
    ) -> Result<NegotiationAck, DispatchError> {
        let path = consumer::termination_addr(&msg.consumer_pid);
        post_for_ack(self.transport.as_ref(), address, &path, msg).await
    }
}

/// Messages the consumer sends to the provider's callback address.
#[derive(Clone)]
pub struct ConsumerApi {
    transport: Arc<dyn CallbackTransport>,
}

impl ConsumerApi {
    pub fn new(transport: Arc<dyn CallbackTransport>) -> ConsumerApi {
        ConsumerApi { transport }
    }

    pub async fn send_request(
        &self,
        address: &str,
        msg: &ContractRequestMessage,
    ) -> Result<NegotiationAck, DispatchError> {
        let path = provider::request_addr();
        post_for_ack(self.transport.as_ref(), address, &path, msg).await
    }

    pub async fn send_event(
        &self,
        address: &str,
        msg: &ContractEventMessage,
    ) -> Result<NegotiationAck, DispatchError> {
        let path = provider::events_addr(&msg.provider_pid);
        post_for_ack(self.transport.as_ref(), address, &path, msg).await
    }

    pub async fn send_verification(
        &self,
        address: &str,
        msg: &ContractVerificationMessage,
    ) -> Result<NegotiationAck, DispatchError> {
        let path = provider::verification_addr(&msg.provider_pid);
        post_for_ack(self.transport.as_ref(), address, &path, msg).await
    }

    pub async fn send_termination(
        &self,
        address: &str,
        msg: &ContractTerminationMessage,
    ) -> Result<NegotiationAck, DispatchError> {
        let path = provider::termination_addr(&msg.provider_pid);
        post_for_ack(self.transport.as_ref(), address, &path, msg).await
    }
}

async fn post_for_ack(
    transport: &dyn CallbackTransport,
    address: &str,
    path: &str,
    msg: &impl Serialize,
) -> Result<NegotiationAck, DispatchError> {
    let body =
        serde_json::to_value(msg).map_err(|error| DispatchError::Encode(error.to_string()))?;
    let response = transport.post(address, path, body).await?;
    expect_ack(response)
}

fn expect_ack(response: CallbackResponse) -> Result<NegotiationAck, DispatchError> {
    if response.is_success() {
        let body = response
            .body
            .ok_or_else(|| DispatchError::MalformedAck("Empty response body.".to_string()))?;
        serde_json::from_value(body).map_err(|error| DispatchError::MalformedAck(error.to_string()))
    } else {
        let message = response
            .body
            .and_then(|body| serde_json::from_value(body).ok());
        Err(DispatchError::Rejected {
            status: response.status,
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kontor_model::message::codes;
    use kontor_model::{NegotiationState, Pid};
    use serde_json::json;

    #[test]
    fn should_parse_ack_out_of_success() {
        let consumer_pid = Pid::generate();
        let provider_pid = Pid::generate();
        let response = CallbackResponse {
            status: 200,
            body: Some(json!({
                "consumerPid": consumer_pid.to_string(),
                "providerPid": provider_pid.to_string(),
                "state": "REQUESTED",
            })),
        };

        let ack = expect_ack(response).unwrap();
        assert_eq!(ack.consumer_pid, consumer_pid);
        assert_eq!(ack.provider_pid, provider_pid);
        assert_eq!(ack.state, NegotiationState::Requested);
    }

    #[test]
    fn should_surface_remote_rejection() {
        let response = CallbackResponse {
            status: 409,
            body: Some(json!({
                "code": codes::NEGOTIATION_EXISTS,
                "reason": ["Negotiation for consumer pid [x] already exists."],
            })),
        };

        match expect_ack(response).unwrap_err() {
            DispatchError::Rejected { status, message } => {
                assert_eq!(409, status);
                assert_eq!(codes::NEGOTIATION_EXISTS, message.unwrap().code);
            }
            other => panic!("expected rejection, got {}", other),
        }
    }

    #[test]
    fn should_refuse_empty_success_body() {
        let response = CallbackResponse {
            status: 204,
            body: None,
        };

        assert!(matches!(
            expect_ack(response),
            Err(DispatchError::MalformedAck(_))
        ));
    }
}
