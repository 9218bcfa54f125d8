use serde::de::DeserializeOwned;
use serde_json::Value;

use kontor_model::message::{
    codes, ContractEventMessage, ContractTerminationMessage, NegotiationAck,
    NegotiationErrorMessage,
};
use kontor_model::{Negotiation, Pid};

use super::error::to_error_message;
use crate::negotiation::error::NegotiationError;
use crate::negotiation::{ConsumerBroker, ProviderBroker};

/// Both protocol surfaces of one connector behind a single dispatch seam.
/// The embedding HTTP layer hands in the path below its callback root plus
/// the JSON body; whatever comes back is the response body, with the status
/// taken from [`super::error::http_status`].
#[derive(Clone)]
pub struct InboundRouter {
    provider: ProviderBroker,
    consumer: ConsumerBroker,
}

impl InboundRouter {
    pub fn new(provider: ProviderBroker, consumer: ConsumerBroker) -> InboundRouter {
        InboundRouter { provider, consumer }
    }

    pub async fn dispatch(
        &self,
        path: &str,
        body: Value,
    ) -> Result<NegotiationAck, NegotiationErrorMessage> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let outcome = match segments.as_slice() {
            ["negotiations", "request"] => self.provider.process_request(parse(body)?).await,
            ["negotiations", "offers"] => self.consumer.on_offer(None, parse(body)?).await,
            ["negotiations", pid, "offers"] => {
                self.consumer.on_offer(Some(&Pid::from(*pid)), parse(body)?).await
            }
            ["negotiations", pid, "agreement"] => {
                self.consumer.on_agreement(&Pid::from(*pid), parse(body)?).await
            }
            ["negotiations", pid, "agreement", "verification"] => {
                self.provider.on_verification(&Pid::from(*pid), parse(body)?).await
            }
            ["negotiations", pid, "events"] => {
                self.route_event(&Pid::from(*pid), parse(body)?).await
            }
            ["negotiations", pid, "termination"] => {
                self.route_termination(&Pid::from(*pid), parse(body)?).await
            }
            _ => {
                return Err(NegotiationErrorMessage::new(codes::NEGOTIATION_NOT_FOUND)
                    .with_reason(format!("No protocol endpoint at [{}].", path)))
            }
        };
        outcome
            .map(|negotiation| ack_of(&negotiation))
            .map_err(|error| to_error_message(&error))
    }

    /// The pid in an event or termination path belongs to whichever side
    /// receives the message, so the provider surface is probed first and
    /// the consumer surface answers when the pid isn't a provider one.
    async fn route_event(
        &self,
        pid: &Pid,
        msg: ContractEventMessage,
    ) -> Result<Negotiation, NegotiationError> {
        match self.provider.on_event(pid, msg.clone()).await {
            Err(NegotiationError::PidNotFound(_)) => self.consumer.on_event(pid, msg).await,
            outcome => outcome,
        }
    }

    async fn route_termination(
        &self,
        pid: &Pid,
        msg: ContractTerminationMessage,
    ) -> Result<Negotiation, NegotiationError> {
        match self.provider.on_termination(pid, msg.clone()).await {
            Err(NegotiationError::PidNotFound(_)) => self.consumer.on_termination(pid, msg).await,
            outcome => outcome,
        }
    }
}

fn parse<T: DeserializeOwned>(body: Value) -> Result<T, NegotiationErrorMessage> {
    serde_json::from_value(body).map_err(|error| {
        NegotiationErrorMessage::new(codes::MESSAGE_MALFORMED)
            .with_reason("Malformed message body.")
            .with_description(error.to_string())
    })
}

fn ack_of(negotiation: &Negotiation) -> NegotiationAck {
    NegotiationAck {
        consumer_pid: negotiation.consumer_pid.clone(),
        provider_pid: negotiation
            .provider_pid
            .clone()
            .unwrap_or_else(|| Pid::from("")),
        state: negotiation.state,
    }
}
