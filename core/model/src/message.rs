//! Wire messages of the negotiation protocol, together with the path each
//! message is posted to, relative to the receiving connector's callback
//! address. JSON-LD framing of the upstream protocol is out of scope; the
//! payloads below are the plain camelCase projection of it.

use serde::{Deserialize, Serialize};

use crate::ids::Pid;
use crate::negotiation::NegotiationState;
use crate::policy::{Agreement, Offer};

/// Consumer opens a negotiation. The provider pid must still be blank.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractRequestMessage {
    pub consumer_pid: Pid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_pid: Option<Pid>,
    pub offer: Offer,
    pub callback_address: String,
}

/// Provider answers with an offer. Without a consumer pid this opens a fresh
/// negotiation on the consumer side.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractOfferMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer_pid: Option<Pid>,
    pub provider_pid: Pid,
    pub offer: Offer,
    pub callback_address: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractAgreementMessage {
    pub consumer_pid: Pid,
    pub provider_pid: Pid,
    pub agreement: Agreement,
    pub callback_address: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractVerificationMessage {
    pub consumer_pid: Pid,
    pub provider_pid: Pid,
}

#[derive(
    strum_macros::EnumString,
    strum_macros::Display,
    PartialEq,
    Eq,
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NegotiationEventType {
    Accepted,
    Finalized,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractEventMessage {
    pub consumer_pid: Pid,
    pub provider_pid: Pid,
    pub event_type: NegotiationEventType,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractTerminationMessage {
    pub consumer_pid: Pid,
    pub provider_pid: Pid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reason: Vec<String>,
}

/// Body of every 2xx protocol response: the receiver echoes its updated view
/// of the negotiation, which is how the consumer learns the minted
/// provider pid.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiationAck {
    pub consumer_pid: Pid,
    pub provider_pid: Pid,
    pub state: NegotiationState,
}

/// Error contract of the protocol surface. `reason` carries short
/// machine-matchable entries, `description` human readable detail.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiationErrorMessage {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer_pid: Option<Pid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_pid: Option<Pid>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reason: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub description: Vec<String>,
}

impl NegotiationErrorMessage {
    pub fn new(code: impl Into<String>) -> NegotiationErrorMessage {
        NegotiationErrorMessage {
            code: code.into(),
            consumer_pid: None,
            provider_pid: None,
            reason: vec![],
            description: vec![],
        }
    }

    pub fn with_pids(
        mut self,
        consumer_pid: Option<Pid>,
        provider_pid: Option<Pid>,
    ) -> NegotiationErrorMessage {
        self.consumer_pid = consumer_pid;
        self.provider_pid = provider_pid;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> NegotiationErrorMessage {
        self.reason.push(reason.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> NegotiationErrorMessage {
        self.description.push(description.into());
        self
    }
}

pub mod codes {
    pub const NEGOTIATION_NOT_FOUND: &str = "NEGOTIATION_NOT_FOUND";
    pub const NEGOTIATION_EXISTS: &str = "NEGOTIATION_EXISTS";
    pub const INVALID_STATE_TRANSITION: &str = "INVALID_STATE_TRANSITION";
    pub const OFFER_NOT_VALID: &str = "OFFER_NOT_VALID";
    pub const PROVIDER_PID_NOT_BLANK: &str = "PROVIDER_PID_NOT_BLANK";
    pub const POLICY_ENFORCEMENT_FAILURE: &str = "POLICY_ENFORCEMENT_FAILURE";
    pub const MESSAGE_MALFORMED: &str = "MESSAGE_MALFORMED";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

/// Paths exposed by the provider side, relative to its callback address.
pub mod provider {
    use super::Pid;

    pub fn request_addr() -> String {
        "negotiations/request".to_string()
    }

    pub fn events_addr(provider_pid: &Pid) -> String {
        format!("negotiations/{}/events", provider_pid)
    }

    pub fn verification_addr(provider_pid: &Pid) -> String {
        format!("negotiations/{}/agreement/verification", provider_pid)
    }

    pub fn termination_addr(provider_pid: &Pid) -> String {
        format!("negotiations/{}/termination", provider_pid)
    }
}

/// Paths exposed by the consumer side, relative to its callback address.
pub mod consumer {
    use super::Pid;

    pub fn initial_offer_addr() -> String {
        "negotiations/offers".to_string()
    }

    pub fn offers_addr(consumer_pid: &Pid) -> String {
        format!("negotiations/{}/offers", consumer_pid)
    }

    pub fn agreement_addr(consumer_pid: &Pid) -> String {
        format!("negotiations/{}/agreement", consumer_pid)
    }

    pub fn events_addr(consumer_pid: &Pid) -> String {
        format!("negotiations/{}/events", consumer_pid)
    }

    pub fn termination_addr(consumer_pid: &Pid) -> String {
        format!("negotiations/{}/termination", consumer_pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::OfferId;

    #[test]
    fn should_accept_request_without_provider_pid() {
        let msg: ContractRequestMessage = serde_json::from_value(serde_json::json!({
            "consumerPid": "urn:uuid:consumer-1",
            "offer": { "id": "urn:uuid:offer-1", "target": "urn:dataset:weather" },
            "callbackAddress": "http://consumer.example/callback",
        }))
        .unwrap();

        assert!(msg.provider_pid.is_none());
        assert_eq!(msg.offer.id, OfferId::from("urn:uuid:offer-1"));
        assert!(msg.offer.permission.is_empty());
    }

    #[test]
    fn should_keep_blank_provider_pid_visible() {
        // A blank pid is not the same as an absent one. The provider guard
        // decides, not the codec.
        let msg: ContractRequestMessage = serde_json::from_value(serde_json::json!({
            "consumerPid": "urn:uuid:consumer-1",
            "providerPid": "",
            "offer": { "id": "urn:uuid:offer-1", "target": "urn:dataset:weather" },
            "callbackAddress": "http://consumer.example/callback",
        }))
        .unwrap();

        assert!(msg.provider_pid.unwrap().is_blank());
    }

    #[test]
    fn should_serialize_event_type_spelling() {
        let msg = ContractEventMessage {
            consumer_pid: Pid::from("urn:uuid:c"),
            provider_pid: Pid::from("urn:uuid:p"),
            event_type: NegotiationEventType::Accepted,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["eventType"], serde_json::json!("ACCEPTED"));
    }

    #[test]
    fn should_skip_empty_error_fields() {
        let error = NegotiationErrorMessage::new(codes::NEGOTIATION_NOT_FOUND);
        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "code": "NEGOTIATION_NOT_FOUND" })
        );
    }

    #[test]
    fn should_compose_protocol_paths() {
        let pid = Pid::from("urn:uuid:p-1");
        assert_eq!(provider::request_addr(), "negotiations/request");
        assert_eq!(
            provider::verification_addr(&pid),
            "negotiations/urn:uuid:p-1/agreement/verification"
        );
        assert_eq!(
            consumer::offers_addr(&Pid::from("urn:uuid:c-1")),
            "negotiations/urn:uuid:c-1/offers"
        );
    }
}
