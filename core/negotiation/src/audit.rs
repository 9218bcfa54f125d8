//! Fire and forget trail of everything the brokers decide. Publishing can
//! neither fail nor block, so the core flow never waits on the sink. The
//! default sink writes structured lines to the log; an event bus or external
//! collector can plug in behind the same trait.

use chrono::{DateTime, Utc};
use serde::Serialize;

use kontor_model::{Negotiation, NegotiationId, NegotiationState, Pid, Role};

#[derive(strum_macros::Display, Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventKind {
    NegotiationCreated,
    StateChanged,
    OfferRejected,
    TerminationSent,
    TerminationReceived,
    CallbackFailed,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub kind: AuditEventKind,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negotiation_id: Option<NegotiationId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumer_pid: Option<Pid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_pid: Option<Pid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<NegotiationState>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub detail: Vec<String>,
}

impl AuditEvent {
    pub fn new(kind: AuditEventKind) -> AuditEvent {
        AuditEvent {
            kind,
            timestamp: Utc::now(),
            negotiation_id: None,
            consumer_pid: None,
            provider_pid: None,
            role: None,
            state: None,
            detail: vec![],
        }
    }

    pub fn for_negotiation(kind: AuditEventKind, negotiation: &Negotiation) -> AuditEvent {
        let mut event = AuditEvent::new(kind);
        event.negotiation_id = Some(negotiation.id);
        event.consumer_pid = Some(negotiation.consumer_pid.clone());
        event.provider_pid = negotiation.provider_pid.clone();
        event.role = Some(negotiation.role);
        event.state = Some(negotiation.state);
        event
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> AuditEvent {
        self.detail.push(detail.into());
        self
    }

    pub fn with_details(mut self, details: &[String]) -> AuditEvent {
        self.detail.extend_from_slice(details);
        self
    }
}

pub trait AuditPublisher: Send + Sync {
    fn publish(&self, event: AuditEvent);
}

/// Default sink: one JSON line per event under the `kontor::audit` target.
pub struct LogPublisher;

impl AuditPublisher for LogPublisher {
    fn publish(&self, event: AuditEvent) {
        let line = serde_json::to_string(&event).unwrap_or_else(|_| format!("{:?}", event));
        log::info!(target: "kontor::audit", "{}", line);
    }
}
