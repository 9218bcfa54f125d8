use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;

use kontor_model::{NegotiationId, NegotiationState};

pub type StateListener = broadcast::Receiver<(NegotiationId, NegotiationState)>;

#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum NotifierError {
    #[error("Timeout while waiting for negotiation [{0}].")]
    Timeout(NegotiationId),
    #[error("Notifier channel closed while waiting for negotiation [{0}].")]
    ChannelClosed(NegotiationId),
}

/// Wakes up everyone interested in committed negotiation changes. Sending
/// never blocks; a listener that can't keep up misses the oldest entries
/// and catches a later notification instead.
#[derive(Clone)]
pub struct StateNotifier {
    sender: broadcast::Sender<(NegotiationId, NegotiationState)>,
}

impl StateNotifier {
    pub fn new() -> StateNotifier {
        let (sender, _) = broadcast::channel(256);
        StateNotifier { sender }
    }

    /// Subscribe before triggering the change you want to observe.
    pub fn listen(&self) -> StateListener {
        self.sender.subscribe()
    }

    pub fn notify(&self, id: NegotiationId, state: NegotiationState) {
        // Error means no one listens right now. That's fine.
        let _ = self.sender.send((id, state));
    }

    pub async fn wait_for_state(
        &self,
        listener: &mut StateListener,
        id: NegotiationId,
        state: NegotiationState,
        timeout: Duration,
    ) -> Result<(), NotifierError> {
        let wait = async {
            loop {
                match listener.recv().await {
                    Ok((seen_id, seen_state)) if seen_id == id && seen_state == state => {
                        return Ok(())
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(NotifierError::ChannelClosed(id))
                    }
                }
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| NotifierError::Timeout(id))?
    }
}

impl Default for StateNotifier {
    fn default() -> Self {
        StateNotifier::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kontor_model::NegotiationState::*;

    #[tokio::test]
    async fn should_wake_up_waiting_listener() {
        let notifier = StateNotifier::new();
        let id = NegotiationId::generate();
        let mut listener = notifier.listen();

        notifier.notify(NegotiationId::generate(), Offered);
        notifier.notify(id, Offered);
        notifier.notify(id, Accepted);

        notifier
            .wait_for_state(&mut listener, id, Accepted, Duration::from_millis(100))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn should_timeout_without_matching_event() {
        let notifier = StateNotifier::new();
        let id = NegotiationId::generate();
        let mut listener = notifier.listen();

        notifier.notify(id, Offered);

        let result = notifier
            .wait_for_state(&mut listener, id, Finalized, Duration::from_millis(20))
            .await;
        assert_eq!(result, Err(NotifierError::Timeout(id)));
    }
}
