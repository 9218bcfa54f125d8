use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

use kontor_model::AgreementId;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CounterError {
    #[error("No usage counter registered for Agreement [{0}].")]
    NotFound(AgreementId),
    #[error("Usage counter storage failure: {0}.")]
    Storage(String),
}

/// Usage counters, one row per agreement. The row is created when the
/// agreement comes to life and incremented by the transfer layer after every
/// granted access. A missing row is an error, so an agreement nobody
/// registered can never pass a COUNT constraint.
#[async_trait]
pub trait AccessCounterStore: Send + Sync {
    /// Registers a counter at zero. Registering twice keeps the current value.
    async fn create(&self, id: &AgreementId) -> Result<(), CounterError>;

    async fn get(&self, id: &AgreementId) -> Result<u64, CounterError>;

    /// Bumps the counter and returns the new value.
    async fn increment(&self, id: &AgreementId) -> Result<u64, CounterError>;
}

#[derive(Default)]
pub struct InMemoryCounterStore {
    counters: RwLock<HashMap<AgreementId, u64>>,
}

impl InMemoryCounterStore {
    pub fn new() -> InMemoryCounterStore {
        Default::default()
    }
}

#[async_trait]
impl AccessCounterStore for InMemoryCounterStore {
    async fn create(&self, id: &AgreementId) -> Result<(), CounterError> {
        self.counters.write().await.entry(id.clone()).or_insert(0);
        Ok(())
    }

    async fn get(&self, id: &AgreementId) -> Result<u64, CounterError> {
        self.counters
            .read()
            .await
            .get(id)
            .copied()
            .ok_or_else(|| CounterError::NotFound(id.clone()))
    }

    async fn increment(&self, id: &AgreementId) -> Result<u64, CounterError> {
        let mut counters = self.counters.write().await;
        let count = counters
            .get_mut(id)
            .ok_or_else(|| CounterError::NotFound(id.clone()))?;
        *count += 1;
        Ok(*count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn should_report_missing_counter() {
        let store = InMemoryCounterStore::new();
        let id = AgreementId::generate();

        assert_eq!(store.get(&id).await, Err(CounterError::NotFound(id.clone())));
        assert_eq!(
            store.increment(&id).await,
            Err(CounterError::NotFound(id))
        );
    }

    #[tokio::test]
    async fn should_start_counting_from_zero() {
        let store = InMemoryCounterStore::new();
        let id = AgreementId::generate();

        store.create(&id).await.unwrap();
        assert_eq!(store.get(&id).await, Ok(0));
        assert_eq!(store.increment(&id).await, Ok(1));
        assert_eq!(store.increment(&id).await, Ok(2));
        assert_eq!(store.get(&id).await, Ok(2));
    }

    #[tokio::test]
    async fn should_keep_value_on_repeated_create() {
        let store = InMemoryCounterStore::new();
        let id = AgreementId::generate();

        store.create(&id).await.unwrap();
        store.increment(&id).await.unwrap();
        store.create(&id).await.unwrap();
        assert_eq!(store.get(&id).await, Ok(1));
    }
}
