use chrono::{Duration, Utc};
use std::sync::Arc;

use kontor_enforcement::{AccessCounterStore, EnforcementEngine, InMemoryCounterStore};
use kontor_model::{Action, Agreement, AgreementId, Constraint, LeftOperand, Operator, Permission};

fn agreement_with(permission: Vec<Permission>) -> Agreement {
    Agreement {
        id: AgreementId::generate(),
        assigner: "urn:connector:provider".to_string(),
        assignee: "urn:connector:consumer".to_string(),
        target: "urn:dataset:weather".to_string(),
        timestamp: Utc::now(),
        permission,
    }
}

fn count_permission(operator: Operator, limit: &str) -> Permission {
    Permission::new(
        Action::Use,
        vec![Constraint::new(LeftOperand::Count, operator, limit)],
    )
}

#[tokio::test]
async fn unconstrained_agreement_is_valid() {
    let engine = EnforcementEngine::new(Arc::new(InMemoryCounterStore::new()));

    let agreement = agreement_with(vec![Permission::new(Action::Use, vec![])]);
    assert!(engine.is_agreement_valid(&agreement).await);

    let empty = agreement_with(vec![]);
    assert!(engine.is_agreement_valid(&empty).await);
}

#[tokio::test]
async fn count_limit_expires_with_usage() {
    let counters = Arc::new(InMemoryCounterStore::new());
    let engine = EnforcementEngine::new(counters.clone());

    let agreement = agreement_with(vec![count_permission(Operator::Lt, "2")]);
    counters.create(&agreement.id).await.unwrap();

    // Two accesses allowed, the third is past the limit.
    assert!(engine.is_agreement_valid(&agreement).await);
    counters.increment(&agreement.id).await.unwrap();
    assert!(engine.is_agreement_valid(&agreement).await);
    counters.increment(&agreement.id).await.unwrap();
    assert!(!engine.is_agreement_valid(&agreement).await);
}

#[tokio::test]
async fn count_without_registered_counter_is_denied() {
    let engine = EnforcementEngine::new(Arc::new(InMemoryCounterStore::new()));

    let agreement = agreement_with(vec![count_permission(Operator::Lteq, "100")]);
    let error = engine.validate_agreement(&agreement).await.unwrap_err();
    assert!(error.to_string().contains("COUNT LTEQ 100"));
}

#[tokio::test]
async fn missing_counter_does_not_affect_time_only_policies() {
    let engine = EnforcementEngine::new(Arc::new(InMemoryCounterStore::new()));

    let until = (Utc::now() + Duration::hours(1)).to_rfc3339();
    let agreement = agreement_with(vec![Permission::new(
        Action::Use,
        vec![Constraint::new(LeftOperand::DateTime, Operator::Lt, &until)],
    )]);
    assert!(engine.is_agreement_valid(&agreement).await);
}

#[tokio::test]
async fn expired_time_window_is_denied() {
    let engine = EnforcementEngine::new(Arc::new(InMemoryCounterStore::new()));

    let past = (Utc::now() - Duration::hours(1)).to_rfc3339();
    let agreement = agreement_with(vec![Permission::new(
        Action::Use,
        vec![Constraint::new(LeftOperand::DateTime, Operator::Lt, &past)],
    )]);
    assert!(!engine.is_agreement_valid(&agreement).await);
}

#[tokio::test]
async fn all_permissions_must_hold() {
    let counters = Arc::new(InMemoryCounterStore::new());
    let engine = EnforcementEngine::new(counters.clone());

    let until = (Utc::now() + Duration::hours(1)).to_rfc3339();
    let agreement = agreement_with(vec![
        Permission::new(
            Action::Use,
            vec![Constraint::new(LeftOperand::DateTime, Operator::Lt, &until)],
        ),
        count_permission(Operator::Lt, "1"),
    ]);
    counters.create(&agreement.id).await.unwrap();

    assert!(engine.is_agreement_valid(&agreement).await);
    counters.increment(&agreement.id).await.unwrap();
    assert!(!engine.is_agreement_valid(&agreement).await);
}

#[tokio::test]
async fn all_constraints_of_one_permission_must_hold() {
    let counters = Arc::new(InMemoryCounterStore::new());
    let engine = EnforcementEngine::new(counters.clone());

    let past = (Utc::now() - Duration::hours(1)).to_rfc3339();
    let agreement = agreement_with(vec![Permission::new(
        Action::Use,
        vec![
            Constraint::new(LeftOperand::Count, Operator::Lteq, "10"),
            Constraint::new(LeftOperand::DateTime, Operator::Lt, &past),
        ],
    )]);
    counters.create(&agreement.id).await.unwrap();

    let error = engine.validate_agreement(&agreement).await.unwrap_err();
    assert!(error.to_string().contains("DATE_TIME"));
}

#[tokio::test]
async fn unknown_constraint_vocabulary_is_denied() {
    let engine = EnforcementEngine::new(Arc::new(InMemoryCounterStore::new()));

    let agreement = agreement_with(vec![Permission::new(
        Action::Use,
        vec![Constraint::new(
            LeftOperand::Other("ELAPSED_TIME".into()),
            Operator::Lt,
            "PT1H",
        )],
    )]);
    assert!(!engine.is_agreement_valid(&agreement).await);
}
