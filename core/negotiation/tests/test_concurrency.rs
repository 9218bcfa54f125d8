use futures::future::join_all;

use kontor_model::{NegotiationState, Pid};
use kontor_negotiation::testing::fixtures::{contract_request, sample_offer};
use kontor_negotiation::testing::TestDataspace;
use kontor_negotiation::NegotiationError;

#[cfg_attr(not(feature = "test-suite"), ignore)]
#[tokio::test]
async fn test_racing_requests_leave_a_single_winner() {
    let mut space = TestDataspace::new();
    space.add_node("provider");
    let provider = space.node("provider");

    let msg = contract_request(
        &Pid::generate(),
        sample_offer("urn:dataset:weather"),
        "http://consumer.mock/protocol",
    );
    let attempts = join_all(
        (0..8).map(|_| provider.provider().process_request(msg.clone())),
    )
    .await;

    let admitted = attempts.iter().filter(|outcome| outcome.is_ok()).count();
    assert_eq!(1, admitted);
    for outcome in attempts {
        if let Err(error) = outcome {
            assert!(matches!(error, NegotiationError::Exists(_)), "{}", error);
        }
    }
    assert_eq!(1, provider.provider().list().await.unwrap().len());
}

#[cfg_attr(not(feature = "test-suite"), ignore)]
#[tokio::test]
async fn test_terminate_racing_accept_closes_the_negotiation() {
    let mut space = TestDataspace::new();
    space.add_node("provider");
    space.add_node("consumer");
    let provider = space.node("provider");
    let consumer = space.node("consumer");

    let opened = consumer
        .consumer()
        .start_negotiation(sample_offer("urn:dataset:weather"), provider.address.clone())
        .await
        .unwrap();
    let provider_pid = opened.provider_pid.clone().unwrap();
    provider
        .provider()
        .send_offer(&provider_pid, None)
        .await
        .unwrap();

    let (accepted, terminated) = tokio::join!(
        consumer.consumer().accept(&opened.consumer_pid),
        consumer.consumer().terminate(
            &opened.consumer_pid,
            None,
            vec!["Withdrawn while deciding.".to_string()],
        )
    );

    // Whatever the interleaving, termination goes through and the accept
    // either lands before it or is turned down.
    assert!(terminated.is_ok());
    if let Err(error) = accepted {
        assert!(
            matches!(error, NegotiationError::InvalidTransition(_)),
            "{}",
            error
        );
    }
    assert_eq!(
        NegotiationState::Terminated,
        consumer
            .consumer()
            .get_by_consumer_pid(&opened.consumer_pid)
            .await
            .unwrap()
            .state
    );
    assert_eq!(
        NegotiationState::Terminated,
        provider
            .provider()
            .get_by_provider_pid(&provider_pid)
            .await
            .unwrap()
            .state
    );
}

#[cfg_attr(not(feature = "test-suite"), ignore)]
#[tokio::test]
async fn test_parallel_negotiations_stay_isolated() {
    let mut space = TestDataspace::new();
    space.add_node("provider");
    space.add_node("consumer");
    let provider = space.node("provider");
    let consumer = space.node("consumer");

    let consumer_pids = join_all((0..5).map(|i| {
        let target = format!("urn:dataset:flow-{}", i);
        async move {
            let opened = consumer
                .consumer()
                .start_negotiation(sample_offer(&target), provider.address.clone())
                .await
                .unwrap();
            let provider_pid = opened.provider_pid.clone().unwrap();
            provider.provider().approve(&provider_pid).await.unwrap();
            consumer
                .consumer()
                .verify(&opened.consumer_pid)
                .await
                .unwrap();
            provider.provider().finalize(&provider_pid).await.unwrap();
            opened.consumer_pid.clone()
        }
    }))
    .await;

    for consumer_pid in consumer_pids {
        assert_eq!(
            NegotiationState::Finalized,
            consumer
                .consumer()
                .get_by_consumer_pid(&consumer_pid)
                .await
                .unwrap()
                .state
        );
    }
    let provider_rows = provider.provider().list().await.unwrap();
    assert_eq!(5, provider_rows.len());
    assert!(provider_rows
        .iter()
        .all(|row| row.state == NegotiationState::Finalized));
}
