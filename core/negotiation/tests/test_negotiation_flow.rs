use kontor_enforcement::{AccessCounterStore, EnforcementEngine};
use kontor_model::message::{consumer as consumer_paths, ContractOfferMessage};
use kontor_model::{NegotiationState, Pid};
use kontor_negotiation::audit::AuditEventKind;
use kontor_negotiation::db::AgreementStore;
use kontor_negotiation::protocol::CallbackTransport;
use kontor_negotiation::testing::fixtures::{count_limited_offer, sample_offer};
use kontor_negotiation::testing::TestDataspace;

#[cfg_attr(not(feature = "test-suite"), ignore)]
#[tokio::test]
async fn test_full_negotiation_to_finalized() {
    let mut space = TestDataspace::new();
    space.add_node("provider");
    space.add_node("consumer");
    let provider = space.node("provider");
    let consumer = space.node("consumer");

    // Consumer opens the negotiation. The ack carries the minted provider
    // pid, so both sides can address each other from here on.
    let opened = consumer
        .consumer()
        .start_negotiation(sample_offer("urn:dataset:weather"), provider.address.clone())
        .await
        .unwrap();
    assert_eq!(NegotiationState::Requested, opened.state);
    assert!(opened.provider_pid.is_some());

    let provider_row = provider.provider().list().await.unwrap().pop().unwrap();
    assert_eq!(NegotiationState::Requested, provider_row.state);
    assert_eq!(provider_row.consumer_pid, opened.consumer_pid);
    assert_eq!(provider_row.provider_pid, opened.provider_pid);
    let provider_pid = provider_row.provider_pid.clone().unwrap();

    // Provider answers with an offer.
    provider
        .provider()
        .send_offer(&provider_pid, None)
        .await
        .unwrap();
    let consumer_row = consumer
        .consumer()
        .get_by_consumer_pid(&opened.consumer_pid)
        .await
        .unwrap();
    assert_eq!(NegotiationState::Offered, consumer_row.state);

    // Consumer accepts, provider follows through the ACCEPTED event.
    consumer
        .consumer()
        .accept(&opened.consumer_pid)
        .await
        .unwrap();
    assert_eq!(
        NegotiationState::Accepted,
        provider
            .provider()
            .get_by_provider_pid(&provider_pid)
            .await
            .unwrap()
            .state
    );

    // Provider issues the Agreement; the consumer stores it verbatim.
    let agreed = provider.provider().approve(&provider_pid).await.unwrap();
    let agreement_id = agreed.agreement_id.clone().unwrap();
    let consumer_row = consumer
        .consumer()
        .get_by_consumer_pid(&opened.consumer_pid)
        .await
        .unwrap();
    assert_eq!(NegotiationState::Agreed, consumer_row.state);
    assert_eq!(Some(agreement_id.clone()), consumer_row.agreement_id);

    // Verification and finalization close the loop on both instances.
    consumer
        .consumer()
        .verify(&opened.consumer_pid)
        .await
        .unwrap();
    assert_eq!(
        NegotiationState::Verified,
        provider
            .provider()
            .get_by_provider_pid(&provider_pid)
            .await
            .unwrap()
            .state
    );
    provider.provider().finalize(&provider_pid).await.unwrap();

    assert_eq!(
        NegotiationState::Finalized,
        provider
            .provider()
            .get_by_provider_pid(&provider_pid)
            .await
            .unwrap()
            .state
    );
    assert_eq!(
        NegotiationState::Finalized,
        consumer
            .consumer()
            .get_by_consumer_pid(&opened.consumer_pid)
            .await
            .unwrap()
            .state
    );

    // Approving registered the enforcement counter at zero usages.
    assert_eq!(0, provider.counters.get(&agreement_id).await.unwrap());
    assert_eq!(0, provider.audit.count(AuditEventKind::CallbackFailed));
    assert_eq!(0, consumer.audit.count(AuditEventKind::CallbackFailed));
}

#[cfg_attr(not(feature = "test-suite"), ignore)]
#[tokio::test]
async fn test_direct_approval_skips_the_offer_exchange() {
    let mut space = TestDataspace::new();
    space.add_node("provider");
    space.add_node("consumer");
    let provider = space.node("provider");
    let consumer = space.node("consumer");

    let opened = consumer
        .consumer()
        .start_negotiation(sample_offer("urn:dataset:open"), provider.address.clone())
        .await
        .unwrap();
    let provider_pid = opened.provider_pid.clone().unwrap();

    // REQUESTED -> AGREED is a legal shortcut when the provider takes the
    // request as-is.
    provider.provider().approve(&provider_pid).await.unwrap();

    let consumer_row = consumer
        .consumer()
        .get_by_consumer_pid(&opened.consumer_pid)
        .await
        .unwrap();
    assert_eq!(NegotiationState::Agreed, consumer_row.state);
    assert!(consumer_row.agreement_id.is_some());
}

#[cfg_attr(not(feature = "test-suite"), ignore)]
#[tokio::test]
async fn test_counter_offer_replaces_held_offer() {
    let mut space = TestDataspace::new();
    space.add_node("provider");
    space.add_node("consumer");
    let provider = space.node("provider");
    let consumer = space.node("consumer");

    let opened = consumer
        .consumer()
        .start_negotiation(
            sample_offer("urn:dataset:metered"),
            provider.address.clone(),
        )
        .await
        .unwrap();
    let provider_pid = opened.provider_pid.clone().unwrap();
    let first_offer_id = provider
        .provider()
        .get_by_provider_pid(&provider_pid)
        .await
        .unwrap()
        .offer
        .id;

    let offered = provider
        .provider()
        .send_offer(&provider_pid, Some(count_limited_offer("urn:dataset:metered", 10)))
        .await
        .unwrap();
    assert_ne!(first_offer_id, offered.offer.id);

    // Consumer holds exactly the offer the provider sent.
    let consumer_row = consumer
        .consumer()
        .get_by_consumer_pid(&opened.consumer_pid)
        .await
        .unwrap();
    assert_eq!(offered.offer.id, consumer_row.offer.id);
    assert_eq!(offered.offer.permission, consumer_row.offer.permission);
}

#[cfg_attr(not(feature = "test-suite"), ignore)]
#[tokio::test]
async fn test_provider_initiated_negotiation() {
    let mut space = TestDataspace::new();
    space.add_node("consumer");
    let consumer = space.node("consumer");

    // A foreign provider opens the negotiation with an initial offer. Its
    // callback address is not reachable in this dataspace.
    let mut offer = sample_offer("urn:dataset:pushed");
    offer.assigner = Some("urn:connector:elsewhere".to_string());
    let msg = ContractOfferMessage {
        consumer_pid: None,
        provider_pid: Pid::generate(),
        offer,
        callback_address: "http://elsewhere.mock/protocol".to_string(),
    };
    let response = space
        .net()
        .post(
            &consumer.address,
            &consumer_paths::initial_offer_addr(),
            serde_json::to_value(&msg).unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(200, response.status);

    let row = consumer.consumer().list().await.unwrap().pop().unwrap();
    assert_eq!(NegotiationState::Offered, row.state);
    assert_eq!(Some(msg.provider_pid.clone()), row.provider_pid);

    // Accepting commits locally even though the peer can't be reached.
    let accepted = consumer.consumer().accept(&row.consumer_pid).await.unwrap();
    assert_eq!(NegotiationState::Accepted, accepted.state);
    assert_eq!(1, consumer.audit.count(AuditEventKind::CallbackFailed));
}

#[cfg_attr(not(feature = "test-suite"), ignore)]
#[tokio::test]
async fn test_agreement_enforces_negotiated_count_limit() {
    let mut space = TestDataspace::new();
    space.add_node("provider");
    space.add_node("consumer");
    let provider = space.node("provider");
    let consumer = space.node("consumer");

    let opened = consumer
        .consumer()
        .start_negotiation(
            count_limited_offer("urn:dataset:metered", 2),
            provider.address.clone(),
        )
        .await
        .unwrap();
    let provider_pid = opened.provider_pid.clone().unwrap();
    let agreed = provider.provider().approve(&provider_pid).await.unwrap();
    let agreement_id = agreed.agreement_id.clone().unwrap();

    let agreement = provider.store.get_agreement(&agreement_id).await.unwrap();
    let engine = EnforcementEngine::new(provider.counters.clone());

    // Two accesses fit under `COUNT LT 2`, the third doesn't.
    assert!(engine.is_agreement_valid(&agreement).await);
    provider.counters.increment(&agreement_id).await.unwrap();
    assert!(engine.is_agreement_valid(&agreement).await);
    provider.counters.increment(&agreement_id).await.unwrap();

    let error = engine.validate_agreement(&agreement).await.unwrap_err();
    assert!(error.to_string().contains("COUNT LT 2"));
}
