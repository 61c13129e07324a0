//! Postgres store against a real database. Needs Docker:
//! cargo test --test postgres_store_tests -- --ignored

mod common;

use chrono::Utc;
use common::*;
use crew_core::domains::groups::NewGroup;
use crew_core::domains::join_requests::{JoinRequestStatus, RequestKey};
use crew_core::kernel::{BaseStore, BaseWalletLedger, PostgresStore, WalletCredit};
use uuid::Uuid;

/// Every test works on its own event so the shared database needs no reset.
fn unique_event() -> String {
    format!("event-{}", Uuid::new_v4())
}

async fn store() -> PostgresStore {
    let harness = PostgresHarness::new().await.expect("postgres harness");
    PostgresStore::new(harness.db_pool)
}

#[tokio::test]
#[ignore = "requires docker"]
async fn group_names_are_unique_per_event() {
    let store = store().await;
    let event = unique_event();
    let group = NewGroup {
        event_slug: event.clone(),
        name: GROUP.into(),
        owner_email: OWNER.into(),
        owner_name: "Owner".into(),
        cohort_capacity: 2,
        ..Default::default()
    };

    assert!(store.create_group(group.clone()).await.unwrap().is_some());
    assert!(store.create_group(group).await.unwrap().is_none());
    assert!(store.find_group(&event, GROUP).await.unwrap().is_some());
}

#[tokio::test]
#[ignore = "requires docker"]
async fn one_active_request_per_key() {
    let store = store().await;
    let mut input = new_request(MEMBER);
    input.event_slug = unique_event();
    let key = RequestKey::new(&input.event_slug, GROUP, MEMBER);

    let (first, created) = store.create_join_request_if_absent(input.clone()).await.unwrap();
    assert!(created);
    let (again, created) = store.create_join_request_if_absent(input.clone()).await.unwrap();
    assert!(!created);
    assert_eq!(first.id, again.id);

    store
        .transition_join_request(first.id, JoinRequestStatus::Pending, JoinRequestStatus::Refused)
        .await
        .unwrap()
        .expect("pending -> refused");
    let (second, created) = store.create_join_request_if_absent(input).await.unwrap();
    assert!(created);
    assert_ne!(first.id, second.id);

    let latest = store.find_latest_join_request(&key).await.unwrap().unwrap();
    assert_eq!(latest.id, second.id);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn status_and_scan_updates_are_compare_and_swap() {
    let store = store().await;
    let mut input = new_request(MEMBER);
    input.event_slug = unique_event();
    let (request, _) = store.create_join_request_if_absent(input).await.unwrap();

    assert!(store
        .mark_join_request_scanned(request.id, Utc::now())
        .await
        .unwrap()
        .is_none());

    store
        .transition_join_request(request.id, JoinRequestStatus::Pending, JoinRequestStatus::Accepted)
        .await
        .unwrap()
        .expect("pending -> accepted");
    assert!(store
        .transition_join_request(request.id, JoinRequestStatus::Pending, JoinRequestStatus::Refused)
        .await
        .unwrap()
        .is_none());

    let scanned = store
        .mark_join_request_scanned(request.id, Utc::now())
        .await
        .unwrap()
        .expect("first scan");
    assert!(scanned.payout_released);
    assert!(store
        .mark_join_request_scanned(request.id, Utc::now())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
#[ignore = "requires docker"]
async fn conversation_membership_and_log() {
    let store = store().await;
    let event = unique_event();

    let conversation = store.ensure_conversation(&event, GROUP).await.unwrap();
    let same = store.ensure_conversation(&event, GROUP).await.unwrap();
    assert_eq!(conversation.id, same.id);

    assert!(store.add_participant(conversation.id, MEMBER).await.unwrap());
    assert!(!store.add_participant(conversation.id, "A@X.com").await.unwrap());
    assert_eq!(
        store.participants(conversation.id).await.unwrap(),
        vec![MEMBER.to_string()]
    );
}

#[tokio::test]
#[ignore = "requires docker"]
async fn wallet_credits_each_reference_once() {
    let store = store().await;
    let owner = format!("{}@x.com", Uuid::new_v4());
    let credit = WalletCredit {
        owner_email: owner.clone(),
        amount_cents: 1500,
        currency: "eur".into(),
        reference: format!("scan:{}", Uuid::new_v4()),
    };

    assert!(store.credit(credit.clone()).await.unwrap());
    assert!(!store.credit(credit).await.unwrap());
    assert_eq!(store.balance_cents(&owner).await.unwrap(), 1500);
}
