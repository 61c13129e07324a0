//! Test fixtures built through the lifecycle actions.

use crew_core::domains::groups::{actions as groups, Group, NewGroup};
use crew_core::domains::join_requests::{actions as join_requests, Decision, JoinRequest, NewJoinRequest};
use crew_core::kernel::ServerDeps;

pub const EVENT: &str = "techno-paris";
pub const GROUP: &str = "Crew 1";
pub const OWNER: &str = "owner@x.com";
pub const MEMBER: &str = "a@x.com";

/// Create "Crew 1" for "techno-paris", owned by `OWNER`, priced at 15 EUR.
pub async fn create_test_group(deps: &ServerDeps) -> Group {
    groups::create_group(
        NewGroup {
            event_slug: EVENT.into(),
            name: GROUP.into(),
            owner_email: OWNER.into(),
            owner_name: "Owner".into(),
            cohort_capacity: 4,
            price_cents: Some(1500),
            currency: Some("eur".into()),
        },
        deps,
    )
    .await
    .expect("create group")
}

pub fn new_request(member: &str) -> NewJoinRequest {
    NewJoinRequest {
        event_slug: EVENT.into(),
        group_name: GROUP.into(),
        member_email: member.into(),
        amount_cents: Some(1500),
        currency: Some("eur".into()),
        method: Some("card".into()),
    }
}

pub async fn submit_request(deps: &ServerDeps, member: &str) -> JoinRequest {
    join_requests::submit(new_request(member), deps)
        .await
        .expect("submit request")
}

pub async fn accepted_request(deps: &ServerDeps, member: &str) -> JoinRequest {
    let request = submit_request(deps, member).await;
    join_requests::decide(request.id, Decision::Accepted, OWNER, deps)
        .await
        .expect("accept request")
}
