//! Side effects of lifecycle transitions.
//!
//! Every effect runs after the transition is durable and is attempted on its
//! own: a failed email never blocks the push, the wallet credit or the bus
//! publish, and nothing here can undo the transition. Terminal effects are
//! claimed through the dedup guard first, so a transition reported twice (the
//! direct scan and its broadcast fallback) applies them once.

use std::future::Future;

use futures::future::join_all;
use tracing::{debug, error, info, instrument, warn};

use crate::common::NotificationError;
use crate::domains::chatrooms::{Conversation, Message};
use crate::domains::events::DomainEvent;
use crate::domains::groups::Group;
use crate::domains::join_requests::models::{normalize_email, Decision, JoinRequest};
use crate::domains::notifications::templates::{self, EmailContent, PushContent};
use crate::kernel::{BusEvent, DedupKey, EffectOutcome, ServerDeps, TransitionKind, WalletCredit};

const DEFAULT_CURRENCY: &str = "eur";

pub struct SideEffectOrchestrator<'a> {
    deps: &'a ServerDeps,
}

impl<'a> SideEffectOrchestrator<'a> {
    pub fn new(deps: &'a ServerDeps) -> Self {
        Self { deps }
    }

    /// New request: tell the owner, then broadcast.
    #[instrument(skip_all, fields(request_id = %request.id))]
    pub async fn on_request_created(&self, request: &JoinRequest, group: Option<&Group>) -> EffectOutcome {
        if !self.claim(request, TransitionKind::Created, request.id.to_string()) {
            return EffectOutcome::DuplicateSuppressed;
        }

        match group {
            Some(group) => {
                let email = templates::request_created_email(request);
                let push = templates::request_created_push(request);
                futures::join!(
                    self.send_email(&group.owner_email, &email),
                    self.push_if_inactive(&group.owner_email, &push, request_data(request)),
                );
            }
            None => warn!(group = %request.group_name, "Group not found, owner not notified"),
        }

        self.publish(DomainEvent::join_request_created(request));
        EffectOutcome::Applied
    }

    /// Decision: tell the requester, then broadcast. The owner is never
    /// involved, so an unreachable owner cannot hold this up.
    #[instrument(skip_all, fields(request_id = %request.id, decision = ?decision))]
    pub async fn on_request_decided(&self, request: &JoinRequest, decision: Decision) -> EffectOutcome {
        let kind = match decision {
            Decision::Accepted => TransitionKind::Accepted,
            Decision::Refused => TransitionKind::Refused,
        };
        if !self.claim(request, kind, request.id.to_string()) {
            return EffectOutcome::DuplicateSuppressed;
        }

        let requester = &request.member_email;
        match decision {
            Decision::Accepted => {
                let email = templates::request_accepted_email(request);
                let push = templates::request_accepted_push(request);
                futures::join!(
                    self.send_email(requester, &email),
                    self.push_if_inactive(requester, &push, request_data(request)),
                );
            }
            Decision::Refused => {
                self.send_email(requester, &templates::request_refused_email(request))
                    .await;
            }
        }

        self.publish(DomainEvent::join_request_updated(request));
        EffectOutcome::Applied
    }

    /// First scan: credit the owner once, tell them, then broadcast.
    #[instrument(skip_all, fields(request_id = %request.id))]
    pub async fn on_request_scanned(&self, request: &JoinRequest, group: &Group) -> EffectOutcome {
        let Some(scanned_at) = request.scanned_at else {
            warn!("Scan effects requested for an unscanned request");
            return EffectOutcome::DuplicateSuppressed;
        };
        let version = scanned_at.timestamp_micros().to_string();
        if !self.claim(request, TransitionKind::Scanned, version) {
            return EffectOutcome::DuplicateSuppressed;
        }

        self.credit_owner(request, group).await;

        let email = templates::payout_email(request);
        let push = templates::payout_push(request);
        futures::join!(
            self.send_email(&group.owner_email, &email),
            self.push_if_inactive(&group.owner_email, &push, request_data(request)),
        );

        self.publish(DomainEvent::join_request_updated(request));
        EffectOutcome::Applied
    }

    /// New message: push every other member who is not looking, then
    /// broadcast. System announcements are broadcast only.
    ///
    /// Returns how many members were pushed.
    #[instrument(skip_all, fields(message_id = %message.id))]
    pub async fn on_message_created(
        &self,
        message: &Message,
        conversation: &Conversation,
        participants: &[String],
    ) -> usize {
        let mut pushed = 0;
        if !message.system {
            let sender = normalize_email(&message.sender_email);
            let push = templates::message_push(message, &conversation.group_name);
            let data = serde_json::json!({
                "type": "message",
                "conversationId": message.conversation_id,
                "eventSlug": conversation.event_slug,
                "groupName": conversation.group_name,
            });

            let recipients: Vec<&String> = participants
                .iter()
                .filter(|p| normalize_email(p) != sender)
                .filter(|p| !self.deps.visibility.is_active(p))
                .collect();
            pushed = recipients.len();

            join_all(recipients.into_iter().map(|recipient| {
                let data = data.clone();
                let push = &push;
                async move {
                    self.deliver(
                        "push",
                        recipient,
                        self.deps
                            .push_service
                            .send_notification(recipient, &push.title, &push.body, data),
                    )
                    .await
                }
            }))
            .await;
        }

        self.publish(DomainEvent::message_created(message));
        pushed
    }

    pub async fn on_group_created(&self, group: &Group) {
        self.publish(DomainEvent::group_created(group));
    }

    fn claim(&self, request: &JoinRequest, kind: TransitionKind, version: String) -> bool {
        let key = DedupKey::new(request.key(), kind, version);
        if self.deps.dedup.check_and_set(key.clone()) {
            true
        } else {
            info!(key = %key, "Duplicate transition, side effects suppressed");
            false
        }
    }

    async fn credit_owner(&self, request: &JoinRequest, group: &Group) {
        let Some(amount_cents) = request.amount_cents.filter(|a| *a > 0) else {
            debug!("No amount on request, nothing to credit");
            return;
        };

        let credit = WalletCredit {
            owner_email: group.owner_email.clone(),
            amount_cents,
            currency: request
                .currency
                .clone()
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            reference: format!("scan:{}", request.id),
        };

        match self.deps.wallet.credit(credit).await {
            Ok(true) => info!(owner = %group.owner_email, amount_cents, "Wallet credited"),
            Ok(false) => info!(owner = %group.owner_email, "Wallet already credited for this scan"),
            Err(e) => error!(owner = %group.owner_email, error = %e, "Wallet credit failed"),
        }
    }

    async fn send_email(&self, to: &str, content: &EmailContent) -> bool {
        self.deliver(
            "email",
            to,
            self.deps
                .email_service
                .send_email(to, &content.subject, &content.body),
        )
        .await
    }

    async fn push_if_inactive(&self, to: &str, content: &PushContent, data: serde_json::Value) -> bool {
        if self.deps.visibility.is_active(to) {
            debug!(to = %to, "Recipient active in app, push skipped");
            return false;
        }
        self.deliver(
            "push",
            to,
            self.deps
                .push_service
                .send_notification(to, &content.title, &content.body, data),
        )
        .await
    }

    /// Run one notification under the timeout. Failures are logged, never
    /// returned.
    async fn deliver<F>(&self, channel: &'static str, target: &str, send: F) -> bool
    where
        F: Future<Output = anyhow::Result<()>>,
    {
        let timeout = self.deps.notification_timeout;
        let failure = match tokio::time::timeout(timeout, send).await {
            Ok(Ok(())) => {
                debug!(channel, target = %target, "Notification sent");
                return true;
            }
            Ok(Err(source)) => NotificationError::Failed {
                channel,
                target: target.to_string(),
                source,
            },
            Err(_) => NotificationError::TimedOut {
                channel,
                target: target.to_string(),
                timeout_ms: timeout.as_millis(),
            },
        };
        warn!(error = %failure, "Notification not delivered");
        false
    }

    fn publish(&self, event: DomainEvent) {
        let report = self.deps.bus.publish(&event);
        debug!(
            channel = event.channel(),
            delivered = report.delivered,
            failed = report.failed,
            "Event published"
        );
    }
}

fn request_data(request: &JoinRequest) -> serde_json::Value {
    serde_json::json!({
        "type": "joinRequest",
        "id": request.id,
        "eventSlug": request.event_slug,
        "groupName": request.group_name,
        "status": request.status,
    })
}
