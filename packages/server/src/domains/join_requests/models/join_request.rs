use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::common::{JoinRequestId, LifecycleError};

/// JoinRequest - a requester's application to join a group for one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct JoinRequest {
    pub id: JoinRequestId,
    pub event_slug: String,
    pub group_name: String,
    pub member_email: String,
    pub amount_cents: Option<i64>,
    pub currency: Option<String>,
    pub method: Option<String>,
    pub status: JoinRequestStatus,
    pub scanned_at: Option<DateTime<Utc>>,
    pub payout_released: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied on submission. Everything else is set by the lifecycle.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewJoinRequest {
    pub event_slug: String,
    pub group_name: String,
    pub member_email: String,
    pub amount_cents: Option<i64>,
    pub currency: Option<String>,
    pub method: Option<String>,
}

impl NewJoinRequest {
    pub fn key(&self) -> RequestKey {
        RequestKey::new(&self.event_slug, &self.group_name, &self.member_email)
    }

    /// Materialize a fresh `pending` record.
    pub fn into_pending(self) -> JoinRequest {
        JoinRequest {
            id: JoinRequestId::new(),
            event_slug: self.event_slug,
            group_name: self.group_name,
            member_email: self.member_email,
            amount_cents: self.amount_cents,
            currency: self.currency,
            method: self.method,
            status: JoinRequestStatus::Pending,
            scanned_at: None,
            payout_released: false,
            created_at: Utc::now(),
        }
    }
}

/// The (event, group, requester) triple that identifies "the" request of a
/// member for a group. Transitions are serialized on this key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestKey {
    pub event_slug: String,
    pub group_name: String,
    pub member_email: String,
}

impl RequestKey {
    pub fn new(event_slug: &str, group_name: &str, member_email: &str) -> Self {
        Self {
            event_slug: event_slug.to_string(),
            group_name: group_name.to_string(),
            member_email: normalize_email(member_email),
        }
    }
}

impl std::fmt::Display for RequestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.event_slug, self.group_name, self.member_email)
    }
}

/// Emails are identities; compare them case-insensitively.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Join request status enum
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JoinRequestStatus {
    Pending,
    Accepted,
    Refused,
}

/// Owner decision on a pending request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Accepted,
    Refused,
}

impl From<Decision> for JoinRequestStatus {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Accepted => JoinRequestStatus::Accepted,
            Decision::Refused => JoinRequestStatus::Refused,
        }
    }
}

impl JoinRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinRequestStatus::Pending => "pending",
            JoinRequestStatus::Accepted => "accepted",
            JoinRequestStatus::Refused => "refused",
        }
    }

    /// Active requests block a second submission for the same key.
    pub fn is_active(&self) -> bool {
        matches!(self, JoinRequestStatus::Pending | JoinRequestStatus::Accepted)
    }

    /// Only `pending` can be decided, and only into `accepted` or `refused`.
    pub fn can_transition_to(&self, next: JoinRequestStatus) -> bool {
        matches!(
            (self, next),
            (JoinRequestStatus::Pending, JoinRequestStatus::Accepted)
                | (JoinRequestStatus::Pending, JoinRequestStatus::Refused)
        )
    }
}

impl std::fmt::Display for JoinRequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JoinRequestStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(JoinRequestStatus::Pending),
            "accepted" => Ok(JoinRequestStatus::Accepted),
            "refused" => Ok(JoinRequestStatus::Refused),
            _ => Err(anyhow::anyhow!("Invalid join request status: {}", s)),
        }
    }
}

/// What a scan would do to a request, decided without touching the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanEligibility {
    /// Accepted and never scanned: release the payout.
    Release,
    /// Accepted and already scanned: report the prior result.
    AlreadyScanned,
    /// Pending or refused: nothing to scan.
    NotAccepted(JoinRequestStatus),
}

impl JoinRequest {
    pub fn key(&self) -> RequestKey {
        RequestKey::new(&self.event_slug, &self.group_name, &self.member_email)
    }

    /// Check that `decision` is a legal next step from the current status.
    pub fn check_decision(&self, decision: Decision) -> Result<JoinRequestStatus, LifecycleError> {
        let next = JoinRequestStatus::from(decision);
        if self.status.can_transition_to(next) {
            Ok(next)
        } else {
            Err(LifecycleError::InvalidTransition {
                id: self.id,
                from: self.status,
                to: next,
            })
        }
    }

    pub fn scan_eligibility(&self) -> ScanEligibility {
        match (self.status, self.scanned_at) {
            (JoinRequestStatus::Accepted, None) => ScanEligibility::Release,
            (JoinRequestStatus::Accepted, Some(_)) => ScanEligibility::AlreadyScanned,
            (status, _) => ScanEligibility::NotAccepted(status),
        }
    }
}

// ============================================================================
// sqlx support (status stored as TEXT)
// ============================================================================

use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::{PgArgumentBuffer, PgTypeInfo, PgValueRef, Postgres};
use sqlx::{Decode, Encode, Type};

impl Type<Postgres> for JoinRequestStatus {
    fn type_info() -> PgTypeInfo {
        <String as Type<Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        <String as Type<Postgres>>::compatible(ty)
    }
}

impl Encode<'_, Postgres> for JoinRequestStatus {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        <&str as Encode<Postgres>>::encode_by_ref(&self.as_str(), buf)
    }
}

impl<'r> Decode<'r, Postgres> for JoinRequestStatus {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let raw = <&'r str as Decode<'r, Postgres>>::decode(value)?;
        Ok(raw.parse::<JoinRequestStatus>()?)
    }
}

// =============================================================================
// Queries
// =============================================================================

impl JoinRequest {
    pub async fn find_by_id(id: JoinRequestId, pool: &PgPool) -> Result<Option<Self>> {
        let request = sqlx::query_as::<_, JoinRequest>("SELECT * FROM join_requests WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(request)
    }

    /// The pending or accepted request for a key, if any.
    pub async fn find_active(key: &RequestKey, pool: &PgPool) -> Result<Option<Self>> {
        let request = sqlx::query_as::<_, JoinRequest>(
            r#"
            SELECT * FROM join_requests
            WHERE event_slug = $1 AND group_name = $2 AND member_email = $3
              AND status IN ('pending', 'accepted')
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(&key.event_slug)
        .bind(&key.group_name)
        .bind(&key.member_email)
        .fetch_optional(pool)
        .await?;
        Ok(request)
    }

    /// The most recent request for a key regardless of status.
    pub async fn find_latest(key: &RequestKey, pool: &PgPool) -> Result<Option<Self>> {
        let request = sqlx::query_as::<_, JoinRequest>(
            r#"
            SELECT * FROM join_requests
            WHERE event_slug = $1 AND group_name = $2 AND member_email = $3
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(&key.event_slug)
        .bind(&key.group_name)
        .bind(&key.member_email)
        .fetch_optional(pool)
        .await?;
        Ok(request)
    }

    /// Insert unless an active request already holds the key.
    ///
    /// Relies on the partial unique index `join_requests_active_key`; on
    /// conflict the existing active row is read back and returned with
    /// `created = false`.
    pub async fn create_if_absent(new: NewJoinRequest, pool: &PgPool) -> Result<(Self, bool)> {
        let key = new.key();
        let pending = NewJoinRequest {
            member_email: key.member_email.clone(),
            ..new
        }
        .into_pending();

        let inserted = sqlx::query_as::<_, JoinRequest>(
            r#"
            INSERT INTO join_requests
                (id, event_slug, group_name, member_email, amount_cents, currency, method,
                 status, scanned_at, payout_released, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NULL, FALSE, $9)
            ON CONFLICT DO NOTHING
            RETURNING *
            "#,
        )
        .bind(pending.id)
        .bind(&pending.event_slug)
        .bind(&pending.group_name)
        .bind(&pending.member_email)
        .bind(pending.amount_cents)
        .bind(&pending.currency)
        .bind(&pending.method)
        .bind(pending.status)
        .bind(pending.created_at)
        .fetch_optional(pool)
        .await?;

        if let Some(request) = inserted {
            return Ok((request, true));
        }

        let existing = Self::find_active(&key, pool)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Insert conflicted but no active request for {}", key))?;
        Ok((existing, false))
    }

    /// Compare-and-swap the status. Returns `None` if the row was no longer in
    /// `expected`.
    pub async fn transition_status(
        id: JoinRequestId,
        expected: JoinRequestStatus,
        next: JoinRequestStatus,
        pool: &PgPool,
    ) -> Result<Option<Self>> {
        let request = sqlx::query_as::<_, JoinRequest>(
            r#"
            UPDATE join_requests
            SET status = $3
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(expected)
        .bind(next)
        .fetch_optional(pool)
        .await?;
        Ok(request)
    }

    /// Set `scanned_at` and release the payout in one statement. Only an
    /// accepted, never-scanned row matches.
    pub async fn mark_scanned(
        id: JoinRequestId,
        scanned_at: DateTime<Utc>,
        pool: &PgPool,
    ) -> Result<Option<Self>> {
        let request = sqlx::query_as::<_, JoinRequest>(
            r#"
            UPDATE join_requests
            SET scanned_at = $2, payout_released = TRUE
            WHERE id = $1 AND status = 'accepted' AND scanned_at IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(scanned_at)
        .fetch_optional(pool)
        .await?;
        Ok(request)
    }
}
