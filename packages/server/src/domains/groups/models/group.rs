use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::common::GroupId;
use crate::domains::join_requests::models::normalize_email;

/// Group - owned by one member, attached to one event.
///
/// Join requests reference a group by `(event_slug, name)`, never by id, so a
/// group may be missing when a request is decided.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Group {
    pub id: GroupId,
    pub event_slug: String,
    pub name: String,
    pub owner_email: String,
    pub owner_name: String,
    /// Seats per cohort. Groups keep the two cohorts at parity, so the
    /// total capacity is twice this.
    pub cohort_capacity: i32,
    pub price_cents: Option<i64>,
    pub currency: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewGroup {
    pub event_slug: String,
    pub name: String,
    pub owner_email: String,
    pub owner_name: String,
    pub cohort_capacity: i32,
    pub price_cents: Option<i64>,
    pub currency: Option<String>,
}

impl NewGroup {
    pub fn into_group(self) -> Group {
        Group {
            id: GroupId::new(),
            event_slug: self.event_slug,
            name: self.name,
            owner_email: normalize_email(&self.owner_email),
            owner_name: self.owner_name,
            cohort_capacity: self.cohort_capacity,
            price_cents: self.price_cents,
            currency: self.currency,
            created_at: Utc::now(),
        }
    }
}

impl Group {
    pub fn is_owned_by(&self, email: &str) -> bool {
        normalize_email(email) == self.owner_email
    }

    pub fn total_capacity(&self) -> i32 {
        self.cohort_capacity.saturating_mul(2)
    }
}

// =============================================================================
// Queries
// =============================================================================

impl Group {
    pub async fn find_by_name(event_slug: &str, name: &str, pool: &PgPool) -> Result<Option<Self>> {
        let group = sqlx::query_as::<_, Group>(
            "SELECT * FROM groups WHERE event_slug = $1 AND name = $2",
        )
        .bind(event_slug)
        .bind(name)
        .fetch_optional(pool)
        .await?;
        Ok(group)
    }

    /// Insert a group. Returns `None` when the name is taken for the event.
    pub async fn create(new: NewGroup, pool: &PgPool) -> Result<Option<Self>> {
        let group = new.into_group();
        let group = sqlx::query_as::<_, Group>(
            r#"
            INSERT INTO groups
                (id, event_slug, name, owner_email, owner_name, cohort_capacity,
                 price_cents, currency, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (event_slug, name) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(group.id)
        .bind(&group.event_slug)
        .bind(&group.name)
        .bind(&group.owner_email)
        .bind(&group.owner_name)
        .bind(group.cohort_capacity)
        .bind(group.price_cents)
        .bind(&group.currency)
        .bind(group.created_at)
        .fetch_optional(pool)
        .await?;
        Ok(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ownership_ignores_case_and_whitespace() {
        let group = NewGroup {
            event_slug: "techno-paris".into(),
            name: "Crew 1".into(),
            owner_email: "owner@x.com".into(),
            owner_name: "Owner".into(),
            cohort_capacity: 3,
            ..Default::default()
        }
        .into_group();

        assert!(group.is_owned_by(" OWNER@x.com"));
        assert!(!group.is_owned_by("a@x.com"));
        assert_eq!(group.total_capacity(), 6);
    }

    #[test]
    fn test_ownership_folds_non_ascii_case() {
        let group = NewGroup {
            event_slug: "techno-paris".into(),
            name: "Crew 1".into(),
            owner_email: "élodie@x.com".into(),
            owner_name: "Élodie".into(),
            cohort_capacity: 3,
            ..Default::default()
        }
        .into_group();

        assert!(group.is_owned_by("Élodie@X.com"));
    }
}
