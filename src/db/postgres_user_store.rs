use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::db::user_store::{BillingUpdate, UserStore};
use crate::models::plan::{PlanTier, SubscriptionStatus};
use crate::models::user::UserRecord;

#[derive(Clone)]
pub struct PostgresUserStore {
    pool: PgPool,
}

impl PostgresUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PostgresUserStore {
    async fn find_user(&self, user_id: &str) -> Result<Option<UserRecord>, sqlx::Error> {
        sqlx::query_as::<_, UserRecord>(
            r#"
            SELECT user_id, email, plan_tier, subscription_status,
                   subscription_id, subscription_ends_at, last_synced_at
            FROM users
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn upsert_synced(
        &self,
        user_id: &str,
        email: &str,
        tier: PlanTier,
        status: SubscriptionStatus,
        synced_at: OffsetDateTime,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO users (user_id, email, plan_tier, subscription_status, last_synced_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id) DO UPDATE SET
                email = CASE WHEN EXCLUDED.email = '' THEN users.email ELSE EXCLUDED.email END,
                plan_tier = EXCLUDED.plan_tier,
                subscription_status = EXCLUDED.subscription_status,
                last_synced_at = EXCLUDED.last_synced_at
            "#,
        )
        .bind(user_id)
        .bind(email)
        .bind(tier.as_str())
        .bind(status.as_str())
        .bind(synced_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn apply_billing_update(
        &self,
        update: &BillingUpdate,
        synced_at: OffsetDateTime,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO users
                (user_id, email, plan_tier, subscription_status,
                 subscription_id, subscription_ends_at, last_synced_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id) DO UPDATE SET
                email = CASE WHEN EXCLUDED.email = '' THEN users.email ELSE EXCLUDED.email END,
                plan_tier = EXCLUDED.plan_tier,
                subscription_status = EXCLUDED.subscription_status,
                subscription_id = COALESCE(EXCLUDED.subscription_id, users.subscription_id),
                subscription_ends_at = EXCLUDED.subscription_ends_at,
                last_synced_at = EXCLUDED.last_synced_at
            "#,
        )
        .bind(&update.user_id)
        .bind(update.email.as_deref().unwrap_or_default())
        .bind(update.tier.as_str())
        .bind(update.status.as_str())
        .bind(update.subscription_id.as_deref())
        .bind(update.ends_at)
        .bind(synced_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_subscription_status(
        &self,
        user_id: &str,
        status: SubscriptionStatus,
        synced_at: OffsetDateTime,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE users
            SET subscription_status = $2, last_synced_at = $3
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(status.as_str())
        .bind(synced_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
