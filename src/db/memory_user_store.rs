use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::db::user_store::{BillingUpdate, UserStore};
use crate::models::plan::{PlanTier, SubscriptionStatus};
use crate::models::user::UserRecord;

/// In-memory store for tests. Failure injection covers the degraded-resolution
/// paths the database-backed store would hit on outages.
#[derive(Default)]
pub struct MemoryUserStore {
    records: Mutex<HashMap<String, UserRecord>>,
    pub upsert_calls: AtomicUsize,
    pub should_fail: AtomicBool,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: UserRecord) -> Self {
        let store = Self::default();
        store
            .records
            .lock()
            .unwrap()
            .insert(record.user_id.clone(), record);
        store
    }

    pub fn insert(&self, record: UserRecord) {
        self.records
            .lock()
            .unwrap()
            .insert(record.user_id.clone(), record);
    }

    pub fn get(&self, user_id: &str) -> Option<UserRecord> {
        self.records.lock().unwrap().get(user_id).cloned()
    }

    pub fn fail_next(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }

    fn check_failure(&self) -> Result<(), sqlx::Error> {
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(sqlx::Error::Protocol("injected store failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_user(&self, user_id: &str) -> Result<Option<UserRecord>, sqlx::Error> {
        self.check_failure()?;
        Ok(self.records.lock().unwrap().get(user_id).cloned())
    }

    async fn upsert_synced(
        &self,
        user_id: &str,
        email: &str,
        tier: PlanTier,
        status: SubscriptionStatus,
        synced_at: OffsetDateTime,
    ) -> Result<(), sqlx::Error> {
        self.check_failure()?;
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);

        let mut records = self.records.lock().unwrap();
        let entry = records.entry(user_id.to_string()).or_insert(UserRecord {
            user_id: user_id.to_string(),
            email: String::new(),
            plan_tier: None,
            subscription_status: None,
            subscription_id: None,
            subscription_ends_at: None,
            last_synced_at: None,
        });
        if !email.is_empty() {
            entry.email = email.to_string();
        }
        entry.plan_tier = Some(tier.as_str().to_string());
        entry.subscription_status = Some(status.as_str().to_string());
        entry.last_synced_at = Some(synced_at);
        Ok(())
    }

    async fn apply_billing_update(
        &self,
        update: &BillingUpdate,
        synced_at: OffsetDateTime,
    ) -> Result<(), sqlx::Error> {
        self.check_failure()?;

        let mut records = self.records.lock().unwrap();
        let entry = records
            .entry(update.user_id.clone())
            .or_insert(UserRecord {
                user_id: update.user_id.clone(),
                email: String::new(),
                plan_tier: None,
                subscription_status: None,
                subscription_id: None,
                subscription_ends_at: None,
                last_synced_at: None,
            });
        if let Some(email) = update.email.as_deref() {
            if !email.is_empty() {
                entry.email = email.to_string();
            }
        }
        entry.plan_tier = Some(update.tier.as_str().to_string());
        entry.subscription_status = Some(update.status.as_str().to_string());
        if update.subscription_id.is_some() {
            entry.subscription_id = update.subscription_id.clone();
        }
        entry.subscription_ends_at = update.ends_at;
        entry.last_synced_at = Some(synced_at);
        Ok(())
    }

    async fn set_subscription_status(
        &self,
        user_id: &str,
        status: SubscriptionStatus,
        synced_at: OffsetDateTime,
    ) -> Result<(), sqlx::Error> {
        self.check_failure()?;

        let mut records = self.records.lock().unwrap();
        if let Some(entry) = records.get_mut(user_id) {
            entry.subscription_status = Some(status.as_str().to_string());
            entry.last_synced_at = Some(synced_at);
        }
        Ok(())
    }
}
