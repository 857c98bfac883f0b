use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::models::plan::PlanTier;
use crate::services::identity::{IdentityError, IdentityProvider, IdentityUser};

#[derive(Default)]
pub struct MockIdentityProvider {
    pub user: Mutex<Option<IdentityUser>>,
    pub fail: AtomicBool,
    pub plan_writes: Mutex<Vec<(String, PlanTier)>>,
}

impl MockIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(user: IdentityUser) -> Self {
        Self {
            user: Mutex::new(Some(user)),
            ..Self::default()
        }
    }

    pub fn set_user(&self, user: IdentityUser) {
        *self.user.lock().unwrap() = Some(user);
    }

    pub fn fail_next(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn recorded_plan_writes(&self) -> Vec<(String, PlanTier)> {
        self.plan_writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn fetch_user(&self, _user_id: &str) -> Result<IdentityUser, IdentityError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(IdentityError::Status(503));
        }
        self.user
            .lock()
            .unwrap()
            .clone()
            .ok_or(IdentityError::Status(404))
    }

    async fn set_plan(&self, user_id: &str, tier: PlanTier) -> Result<(), IdentityError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(IdentityError::Status(503));
        }
        self.plan_writes
            .lock()
            .unwrap()
            .push((user_id.to_string(), tier));
        Ok(())
    }
}
