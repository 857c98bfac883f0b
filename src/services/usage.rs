use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use crate::models::plan::{Limit, PlanView, ResourceKind};
use crate::services::counters::CounterStore;

/// Outcome of a metering check. `remaining` and `limit` are null for
/// unlimited resources, never a sentinel number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsageDecision {
    pub allowed: bool,
    pub remaining: Option<u64>,
    pub limit: Option<u64>,
}

/// Meters plan-limited resources against fixed-window counters. Counter
/// backend failures fail open: a metering outage must never block paying
/// users, at worst it briefly over-serves free ones.
pub struct UsageLimiter {
    counters: Arc<dyn CounterStore>,
    window: Duration,
}

impl UsageLimiter {
    pub fn new(counters: Arc<dyn CounterStore>, window: Duration) -> Self {
        Self { counters, window }
    }

    fn key(user_id: &str, resource: ResourceKind) -> String {
        format!("usage:{}:{}", resource.as_str(), user_id)
    }

    fn fail_open(limit: u64) -> UsageDecision {
        UsageDecision {
            allowed: true,
            remaining: Some(limit),
            limit: Some(limit),
        }
    }

    /// Consumes `units` of a resource, one counter increment each. Increments
    /// already applied are not rolled back when a later one is denied; the
    /// worst case is a few phantom units inside one window.
    pub async fn check_and_consume(
        &self,
        user_id: &str,
        plan: &PlanView,
        resource: ResourceKind,
        units: u32,
    ) -> UsageDecision {
        let limit = match plan.limits.for_resource(resource) {
            Limit::Unlimited => {
                return UsageDecision {
                    allowed: true,
                    remaining: None,
                    limit: None,
                }
            }
            Limit::Limited(n) => n,
        };

        if units == 0 {
            return self.peek(user_id, plan, resource).await;
        }

        let key = Self::key(user_id, resource);
        let mut last = None;
        for _ in 0..units {
            match self.counters.consume(&key, limit, self.window).await {
                Ok(snapshot) => {
                    let denied = !snapshot.allowed;
                    last = Some(snapshot);
                    if denied {
                        break;
                    }
                }
                Err(e) => {
                    warn!(
                        user_id,
                        resource = resource.as_str(),
                        error = %e,
                        "counter backend failed, allowing request"
                    );
                    return Self::fail_open(limit);
                }
            }
        }

        match last {
            Some(snapshot) => UsageDecision {
                allowed: snapshot.allowed,
                remaining: Some(snapshot.remaining),
                limit: Some(limit),
            },
            None => Self::fail_open(limit),
        }
    }

    /// Reads current headroom without consuming anything.
    pub async fn peek(
        &self,
        user_id: &str,
        plan: &PlanView,
        resource: ResourceKind,
    ) -> UsageDecision {
        let limit = match plan.limits.for_resource(resource) {
            Limit::Unlimited => {
                return UsageDecision {
                    allowed: true,
                    remaining: None,
                    limit: None,
                }
            }
            Limit::Limited(n) => n,
        };

        let key = Self::key(user_id, resource);
        match self.counters.peek(&key, limit, self.window).await {
            Ok(snapshot) => UsageDecision {
                allowed: snapshot.allowed,
                remaining: Some(snapshot.remaining),
                limit: Some(limit),
            },
            Err(e) => {
                warn!(
                    user_id,
                    resource = resource.as_str(),
                    error = %e,
                    "counter backend failed, reporting full headroom"
                );
                Self::fail_open(limit)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::plan::{PlanTier, SubscriptionStatus};
    use crate::services::counters::memory::MemoryCounterStore;
    use crate::services::counters::{CounterError, CounterSnapshot};
    use async_trait::async_trait;

    struct FailingCounterStore;

    #[async_trait]
    impl CounterStore for FailingCounterStore {
        async fn consume(
            &self,
            _key: &str,
            _limit: u64,
            _window: Duration,
        ) -> Result<CounterSnapshot, CounterError> {
            Err(CounterError::Status(503))
        }

        async fn peek(
            &self,
            _key: &str,
            _limit: u64,
            _window: Duration,
        ) -> Result<CounterSnapshot, CounterError> {
            Err(CounterError::Status(503))
        }
    }

    fn limiter() -> UsageLimiter {
        UsageLimiter::new(Arc::new(MemoryCounterStore::new()), Duration::from_secs(60))
    }

    fn free_plan() -> PlanView {
        PlanView::new(PlanTier::Free, SubscriptionStatus::Active)
    }

    fn pro_plan() -> PlanView {
        PlanView::new(PlanTier::Pro, SubscriptionStatus::Active)
    }

    #[tokio::test]
    async fn free_transformations_deny_at_the_limit() {
        let limiter = limiter();
        let plan = free_plan();

        for i in 1..=10 {
            let decision = limiter
                .check_and_consume("user_1", &plan, ResourceKind::Transformations, 1)
                .await;
            assert!(decision.allowed, "transformation {i}");
            assert_eq!(decision.remaining, Some(10 - i));
        }

        let denied = limiter
            .check_and_consume("user_1", &plan, ResourceKind::Transformations, 1)
            .await;
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, Some(0));
        assert_eq!(denied.limit, Some(10));
    }

    #[tokio::test]
    async fn unlimited_resources_skip_the_counter_entirely() {
        let limiter = UsageLimiter::new(Arc::new(FailingCounterStore), Duration::from_secs(60));
        let decision = limiter
            .check_and_consume("user_1", &pro_plan(), ResourceKind::Transformations, 1)
            .await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, None);
        assert_eq!(decision.limit, None);
    }

    #[tokio::test]
    async fn minutes_consume_one_unit_per_minute() {
        let limiter = limiter();
        let plan = free_plan();

        let decision = limiter
            .check_and_consume("user_1", &plan, ResourceKind::Minutes, 3)
            .await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, Some(2));

        // The 5-minute cap has 2 left; a 3-minute request burns them before
        // being denied, and they stay burned.
        let denied = limiter
            .check_and_consume("user_1", &plan, ResourceKind::Minutes, 3)
            .await;
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, Some(0));

        let after = limiter.peek("user_1", &plan, ResourceKind::Minutes).await;
        assert_eq!(after.remaining, Some(0));
    }

    #[tokio::test]
    async fn zero_units_is_a_read_only_check() {
        let limiter = limiter();
        let plan = free_plan();

        let first = limiter
            .check_and_consume("user_1", &plan, ResourceKind::Minutes, 0)
            .await;
        assert_eq!(first.remaining, Some(5));

        let second = limiter.peek("user_1", &plan, ResourceKind::Minutes).await;
        assert_eq!(second.remaining, Some(5));
    }

    #[tokio::test]
    async fn counter_failures_fail_open_with_plan_limit() {
        let limiter = UsageLimiter::new(Arc::new(FailingCounterStore), Duration::from_secs(60));
        let plan = free_plan();

        let decision = limiter
            .check_and_consume("user_1", &plan, ResourceKind::Minutes, 2)
            .await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, Some(5));
        assert_eq!(decision.limit, Some(5));

        let peeked = limiter.peek("user_1", &plan, ResourceKind::Minutes).await;
        assert!(peeked.allowed);
        assert_eq!(peeked.remaining, Some(5));
    }

    #[tokio::test]
    async fn inactive_pro_is_metered_at_entry_limits() {
        let limiter = limiter();
        let plan = PlanView::new(PlanTier::Pro, SubscriptionStatus::Canceled);

        let decision = limiter
            .check_and_consume("user_1", &plan, ResourceKind::Transformations, 1)
            .await;
        assert_eq!(decision.limit, Some(10));
    }
}
