use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Free,
    Trial,
    Starter,
    Pro,
}

impl PlanTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Trial => "trial",
            PlanTier::Starter => "starter",
            PlanTier::Pro => "pro",
        }
    }

    /// Strict lookup: only the catalog's own tier names.
    pub fn parse_known(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "free" => Some(PlanTier::Free),
            "trial" => Some(PlanTier::Trial),
            "starter" => Some(PlanTier::Starter),
            "pro" => Some(PlanTier::Pro),
            _ => None,
        }
    }

    /// Lenient parse for values coming off user records and identity metadata.
    /// Unknown or absent tiers resolve to the entry tier, never an error.
    pub fn parse(raw: Option<&str>) -> Self {
        let normalized = raw.unwrap_or_default().trim().to_lowercase();
        if normalized.is_empty() || normalized == "none" {
            return PlanTier::Free;
        }
        Self::parse_known(&normalized).unwrap_or(PlanTier::Free)
    }

    /// Precedence used when picking the highest-ranked active subscription.
    pub fn rank(&self) -> u8 {
        match self {
            PlanTier::Free => 0,
            PlanTier::Trial => 1,
            PlanTier::Starter => 2,
            PlanTier::Pro => 3,
        }
    }

    pub fn plan(&self) -> &'static Plan {
        match self {
            PlanTier::Free => &PLAN_CATALOG[0],
            PlanTier::Trial => &PLAN_CATALOG[1],
            PlanTier::Starter => &PLAN_CATALOG[2],
            PlanTier::Pro => &PLAN_CATALOG[3],
        }
    }

    pub fn limits(&self) -> PlanLimits {
        self.plan().limits
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Minutes,
    Transformations,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Minutes => "minutes",
            ResourceKind::Transformations => "transformations",
        }
    }
}

/// An explicit no-limit value. Never a sentinel number: pro-tier
/// transformations are `Unlimited`, not 10000.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Limited(u64),
    Unlimited,
}

impl Limit {
    pub fn value(&self) -> Option<u64> {
        match self {
            Limit::Limited(n) => Some(*n),
            Limit::Unlimited => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanLimits {
    pub minutes: Limit,
    pub transformations: Limit,
}

impl PlanLimits {
    pub fn for_resource(&self, kind: ResourceKind) -> Limit {
        match kind {
            ResourceKind::Minutes => self.minutes,
            ResourceKind::Transformations => self.transformations,
        }
    }
}

pub struct Plan {
    pub tier: PlanTier,
    pub display_name: &'static str,
    pub price_monthly_cents: u32,
    pub limits: PlanLimits,
    /// Payment-provider price handle; None for tiers that are not purchasable.
    pub stripe_price_id: Option<&'static str>,
}

/// The single policy table. Limits are per usage window; the window length is
/// one explicit configuration knob rather than baked into these numbers.
pub const PLAN_CATALOG: [Plan; 4] = [
    Plan {
        tier: PlanTier::Free,
        display_name: "Free",
        price_monthly_cents: 0,
        limits: PlanLimits {
            minutes: Limit::Limited(5),
            transformations: Limit::Limited(10),
        },
        stripe_price_id: None,
    },
    Plan {
        tier: PlanTier::Trial,
        display_name: "Trial",
        price_monthly_cents: 0,
        limits: PlanLimits {
            minutes: Limit::Limited(5),
            transformations: Limit::Limited(10),
        },
        stripe_price_id: None,
    },
    Plan {
        tier: PlanTier::Starter,
        display_name: "Starter",
        price_monthly_cents: 899,
        limits: PlanLimits {
            minutes: Limit::Limited(480),
            transformations: Limit::Limited(50),
        },
        stripe_price_id: Some("price_1RoYNGCHgVkAnNskkc2FjgJ4"),
    },
    Plan {
        tier: PlanTier::Pro,
        display_name: "Pro",
        price_monthly_cents: 1299,
        limits: PlanLimits {
            minutes: Limit::Limited(1500),
            transformations: Limit::Unlimited,
        },
        stripe_price_id: Some("price_1RoYNzCHgVkAnNsk95tvmzxQ"),
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Inactive,
    Canceled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Inactive => "inactive",
            SubscriptionStatus::Canceled => "canceled",
        }
    }

    /// Maps stored values and payment-provider status strings. Absent status
    /// means the record predates status tracking and is treated as active.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.unwrap_or("active").trim().to_lowercase().as_str() {
            "active" | "trialing" => SubscriptionStatus::Active,
            "canceled" | "cancelled" => SubscriptionStatus::Canceled,
            _ => SubscriptionStatus::Inactive,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, SubscriptionStatus::Active)
    }
}

/// The resolved entitlement view handed to the limiter and the API surface.
/// Effective limits drop to the entry tier whenever the subscription is not
/// active, regardless of the stored tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanView {
    pub tier: PlanTier,
    pub status: SubscriptionStatus,
    pub limits: PlanLimits,
}

impl PlanView {
    pub fn new(tier: PlanTier, status: SubscriptionStatus) -> Self {
        let effective = if status.is_active() { tier } else { PlanTier::Free };
        Self {
            tier,
            status,
            limits: effective.limits(),
        }
    }

    /// The safety default: entry tier, active. New users and degraded
    /// resolutions land here; nobody is locked out by a fetch failure.
    pub fn entry() -> Self {
        Self::new(PlanTier::Free, SubscriptionStatus::Active)
    }

    pub fn from_record(record: &crate::models::user::UserRecord) -> Self {
        Self::new(
            PlanTier::parse(record.plan_tier.as_deref()),
            SubscriptionStatus::parse(record.subscription_status.as_deref()),
        )
    }
}
