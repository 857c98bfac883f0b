pub mod counters;
pub mod entitlements;
pub mod identity;
pub mod stripe;
pub mod usage;
