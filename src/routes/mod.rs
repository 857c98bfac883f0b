pub mod admin;
pub mod auth;
pub mod billing;
pub mod identity;
pub mod limits;
pub mod stripe;
pub mod usage;
