pub mod plan;
pub mod user;
