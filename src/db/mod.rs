pub mod memory_user_store;
pub mod postgres_user_store;
pub mod user_store;
