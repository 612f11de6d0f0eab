pub mod event_publisher;
pub mod postgres_store;
