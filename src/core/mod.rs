pub mod errors;
pub mod health;
pub mod metrics;
pub mod models;
pub mod resilience;
pub mod traits;
