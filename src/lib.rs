// Library root for the todos data-access service

pub mod api;
pub mod config;
pub mod core;
pub mod infra;
pub mod state;
