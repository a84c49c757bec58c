pub mod auth;
pub mod config;
pub mod engine;
pub mod error;
pub mod limits;
pub mod model;
pub mod observability;
pub mod pricing;
pub mod service;
pub mod wal;
