pub mod config;
pub mod engine;
pub mod hold;
pub mod lifecycle;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod payment;
pub mod pricing;
pub mod reaper;
pub mod store;
pub mod wal;
