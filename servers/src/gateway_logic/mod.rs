//! The notification gateway: configuration, logging, shared state, the
//! WebSocket endpoint and the poll schedule.

pub mod config;
pub mod downstream;
pub mod logger;
pub mod scheduler;
pub mod state;
