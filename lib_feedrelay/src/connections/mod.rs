//! # Connections Module
//!
//! Collaborators backed by external services.

/// PostgreSQL-backed feed store on a `deadpool-postgres` pool.
pub mod db_postgres;

pub use db_postgres::PostgresFeedStore;
