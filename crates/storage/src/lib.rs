//! Storage layer for the vesta indexer.
//!
//! This crate provides implementations of the repository traits defined in
//! `vesta-core`: a PostgreSQL adapter for durable runs and an in-memory
//! adapter for tests and database-less runs.
//!
//! # Architecture
//!
//! The storage layer follows the repository pattern:
//!
//! - [`postgres::Database`] - Connection pool management
//! - [`postgres::PgRepositories`] - Composite repository for the event log and checkpoints
//! - [`memory::InMemoryRepositories`] - Same ports, no persistence
//!
//! # Usage
//!
//! ```ignore
//! use vesta_storage::{Database, DatabaseConfig, PgRepositories};
//!
//! // Connect to the database
//! let config = DatabaseConfig::for_indexer(&database_url);
//! let db = Database::connect(&config).await?;
//!
//! // Run migrations
//! db.migrate().await?;
//!
//! // Create repositories
//! let repositories = Arc::new(PgRepositories::new(Arc::new(db)));
//! ```

pub mod memory;
pub mod postgres;

pub use memory::InMemoryRepositories;
pub use postgres::{Database, DatabaseConfig, PgRepositories, PurgeStats};
