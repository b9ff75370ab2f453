//! Core domain layer for the Vesta vault indexer.
//!
//! This crate contains the accounting model, port traits (interfaces), and
//! the indexing services that reconstruct vault state from an ordered event
//! log. It follows hexagonal architecture principles - this is the innermost
//! layer with no dependencies on infrastructure.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      vesta (binary)                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │     vesta-graphql          │          vesta-feed            │
//! │   (GraphQL + REST API)     │        (NDJSON feed)           │
//! ├────────────────────────────┴────────────────────────────────┤
//! │                     vesta-storage                           │
//! │                (PostgreSQL / in-memory)                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │                      vesta-core  ← YOU ARE HERE             │
//! │           (domain, models, ports, services)                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`domain`] - Vesting curve, position ledger, vault accountant
//! - [`models`] - Events, aggregates, identifiers, checkpoints
//! - [`ports`] - Interface traits for adapters to implement
//! - [`services`] - Event indexer, indexer service, query service
//! - [`error`] - Domain error types
//! - [`metrics`] - Prometheus metrics definitions
//!
//! # Indexer Lifecycle
//!
//! 1. Restore state from the latest checkpoint plus the retained log
//! 2. Subscribe to the feed after the last retained event
//! 3. Sort, dedup and apply each batch under the accounting invariants
//! 4. Persist changed log records (and periodic checkpoints) atomically
//! 5. On rollback, replay the retained log up to the boundary

pub mod domain;
pub mod error;
pub mod metrics;
pub mod models;
pub mod ports;
pub mod services;
