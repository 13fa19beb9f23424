//! Database integration for Connectify
//!
//! This crate provides a database client built on the SQLx `Any` driver and the
//! repositories the calendar sync engine persists its state through:
//!
//! - [`CredentialRepository`] for per-specialist OAuth credentials
//! - [`SyncQueueRepository`] for the durable queue of booking changes
//! - [`BookingRepository`] for the bookings themselves and their remote event reference
//!
//! # Example
//!
//! ```rust,no_run
//! use connectify_db::{DbClient, SqlSyncQueueRepository, SyncQueueRepository};
//!
//! async fn setup_queue() -> Result<SqlSyncQueueRepository, connectify_db::DbError> {
//!     let db_client = DbClient::from_url("sqlite://data/connectify.db").await?;
//!     let queue = SqlSyncQueueRepository::new(db_client);
//!     queue.init_schema().await?;
//!     Ok(queue)
//! }
//! ```

pub mod client;
pub mod error;
pub mod repositories;

pub use client::DbClient;
pub use error::DbError;

pub use repositories::{
    Booking, BookingRepository, Credential, CredentialRepository, CredentialStatus,
    EnqueueOutcome, NewBooking, SqlBookingRepository, SqlCredentialRepository,
    SqlSyncQueueRepository, SyncQueueRepository,
};
