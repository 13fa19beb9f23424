// --- File: crates/connectify_gcal_sync/src/lib.rs ---
//! Google Calendar synchronization for Connectify bookings.
//!
//! Specialists connect their calendar through OAuth. Booking changes are queued and a worker
//! mirrors each booking as one event in the specialist's calendar.

pub mod credentials;
#[cfg(test)]
mod credentials_test;
pub mod doc;
pub mod error;
pub mod handlers;
pub mod import;
pub mod locks;
pub mod payload;
#[cfg(test)]
mod payload_proptest;
pub mod provider;
pub mod reconciler;
pub mod routes;
pub mod service;
#[cfg(test)]
mod test_support;
pub mod timezone;
pub mod worker;

pub use credentials::{AccessToken, ConnectionStatus, CredentialManager, CredentialSettings};
pub use error::{CredentialError, PayloadError, ReconcileError, SyncError};
pub use handlers::GcalSyncState;
pub use import::{ImportOptions, ImportReport, ImportStatus, ImportedEvent, ServiceMapping};
pub use reconciler::{EventReconciler, ReconcileAction, ReconcileOutcome};
pub use service::GcalSyncService;
pub use worker::{BatchSummary, QueueWorker, WorkerSettings};
