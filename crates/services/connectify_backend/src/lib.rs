// --- File: crates/services/connectify_backend/src/lib.rs ---
//! Process wiring shared by the HTTP server and the `gcal_sync_worker` binary.

pub mod app_state;
pub mod background;
#[cfg(test)]
mod background_test;
