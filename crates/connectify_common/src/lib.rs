// --- File: crates/connectify_common/src/lib.rs ---
//! Shared building blocks for the Connectify calendar sync services: domain models, the
//! calendar provider abstraction, the HTTP-facing error type and logging setup.

pub mod error;
pub mod http;
pub mod logging;
pub mod models;
pub mod services;

#[cfg(test)]
mod models_test;

pub use error::{config_error, validation_error, ConnectifyError, HttpStatusCode};

pub use http::{client::create_client, map_json_error, IntoHttpResponse};

pub use services::{
    BoxFuture, CalendarProvider, EventPayload, ProviderError, RemoteEvent, RemoteEventTime,
    TokenGrant,
};
