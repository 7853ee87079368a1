//! Core domain types for Relay.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the dispatch pipeline.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Panics are documented in assertions

mod action;
mod connector;
mod policy;

pub use action::{ActionError, ActionRequest, ActionResponse, InvalidResponse};
pub use connector::{AuthConfig, AuthKind, ConnectorConfig, Credentials, ValidationError};
pub use policy::{AdmissionConfig, ErrorMatcher, RetryPolicy};
