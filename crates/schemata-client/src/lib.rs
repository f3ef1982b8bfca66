//! HTTP backend for schemata: an async client for the schema-manager REST API
//! that implements [`schemata_core::store::SchemaStore`].

pub mod client;
pub mod error;

pub use client::{ApiClient, ApiConfig};
pub use error::{Error, Result};
