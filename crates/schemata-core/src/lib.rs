//! Core types and engine for the schemata table-schema editor.
//!
//! A persisted schema document arrives in one of several physical layouts.
//! This crate detects the layout, exposes the document as a uniform
//! table/column model, applies edits to that model and writes them back into
//! the document's original layout.
//!
//! This crate is deliberately free of HTTP and database dependencies. The
//! persistence backend is reached only through [`store::SchemaStore`].

pub mod column;
pub mod diff;
pub mod document;
pub mod error;
pub mod mapper;
pub mod normalize;
pub mod session;
pub mod shape;
pub mod store;
pub mod table;
pub mod version;

pub use document::SchemaDocument;
pub use error::{Error, Result};
