//! An embedded storage engine for tiled and bricked multi-dimensional
//! microscopy images, backed by a relational schema with optional R-Tree
//! spatial indices.
//!
//! A [`document::Document`] owns a single connection and schema configuration
//! and is created fresh (emitting the schema DDL) or opened against an
//! existing file (discovering and validating the schema). From it callers
//! obtain a 2-D or 3-D reader/writer pair, gated by the document's declared
//! type, plus a metadata handle for the hierarchical document-metadata tree.
//!
//! ```no_run
//! use imgdoc_rs::document::Document;
//! use imgdoc_rs::schema::CreateOptions;
//! use imgdoc_rs::types::DocumentType;
//!
//! let options = CreateOptions::new("my_document.db", DocumentType::Image2d);
//! let doc = Document::create_new(&options)?;
//! let writer = doc.writer_2d().expect("document is 2-D");
//! # Ok::<(), imgdoc_rs::error::Error>(())
//! ```

pub mod connection;
pub mod dimension;
pub mod doc2d;
pub mod doc3d;
pub mod document;
pub mod engine;
pub mod environment;
pub mod error;
pub mod metadata;
pub mod query;
pub mod schema;
pub mod types;

pub use document::Document;
pub use error::{Error, Result};
