//! A thin data-access layer over document databases for plugin-based host applications.
//!
//! This crate is the core of the docshim project and provides:
//!
//! - **Identifier coercion** ([`identifier`]) - Recognizing, parsing and deep-coercing identifier strings
//! - **Query normalization** ([`query`]) - Declarative query descriptors and their driver-facing form
//! - **Driver abstraction** ([`driver`]) - Traits for implementing document database drivers
//! - **Document store** ([`store`]) - The facade sequencing coercion, normalization and classification
//! - **Error handling** ([`error`]) - The error taxonomy and the driver error classifier
//! - **Validator keywords** ([`keyword`]) - Coercing keywords for an external schema validator
//! - **Configuration** ([`config`]) - Connection parameters and URI assembly
//! - **Payloads** ([`payload`]) - Conversions between JSON, typed values and BSON documents
//!
//! # Example
//!
//! ```ignore
//! use bson::doc;
//! use docshim_core::{query::QueryDescriptor, store::DataStore};
//!
//! let store = DataStore::new(driver);
//! let course = store.insert("courses", doc! { "ownerId": "5f1b2c3d4e5f6a7b8c9d0e1f" }).await?;
//! assert!(course.get_object_id("ownerId").is_ok());
//!
//! let courses = store
//!     .find("courses", QueryDescriptor::new(doc! { "_id": course.get_object_id("_id")? }))
//!     .await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docshim_core;

pub mod config;
pub mod driver;
pub mod error;
pub mod identifier;
pub mod keyword;
pub mod payload;
pub mod query;
pub mod store;
