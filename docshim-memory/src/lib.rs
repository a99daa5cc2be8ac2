//! In-memory storage driver for docshim.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreDriver` trait.
//! It uses async-aware read-write locks for concurrent access and is meant for development
//! and testing, where a database server is not available.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Server-style filters** - Comparison, set and logical operators over dotted paths
//! - **Update operators** - `$set`, `$unset` and `$inc`
//! - **Unique indexes** - Violations reported with the server's duplicate key code
//!
//! # Quick Start
//!
//! ```ignore
//! use bson::doc;
//! use docshim::{DataStore, memory::InMemoryDriver};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = DataStore::new(InMemoryDriver::new());
//!     let user = store.insert("users", doc! { "name": "Alice" }).await?;
//!
//!     assert!(user.get_object_id("_id").is_ok());
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docshim_memory;

pub mod driver;
pub mod evaluator;
pub mod update;

pub use driver::{InMemoryDriver, InMemoryDriverBuilder};
