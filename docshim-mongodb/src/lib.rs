//! MongoDB driver implementation for docshim.
//!
//! This crate provides a MongoDB-based implementation of the `StoreDriver` trait on top
//! of the official async driver.
//!
//! To use this driver, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docshim = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Connection
//!
//! The driver connects from a [`ConnectionConfig`](docshim_core::config::ConnectionConfig)
//! or a raw connection string, and pings the server while building so an unreachable
//! server aborts startup.
//!
//! # Example
//!
//! ```ignore
//! use docshim::{DataStore, KeywordSet, config::ConnectionConfig, mongodb::MongoDbDriverBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConnectionConfig::new("localhost", 27017).with_dbname("adapt");
//!     let mut keywords = KeywordSet::new();
//!     let store = DataStore::builder(MongoDbDriverBuilder::from_config(&config))
//!         .build(&mut keywords)
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docshim_mongodb;

pub mod driver;
pub mod error;

pub use driver::{MongoDbDriver, MongoDbDriverBuilder};
pub use error::driver_error;
