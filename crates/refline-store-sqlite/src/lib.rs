//! SQLite backend for the Refline referral store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread pool without blocking the async runtime. Writes go through a
//! chunk-rotating [`WriteBatch`] so an ingest of any size commits in
//! bounded transactions.

mod encode;
mod schema;
mod store;

pub mod batch;
pub mod error;

pub use batch::WriteBatch;
pub use error::{Error, Result};
pub use store::SqliteStore;
