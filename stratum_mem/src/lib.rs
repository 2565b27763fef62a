//! # Stratum memory store
//!
//! In-memory connection provider for stratum's migrator, primarily for testing.
//!
//! ```ignore
//! use stratum_core::prelude::*;
//! use stratum_mem::InMemoryConnection;
//!
//! let mut conn = InMemoryConnection::new();
//! let mut migrator = Migrator::new(registry);
//! migrator.upgrade(&mut conn, false).await?;
//!
//! assert!(conn.has_table("master_workflow"));
//! ```

#![deny(missing_docs)]

mod connection;

pub use connection::*;
