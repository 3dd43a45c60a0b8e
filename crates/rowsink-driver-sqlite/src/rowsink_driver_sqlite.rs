//! SQLite driver for rowsink
//!
//! The one backend shipped in-tree; server vendors connect through
//! externally injected `ConnectionFactory` implementations.

mod connection;
mod factory;

pub use connection::SqliteConnection;
pub use factory::SqliteConnectionFactory;
