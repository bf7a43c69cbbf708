//! Database layer for bimsync

mod connection;
mod migrations;
mod store;

pub use connection::Database;
pub use store::LibSqlStore;
