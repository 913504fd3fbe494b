//! Database access layer
//!
//! SQLite storage for the persisted replica.

pub mod init;
pub mod replica;

pub use init::init_database;
pub use replica::{load_replica, save_replica};
