mod connection;
mod migrations;
pub mod store;

pub use connection::Database;
pub use store::{MemoryStore, PersistedRecord, PersistenceStore};
