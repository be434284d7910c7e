pub mod sqlite_durable_store;

pub use sqlite_durable_store::SqliteDurableStore;
