pub mod database;
pub mod in_memory_store;
pub mod persistence_service;
pub mod persister;

pub use database::*;
pub use in_memory_store::InMemoryLiveStore;
pub use persistence_service::{PersistenceReport, PersistenceService};
pub use persister::Persister;
