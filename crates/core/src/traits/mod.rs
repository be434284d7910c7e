pub mod durable_store;
pub mod live_store;

pub use durable_store::*;
pub use live_store::*;
