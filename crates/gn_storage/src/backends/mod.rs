pub mod memory;

#[cfg(feature = "mongo")]
pub mod mongo;

pub use memory::InMemoryStorage;

#[cfg(feature = "mongo")]
pub use mongo::MongoStorage;
