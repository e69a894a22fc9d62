use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use gn_core::{ArticleStorage, Config, Error, Result};

pub mod backends;

pub use backends::*;

/// Storage backends selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Mongo,
    Memory,
}

impl FromStr for StorageKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mongo" | "mongodb" => Ok(StorageKind::Mongo),
            "memory" => Ok(StorageKind::Memory),
            other => Err(Error::Storage(format!("Unknown storage backend: {other}"))),
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageKind::Mongo => f.write_str("mongo"),
            StorageKind::Memory => f.write_str("memory"),
        }
    }
}

/// Build the requested backend. The caller is expected to `verify()` it.
pub async fn create_storage(kind: StorageKind, config: &Config) -> Result<Arc<dyn ArticleStorage>> {
    match kind {
        #[cfg(feature = "mongo")]
        StorageKind::Mongo => Ok(Arc::new(MongoStorage::connect(config).await?)),
        #[cfg(not(feature = "mongo"))]
        StorageKind::Mongo => Err(Error::Storage(
            "MongoDB support was not compiled in (enable the `mongo` feature)".to_string(),
        )),
        StorageKind::Memory => Ok(Arc::new(InMemoryStorage::new(config.schema_version.clone()))),
    }
}

pub mod prelude {
    pub use super::backends::*;
    pub use super::{create_storage, StorageKind};
}
