//! Stores for node state, history, breakdowns and authorities
//!
//! The pipeline talks to a `Store` trait object, so the backend can be
//! swapped without touching the ingestion code.
//!
//! ## Backends
//!
//! - **SQLite** (default): Embedded database
//! - **In-Memory**: No persistence, for testing or config-less runs
//!
//! ## Usage
//!
//! ```no_run
//! use powerline_monitoring::storage::{Store, sqlite::SqliteStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = SqliteStore::new("./powerline.db").await?;
//!     println!("{}", store.health_check().await?.message);
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use tracing::info;

use crate::config::StorageConfig;

pub mod backend;
pub mod error;
pub mod memory;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::{HealthStatus, HistoryQuery, Store};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;

/// Build the store selected in the configuration
pub async fn open_store(config: Option<&StorageConfig>) -> StorageResult<Arc<dyn Store>> {
    match config {
        None | Some(StorageConfig::None) => {
            info!("using in-memory store (data is lost on restart)");
            Ok(Arc::new(MemoryStore::new()))
        }
        #[cfg(feature = "storage-sqlite")]
        Some(StorageConfig::Sqlite { path }) => Ok(Arc::new(sqlite::SqliteStore::new(path).await?)),
        #[cfg(not(feature = "storage-sqlite"))]
        Some(StorageConfig::Sqlite { .. }) => Err(StorageError::ConnectionFailed(
            "built without the storage-sqlite feature".to_string(),
        )),
    }
}
