//! Conversation store implementations for Parley.

pub mod in_memory;
pub mod retry;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryStore;
pub use retry::RetryPolicy;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

use parley_config::AppConfig;
use parley_core::error::StoreError;
use parley_core::store::ConversationStore;
use std::sync::Arc;
use tracing::info;

/// Build the configured store, retrying the connection per `store.retry`.
///
/// Exhausting the retries is a startup failure and is returned to the caller.
pub async fn build_from_config(config: &AppConfig) -> Result<Arc<dyn ConversationStore>, StoreError> {
    match config.store.backend.as_str() {
        "in_memory" => {
            info!("Using in-memory conversation store");
            Ok(Arc::new(InMemoryStore::new()))
        }
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            let path = config.store_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Connection(format!("{}: {e}", parent.display())))?;
            }
            let path = path.display().to_string();
            let policy = RetryPolicy::from(&config.store.retry);
            let store = policy
                .retry("SQLite connection", || SqliteStore::new(&path))
                .await?;
            Ok(Arc::new(store))
        }
        other => Err(StoreError::Connection(format!(
            "store backend \"{other}\" is not available in this build"
        ))),
    }
}
