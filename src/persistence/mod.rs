//! History and chat-state persistence backends.

pub mod in_memory;
pub mod noop;
pub mod sqlite;
pub mod traits;

pub use in_memory::InMemoryPersistence;
pub use noop::NoopPersistence;
pub use sqlite::SqlitePersistence;
pub use traits::{PersistedState, Persistence};

use std::path::Path;
use std::sync::Arc;

use crate::config::PersistenceConfig;

/// Factory: create the backend named by `config.backend`. `db_path` is only
/// used by `sqlite`.
pub fn create_persistence(
    config: &PersistenceConfig,
    db_path: &Path,
) -> anyhow::Result<Arc<dyn Persistence>> {
    match config.backend.trim().to_ascii_lowercase().as_str() {
        "sqlite" => Ok(Arc::new(SqlitePersistence::open(db_path)?)),
        "memory" => Ok(Arc::new(InMemoryPersistence::new())),
        "none" => Ok(Arc::new(NoopPersistence)),
        other => anyhow::bail!(
            "Unknown persistence.backend '{other}'. Supported values: sqlite, memory, none"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(backend: &str) -> PersistenceConfig {
        PersistenceConfig {
            backend: backend.to_string(),
            ..PersistenceConfig::default()
        }
    }

    #[test]
    fn factory_builds_each_backend() {
        let tmp = TempDir::new().unwrap();
        let db = tmp.path().join("history.db");
        assert_eq!(create_persistence(&config("sqlite"), &db).unwrap().name(), "sqlite");
        assert!(db.exists());
        assert_eq!(create_persistence(&config("Memory"), &db).unwrap().name(), "memory");
        assert_eq!(create_persistence(&config("none"), &db).unwrap().name(), "none");
    }

    #[test]
    fn factory_rejects_unknown_backend() {
        let tmp = TempDir::new().unwrap();
        let err = create_persistence(&config("redis"), &tmp.path().join("x.db"))
            .err()
            .unwrap();
        assert!(err.to_string().contains("Unknown persistence.backend"));
    }
}
