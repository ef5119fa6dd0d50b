//! Vector store factory
//!
//! Builds the configured backend behind `Arc<dyn VectorStore>`.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::VectorStore;

use super::{InMemoryVectorStore, JsonFileVectorStore};

/// Which backend to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorStoreBackend {
    Memory,
    JsonFile,
}

impl fmt::Display for VectorStoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::JsonFile => write!(f, "json_file"),
        }
    }
}

/// The `[vector_store]` configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreSettings {
    pub backend: VectorStoreBackend,
    pub path: String,
}

impl Default for VectorStoreSettings {
    fn default() -> Self {
        Self {
            backend: VectorStoreBackend::JsonFile,
            path: "data/vector_store.json".to_string(),
        }
    }
}

pub struct VectorStoreFactory;

impl VectorStoreFactory {
    pub fn create(settings: &VectorStoreSettings) -> Arc<dyn VectorStore> {
        match settings.backend {
            VectorStoreBackend::Memory => Arc::new(InMemoryVectorStore::new()),
            VectorStoreBackend::JsonFile => Arc::new(JsonFileVectorStore::new(&settings.path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_settings_pick_the_file_backend() {
        let settings = VectorStoreSettings::default();
        assert_eq!(settings.backend, VectorStoreBackend::JsonFile);
        assert_eq!(settings.path, "data/vector_store.json");

        let store = VectorStoreFactory::create(&settings);
        assert_eq!(store.backend_name(), "json_file");
    }

    #[test]
    fn test_memory_backend_selection() {
        let settings = VectorStoreSettings {
            backend: VectorStoreBackend::Memory,
            path: String::new(),
        };
        let store = VectorStoreFactory::create(&settings);
        assert_eq!(store.backend_name(), "memory");
    }

    #[test]
    fn test_backend_names_deserialize_snake_case() {
        let settings: VectorStoreSettings =
            serde_json::from_value(json!({ "backend": "memory" })).unwrap();
        assert_eq!(settings.backend, VectorStoreBackend::Memory);
        assert_eq!(settings.path, "data/vector_store.json");

        assert!(serde_json::from_value::<VectorStoreSettings>(json!({ "backend": "redis" }))
            .is_err());
    }

    #[test]
    fn test_backend_display_matches_config_spelling() {
        assert_eq!(VectorStoreBackend::Memory.to_string(), "memory");
        assert_eq!(VectorStoreBackend::JsonFile.to_string(), "json_file");
    }
}
