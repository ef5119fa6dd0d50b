use serde::Deserialize;

use crate::infrastructure::ingestion::{ParserSettings, WebSettings};
use crate::infrastructure::services::FileNaming;
use crate::infrastructure::vector_store::VectorStoreSettings;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageSettings,
    pub vector_store: VectorStoreSettings,
    pub ingestion: IngestionSettings,
    pub query: QuerySettings,
    pub web: WebSettings,
    pub parsers: ParserSettings,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub data_path: String,
    pub catalog_file: String,
    pub file_naming: FileNaming,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestionSettings {
    pub max_file_size_mb: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    pub top_k: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_path: "data".to_string(),
            catalog_file: "data/group_meta.json".to_string(),
            file_naming: FileNaming::Original,
        }
    }
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            max_file_size_mb: 100,
        }
    }
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self { top_k: 3 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("DOCBASE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::vector_store::VectorStoreBackend;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.storage.data_path, "data");
        assert_eq!(config.storage.catalog_file, "data/group_meta.json");
        assert_eq!(config.storage.file_naming, FileNaming::Original);
        assert_eq!(config.vector_store.backend, VectorStoreBackend::JsonFile);
        assert_eq!(config.ingestion.max_file_size_mb, 100);
        assert_eq!(config.query.top_k, 3);
        assert_eq!(config.web.timeout_secs, 30);
        assert_eq!(config.parsers.pdf.min_page_text_length, 50);
        assert_eq!(config.logging.level, "info");
        assert!(matches!(config.logging.format, LogFormat::Pretty));
    }

    #[test]
    fn test_partial_file_overrides_keep_other_defaults() {
        let config: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(
                r#"
                [storage]
                file_naming = "id_prefixed"

                [vector_store]
                backend = "memory"

                [query]
                top_k = 7

                [parsers.text]
                chunk_size = 500
                "#,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.storage.file_naming, FileNaming::IdPrefixed);
        assert_eq!(config.storage.data_path, "data");
        assert_eq!(config.vector_store.backend, VectorStoreBackend::Memory);
        assert_eq!(config.query.top_k, 7);
        assert_eq!(config.parsers.text.chunk_size, 500);
        assert_eq!(config.parsers.text.chunk_overlap, 100);
        assert_eq!(config.ingestion.max_file_size_mb, 100);
    }
}
