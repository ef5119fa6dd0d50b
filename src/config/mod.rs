//! Layered application configuration

mod app_config;

pub use app_config::{
    AppConfig, IngestionSettings, LogFormat, LoggingConfig, QuerySettings, StorageSettings,
};
