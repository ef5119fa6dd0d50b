use thiserror::Error;

/// Core engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Unsupported format: {message}")]
    UnsupportedFormat { message: String },

    #[error("Parse error ({format}): {message}")]
    Parse { format: String, message: String },

    #[error("Duplicate source: {message}")]
    DuplicateSource { message: String },

    #[error("Store inconsistency: {message}")]
    StoreInconsistency { message: String },

    #[error("Catalog I/O error: {message}")]
    CatalogIo { message: String },

    #[error("Vector store error: {message}")]
    VectorStore { message: String },

    #[error("Web fetch error ({url}): {message}")]
    WebFetch { url: String, message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl EngineError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn unsupported_format(message: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            message: message.into(),
        }
    }

    pub fn parse(format: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            format: format.into(),
            message: message.into(),
        }
    }

    pub fn duplicate_source(message: impl Into<String>) -> Self {
        Self::DuplicateSource {
            message: message.into(),
        }
    }

    pub fn store_inconsistency(message: impl Into<String>) -> Self {
        Self::StoreInconsistency {
            message: message.into(),
        }
    }

    pub fn catalog_io(message: impl Into<String>) -> Self {
        Self::CatalogIo {
            message: message.into(),
        }
    }

    pub fn vector_store(message: impl Into<String>) -> Self {
        Self::VectorStore {
            message: message.into(),
        }
    }

    pub fn web_fetch(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::WebFetch {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
