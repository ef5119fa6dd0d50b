//! Infrastructure layer - store backends, parsers, and orchestration

pub mod catalog;
pub mod ingestion;
pub mod logging;
pub mod services;
pub mod vector_store;
