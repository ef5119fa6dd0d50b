//! docbase
//!
//! A multi-tenant document ingestion engine: groups own uploaded files and
//! registered webpages, which are parsed into content-addressed chunks and
//! served back through group-filtered retrieval.

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;
