//! Infrastructure services

mod pipeline_service;

pub use pipeline_service::{
    AcceptedSource, FileNaming, FileUpload, IngestReceipt, PipelineOptions, PipelineService,
    SkippedSource,
};
