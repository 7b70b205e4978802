#![warn(missing_docs)]

//! docdrop service layer: upload/convert orchestration, HTTP API, CLI, metrics

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod metrics;
pub mod security;
pub mod service;

pub use api::DocApi;
pub use config::ServerConfig;
pub use error::{ServiceError, ServiceResult};
pub use metrics::ServiceMetrics;
pub use service::{DocService, UploadReceipt};
