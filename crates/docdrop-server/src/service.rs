//! Upload/convert orchestration.
//!
//! [`DocService`] sits between the HTTP adapter and the storage and
//! conversion subsystems. It owns the request-level policy: the upload size
//! cap, identifier parsing, error classification and metrics.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use futures::{pin_mut, Stream, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use docdrop_convert::{ConversionPipeline, ConvertedDocument, ConverterRegistry, DocumentConverter};
use docdrop_store::{BlobId, BlobRecord, BlobStore, StoreError, StoreResult};

use crate::config::ServerConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::metrics::ServiceMetrics;

/// What a client learns about a stored upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReceipt {
    pub id: BlobId,
    pub stored_path: PathBuf,
    /// Stored filename, `<id>.<ext>`.
    pub file_name: String,
    /// Filename as sent by the client.
    pub original_name: String,
    pub file_url: String,
    pub size: u64,
}

pub struct DocService {
    store: Arc<BlobStore>,
    pipeline: ConversionPipeline,
    metrics: Arc<ServiceMetrics>,
    config: Arc<ServerConfig>,
    shutdown: CancellationToken,
}

impl DocService {
    /// Opens the store named by `config` and wires the default converters.
    ///
    /// In-flight conversions fail with `Unavailable` once `shutdown` fires.
    pub async fn open(config: Arc<ServerConfig>, shutdown: CancellationToken) -> StoreResult<Self> {
        let store = Arc::new(BlobStore::open(&config.store_config()).await?);
        let converter: Arc<dyn DocumentConverter> = Arc::new(ConverterRegistry::with_defaults());
        Ok(Self::new(store, converter, config, shutdown))
    }

    pub fn new(
        store: Arc<BlobStore>,
        converter: Arc<dyn DocumentConverter>,
        config: Arc<ServerConfig>,
        shutdown: CancellationToken,
    ) -> Self {
        let pipeline = ConversionPipeline::new(store.clone(), converter, config.convert_timeout());
        Self {
            store,
            pipeline,
            metrics: Arc::new(ServiceMetrics::new()),
            config,
            shutdown,
        }
    }

    pub fn store(&self) -> &Arc<BlobStore> {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<ServiceMetrics> {
        &self.metrics
    }

    pub fn config(&self) -> &Arc<ServerConfig> {
        &self.config
    }

    /// Streams an upload into the store.
    ///
    /// Chunks are written as they arrive; the upload is rejected with
    /// `PayloadTooLarge` as soon as it passes the configured cap, and the
    /// partial file is discarded.
    pub async fn handle_upload<S>(&self, original_name: &str, chunks: S) -> ServiceResult<UploadReceipt>
    where
        S: Stream<Item = ServiceResult<Bytes>>,
    {
        let original_name = original_name.trim();
        if original_name.is_empty() {
            self.metrics.upload_failures.inc();
            return Err(ServiceError::NoInput("No files were uploaded.".to_string()));
        }

        let record = match self.receive(original_name, chunks).await {
            Ok(record) => record,
            Err(e) => {
                self.metrics.upload_failures.inc();
                warn!(original = original_name, error = %e, "upload failed");
                return Err(e);
            }
        };

        self.metrics.uploads.inc();
        self.metrics.upload_bytes.add(record.size);
        info!(id = %record.id, original = original_name, bytes = record.size, "upload accepted");

        Ok(UploadReceipt {
            id: record.id,
            file_url: self.config.file_url(&record.file_name),
            stored_path: record.stored_path,
            file_name: record.file_name,
            original_name: original_name.to_string(),
            size: record.size,
        })
    }

    async fn receive<S>(&self, original_name: &str, chunks: S) -> ServiceResult<BlobRecord>
    where
        S: Stream<Item = ServiceResult<Bytes>>,
    {
        let limit = self.config.max_upload_bytes;
        let mut pending = self
            .store
            .begin(original_name)
            .await
            .map_err(ServiceError::WriteFailure)?;

        pin_mut!(chunks);
        // An early return drops `pending`, which removes the staging file.
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            if pending.written() + chunk.len() as u64 > limit {
                return Err(ServiceError::PayloadTooLarge { limit });
            }
            pending.write(&chunk).await.map_err(ServiceError::WriteFailure)?;
        }
        pending.commit().await.map_err(ServiceError::WriteFailure)
    }

    /// Converts the stored file named by a client-supplied identifier.
    ///
    /// Text that does not parse as an identifier cannot name a stored file
    /// and is reported as `NotFound`.
    pub async fn handle_convert(&self, raw_id: &str) -> ServiceResult<ConvertedDocument> {
        let raw_id = raw_id.trim();
        if raw_id.is_empty() {
            return Err(ServiceError::NoInput("No file ID provided".to_string()));
        }
        let id = parse_id(raw_id)?;

        match self.pipeline.convert_with_cancel(&id, &self.shutdown).await {
            Ok(doc) => {
                self.metrics.conversions.inc();
                Ok(doc)
            }
            Err(e) => {
                let err = ServiceError::from(e);
                self.metrics.conversion_failures.inc();
                if matches!(err, ServiceError::Timeout { .. }) {
                    self.metrics.conversion_timeouts.inc();
                }
                Err(err)
            }
        }
    }

    /// Removes a stored file ahead of its retention deadline.
    pub async fn handle_delete(&self, raw_id: &str) -> ServiceResult<BlobId> {
        let raw_id = raw_id.trim();
        if raw_id.is_empty() {
            return Err(ServiceError::NoInput("No file ID provided".to_string()));
        }
        let id = parse_id(raw_id)?;

        match self.store.remove(&id).await {
            Ok(_) => {
                self.metrics.deletions.inc();
                Ok(id)
            }
            Err(StoreError::NotFound { .. }) => Err(ServiceError::NotFound),
            Err(e) => Err(ServiceError::Storage(e)),
        }
    }
}

fn parse_id(raw: &str) -> ServiceResult<BlobId> {
    raw.parse::<BlobId>().map_err(|e| {
        debug!(error = %e, "rejecting malformed id");
        ServiceError::NotFound
    })
}
