//! Resolve-then-convert pipeline.

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use docdrop_store::{BlobId, BlobStore};

use crate::converter::DocumentConverter;
use crate::error::{ConvertError, PipelineError, PipelineResult};

/// Time budget applied when none is configured.
pub const DEFAULT_CONVERT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTML produced for a stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConvertedDocument {
    /// The blob that was converted.
    pub source_id: BlobId,
    /// Resulting markup.
    pub html: String,
    /// Converter warnings.
    pub messages: Vec<String>,
}

/// Looks up a blob by id and runs a converter over it.
///
/// Each call re-reads the stored file; nothing is cached. Converters run on
/// the blocking pool. A timed-out or cancelled converter is abandoned and
/// finishes in the background; its result is discarded.
#[derive(Clone)]
pub struct ConversionPipeline {
    store: Arc<BlobStore>,
    converter: Arc<dyn DocumentConverter>,
    timeout: Duration,
}

impl ConversionPipeline {
    /// Creates a pipeline with the given time budget per conversion.
    pub fn new(store: Arc<BlobStore>, converter: Arc<dyn DocumentConverter>, timeout: Duration) -> Self {
        Self {
            store,
            converter,
            timeout,
        }
    }

    /// Per-conversion time budget.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Converts the blob named by `id`.
    pub async fn convert(&self, id: &BlobId) -> PipelineResult<ConvertedDocument> {
        self.convert_with_cancel(id, &CancellationToken::new()).await
    }

    /// Converts the blob named by `id`, giving up early if `cancel` fires.
    pub async fn convert_with_cancel(
        &self,
        id: &BlobId,
        cancel: &CancellationToken,
    ) -> PipelineResult<ConvertedDocument> {
        let path = self.store.resolve(id).await?;
        debug!(%id, path = %path.display(), converter = self.converter.name(), "converting");

        let started = Instant::now();
        let converter = self.converter.clone();
        let job = tokio::task::spawn_blocking(move || converter.convert(&path));

        let joined = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(%id, "conversion cancelled");
                return Err(PipelineError::Cancelled);
            }
            res = tokio::time::timeout(self.timeout, job) => match res {
                Ok(joined) => joined,
                Err(_) => {
                    warn!(%id, timeout_secs = self.timeout.as_secs(), "conversion timed out");
                    return Err(PipelineError::Timeout {
                        secs: self.timeout.as_secs(),
                    });
                }
            },
        };

        let conversion = match joined {
            Ok(Ok(conversion)) => conversion,
            // The file disappeared between resolve and open (sweeper or delete).
            Ok(Err(ConvertError::Io(e))) if e.kind() == io::ErrorKind::NotFound => {
                return Err(PipelineError::NotFound { id: *id });
            }
            Ok(Err(e)) => {
                warn!(%id, error = %e, "conversion failed");
                return Err(PipelineError::ConversionFailure(e));
            }
            Err(e) => {
                warn!(%id, error = %e, "converter task failed");
                return Err(PipelineError::Crashed(e.to_string()));
            }
        };

        info!(
            %id,
            html_bytes = conversion.html.len(),
            warnings = conversion.messages.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "conversion complete"
        );
        Ok(ConvertedDocument {
            source_id: *id,
            html: conversion.html,
            messages: conversion.messages,
        })
    }
}
