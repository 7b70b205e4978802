#![warn(missing_docs)]

//! docdrop storage subsystem: identifier generation, a flat temporary blob
//! store on the local filesystem, and the retention sweeper that evicts
//! stale uploads.
//!
//! Every blob lives in a single directory as `<id><extension>`. All metadata
//! (creation and modification time) comes from filesystem attributes, so the
//! store keeps no in-memory index and several processes may share a directory.

pub mod blob_store;
pub mod config;
pub mod error;
pub mod id;
pub mod sweeper;

pub use blob_store::{BlobEntries, BlobEntry, BlobRecord, BlobStore, PendingBlob};
pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use id::{BlobId, IdError};
pub use sweeper::{RetentionSweeper, SweepStats, SweeperHandle, SweeperStats};
