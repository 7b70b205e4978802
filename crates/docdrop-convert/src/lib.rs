#![warn(missing_docs)]

//! docdrop conversion subsystem: turns stored documents into HTML.
//!
//! The [`DocumentConverter`] trait is the converter capability; built-in
//! implementations cover Word (`.docx`) packages and plain text. The
//! [`ConversionPipeline`] resolves a blob identifier through the store, runs
//! the converter off the async executor, and bounds it with a timeout and a
//! cancellation token.

pub mod converter;
pub mod docx;
pub mod error;
pub mod html;
pub mod pipeline;
pub mod text;
pub mod xml;

pub use converter::{Conversion, ConverterRegistry, DocumentConverter};
pub use docx::DocxConverter;
pub use error::{ConvertError, ConvertResult, PipelineError, PipelineResult};
pub use pipeline::{ConversionPipeline, ConvertedDocument, DEFAULT_CONVERT_TIMEOUT};
pub use text::PlainTextConverter;
