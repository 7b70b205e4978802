//! The converter capability and extension-based dispatch.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::docx::DocxConverter;
use crate::error::{ConvertError, ConvertResult};
use crate::text::PlainTextConverter;

/// Output of a successful conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversion {
    /// Resulting markup.
    pub html: String,
    /// Warnings about content that could not be represented.
    pub messages: Vec<String>,
}

/// Transforms a stored document into HTML.
///
/// Implementations do blocking I/O and run on the blocking thread pool.
pub trait DocumentConverter: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Converts the file at `path`.
    fn convert(&self, path: &Path) -> ConvertResult<Conversion>;
}

/// Routes a document to a converter by file extension.
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    by_extension: HashMap<String, Arc<dyn DocumentConverter>>,
}

impl ConverterRegistry {
    /// An empty registry that rejects every file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in Word and plain-text converters.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(&["docx"], Arc::new(DocxConverter::new()));
        registry.register(&["txt", "text", "md"], Arc::new(PlainTextConverter::new()));
        registry
    }

    /// Maps each extension (case-insensitive, without dot) to `converter`.
    pub fn register(&mut self, extensions: &[&str], converter: Arc<dyn DocumentConverter>) {
        for ext in extensions {
            self.by_extension
                .insert(ext.to_ascii_lowercase(), converter.clone());
        }
    }

    /// Extensions with a registered converter, sorted.
    pub fn extensions(&self) -> Vec<&str> {
        let mut exts: Vec<&str> = self.by_extension.keys().map(String::as_str).collect();
        exts.sort_unstable();
        exts
    }

    /// Finds the converter for `path`.
    pub fn converter_for(&self, path: &Path) -> ConvertResult<&Arc<dyn DocumentConverter>> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext {
            Some(ext) => self
                .by_extension
                .get(&ext)
                .ok_or(ConvertError::Unsupported(format!(".{ext}"))),
            None => Err(ConvertError::Unsupported("file without extension".to_string())),
        }
    }
}

impl DocumentConverter for ConverterRegistry {
    fn name(&self) -> &'static str {
        "registry"
    }

    fn convert(&self, path: &Path) -> ConvertResult<Conversion> {
        let converter = self.converter_for(path)?;
        debug!(converter = converter.name(), path = %path.display(), "dispatching conversion");
        converter.convert(path)
    }
}
