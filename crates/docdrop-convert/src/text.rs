//! Plain-text converter.

use std::path::Path;

use crate::converter::{Conversion, DocumentConverter};
use crate::error::{ConvertError, ConvertResult};
use crate::html::HtmlWriter;

/// Renders UTF-8 text: blank-line separated blocks become paragraphs and
/// single newlines become line breaks.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextConverter;

impl PlainTextConverter {
    /// Creates the converter.
    pub fn new() -> Self {
        Self
    }

    /// Converts text already in memory.
    pub fn convert_str(&self, text: &str) -> Conversion {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let normalized = text.replace("\r\n", "\n").replace('\r', "\n");

        let mut w = HtmlWriter::new();
        let mut block: Vec<&str> = Vec::new();
        for line in normalized.split('\n').chain(std::iter::once("")) {
            if line.trim().is_empty() {
                if !block.is_empty() {
                    w.open("p");
                    for (i, l) in block.iter().enumerate() {
                        if i > 0 {
                            w.void("br");
                        }
                        w.text(l);
                    }
                    w.close("p");
                    block.clear();
                }
            } else {
                block.push(line);
            }
        }

        Conversion {
            html: w.finish(),
            messages: Vec::new(),
        }
    }
}

impl DocumentConverter for PlainTextConverter {
    fn name(&self) -> &'static str {
        "plain-text"
    }

    fn convert(&self, path: &Path) -> ConvertResult<Conversion> {
        let bytes = std::fs::read(path)?;
        let text = String::from_utf8(bytes).map_err(|_| ConvertError::Encoding)?;
        Ok(self.convert_str(&text))
    }
}
