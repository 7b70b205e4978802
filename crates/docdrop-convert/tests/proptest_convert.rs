//! Property-based tests for docdrop-convert using proptest.
//!
//! Converted output must never let document text through as markup, and
//! converting the same bytes twice must give the same result.

use std::io::{Cursor, Write};

use docdrop_convert::{DocxConverter, PlainTextConverter};
use proptest::prelude::*;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn docx_with_paragraph(text: &str) -> Vec<u8> {
    let document = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p></w:body></w:document>"#,
        xml_escape(text)
    );
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    zip.start_file("word/document.xml", SimpleFileOptions::default())
        .unwrap();
    zip.write_all(document.as_bytes()).unwrap();
    zip.finish().unwrap().into_inner()
}

/// Removes the only tags the text converter may emit.
fn strip_text_markup(html: &str) -> String {
    html.replace("<p>", "").replace("</p>", "").replace("<br />", "")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Plain-text output contains no tags beyond paragraphs and breaks.
    #[test]
    fn prop_text_output_has_no_foreign_tags(input in "[ -~\n]{0,200}") {
        let out = PlainTextConverter::new().convert_str(&input);
        prop_assert!(!strip_text_markup(&out.html).contains('<'));
        prop_assert!(out.messages.is_empty());
    }

    /// Every non-blank input line survives, escaped, in the output.
    #[test]
    fn prop_text_lines_preserved(lines in proptest::collection::vec("[a-z<>&]{1,12}", 1..8)) {
        let out = PlainTextConverter::new().convert_str(&lines.join("\n"));
        for line in &lines {
            prop_assert!(out.html.contains(&html_escape(line)));
        }
    }

    /// A single-run paragraph renders as exactly one escaped `<p>`.
    #[test]
    fn prop_docx_paragraph_text_escaped(text in "[a-zA-Z0-9 <>&\"']{1,80}") {
        let out = DocxConverter::new()
            .convert_reader(Cursor::new(docx_with_paragraph(&text)))
            .unwrap();
        prop_assert_eq!(out.html, format!("<p>{}</p>", html_escape(&text)));
    }

    /// Converting the same package twice yields identical output.
    #[test]
    fn prop_docx_deterministic(text in "[a-z ]{0,40}") {
        let bytes = docx_with_paragraph(&text);
        let first = DocxConverter::new().convert_reader(Cursor::new(bytes.clone())).unwrap();
        let second = DocxConverter::new().convert_reader(Cursor::new(bytes)).unwrap();
        prop_assert_eq!(first, second);
    }

    /// Arbitrary bytes never panic the converter.
    #[test]
    fn prop_docx_garbage_is_an_error(data in proptest::collection::vec(any::<u8>(), 0..512)) {
        prop_assert!(DocxConverter::new().convert_reader(Cursor::new(data)).is_err());
    }
}
