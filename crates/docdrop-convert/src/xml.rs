//! Minimal pull reader for the XML parts of office documents.
//!
//! Handles elements, attributes, character data, the predefined and numeric
//! entities, CDATA sections, comments and processing instructions. It does
//! not validate, resolve DTDs or track namespaces; callers match on local
//! names.

use std::borrow::Cow;

use crate::error::{ConvertError, ConvertResult};

/// One event produced by [`XmlReader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlEvent<'a> {
    /// An opening tag. `empty` is true for `<tag/>`; no matching `End`
    /// event follows in that case.
    Start {
        /// Qualified tag name, e.g. `w:p`.
        name: &'a str,
        /// Raw attribute section.
        attrs: Attributes<'a>,
        /// Self-closing tag.
        empty: bool,
    },
    /// A closing tag.
    End {
        /// Qualified tag name.
        name: &'a str,
    },
    /// Character data with entities decoded.
    Text(Cow<'a, str>),
}

/// Attributes of a start tag, parsed on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attributes<'a> {
    raw: &'a str,
    offset: usize,
}

impl<'a> Attributes<'a> {
    /// Looks up an attribute by local name (prefix ignored).
    pub fn get(&self, local: &str) -> ConvertResult<Option<Cow<'a, str>>> {
        for pair in self.iter() {
            let (key, value) = pair?;
            if local_name(key) == local {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    /// Iterates `(qualified name, decoded value)` pairs.
    pub fn iter(&self) -> AttrIter<'a> {
        AttrIter {
            raw: self.raw,
            pos: 0,
            offset: self.offset,
        }
    }
}

/// Iterator over the attributes of a start tag.
pub struct AttrIter<'a> {
    raw: &'a str,
    pos: usize,
    offset: usize,
}

impl<'a> Iterator for AttrIter<'a> {
    type Item = ConvertResult<(&'a str, Cow<'a, str>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let raw: &'a str = self.raw;
        let bytes = raw.as_bytes();
        while self.pos < bytes.len() && bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
        if self.pos >= bytes.len() {
            return None;
        }

        let key_start = self.pos;
        while self.pos < bytes.len() && bytes[self.pos] != b'=' && !bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
        let key = &raw[key_start..self.pos];
        while self.pos < bytes.len() && bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
        if self.pos >= bytes.len() || bytes[self.pos] != b'=' {
            self.pos = bytes.len();
            return Some(Err(malformed(self.offset + key_start, format!("attribute {key:?} has no value"))));
        }
        self.pos += 1;
        while self.pos < bytes.len() && bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
        let quote = match bytes.get(self.pos) {
            Some(&q @ (b'"' | b'\'')) => q,
            _ => {
                self.pos = bytes.len();
                return Some(Err(malformed(self.offset + key_start, format!("attribute {key:?} is not quoted"))));
            }
        };
        let value_start = self.pos + 1;
        let Some(len) = bytes[value_start..].iter().position(|&b| b == quote) else {
            self.pos = bytes.len();
            return Some(Err(malformed(self.offset + key_start, "unterminated attribute value")));
        };
        self.pos = value_start + len + 1;

        let value = &raw[value_start..value_start + len];
        Some(unescape(value, self.offset + value_start).map(|v| (key, v)))
    }
}

/// Strips a namespace prefix: `w:p` becomes `p`.
pub fn local_name(name: &str) -> &str {
    name.rsplit_once(':').map_or(name, |(_, local)| local)
}

fn malformed(offset: usize, reason: impl Into<String>) -> ConvertError {
    ConvertError::Malformed {
        offset,
        reason: reason.into(),
    }
}

/// Decodes the predefined and numeric character references.
pub fn unescape(text: &str, offset: usize) -> ConvertResult<Cow<'_, str>> {
    if !text.contains('&') {
        return Ok(Cow::Borrowed(text));
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    let mut consumed = 0;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let Some(semi) = after.find(';') else {
            return Err(malformed(offset + consumed + amp, "unterminated entity"));
        };
        let entity = &after[..semi];
        let decoded = match entity {
            "lt" => '<',
            "gt" => '>',
            "amp" => '&',
            "quot" => '"',
            "apos" => '\'',
            _ => {
                let code = if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
                    u32::from_str_radix(hex, 16).ok()
                } else if let Some(dec) = entity.strip_prefix('#') {
                    dec.parse::<u32>().ok()
                } else {
                    None
                };
                code.and_then(char::from_u32).ok_or_else(|| {
                    malformed(offset + consumed + amp, format!("unknown entity &{entity};"))
                })?
            }
        };
        out.push(decoded);
        let step = amp + 1 + semi + 1;
        consumed += step;
        rest = &rest[step..];
    }
    out.push_str(rest);
    Ok(Cow::Owned(out))
}

/// Pull reader over a complete XML document held in memory.
pub struct XmlReader<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> XmlReader<'a> {
    /// Creates a reader over `src`. A leading byte-order mark is skipped.
    pub fn new(src: &'a str) -> Self {
        let pos = if src.starts_with('\u{feff}') { '\u{feff}'.len_utf8() } else { 0 };
        Self { src, pos }
    }

    /// Current byte offset.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Returns the next event, or `None` at end of input.
    pub fn next_event(&mut self) -> ConvertResult<Option<XmlEvent<'a>>> {
        loop {
            let src: &'a str = self.src;
            if self.pos >= src.len() {
                return Ok(None);
            }
            let rest = &src[self.pos..];

            if !rest.starts_with('<') {
                let len = rest.find('<').unwrap_or(rest.len());
                let start = self.pos;
                self.pos += len;
                let text = unescape(&rest[..len], start)?;
                return Ok(Some(XmlEvent::Text(text)));
            }

            if rest.starts_with("<?") {
                self.skip_past("?>")?;
                continue;
            }
            if rest.starts_with("<!--") {
                self.skip_past("-->")?;
                continue;
            }
            if let Some(body) = rest.strip_prefix("<![CDATA[") {
                let Some(end) = body.find("]]>") else {
                    return Err(malformed(self.pos, "unterminated CDATA section"));
                };
                self.pos += "<![CDATA[".len() + end + "]]>".len();
                return Ok(Some(XmlEvent::Text(Cow::Borrowed(&body[..end]))));
            }
            if rest.starts_with("<!") {
                self.skip_past(">")?;
                continue;
            }

            let start = self.pos;
            let end = tag_end(rest).ok_or_else(|| malformed(start, "unterminated tag"))?;
            let inner = &rest[1..end];
            self.pos += end + 1;

            if let Some(name) = inner.strip_prefix('/') {
                let name = name.trim();
                if name.is_empty() {
                    return Err(malformed(start, "closing tag without a name"));
                }
                return Ok(Some(XmlEvent::End { name }));
            }

            let (inner, empty) = match inner.strip_suffix('/') {
                Some(body) => (body, true),
                None => (inner, false),
            };
            let name_len = inner
                .find(|c: char| c.is_ascii_whitespace())
                .unwrap_or(inner.len());
            let name = &inner[..name_len];
            if name.is_empty() {
                return Err(malformed(start, "tag without a name"));
            }
            let attrs = Attributes {
                raw: &inner[name_len..],
                offset: start + 1 + name_len,
            };
            return Ok(Some(XmlEvent::Start { name, attrs, empty }));
        }
    }

    fn skip_past(&mut self, terminator: &str) -> ConvertResult<()> {
        let rest = &self.src[self.pos..];
        match rest.find(terminator) {
            Some(idx) => {
                self.pos += idx + terminator.len();
                Ok(())
            }
            None => Err(malformed(self.pos, format!("missing {terminator:?}"))),
        }
    }
}

/// Finds the `>` closing a tag that starts at `tag[0] == '<'`, skipping
/// quoted attribute values.
fn tag_end(tag: &str) -> Option<usize> {
    let mut quote: Option<u8> = None;
    for (i, &b) in tag.as_bytes().iter().enumerate().skip(1) {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'>' => return Some(i),
            None => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(src: &str) -> Vec<XmlEvent<'_>> {
        let mut reader = XmlReader::new(src);
        let mut out = Vec::new();
        while let Some(ev) = reader.next_event().unwrap() {
            out.push(ev);
        }
        out
    }

    #[test]
    fn test_local_name() {
        assert_eq!(local_name("w:p"), "p");
        assert_eq!(local_name("p"), "p");
        assert_eq!(local_name("xml:space"), "space");
    }

    #[test]
    fn test_unescape_predefined() {
        assert_eq!(unescape("a &lt;b&gt; &amp; &quot;c&quot; &apos;", 0).unwrap(), "a <b> & \"c\" '");
    }

    #[test]
    fn test_unescape_numeric() {
        assert_eq!(unescape("&#65;&#x42;&#X43;", 0).unwrap(), "ABC");
    }

    #[test]
    fn test_unescape_borrowed_when_plain() {
        assert!(matches!(unescape("plain", 0).unwrap(), Cow::Borrowed(_)));
    }

    #[test]
    fn test_unescape_rejects_unknown() {
        assert!(unescape("&nbsp;", 0).is_err());
        assert!(unescape("a & b", 0).is_err());
    }

    #[test]
    fn test_elements_and_text() {
        let evs = events(r#"<?xml version="1.0"?><w:p><w:t xml:space="preserve"> hi </w:t><w:br/></w:p>"#);
        assert_eq!(evs.len(), 6);
        assert!(matches!(evs[0], XmlEvent::Start { name: "w:p", empty: false, .. }));
        assert!(matches!(evs[1], XmlEvent::Start { name: "w:t", empty: false, .. }));
        assert_eq!(evs[2], XmlEvent::Text(Cow::Borrowed(" hi ")));
        assert_eq!(evs[3], XmlEvent::End { name: "w:t" });
        assert!(matches!(evs[4], XmlEvent::Start { name: "w:br", empty: true, .. }));
        assert_eq!(evs[5], XmlEvent::End { name: "w:p" });
    }

    #[test]
    fn test_attributes() {
        let mut reader = XmlReader::new(r#"<w:pStyle w:val="Heading1" other = 'x &amp; y' />"#);
        match reader.next_event().unwrap() {
            Some(XmlEvent::Start { name, attrs, empty }) => {
                assert_eq!(name, "w:pStyle");
                assert!(empty);
                assert_eq!(attrs.get("val").unwrap().as_deref(), Some("Heading1"));
                assert_eq!(attrs.get("other").unwrap().as_deref(), Some("x & y"));
                assert_eq!(attrs.get("missing").unwrap(), None);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_gt_inside_attribute_value() {
        let evs = events(r#"<a title="x > y">t</a>"#);
        match &evs[0] {
            XmlEvent::Start { attrs, .. } => {
                assert_eq!(attrs.get("title").unwrap().as_deref(), Some("x > y"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(evs[1], XmlEvent::Text(Cow::Borrowed("t")));
    }

    #[test]
    fn test_comments_cdata_doctype() {
        let evs = events("<!DOCTYPE x><r><!-- skip <me> --><![CDATA[<raw>]]></r>");
        assert_eq!(evs.len(), 3);
        assert_eq!(evs[1], XmlEvent::Text(Cow::Borrowed("<raw>")));
    }

    #[test]
    fn test_bom_skipped() {
        let evs = events("\u{feff}<r/>");
        assert_eq!(evs.len(), 1);
    }

    #[test]
    fn test_unterminated_tag_is_malformed() {
        let mut reader = XmlReader::new("<w:p attr=\"x");
        assert!(matches!(
            reader.next_event(),
            Err(ConvertError::Malformed { offset: 0, .. })
        ));
    }

    #[test]
    fn test_unquoted_attribute_is_malformed() {
        let mut reader = XmlReader::new("<a b=c>");
        match reader.next_event().unwrap() {
            Some(XmlEvent::Start { attrs, .. }) => assert!(attrs.get("b").is_err()),
            other => panic!("unexpected {:?}", other),
        }
    }
}
