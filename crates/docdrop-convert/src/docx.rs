//! Word (`.docx`) to HTML converter.
//!
//! Reads the main document part of the OOXML package and maps its
//! structure onto semantic HTML: paragraphs, headings, lists, tables,
//! hyperlinks and basic character formatting. Styling that has no semantic
//! equivalent (fonts, colours, sizes) is dropped. Empty paragraphs are
//! omitted.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use tracing::debug;
use zip::ZipArchive;

use crate::converter::{Conversion, DocumentConverter};
use crate::error::{ConvertError, ConvertResult};
use crate::html::HtmlWriter;
use crate::xml::{local_name, Attributes, XmlEvent, XmlReader};

const DOCUMENT_PART: &str = "word/document.xml";
const RELATIONSHIPS_PART: &str = "word/_rels/document.xml.rels";

/// Upper bound on the decompressed size of a single package part.
pub const MAX_PART_BYTES: u64 = 64 * 1024 * 1024;

/// Converts Word packages to HTML.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocxConverter;

impl DocxConverter {
    /// Creates the converter.
    pub fn new() -> Self {
        Self
    }

    /// Converts a package read from any seekable source.
    pub fn convert_reader<R: Read + Seek>(&self, reader: R) -> ConvertResult<Conversion> {
        let mut archive = ZipArchive::new(reader)?;
        let document = read_part(&mut archive, DOCUMENT_PART)?
            .ok_or_else(|| ConvertError::MissingPart(DOCUMENT_PART.to_string()))?;
        let links = match read_part(&mut archive, RELATIONSHIPS_PART)? {
            Some(rels) => parse_relationships(&rels)?,
            None => HashMap::new(),
        };
        render_document(&document, &links)
    }
}

impl DocumentConverter for DocxConverter {
    fn name(&self) -> &'static str {
        "docx"
    }

    fn convert(&self, path: &Path) -> ConvertResult<Conversion> {
        let file = File::open(path)?;
        self.convert_reader(file)
    }
}

fn read_part<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> ConvertResult<Option<String>> {
    let part = match archive.by_name(name) {
        Ok(part) => part,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if part.size() > MAX_PART_BYTES {
        return Err(ConvertError::Package(format!(
            "{name} expands to {} bytes, limit is {MAX_PART_BYTES}",
            part.size()
        )));
    }

    let mut bytes = Vec::with_capacity(part.size() as usize);
    part.take(MAX_PART_BYTES + 1).read_to_end(&mut bytes)?;
    if bytes.len() as u64 > MAX_PART_BYTES {
        return Err(ConvertError::Package(format!("{name} exceeds {MAX_PART_BYTES} bytes")));
    }
    String::from_utf8(bytes)
        .map(Some)
        .map_err(|_| ConvertError::Encoding)
}

/// Maps relationship ids to their targets.
fn parse_relationships(xml: &str) -> ConvertResult<HashMap<String, String>> {
    let mut links = HashMap::new();
    let mut reader = XmlReader::new(xml);
    while let Some(ev) = reader.next_event()? {
        if let XmlEvent::Start { name, attrs, .. } = ev {
            if local_name(name) != "Relationship" {
                continue;
            }
            if let (Some(id), Some(target)) = (attrs.get("Id")?, attrs.get("Target")?) {
                links.insert(id.into_owned(), target.into_owned());
            }
        }
    }
    Ok(links)
}

const ALLOWED_SCHEMES: &[&str] = &["http", "https", "mailto"];

/// Normalizes a link target the way browsers parse it and keeps it only if
/// it is relative, a fragment, or uses an allowed scheme.
fn clean_href(target: &str) -> Option<String> {
    let cleaned: String = target
        .trim_matches(|c: char| c <= ' ')
        .chars()
        .filter(|c| !matches!(c, '\t' | '\n' | '\r'))
        .collect();
    match cleaned.find([':', '/', '?', '#']) {
        Some(i) if cleaned[i..].starts_with(':') => {
            let scheme = cleaned[..i].to_ascii_lowercase();
            ALLOWED_SCHEMES.contains(&scheme.as_str()).then_some(cleaned)
        }
        _ => Some(cleaned),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum VertAlign {
    #[default]
    Baseline,
    Superscript,
    Subscript,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Format {
    bold: bool,
    italic: bool,
    strike: bool,
    vert: VertAlign,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Text(String),
    Break,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Inline {
    piece: Piece,
    format: Format,
    link: Option<String>,
}

#[derive(Debug, Default)]
struct Paragraph {
    style: Option<String>,
    list_level: Option<usize>,
    inlines: Vec<Inline>,
    /// A nested paragraph was folded in; later text starts on a new line.
    after_fold: bool,
}

impl Paragraph {
    fn has_content(&self) -> bool {
        self.inlines.iter().any(|i| match &i.piece {
            Piece::Text(t) => !t.is_empty(),
            Piece::Break => true,
        })
    }
}

type Cell = Vec<Block>;
type Row = Vec<Cell>;

#[derive(Debug)]
enum Block {
    Paragraph(Paragraph),
    Table(Vec<Row>),
}

enum Frame {
    Body(Vec<Block>),
    Table(Vec<Row>),
    Row(Row),
    Cell(Cell),
    Paragraph(Paragraph),
}

/// Reads a `w:val` style toggle: absent means on.
fn toggle(attrs: &Attributes<'_>) -> ConvertResult<bool> {
    Ok(match attrs.get("val")? {
        None => true,
        Some(v) => !matches!(v.as_ref(), "0" | "false" | "off" | "none"),
    })
}

/// State of one open `w:r`. Runs nest through text boxes.
#[derive(Debug, Default)]
struct Run {
    format: Format,
    in_props: bool,
    in_text: bool,
}

struct DocumentParser<'l> {
    links: &'l HashMap<String, String>,
    frames: Vec<Frame>,
    in_paragraph_props: bool,
    runs: Vec<Run>,
    /// Depth inside an `mc:Choice` subtree; only `mc:Fallback` renders.
    skip_depth: usize,
    link_stack: Vec<Option<String>>,
    messages: Vec<String>,
}

impl<'l> DocumentParser<'l> {
    fn new(links: &'l HashMap<String, String>) -> Self {
        Self {
            links,
            frames: vec![Frame::Body(Vec::new())],
            in_paragraph_props: false,
            runs: Vec::new(),
            skip_depth: 0,
            link_stack: Vec::new(),
            messages: Vec::new(),
        }
    }

    fn warn(&mut self, message: String) {
        if !self.messages.contains(&message) {
            self.messages.push(message);
        }
    }

    fn paragraph(&mut self) -> Option<&mut Paragraph> {
        match self.frames.last_mut() {
            Some(Frame::Paragraph(p)) => Some(p),
            _ => None,
        }
    }

    fn in_run(&self) -> bool {
        !self.runs.is_empty()
    }

    fn in_run_props(&self) -> bool {
        self.runs.last().is_some_and(|r| r.in_props)
    }

    fn in_text(&self) -> bool {
        self.skip_depth == 0 && self.runs.last().is_some_and(|r| r.in_text)
    }

    fn set_format(&mut self, apply: impl FnOnce(&mut Format)) {
        if let Some(run) = self.runs.last_mut() {
            apply(&mut run.format);
        }
    }

    fn current_link(&self) -> Option<String> {
        self.link_stack.iter().rev().flatten().next().cloned()
    }

    fn push_piece(&mut self, piece: Piece) {
        let format = self.runs.last().map(|r| r.format).unwrap_or_default();
        let link = self.current_link();
        let Some(paragraph) = self.paragraph() else {
            return;
        };
        if std::mem::take(&mut paragraph.after_fold) && piece != Piece::Break {
            paragraph.inlines.push(Inline {
                piece: Piece::Break,
                format: Format::default(),
                link: None,
            });
        }
        if let (Piece::Text(more), Some(last)) = (&piece, paragraph.inlines.last_mut()) {
            if let Piece::Text(existing) = &mut last.piece {
                if last.format == format && last.link == link {
                    existing.push_str(more);
                    return;
                }
            }
        }
        paragraph.inlines.push(Inline { piece, format, link });
    }

    fn start(&mut self, name: &str, attrs: &Attributes<'_>) -> ConvertResult<()> {
        if self.skip_depth > 0 {
            self.skip_depth += 1;
            return Ok(());
        }
        match name {
            "Choice" => self.skip_depth = 1,
            "p" => self.frames.push(Frame::Paragraph(Paragraph::default())),
            "pPr" => self.in_paragraph_props = true,
            "pStyle" if self.in_paragraph_props => {
                let style = attrs.get("val")?.map(|v| v.into_owned());
                if let Some(p) = self.paragraph() {
                    p.style = style;
                }
            }
            "numPr" if self.in_paragraph_props => {
                if let Some(p) = self.paragraph() {
                    p.list_level.get_or_insert(0);
                }
            }
            "ilvl" if self.in_paragraph_props => {
                let level = attrs
                    .get("val")?
                    .and_then(|v| v.parse::<usize>().ok())
                    .unwrap_or(0)
                    .min(8);
                if let Some(p) = self.paragraph() {
                    p.list_level = Some(level);
                }
            }
            "r" => self.runs.push(Run::default()),
            "rPr" if !self.in_paragraph_props => {
                if let Some(run) = self.runs.last_mut() {
                    run.in_props = true;
                }
            }
            "b" if self.in_run_props() => {
                let on = toggle(attrs)?;
                self.set_format(|f| f.bold = on);
            }
            "i" if self.in_run_props() => {
                let on = toggle(attrs)?;
                self.set_format(|f| f.italic = on);
            }
            "strike" | "dstrike" if self.in_run_props() => {
                let on = toggle(attrs)?;
                self.set_format(|f| f.strike = on);
            }
            "vertAlign" if self.in_run_props() => {
                let vert = match attrs.get("val")?.as_deref() {
                    Some("superscript") => VertAlign::Superscript,
                    Some("subscript") => VertAlign::Subscript,
                    _ => VertAlign::Baseline,
                };
                self.set_format(|f| f.vert = vert);
            }
            "t" => {
                if let Some(run) = self.runs.last_mut() {
                    run.in_text = true;
                }
            }
            "br" if self.in_run() => {
                let kind = attrs.get("type")?;
                if !matches!(kind.as_deref(), Some("page") | Some("column")) {
                    self.push_piece(Piece::Break);
                }
            }
            "tab" if self.in_run() && !self.in_paragraph_props => {
                self.push_piece(Piece::Text("\t".to_string()))
            }
            "hyperlink" => {
                let href = if let Some(rel) = attrs.get("id")? {
                    self.links.get(rel.as_ref()).cloned()
                } else {
                    attrs.get("anchor")?.map(|a| format!("#{a}"))
                };
                let href = match href {
                    Some(raw) => {
                        let cleaned = clean_href(&raw);
                        if cleaned.is_none() {
                            self.warn(format!(
                                "Dropped unsafe hyperlink target: {}",
                                raw.escape_debug()
                            ));
                        }
                        cleaned
                    }
                    None => None,
                };
                self.link_stack.push(href);
            }
            "tbl" => self.frames.push(Frame::Table(Vec::new())),
            "tr" => self.frames.push(Frame::Row(Vec::new())),
            "tc" => self.frames.push(Frame::Cell(Vec::new())),
            "drawing" | "pict" | "object" => {
                self.warn("Embedded images and objects are not converted".to_string())
            }
            _ => {}
        }
        Ok(())
    }

    fn end(&mut self, name: &str, offset: usize) -> ConvertResult<()> {
        if self.skip_depth > 0 {
            self.skip_depth -= 1;
            return Ok(());
        }
        match name {
            "p" => match self.frames.pop() {
                Some(Frame::Paragraph(p)) => self.attach(Block::Paragraph(p)),
                _ => return Err(nesting(offset, name)),
            },
            "pPr" => self.in_paragraph_props = false,
            "r" => {
                self.runs.pop();
            }
            "rPr" => {
                if let Some(run) = self.runs.last_mut() {
                    run.in_props = false;
                }
            }
            "t" => {
                if let Some(run) = self.runs.last_mut() {
                    run.in_text = false;
                }
            }
            "hyperlink" => {
                self.link_stack.pop();
            }
            "tbl" => match self.frames.pop() {
                Some(Frame::Table(rows)) => self.attach(Block::Table(rows)),
                _ => return Err(nesting(offset, name)),
            },
            "tr" => match (self.frames.pop(), self.frames.last_mut()) {
                (Some(Frame::Row(row)), Some(Frame::Table(rows))) => rows.push(row),
                _ => return Err(nesting(offset, name)),
            },
            "tc" => match (self.frames.pop(), self.frames.last_mut()) {
                (Some(Frame::Cell(cell)), Some(Frame::Row(row))) => row.push(cell),
                _ => return Err(nesting(offset, name)),
            },
            _ => {}
        }
        Ok(())
    }

    fn attach(&mut self, block: Block) {
        match self.frames.last_mut() {
            Some(Frame::Body(blocks)) | Some(Frame::Cell(blocks)) => blocks.push(block),
            Some(Frame::Paragraph(outer)) => match block {
                // Text boxes nest paragraphs inside a run; fold them inline.
                Block::Paragraph(inner) => {
                    if inner.has_content() {
                        if outer.has_content() {
                            outer.inlines.push(Inline {
                                piece: Piece::Break,
                                format: Format::default(),
                                link: None,
                            });
                        }
                        outer.inlines.extend(inner.inlines);
                        outer.after_fold = true;
                    }
                }
                Block::Table(_) => self.warn("Table nested inside a paragraph was dropped".to_string()),
            },
            _ => self.warn("Content outside a table cell was dropped".to_string()),
        }
    }

    fn finish(mut self) -> ConvertResult<(Vec<Block>, Vec<String>)> {
        match (self.frames.pop(), self.frames.is_empty()) {
            (Some(Frame::Body(blocks)), true) => Ok((blocks, self.messages)),
            _ => Err(ConvertError::Malformed {
                offset: 0,
                reason: "document ended inside an open element".to_string(),
            }),
        }
    }
}

fn nesting(offset: usize, name: &str) -> ConvertError {
    ConvertError::Malformed {
        offset,
        reason: format!("unbalanced </{name}>"),
    }
}

/// Renders `word/document.xml` with hyperlink targets from `links`.
fn render_document(document: &str, links: &HashMap<String, String>) -> ConvertResult<Conversion> {
    let mut parser = DocumentParser::new(links);
    let mut reader = XmlReader::new(document);

    while let Some(ev) = reader.next_event()? {
        match ev {
            XmlEvent::Start { name, attrs, empty } => {
                let local = local_name(name);
                parser.start(local, &attrs)?;
                if empty {
                    parser.end(local, reader.position())?;
                }
            }
            XmlEvent::End { name } => parser.end(local_name(name), reader.position())?,
            XmlEvent::Text(text) => {
                if parser.in_text() {
                    parser.push_piece(Piece::Text(text.into_owned()));
                }
            }
        }
    }

    let (blocks, mut messages) = parser.finish()?;
    let mut w = HtmlWriter::new();
    render_blocks(&blocks, &mut w, &mut messages);
    debug!(blocks = blocks.len(), warnings = messages.len(), "docx rendered");
    Ok(Conversion {
        html: w.finish(),
        messages,
    })
}

fn heading_level(style: &str) -> Option<usize> {
    let normalized: String = style
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    if normalized == "title" {
        return Some(1);
    }
    normalized
        .strip_prefix("heading")
        .and_then(|n| n.parse::<usize>().ok())
        .filter(|n| (1..=6).contains(n))
}

const PLAIN_STYLES: &[&str] = &["Normal", "ListParagraph", "BodyText", "NoSpacing"];

/// Tracks nested `<ul>` elements while consecutive list paragraphs render.
#[derive(Default)]
struct ListState {
    depth: usize,
}

impl ListState {
    fn item(&mut self, level: usize, w: &mut HtmlWriter) {
        let target = level + 1;
        if self.depth == 0 {
            w.open("ul");
            self.depth = 1;
        } else {
            while self.depth > target {
                w.close("li").close("ul");
                self.depth -= 1;
            }
            if self.depth == target {
                w.close("li");
            }
        }
        while self.depth < target {
            w.open("ul");
            self.depth += 1;
        }
        w.open("li");
    }

    fn finish(&mut self, w: &mut HtmlWriter) {
        while self.depth > 0 {
            w.close("li").close("ul");
            self.depth -= 1;
        }
    }
}

fn render_blocks(blocks: &[Block], w: &mut HtmlWriter, messages: &mut Vec<String>) {
    let mut list = ListState::default();
    for block in blocks {
        match block {
            Block::Paragraph(p) if !p.has_content() => {}
            Block::Paragraph(p) => {
                let heading = p.style.as_deref().and_then(heading_level);
                if let (Some(style), None) = (p.style.as_deref(), heading) {
                    if !PLAIN_STYLES.contains(&style) {
                        let message = format!("Unrecognised paragraph style: {style}");
                        if !messages.contains(&message) {
                            messages.push(message);
                        }
                    }
                }

                match (p.list_level, heading) {
                    (Some(level), None) => {
                        list.item(level, w);
                        render_inlines(&p.inlines, w);
                    }
                    _ => {
                        list.finish(w);
                        let tag = heading.map(|n| format!("h{n}")).unwrap_or_else(|| "p".to_string());
                        w.open(&tag);
                        render_inlines(&p.inlines, w);
                        w.close(&tag);
                    }
                }
            }
            Block::Table(rows) => {
                list.finish(w);
                w.open("table");
                for row in rows {
                    w.open("tr");
                    for cell in row {
                        w.open("td");
                        render_blocks(cell, w, messages);
                        w.close("td");
                    }
                    w.close("tr");
                }
                w.close("table");
            }
        }
    }
    list.finish(w);
}

fn format_tags(format: &Format) -> Vec<&'static str> {
    let mut tags = Vec::new();
    if format.bold {
        tags.push("strong");
    }
    if format.italic {
        tags.push("em");
    }
    if format.strike {
        tags.push("s");
    }
    match format.vert {
        VertAlign::Superscript => tags.push("sup"),
        VertAlign::Subscript => tags.push("sub"),
        VertAlign::Baseline => {}
    }
    tags
}

fn render_inlines(inlines: &[Inline], w: &mut HtmlWriter) {
    let mut i = 0;
    while i < inlines.len() {
        let link = &inlines[i].link;
        let end = inlines[i..]
            .iter()
            .position(|x| &x.link != link)
            .map_or(inlines.len(), |n| i + n);

        if let Some(href) = link {
            w.open_with("a", &[("href", href)]);
        }
        for inline in &inlines[i..end] {
            match &inline.piece {
                Piece::Break => {
                    w.void("br");
                }
                Piece::Text(text) => {
                    let tags = format_tags(&inline.format);
                    for tag in &tags {
                        w.open(tag);
                    }
                    w.text(text);
                    for tag in tags.iter().rev() {
                        w.close(tag);
                    }
                }
            }
        }
        if link.is_some() {
            w.close("a");
        }
        i = end;
    }
}
