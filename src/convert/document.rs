//! In-memory document model and Markdown serialization

use base64::Engine;
use image::DynamicImage;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// Placeholder emitted for pictures that carry no image data.
const IMAGE_PLACEHOLDER: &str = "<!-- image -->";

/// Placeholder emitted for tables with an empty cell grid.
const TABLE_PLACEHOLDER: &str = "<!-- table -->";

/// How pictures are represented in serialized Markdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRefMode {
    /// Inline `data:image/png;base64,...` URIs.
    Embedded,
    /// Links into an images directory.
    Referenced,
}

/// Document metadata taken from the PDF info dictionary.
#[derive(Debug, Clone, Default)]
pub struct DocMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub keywords: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
}

/// One content element, in document traversal order.
#[derive(Debug, Clone)]
pub enum DocItem {
    /// A text block; a `level` of 1 or more renders as a heading.
    Text { text: String, level: Option<u8> },
    /// An embedded picture. `image` is present when picture-image
    /// generation was enabled and decoding succeeded.
    Picture {
        page: u32,
        image: Option<DynamicImage>,
    },
    /// A table with its cell grid (row-major).
    Table {
        page: u32,
        cells: Vec<Vec<String>>,
        image: Option<DynamicImage>,
    },
}

/// Owned result of converting one PDF.
///
/// Everything is extracted upfront by the converter, so a `Document` has no
/// ties to the engine that produced it and can be built directly in tests.
#[derive(Debug, Clone, Default)]
pub struct Document {
    /// Source file stem; used in extracted-image filenames.
    pub name: String,
    pub page_count: u32,
    pub metadata: DocMetadata,
    pub items: Vec<DocItem>,
    /// Full-page rasters, present only when page-image generation was on.
    pub page_images: Vec<DynamicImage>,
}

/// Internal picture-rendering target for one serialization pass.
enum ImageTarget<'a> {
    Embedded,
    Referenced(&'a Path),
    Placeholder,
}

impl Document {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Render the document as Markdown.
    ///
    /// `Referenced` mode links pictures into `images_base` using the same
    /// 1-based `{name}-picture-{n}.png` numbering the extraction step
    /// assigns, so links line up with the files written alongside. Without a
    /// base directory it degrades to placeholders.
    pub fn to_markdown(&self, mode: ImageRefMode, images_base: Option<&Path>) -> String {
        let target = match (mode, images_base) {
            (ImageRefMode::Embedded, _) => ImageTarget::Embedded,
            (ImageRefMode::Referenced, Some(base)) => ImageTarget::Referenced(base),
            (ImageRefMode::Referenced, None) => ImageTarget::Placeholder,
        };
        self.render(target)
    }

    /// Minimal rendering with image placeholders only. Never fails.
    pub fn to_markdown_basic(&self) -> String {
        self.render(ImageTarget::Placeholder)
    }

    fn render(&self, target: ImageTarget) -> String {
        let mut out = String::new();
        let mut picture_counter = 0u32;

        for item in &self.items {
            let block = match item {
                DocItem::Text { text, level } => match level {
                    Some(level) => {
                        format!("{} {}", "#".repeat((*level).clamp(1, 6) as usize), text)
                    }
                    None => text.clone(),
                },
                DocItem::Picture { image, .. } => {
                    picture_counter += 1;
                    self.render_picture(image.as_ref(), picture_counter, &target)
                }
                DocItem::Table { cells, .. } => render_table(cells),
            };

            if block.is_empty() {
                continue;
            }
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            out.push_str(&block);
        }

        if !out.is_empty() {
            out.push('\n');
        }
        out
    }

    fn render_picture(
        &self,
        image: Option<&DynamicImage>,
        number: u32,
        target: &ImageTarget,
    ) -> String {
        match (target, image) {
            (ImageTarget::Embedded, Some(img)) => match png_base64(img) {
                Some(b64) => format!("![Picture {}](data:image/png;base64,{})", number, b64),
                None => IMAGE_PLACEHOLDER.to_string(),
            },
            (ImageTarget::Referenced(base), Some(_)) => {
                let file = base.join(format!("{}-picture-{}.png", self.name, number));
                format!("![Picture {}]({})", number, file.display())
            }
            _ => IMAGE_PLACEHOLDER.to_string(),
        }
    }

    /// Table elements in document order.
    pub fn tables(&self) -> impl Iterator<Item = &DocItem> {
        self.items
            .iter()
            .filter(|item| matches!(item, DocItem::Table { .. }))
    }

    /// One JSON mapping per table element, in document order.
    pub fn export_tables(&self) -> Vec<Value> {
        self.tables()
            .filter_map(|item| match item {
                DocItem::Table { page, cells, .. } => {
                    let num_cols = cells.iter().map(Vec::len).max().unwrap_or(0);
                    Some(json!({
                        "page": page,
                        "num_rows": cells.len(),
                        "num_cols": num_cols,
                        "cells": cells,
                    }))
                }
                _ => None,
            })
            .collect()
    }
}

/// Render a cell grid as a GFM pipe table; the first row is the header.
fn render_table(cells: &[Vec<String>]) -> String {
    let width = cells.iter().map(Vec::len).max().unwrap_or(0);
    if width == 0 {
        return TABLE_PLACEHOLDER.to_string();
    }

    let mut lines = Vec::with_capacity(cells.len() + 1);
    lines.push(render_row(&cells[0], width));
    lines.push(format!("|{}", "---|".repeat(width)));
    for row in &cells[1..] {
        lines.push(render_row(row, width));
    }
    lines.join("\n")
}

fn render_row(cells: &[String], width: usize) -> String {
    let mut out = String::from("|");
    for i in 0..width {
        let cell = cells.get(i).map(String::as_str).unwrap_or("");
        out.push(' ');
        out.push_str(&cell.replace('\n', " ").replace('|', "\\|"));
        out.push_str(" |");
    }
    out
}

/// Encode an image as base64 PNG data.
fn png_base64(image: &DynamicImage) -> Option<String> {
    let mut png_bytes = Vec::new();
    image
        .write_to(
            &mut std::io::Cursor::new(&mut png_bytes),
            image::ImageFormat::Png,
        )
        .ok()?;
    Some(base64::engine::general_purpose::STANDARD.encode(&png_bytes))
}

/// Export capabilities of a converted document.
///
/// Each `Option`-returning method is one rung a backend may decline;
/// [`metadata_map`] and [`markdown_with_fallback`] walk the rungs
/// top-to-bottom and the final rung of each chain always succeeds.
pub trait DocumentExport {
    /// Complete metadata export. Absent fields are omitted from the map.
    fn export_metadata_map(&self) -> Option<BTreeMap<String, String>>;

    /// Individual metadata fields, for backends without a map export.
    fn metadata_fields(&self) -> Option<DocMetadata>;

    /// Primary Markdown serialization honoring the requested image mode.
    fn serialize_markdown(&self, mode: ImageRefMode, images_base: Option<&Path>)
        -> Option<String>;

    /// Older serialization path that only understands referenced images.
    fn export_markdown_referenced(&self, images_base: &Path) -> Option<String>;

    /// Minimal serialization with image placeholders. Always succeeds.
    fn export_markdown_basic(&self) -> String;
}

impl DocumentExport for Document {
    fn export_metadata_map(&self) -> Option<BTreeMap<String, String>> {
        let m = &self.metadata;
        let mut map = BTreeMap::new();
        for (key, value) in [
            ("title", &m.title),
            ("author", &m.author),
            ("subject", &m.subject),
            ("keywords", &m.keywords),
            ("creator", &m.creator),
            ("producer", &m.producer),
        ] {
            if let Some(v) = value {
                map.insert(key.to_string(), v.clone());
            }
        }
        Some(map)
    }

    fn metadata_fields(&self) -> Option<DocMetadata> {
        Some(self.metadata.clone())
    }

    fn serialize_markdown(
        &self,
        mode: ImageRefMode,
        images_base: Option<&Path>,
    ) -> Option<String> {
        Some(self.to_markdown(mode, images_base))
    }

    fn export_markdown_referenced(&self, images_base: &Path) -> Option<String> {
        Some(self.to_markdown(ImageRefMode::Referenced, Some(images_base)))
    }

    fn export_markdown_basic(&self) -> String {
        self.to_markdown_basic()
    }
}

/// Metadata with graceful degradation: the complete export when available,
/// then field-by-field with empty-string defaults, then an empty mapping.
pub fn metadata_map(doc: &dyn DocumentExport) -> BTreeMap<String, String> {
    if let Some(map) = doc.export_metadata_map() {
        return map;
    }

    if let Some(fields) = doc.metadata_fields() {
        let mut map = BTreeMap::new();
        map.insert("title".to_string(), fields.title.unwrap_or_default());
        map.insert("author".to_string(), fields.author.unwrap_or_default());
        map.insert("subject".to_string(), fields.subject.unwrap_or_default());
        map.insert("keywords".to_string(), fields.keywords.unwrap_or_default());
        return map;
    }

    BTreeMap::new()
}

/// Markdown with graceful degradation: the primary serializer, then the
/// referenced-images path when an images directory exists, then the minimal
/// serializer.
pub fn markdown_with_fallback(
    doc: &dyn DocumentExport,
    mode: ImageRefMode,
    images_base: Option<&Path>,
) -> String {
    if let Some(md) = doc.serialize_markdown(mode, images_base) {
        return md;
    }

    if let Some(base) = images_base {
        if let Some(md) = doc.export_markdown_referenced(base) {
            return md;
        }
    }

    doc.export_markdown_basic()
}
