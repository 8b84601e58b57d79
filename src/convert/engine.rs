//! PDFium-backed document converter

use crate::convert::document::{DocItem, DocMetadata, Document};
use crate::error::{Error, Result};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};

/// Line-gap multiplier above which a paragraph break is inserted.
const PARAGRAPH_THRESHOLD: f32 = 1.5;

/// Line-height ratios (vs. the page median) for heading detection.
const HEADING_H1_RATIO: f32 = 1.7;
const HEADING_H2_RATIO: f32 = 1.35;

/// Lines longer than this are never treated as headings.
const MAX_HEADING_CHARS: usize = 100;

/// Conversion pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Scale factor applied when rasterizing full pages.
    pub images_scale: f32,
    /// Rasterize every page into `Document::page_images`.
    pub generate_page_images: bool,
    /// Decode embedded picture objects into their items.
    pub generate_picture_images: bool,
    /// Model/artifact cache directory for engines that need one.
    pub artifacts_path: Option<PathBuf>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            images_scale: 1.0,
            generate_page_images: false,
            generate_picture_images: true,
            artifacts_path: None,
        }
    }
}

/// A PDF-to-document conversion backend.
pub trait Converter {
    fn convert(&self, path: &Path, options: &PipelineOptions) -> Result<Document>;
}

/// Converter backed by PDFium.
///
/// A fresh PDFium binding is created per call because the underlying library
/// is not thread-safe.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfiumConverter;

impl Converter for PdfiumConverter {
    fn convert(&self, path: &Path, options: &PipelineOptions) -> Result<Document> {
        let data = std::fs::read(path)?;
        if data.len() < 4 || &data[0..4] != b"%PDF" {
            return Err(Error::InvalidPdf {
                reason: "Not a valid PDF file".to_string(),
            });
        }

        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("document")
            .to_string();

        let pdfium = create_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(&data, None)
            .map_err(|e| Error::Pdfium {
                reason: format!("{}", e),
            })?;

        extract_document(&document, name, options)
    }
}

/// Get a PDFium instance (a new one each time - PDFium is not thread-safe)
fn create_pdfium() -> Result<Pdfium> {
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
                "/opt/pdfium/lib",
            ))
        })
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| Error::Pdfium {
            reason: format!("Failed to initialize PDFium: {}", e),
        })?;

    Ok(Pdfium::new(bindings))
}

/// Extract everything upfront into an owned [`Document`].
fn extract_document(
    document: &PdfDocument,
    name: String,
    options: &PipelineOptions,
) -> Result<Document> {
    let pages = document.pages();
    let page_count = pages.len() as u32;
    let metadata = extract_metadata(document);

    let mut items = Vec::new();
    let mut page_images = Vec::new();

    for index in 0..pages.len() {
        let page = pages.get(index).map_err(|e| Error::Pdfium {
            reason: format!("Failed to get page {}: {}", index + 1, e),
        })?;
        let page_number = index as u32 + 1;

        items.extend(extract_page_text_items(&page));
        items.extend(extract_page_pictures(&page, document, page_number, options));

        if options.generate_page_images {
            if let Some(image) = render_page(&page, options.images_scale) {
                page_images.push(image);
            }
        }
    }

    Ok(Document {
        name,
        page_count,
        metadata,
        items,
        page_images,
    })
}

fn extract_metadata(document: &PdfDocument) -> DocMetadata {
    let meta = document.metadata();
    DocMetadata {
        title: meta
            .get(PdfDocumentMetadataTagType::Title)
            .map(|t| t.value().to_string()),
        author: meta
            .get(PdfDocumentMetadataTagType::Author)
            .map(|t| t.value().to_string()),
        subject: meta
            .get(PdfDocumentMetadataTagType::Subject)
            .map(|t| t.value().to_string()),
        keywords: meta
            .get(PdfDocumentMetadataTagType::Keywords)
            .map(|t| t.value().to_string()),
        creator: meta
            .get(PdfDocumentMetadataTagType::Creator)
            .map(|t| t.value().to_string()),
        producer: meta
            .get(PdfDocumentMetadataTagType::Producer)
            .map(|t| t.value().to_string()),
    }
}

/// A character with its page position, from PDFium's loose bounds.
#[derive(Debug, Clone)]
struct PlacedChar {
    ch: char,
    x: f32,
    y: f32,
    height: f32,
}

/// Characters grouped into one visual line.
#[derive(Debug, Clone)]
struct Line {
    /// Characters with their X positions, unsorted.
    chars: Vec<(char, f32)>,
    /// Y coordinate of the line anchor (top).
    y: f32,
    /// Average character height, a font-size proxy.
    avg_height: f32,
}

/// Extract one page's text as heading/paragraph items in reading order.
fn extract_page_text_items(page: &PdfPage) -> Vec<DocItem> {
    let text_obj = match page.text() {
        Ok(t) => t,
        Err(_) => return Vec::new(),
    };

    let chars = collect_chars(&text_obj);
    if chars.is_empty() {
        return Vec::new();
    }

    let (y_tolerance, space_threshold) = dynamic_thresholds(&chars);
    let lines = group_into_lines(chars, y_tolerance);
    assemble_items(&lines, space_threshold)
}

fn collect_chars(text_obj: &PdfPageText) -> Vec<PlacedChar> {
    let mut chars = Vec::new();

    for segment in text_obj.segments().iter() {
        if let Ok(char_iter) = segment.chars() {
            for char_result in char_iter.iter() {
                if let Some(c) = char_result.unicode_char() {
                    if let Ok(bounds) = char_result.loose_bounds() {
                        chars.push(PlacedChar {
                            ch: c,
                            x: bounds.left().value,
                            y: bounds.top().value,
                            height: bounds.height().value,
                        });
                    }
                }
            }
        }
    }

    chars
}

/// Thresholds derived from the median character height: Y tolerance at 40%
/// of it (baseline wobble within a line), space gap at 30%.
fn dynamic_thresholds(chars: &[PlacedChar]) -> (f32, f32) {
    let mut heights: Vec<f32> = chars
        .iter()
        .filter(|c| c.height > 0.0)
        .map(|c| c.height)
        .collect();

    if heights.is_empty() {
        return (5.0, 10.0);
    }

    heights.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let median_height = heights[heights.len() / 2];

    ((median_height * 0.4).max(2.0), (median_height * 0.3).max(3.0))
}

/// Group characters into lines by Y proximity, top to bottom.
fn group_into_lines(mut chars: Vec<PlacedChar>, y_tolerance: f32) -> Vec<Line> {
    chars.sort_by(|a, b| {
        let y_cmp = b.y.partial_cmp(&a.y).unwrap_or(std::cmp::Ordering::Equal);
        if y_cmp == std::cmp::Ordering::Equal {
            a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal)
        } else {
            y_cmp
        }
    });

    let mut lines: Vec<Line> = Vec::new();
    let mut current: Vec<PlacedChar> = Vec::new();
    let mut current_y: Option<f32> = None;

    for c in chars {
        match current_y {
            Some(y) if (y - c.y).abs() <= y_tolerance => current.push(c),
            _ => {
                if !current.is_empty() {
                    lines.push(build_line(std::mem::take(&mut current)));
                }
                current_y = Some(c.y);
                current.push(c);
            }
        }
    }

    if !current.is_empty() {
        lines.push(build_line(current));
    }

    lines
}

fn build_line(chars: Vec<PlacedChar>) -> Line {
    let avg_height = chars.iter().map(|c| c.height).sum::<f32>() / chars.len() as f32;
    let y = chars.first().map(|c| c.y).unwrap_or(0.0);

    Line {
        chars: chars.into_iter().map(|c| (c.ch, c.x)).collect(),
        y,
        avg_height,
    }
}

/// Assemble lines into text items: headings stand alone, body lines merge
/// into paragraphs until a vertical gap larger than the normal line height
/// times [`PARAGRAPH_THRESHOLD`] separates them.
fn assemble_items(lines: &[Line], space_threshold: f32) -> Vec<DocItem> {
    if lines.is_empty() {
        return Vec::new();
    }

    let median_height = median_line_height(lines);
    let mut items = Vec::new();
    let mut paragraph: Vec<String> = Vec::new();
    let mut prev_y: Option<f32> = None;
    let mut prev_height: Option<f32> = None;

    for line in lines {
        let text = line_text(line, space_threshold);
        if text.is_empty() {
            continue;
        }

        let starts_new = match (prev_y, prev_height) {
            (Some(py), Some(ph)) => {
                let gap = py - line.y;
                gap > ph.max(line.avg_height) * PARAGRAPH_THRESHOLD
            }
            _ => false,
        };

        match heading_level(line, median_height, &text) {
            Some(level) => {
                flush_paragraph(&mut items, &mut paragraph);
                items.push(DocItem::Text {
                    text,
                    level: Some(level),
                });
            }
            None => {
                if starts_new {
                    flush_paragraph(&mut items, &mut paragraph);
                }
                paragraph.push(text);
            }
        }

        prev_y = Some(line.y);
        prev_height = Some(line.avg_height);
    }

    flush_paragraph(&mut items, &mut paragraph);
    items
}

fn flush_paragraph(items: &mut Vec<DocItem>, paragraph: &mut Vec<String>) {
    if !paragraph.is_empty() {
        items.push(DocItem::Text {
            text: paragraph.join("\n"),
            level: None,
        });
        paragraph.clear();
    }
}

fn median_line_height(lines: &[Line]) -> f32 {
    let mut heights: Vec<f32> = lines
        .iter()
        .map(|l| l.avg_height)
        .filter(|h| *h > 0.0)
        .collect();

    if heights.is_empty() {
        return 0.0;
    }

    heights.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    heights[heights.len() / 2]
}

fn heading_level(line: &Line, median_height: f32, text: &str) -> Option<u8> {
    if median_height <= 0.0 || text.chars().count() > MAX_HEADING_CHARS {
        return None;
    }

    let ratio = line.avg_height / median_height;
    if ratio >= HEADING_H1_RATIO {
        Some(1)
    } else if ratio >= HEADING_H2_RATIO {
        Some(2)
    } else {
        None
    }
}

/// Build one line's text left to right, inserting a space where the gap
/// between characters exceeds the threshold.
fn line_text(line: &Line, space_threshold: f32) -> String {
    let mut sorted_chars = line.chars.clone();
    sorted_chars.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut out = String::new();
    let mut prev_x: Option<f32> = None;
    for (c, x) in sorted_chars {
        if let Some(px) = prev_x {
            if x - px > space_threshold && c != ' ' {
                out.push(' ');
            }
        }
        out.push(c);
        prev_x = Some(x);
    }

    out.trim().to_string()
}

/// Decode embedded image objects on one page into picture items.
fn extract_page_pictures(
    page: &PdfPage,
    document: &PdfDocument,
    page_number: u32,
    options: &PipelineOptions,
) -> Vec<DocItem> {
    let mut pictures = Vec::new();

    for object in page.objects().iter() {
        if let Some(image_object) = object.as_image_object() {
            let image = if options.generate_picture_images {
                match image_object.get_processed_image(document) {
                    Ok(img) => Some(img),
                    Err(e) => {
                        tracing::warn!(
                            page = page_number,
                            error = %e,
                            "failed to decode embedded image"
                        );
                        None
                    }
                }
            } else {
                None
            };

            pictures.push(DocItem::Picture {
                page: page_number,
                image,
            });
        }
    }

    pictures
}

fn render_page(page: &PdfPage, scale: f32) -> Option<DynamicImage> {
    let config = PdfRenderConfig::new().scale_page_by_factor(scale);
    match page.render_with_config(&config) {
        Ok(bitmap) => Some(bitmap.as_image()),
        Err(e) => {
            tracing::warn!(error = %e, "failed to render page");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn placed(ch: char, x: f32, y: f32, height: f32) -> PlacedChar {
        PlacedChar { ch, x, y, height }
    }

    /// Lay out a word with tight character advances at the given position.
    fn word(text: &str, x: f32, y: f32, height: f32) -> Vec<PlacedChar> {
        text.chars()
            .enumerate()
            .map(|(i, c)| placed(c, x + i as f32 * 2.0, y, height))
            .collect()
    }

    #[test]
    fn test_dynamic_thresholds_from_median_height() {
        let chars = vec![
            placed('a', 0.0, 0.0, 10.0),
            placed('b', 2.0, 0.0, 10.0),
            placed('c', 4.0, 0.0, 12.0),
        ];
        let (y_tol, space) = dynamic_thresholds(&chars);
        assert_eq!(y_tol, 4.0);
        assert_eq!(space, 3.0);
    }

    #[test]
    fn test_dynamic_thresholds_floor() {
        let chars = vec![placed('a', 0.0, 0.0, 1.0)];
        let (y_tol, space) = dynamic_thresholds(&chars);
        assert_eq!(y_tol, 2.0);
        assert_eq!(space, 3.0);
    }

    #[test]
    fn test_group_into_lines_by_y_proximity() {
        let mut chars = word("ab", 10.0, 700.0, 10.0);
        chars.extend(word("cd", 10.0, 699.0, 10.0)); // same line, slight wobble
        chars.extend(word("ef", 10.0, 680.0, 10.0)); // next line

        let lines = group_into_lines(chars, 4.0);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].chars.len(), 4);
        assert_eq!(lines[1].chars.len(), 2);
    }

    #[test]
    fn test_line_text_inserts_spaces_on_gaps() {
        let mut chars = word("Hello", 10.0, 700.0, 10.0);
        chars.extend(word("world", 30.0, 700.0, 10.0));
        let lines = group_into_lines(chars, 4.0);

        assert_eq!(lines.len(), 1);
        assert_eq!(line_text(&lines[0], 3.0), "Hello world");
    }

    #[test]
    fn test_assemble_items_detects_headings_and_paragraphs() {
        let mut chars = word("Title", 10.0, 700.0, 20.0);
        chars.extend(word("first", 10.0, 660.0, 10.0));
        chars.extend(word("second", 10.0, 648.0, 10.0)); // gap 12 <= 15, same paragraph
        chars.extend(word("third", 10.0, 600.0, 10.0)); // gap 48 > 15, new paragraph

        let (y_tol, space) = dynamic_thresholds(&chars);
        let lines = group_into_lines(chars, y_tol);
        let items = assemble_items(&lines, space);

        assert_eq!(items.len(), 3);
        match &items[0] {
            DocItem::Text { text, level } => {
                assert_eq!(text, "Title");
                assert_eq!(*level, Some(1));
            }
            other => panic!("expected heading, got {:?}", other),
        }
        match &items[1] {
            DocItem::Text { text, level } => {
                assert_eq!(text, "first\nsecond");
                assert_eq!(*level, None);
            }
            other => panic!("expected paragraph, got {:?}", other),
        }
        match &items[2] {
            DocItem::Text { text, .. } => assert_eq!(text, "third"),
            other => panic!("expected paragraph, got {:?}", other),
        }
    }

    #[test]
    fn test_heading_levels_scale_with_height_ratio() {
        let line = |h: f32| Line {
            chars: vec![('A', 0.0)],
            y: 0.0,
            avg_height: h,
        };

        assert_eq!(heading_level(&line(20.0), 10.0, "A"), Some(1));
        assert_eq!(heading_level(&line(14.0), 10.0, "A"), Some(2));
        assert_eq!(heading_level(&line(10.0), 10.0, "A"), None);
    }

    #[test]
    fn test_long_lines_are_never_headings() {
        let long_text = "x".repeat(MAX_HEADING_CHARS + 1);
        let line = Line {
            chars: vec![('x', 0.0)],
            y: 0.0,
            avg_height: 30.0,
        };
        assert_eq!(heading_level(&line, 10.0, &long_text), None);
    }

    #[test]
    fn test_assemble_items_empty_input() {
        assert!(assemble_items(&[], 3.0).is_empty());
    }
}
