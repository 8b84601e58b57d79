//! Batch PDF discovery, conversion, and result aggregation

use crate::convert::{
    markdown_with_fallback, metadata_map, Converter, DocItem, Document, ImageRefMode,
    PipelineOptions,
};
use crate::error::{Error, Result};
use crate::scratch;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Scale applied to generated images during conversion.
pub const IMAGE_RESOLUTION_SCALE: f32 = 2.0;

/// Options for one batch invocation.
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    /// Search subdirectories too.
    pub recursive: bool,
    /// Write one `{stem}.md` per converted file under this directory.
    pub markdown_output: Option<PathBuf>,
    /// Extract table/picture images as PNG files under this directory.
    pub images_dir: Option<PathBuf>,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            recursive: true,
            markdown_output: None,
            images_dir: None,
        }
    }
}

/// A located PDF file.
#[derive(Debug, Clone, Serialize)]
pub struct FileEntry {
    pub path: String,
    pub name: String,
    pub size: u64,
    pub modified: Option<String>,
}

/// Per-file record for a successful conversion.
#[derive(Debug, Clone, Serialize)]
pub struct FileRecord {
    pub filename: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub pages: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_images: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tables: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markdown_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markdown_file_error: Option<String>,
    pub content: String,
}

/// Outcome for one file: a full record, or a single error message.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum FileOutcome {
    Converted(FileRecord),
    Failed { error: String },
}

/// Aggregate counters for one batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub total_files: u64,
    pub successful: u64,
    pub failed: u64,
    pub total_pages: u64,
    pub total_images_extracted: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate result of one batch invocation. Constructed fresh per call;
/// nothing persists across invocations.
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub summary: BatchSummary,
    pub files: BTreeMap<String, FileOutcome>,
}

impl BatchResult {
    /// Flat JSON shape used by the CLI: one entry per file keyed by path,
    /// plus a `summary` key.
    pub fn to_flat_json(&self) -> Result<Value> {
        let mut map = serde_json::Map::new();
        for (path, outcome) in &self.files {
            map.insert(path.clone(), serde_json::to_value(outcome)?);
        }
        map.insert("summary".to_string(), serde_json::to_value(&self.summary)?);
        Ok(Value::Object(map))
    }
}

/// Locate PDF files under `directory`, sorted by path.
pub fn find_pdf_files(directory: &Path, recursive: bool) -> Result<Vec<FileEntry>> {
    if !directory.exists() {
        return Err(Error::DirectoryNotFound {
            path: directory.display().to_string(),
        });
    }

    if !directory.is_dir() {
        return Err(Error::NotADirectory {
            path: directory.display().to_string(),
        });
    }

    let mut files = Vec::new();
    collect_pdfs(directory, recursive, &mut files)?;

    // Sort by path for consistent ordering
    files.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(files)
}

fn collect_pdfs(dir: &Path, recursive: bool, files: &mut Vec<FileEntry>) -> Result<()> {
    let entries = fs::read_dir(dir).map_err(Error::Io)?;

    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue, // Skip entries we can't read
        };

        let path = entry.path();

        if path.is_dir() {
            if recursive {
                let _ = collect_pdfs(&path, recursive, files);
            }
        } else if path.is_file() {
            if let Some(ext) = path.extension() {
                if ext.eq_ignore_ascii_case("pdf") {
                    let name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default();

                    let metadata = fs::metadata(&path).ok();
                    let size = metadata.as_ref().map(|m| m.len()).unwrap_or(0);
                    let modified = metadata
                        .as_ref()
                        .and_then(|m| m.modified().ok())
                        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                        .map(|d| {
                            chrono::DateTime::from_timestamp(d.as_secs() as i64, 0)
                                .map(|dt| dt.to_rfc3339())
                                .unwrap_or_default()
                        });

                    files.push(FileEntry {
                        path: path.to_string_lossy().to_string(),
                        name,
                        size,
                        modified,
                    });
                }
            }
        }
    }

    Ok(())
}

/// Convert every PDF under `directory`, isolating failures per file.
///
/// Returns `Err` only for batch-level input errors (missing or non-directory
/// root); everything after file discovery is reported inside the result.
pub fn process_directory(
    converter: &dyn Converter,
    directory: &Path,
    options: &ProcessOptions,
) -> Result<BatchResult> {
    let files = find_pdf_files(directory, options.recursive)?;

    if files.is_empty() {
        return Ok(BatchResult {
            summary: BatchSummary {
                message: Some("No PDF files found in the specified directory".to_string()),
                ..Default::default()
            },
            files: BTreeMap::new(),
        });
    }

    scratch::prepare();

    let mut summary = BatchSummary {
        total_files: files.len() as u64,
        ..Default::default()
    };
    let mut outcomes = BTreeMap::new();

    for entry in &files {
        tracing::info!(path = %entry.path, "processing file");

        match process_file(converter, entry, options) {
            Ok(record) => {
                summary.successful += 1;
                summary.total_pages += u64::from(record.pages);
                if let Some(images) = &record.extracted_images {
                    summary.total_images_extracted += images.len() as u64;
                }
                outcomes.insert(entry.path.clone(), FileOutcome::Converted(record));
            }
            Err(message) => {
                summary.failed += 1;
                outcomes.insert(entry.path.clone(), FileOutcome::Failed { error: message });
            }
        }
    }

    Ok(BatchResult {
        summary,
        files: outcomes,
    })
}

/// Convert one file. `Err` carries the user-facing failure message recorded
/// for that file.
fn process_file(
    converter: &dyn Converter,
    entry: &FileEntry,
    options: &ProcessOptions,
) -> std::result::Result<FileRecord, String> {
    let path = Path::new(&entry.path);

    // The images directory is created per file, so a permission change
    // mid-batch fails only the files after it.
    if let Some(images_dir) = &options.images_dir {
        fs::create_dir_all(images_dir).map_err(|e| {
            if e.kind() == io::ErrorKind::PermissionDenied {
                tracing::warn!(
                    directory = %images_dir.display(),
                    "permission denied when creating images directory"
                );
                format!(
                    "Permission denied when creating images directory: {}",
                    images_dir.display()
                )
            } else {
                tracing::warn!(directory = %images_dir.display(), error = %e, "error creating images directory");
                format!("Error creating images directory: {}", e)
            }
        })?;
    }

    let artifacts_path = scratch::artifacts_path().map_err(|e| {
        tracing::error!(error = %e, "artifacts directory unavailable");
        "Permission issues with model directories. Please check application permissions."
            .to_string()
    })?;

    let pipeline = PipelineOptions {
        images_scale: IMAGE_RESOLUTION_SCALE,
        generate_page_images: false,
        generate_picture_images: true,
        artifacts_path: Some(artifacts_path),
    };

    tracing::info!(path = %entry.path, "converting PDF");
    let document = converter.convert(path, &pipeline).map_err(|e| {
        if e.is_permission() {
            tracing::error!(error = %e, "permission error during PDF conversion");
            "Permission denied during PDF conversion. Please check application permissions."
                .to_string()
        } else {
            tracing::error!(error = %e, "error during PDF conversion");
            format!("Failed to convert PDF: {}", e)
        }
    })?;

    let mut record = FileRecord {
        filename: entry.name.clone(),
        size: entry.size,
        modified: entry.modified.clone(),
        metadata: metadata_map(&document),
        pages: document.page_count,
        extracted_images: None,
        tables: None,
        markdown_file: None,
        markdown_file_error: None,
        content: String::new(),
    };

    if let Some(images_dir) = &options.images_dir {
        let extracted = extract_element_images(&document, images_dir);
        if !extracted.is_empty() {
            record.extracted_images = Some(extracted);
        }
    }

    let tables = document.export_tables();
    if !tables.is_empty() {
        record.tables = Some(tables);
    }

    let image_mode = if options.images_dir.is_some() {
        ImageRefMode::Referenced
    } else {
        ImageRefMode::Embedded
    };

    if let Some(markdown_output) = &options.markdown_output {
        match write_markdown_file(
            &document,
            markdown_output,
            image_mode,
            options.images_dir.as_deref(),
        ) {
            Ok(written) => record.markdown_file = Some(written),
            Err(message) => record.markdown_file_error = Some(message),
        }
    }

    record.content = markdown_with_fallback(&document, image_mode, options.images_dir.as_deref());

    Ok(record)
}

/// Write table and picture element images as PNGs, numbered 1-based per kind
/// in document traversal order. A single element's failure is logged and
/// skipped; its number stays consumed so later filenames do not shift.
fn extract_element_images(document: &Document, images_dir: &Path) -> Vec<String> {
    let mut extracted = Vec::new();
    let mut table_counter = 0u32;
    let mut picture_counter = 0u32;

    for item in &document.items {
        let (kind, number, image) = match item {
            DocItem::Table { image, .. } => {
                table_counter += 1;
                ("table", table_counter, image)
            }
            DocItem::Picture { image, .. } => {
                picture_counter += 1;
                ("picture", picture_counter, image)
            }
            DocItem::Text { .. } => continue,
        };

        let image = match image {
            Some(img) => img,
            None => {
                tracing::warn!(kind, number, "document element has no image data");
                continue;
            }
        };

        let file_path = images_dir.join(format!("{}-{}-{}.png", document.name, kind, number));
        match image.save_with_format(&file_path, image::ImageFormat::Png) {
            Ok(()) => extracted.push(file_path.to_string_lossy().to_string()),
            Err(e) => {
                tracing::warn!(
                    file = %file_path.display(),
                    error = %e,
                    "error extracting image from document element"
                );
            }
        }
    }

    extracted
}

/// Render and write `{stem}.md`; returns the written path. `Err` carries the
/// soft failure message stored on the record.
fn write_markdown_file(
    document: &Document,
    markdown_output: &Path,
    mode: ImageRefMode,
    images_dir: Option<&Path>,
) -> std::result::Result<String, String> {
    fs::create_dir_all(markdown_output).map_err(|e| {
        tracing::warn!(
            directory = %markdown_output.display(),
            error = %e,
            "error creating markdown output directory"
        );
        format!("Error saving markdown file: {}", e)
    })?;

    let file_path = markdown_output.join(format!("{}.md", document.name));
    let markdown = markdown_with_fallback(document, mode, images_dir);

    match fs::write(&file_path, markdown) {
        Ok(()) => Ok(file_path.to_string_lossy().to_string()),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            tracing::warn!(file = %file_path.display(), "permission denied when saving markdown file");
            Err("Permission denied when saving markdown file".to_string())
        }
        Err(e) => {
            tracing::warn!(file = %file_path.display(), error = %e, "error saving markdown file");
            Err(format!("Error saving markdown file: {}", e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs::File;
    use std::io::Write;

    fn touch_pdf(dir: &Path, name: &str) {
        let mut f = File::create(dir.join(name)).unwrap();
        f.write_all(b"%PDF-1.4\n").unwrap();
    }

    #[test]
    fn test_find_pdf_files_missing_root() {
        let err = find_pdf_files(Path::new("/nonexistent/pdfs"), true).unwrap_err();
        assert!(matches!(err, Error::DirectoryNotFound { .. }));
    }

    #[test]
    fn test_find_pdf_files_root_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        touch_pdf(dir.path(), "a.pdf");

        let err = find_pdf_files(&dir.path().join("a.pdf"), true).unwrap_err();
        assert!(matches!(err, Error::NotADirectory { .. }));
    }

    #[test]
    fn test_find_pdf_files_matches_extension_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        touch_pdf(dir.path(), "lower.pdf");
        touch_pdf(dir.path(), "upper.PDF");
        File::create(dir.path().join("notes.txt")).unwrap();

        let files = find_pdf_files(dir.path(), false).unwrap();
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["lower.pdf", "upper.PDF"]);
    }

    #[test]
    fn test_find_pdf_files_recursion_toggle() {
        let dir = tempfile::tempdir().unwrap();
        touch_pdf(dir.path(), "top.pdf");
        fs::create_dir(dir.path().join("sub")).unwrap();
        touch_pdf(&dir.path().join("sub"), "nested.pdf");

        let flat = find_pdf_files(dir.path(), false).unwrap();
        assert_eq!(flat.len(), 1);
        assert_eq!(flat[0].name, "top.pdf");

        let deep = find_pdf_files(dir.path(), true).unwrap();
        assert_eq!(deep.len(), 2);
    }

    #[test]
    fn test_find_pdf_files_sorted_by_path() {
        let dir = tempfile::tempdir().unwrap();
        touch_pdf(dir.path(), "zebra.pdf");
        touch_pdf(dir.path(), "apple.pdf");
        touch_pdf(dir.path(), "mango.pdf");

        let files = find_pdf_files(dir.path(), true).unwrap();
        let paths: Vec<_> = files.iter().map(|f| f.path.clone()).collect();
        let mut sorted = paths.clone();
        sorted.sort();
        assert_eq!(paths, sorted);
    }

    #[test]
    fn test_find_pdf_files_reports_size_and_modified() {
        let dir = tempfile::tempdir().unwrap();
        touch_pdf(dir.path(), "a.pdf");

        let files = find_pdf_files(dir.path(), true).unwrap();
        assert_eq!(files[0].size, 9);
        let modified = files[0].modified.as_deref().unwrap();
        // RFC 3339 stamps parse back
        assert!(chrono::DateTime::parse_from_rfc3339(modified).is_ok());
    }

    #[test]
    fn test_flat_json_carries_files_and_summary() {
        let mut files = BTreeMap::new();
        files.insert(
            "/tmp/a.pdf".to_string(),
            FileOutcome::Failed {
                error: "Failed to convert PDF: boom".to_string(),
            },
        );
        let result = BatchResult {
            summary: BatchSummary {
                total_files: 1,
                failed: 1,
                ..Default::default()
            },
            files,
        };

        let flat = result.to_flat_json().unwrap();
        assert_eq!(flat["/tmp/a.pdf"]["error"], "Failed to convert PDF: boom");
        assert_eq!(flat["summary"]["total_files"], 1);
        assert_eq!(flat["summary"]["failed"], 1);
        assert!(flat["summary"].get("message").is_none());
    }
}
