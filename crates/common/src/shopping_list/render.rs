//! Shopping list document rendering using lopdf

use super::aggregate::AggregatedLine;
use super::font::{shopping_list_font, TextEncoder};
use crate::config::ShoppingListConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, StringFormat};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{debug, warn};

// A4 in points
const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const MARGIN: i64 = 56;
const TITLE_SIZE: i64 = 18;
const BODY_SIZE: i64 = 11;
const LEADING: i64 = 16;

/// Reference to a rendered document on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactRef {
    pub path: PathBuf,
    /// Name offered to the client when downloading
    pub file_name: String,
    pub size_bytes: u64,
    /// Hex SHA-256 of the file contents
    pub checksum: String,
}

impl ArtifactRef {
    /// Read the artifact into memory and delete it from disk
    pub async fn take(&self) -> Result<Vec<u8>> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| AppError::RenderFailed {
                message: format!("Cannot read {}: {}", self.path.display(), e),
            })?;

        self.discard().await;
        Ok(bytes)
    }

    /// Delete the artifact without reading it. A file that is already gone
    /// is not an error; other failures are logged.
    pub async fn discard(&self) {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove artifact"),
        }
    }
}

/// Sink that turns display lines into a downloadable artifact
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    /// Render `lines` for the user `label` at `timestamp`.
    ///
    /// The artifact must be readable as soon as this returns. Callers own it
    /// afterwards and remove it with [`ArtifactRef::take`] or
    /// [`ArtifactRef::discard`].
    async fn render(
        &self,
        lines: &[String],
        label: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<ArtifactRef>;
}

/// `"Flour — 350 g"`
pub fn format_line(line: &AggregatedLine) -> String {
    format!(
        "{} \u{2014} {} {}",
        line.name, line.total_amount, line.measurement_unit
    )
}

/// `{timestamp}_{label}_shopping_list.pdf`, safe to use as a file name
pub fn artifact_file_name(label: &str, timestamp: DateTime<Utc>) -> String {
    let mut safe: String = label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if safe.trim_matches('_').is_empty() {
        safe = "user".to_string();
    }

    format!(
        "{}_{}_shopping_list.pdf",
        timestamp.format("%Y-%m-%d_%H-%M-%S"),
        safe
    )
}

/// Writes shopping lists as A4 PDF files into a directory
#[derive(Debug, Clone)]
pub struct PdfRenderer {
    output_dir: PathBuf,
    lines_per_page: usize,
}

impl PdfRenderer {
    pub fn new(output_dir: impl Into<PathBuf>, lines_per_page: usize) -> Self {
        Self {
            output_dir: output_dir.into(),
            lines_per_page: lines_per_page.max(1),
        }
    }

    pub fn from_config(config: &ShoppingListConfig) -> Self {
        Self::new(config.output_dir.clone(), config.lines_per_page)
    }

    /// Build the PDF bytes. Identical inputs give identical bytes.
    pub fn build_document(
        &self,
        lines: &[String],
        label: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Vec<u8>> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut encoder = TextEncoder::new(shopping_list_font()?);

        // An empty list still gets one page with the header
        let chunks: Vec<&[String]> = if lines.is_empty() {
            vec![&[]]
        } else {
            lines.chunks(self.lines_per_page).collect()
        };
        let page_count = chunks.len();
        let created = timestamp.format("%d.%m.%Y %H:%M").to_string();

        let mut kids: Vec<Object> = Vec::with_capacity(page_count);
        for (page_index, chunk) in chunks.iter().enumerate() {
            let header = PageHeader {
                label,
                created: &created,
                page: page_index + 1,
                page_count,
            };
            let first_number = page_index * self.lines_per_page + 1;
            let content = page_content(&mut encoder, &header, chunk, first_number);
            let encoded = content.encode().map_err(|e| AppError::RenderFailed {
                message: format!("Failed to encode page {}: {}", page_index + 1, e),
            })?;

            let content_id = doc.add_object(lopdf::Stream::new(dictionary! {}, encoded));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        // Pages are written first so the font only carries the glyphs they use
        let font_id = encoder.finish(&mut doc);
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => page_count as i64,
                "Resources" => resources_id,
                "MediaBox" => vec![0i64.into(), 0i64.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        let info_id = doc.add_object(dictionary! {
            "Title" => info_text("Shopping list"),
            "Author" => info_text(label),
        });
        doc.trailer.set("Root", catalog_id);
        doc.trailer.set("Info", info_id);
        doc.compress();

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).map_err(|e| AppError::RenderFailed {
            message: format!("Failed to serialize PDF: {}", e),
        })?;

        Ok(bytes)
    }
}

#[async_trait]
impl DocumentRenderer for PdfRenderer {
    async fn render(
        &self,
        lines: &[String],
        label: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<ArtifactRef> {
        let renderer = self.clone();
        let owned_lines = lines.to_vec();
        let owned_label = label.to_string();
        let bytes = tokio::task::spawn_blocking(move || {
            renderer.build_document(&owned_lines, &owned_label, timestamp)
        })
        .await
        .map_err(|e| AppError::RenderFailed {
            message: format!("Render task failed: {}", e),
        })??;

        let file_name = artifact_file_name(label, timestamp);
        // Two exports in the same second must not share a file
        let path = self
            .output_dir
            .join(format!("{}_{}", uuid::Uuid::new_v4().simple(), file_name));

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| AppError::RenderFailed {
                message: format!(
                    "Cannot create output directory {}: {}",
                    self.output_dir.display(),
                    e
                ),
            })?;

        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| AppError::RenderFailed {
                message: format!("Cannot write {}: {}", path.display(), e),
            })?;

        let checksum = hex::encode(Sha256::digest(&bytes));

        debug!(
            path = %path.display(),
            size_bytes = bytes.len(),
            lines = lines.len(),
            "Shopping list rendered"
        );

        Ok(ArtifactRef {
            path,
            file_name,
            size_bytes: bytes.len() as u64,
            checksum,
        })
    }
}

struct PageHeader<'a> {
    label: &'a str,
    created: &'a str,
    page: usize,
    page_count: usize,
}

fn page_content(
    encoder: &mut TextEncoder<'_>,
    header: &PageHeader<'_>,
    lines: &[String],
    first_number: usize,
) -> Content {
    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), TITLE_SIZE.into()]),
        Operation::new("Td", vec![MARGIN.into(), (PAGE_HEIGHT - MARGIN).into()]),
        Operation::new("Tj", vec![encoder.encode("Shopping list")]),
        Operation::new("Tf", vec!["F1".into(), BODY_SIZE.into()]),
        Operation::new("TL", vec![LEADING.into()]),
        Operation::new("T*", vec![]),
        Operation::new("Tj", vec![encoder.encode(&format!("User: {}", header.label))]),
        Operation::new("T*", vec![]),
        Operation::new("Tj", vec![encoder.encode(&format!("Created: {}", header.created))]),
    ];

    if header.page_count > 1 {
        operations.push(Operation::new("T*", vec![]));
        operations.push(Operation::new(
            "Tj",
            vec![encoder.encode(&format!("Page {} of {}", header.page, header.page_count))],
        ));
    }

    operations.push(Operation::new("T*", vec![]));

    for (offset, line) in lines.iter().enumerate() {
        operations.push(Operation::new("T*", vec![]));
        operations.push(Operation::new(
            "Tj",
            vec![encoder.encode(&format!("{}. {}", first_number + offset, line))],
        ));
    }

    operations.push(Operation::new("ET", vec![]));

    Content { operations }
}

/// Document information strings are UTF-16BE with a byte order mark
fn info_text(value: &str) -> Object {
    let mut bytes = vec![0xFE, 0xFF];
    for unit in value.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn timestamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 11, 20, 18, 5, 9).unwrap()
    }

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("foodgram-render-{}-{}", name, uuid::Uuid::new_v4()))
    }

    fn sample_lines(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("Item {} \u{2014} {} g", i, i * 10)).collect()
    }

    #[test]
    fn test_format_line() {
        let line = AggregatedLine {
            ingredient_id: 1,
            name: "Tomato".into(),
            total_amount: 450,
            measurement_unit: "g".into(),
        };
        assert_eq!(format_line(&line), "Tomato \u{2014} 450 g");
    }

    #[test]
    fn test_artifact_file_name() {
        assert_eq!(
            artifact_file_name("chef_anna", timestamp()),
            "2024-11-20_18-05-09_chef_anna_shopping_list.pdf"
        );
        assert_eq!(
            artifact_file_name("../etc/passwd", timestamp()),
            "2024-11-20_18-05-09____etc_passwd_shopping_list.pdf"
        );
        assert_eq!(
            artifact_file_name("повар", timestamp()),
            "2024-11-20_18-05-09_user_shopping_list.pdf"
        );
    }

    /// Text of one page, decoded through the font's `ToUnicode` map
    fn page_text(bytes: &[u8], page: u32) -> String {
        let doc = Document::load_mem(bytes).unwrap();
        let page_id = doc.get_pages()[&page];

        let fonts = doc.get_page_fonts(page_id);
        let font = fonts.get(b"F1".as_slice()).unwrap();
        let to_unicode_id = font.get(b"ToUnicode").unwrap().as_reference().unwrap();
        let stream = doc.get_object(to_unicode_id).unwrap().as_stream().unwrap();
        let cmap = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());

        let mut glyphs = std::collections::HashMap::new();
        for line in String::from_utf8(cmap).unwrap().lines() {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() == 2 && parts.iter().all(|p| p.starts_with('<') && p.ends_with('>')) {
                let glyph = u16::from_str_radix(parts[0].trim_matches(&['<', '>'][..]), 16).unwrap();
                let hex = parts[1].trim_matches(&['<', '>'][..]);
                let units: Vec<u16> = (0..hex.len())
                    .step_by(4)
                    .map(|i| u16::from_str_radix(&hex[i..i + 4], 16).unwrap())
                    .collect();
                glyphs.insert(glyph, String::from_utf16(&units).unwrap());
            }
        }

        let content = Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap();
        let mut text = String::new();
        for operation in content.operations.iter().filter(|op| op.operator == "Tj") {
            if let Some(Object::String(bytes, _)) = operation.operands.first() {
                for pair in bytes.chunks(2) {
                    let glyph = u16::from_be_bytes([pair[0], pair[1]]);
                    text.push_str(&glyphs[&glyph]);
                }
                text.push('\n');
            }
        }
        text
    }

    #[test]
    fn test_cyrillic_text_survives() {
        let renderer = PdfRenderer::new(scratch_dir("cyrillic"), 40);
        let lines = vec!["Абрикос \u{2014} 100 г".to_string(), "Flour \u{2014} 350 g".to_string()];

        let bytes = renderer.build_document(&lines, "artni-test", timestamp()).unwrap();
        let text = page_text(&bytes, 1);

        assert!(text.contains("1. Абрикос \u{2014} 100 г"), "got {:?}", text);
        assert!(text.contains("2. Flour \u{2014} 350 g"));
        assert!(text.contains("User: artni-test"));
        assert!(text.contains("Created: 20.11.2024 18:05"));
    }

    #[test]
    fn test_cyrillic_username_in_header() {
        let renderer = PdfRenderer::new(scratch_dir("cyrillic-user"), 40);
        let bytes = renderer.build_document(&[], "повар", timestamp()).unwrap();
        assert!(page_text(&bytes, 1).contains("User: повар"));
    }

    #[test]
    fn test_font_is_embedded() {
        let renderer = PdfRenderer::new(scratch_dir("embedded"), 40);
        let bytes = renderer.build_document(&sample_lines(1), "anna", timestamp()).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();

        let page_id = doc.get_pages()[&1];
        let fonts = doc.get_page_fonts(page_id);
        let font = fonts.get(b"F1".as_slice()).unwrap();
        assert_eq!(font.get(b"Subtype").unwrap().as_name_str().unwrap(), "Type0");
        assert_eq!(font.get(b"Encoding").unwrap().as_name_str().unwrap(), "Identity-H");

        let has_font_file = doc.objects.values().any(|object| match object {
            Object::Dictionary(dict) => dict.get(b"FontFile2").is_ok(),
            _ => false,
        });
        assert!(has_font_file);
    }

    #[test]
    fn test_page_numbers_on_every_page() {
        let renderer = PdfRenderer::new(scratch_dir("numbers"), 2);
        let bytes = renderer.build_document(&sample_lines(3), "anna", timestamp()).unwrap();

        assert!(page_text(&bytes, 1).contains("Page 1 of 2"));
        let second = page_text(&bytes, 2);
        assert!(second.contains("Page 2 of 2"));
        assert!(second.contains("3. Item 2"));
    }

    #[test]
    fn test_document_is_deterministic() {
        let renderer = PdfRenderer::new(scratch_dir("det"), 40);
        let lines = sample_lines(5);
        let first = renderer.build_document(&lines, "anna", timestamp()).unwrap();
        let second = renderer.build_document(&lines, "anna", timestamp()).unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with(b"%PDF-1.5"));
    }

    #[test]
    fn test_pages_follow_line_count() {
        let renderer = PdfRenderer::new(scratch_dir("pages"), 10);

        let empty = renderer.build_document(&[], "anna", timestamp()).unwrap();
        let doc = Document::load_mem(&empty).unwrap();
        assert_eq!(doc.get_pages().len(), 1);

        let bytes = renderer.build_document(&sample_lines(25), "anna", timestamp()).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 3);
    }

    #[test]
    fn test_zero_lines_per_page_is_clamped() {
        let renderer = PdfRenderer::new(scratch_dir("clamp"), 0);
        let bytes = renderer.build_document(&sample_lines(2), "anna", timestamp()).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 2);
    }

    #[tokio::test]
    async fn test_render_writes_file() {
        let dir = scratch_dir("write");
        let renderer = PdfRenderer::new(&dir, 40);

        let artifact = renderer
            .render(&sample_lines(3), "anna", timestamp())
            .await
            .unwrap();

        assert_eq!(artifact.path.parent(), Some(dir.as_path()));
        assert!(artifact
            .path
            .to_string_lossy()
            .ends_with(&artifact.file_name));
        let on_disk = tokio::fs::read(&artifact.path).await.unwrap();
        assert_eq!(on_disk.len() as u64, artifact.size_bytes);
        assert_eq!(artifact.checksum, hex::encode(Sha256::digest(&on_disk)));

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_same_second_renders_do_not_collide() {
        let dir = scratch_dir("collide");
        let renderer = PdfRenderer::new(&dir, 40);

        let first = renderer.render(&sample_lines(1), "anna", timestamp()).await.unwrap();
        let second = renderer.render(&sample_lines(2), "anna", timestamp()).await.unwrap();

        assert_eq!(first.file_name, second.file_name);
        assert_ne!(first.path, second.path);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_take_leaves_directory_empty() {
        let dir = scratch_dir("take");
        let renderer = PdfRenderer::new(&dir, 40);

        let artifact = renderer.render(&sample_lines(3), "anna", timestamp()).await.unwrap();
        let bytes = tokio_test::assert_ok!(artifact.take().await);

        assert_eq!(bytes.len() as u64, artifact.size_bytes);
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
        tokio_test::assert_err!(artifact.take().await);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_discard_is_idempotent() {
        let dir = scratch_dir("discard");
        let renderer = PdfRenderer::new(&dir, 40);

        let artifact = renderer.render(&[], "anna", timestamp()).await.unwrap();
        artifact.discard().await;
        artifact.discard().await;

        assert!(!artifact.path.exists());
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_unwritable_directory_is_render_failure() {
        let dir = scratch_dir("blocked");
        tokio::fs::create_dir_all(dir.parent().unwrap()).await.unwrap();
        // A regular file where the directory should be
        tokio::fs::write(&dir, b"not a directory").await.unwrap();

        let renderer = PdfRenderer::new(&dir, 40);
        let err = renderer.render(&[], "anna", timestamp()).await.unwrap_err();
        assert!(matches!(err, AppError::RenderFailed { .. }));

        tokio::fs::remove_file(&dir).await.unwrap();
    }
}
