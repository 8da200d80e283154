//! Plain-text extraction by file category.
//!
//! Failures are logged and yield an empty string; they never abort indexing.

use std::io::Read;
use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::warn;

use crate::core::error::{Error, Result};
use crate::core::paths::extension_of;

pub const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "py", "c", "cpp", "h", "java", "js", "html", "css", "rs", "toml", "json",
];
pub const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "docx"];
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif"];

lazy_static! {
    static ref DOCX_PARAGRAPH_RE: Regex = Regex::new(r"(?s)<w:p[ >].*?</w:p>").unwrap();
    static ref DOCX_TEXT_RE: Regex = Regex::new(r"(?s)<w:t(?:\s[^>]*)?>(.*?)</w:t>").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileCategory {
    Text,
    Document,
    Image,
    Unsupported,
}

impl FileCategory {
    pub fn of(path: &Path) -> Self {
        let ext = extension_of(path);
        let ext = ext.as_str();
        if TEXT_EXTENSIONS.contains(&ext) {
            Self::Text
        } else if DOCUMENT_EXTENSIONS.contains(&ext) {
            Self::Document
        } else if IMAGE_EXTENSIONS.contains(&ext) {
            Self::Image
        } else {
            Self::Unsupported
        }
    }
}

pub fn is_image(path: &Path) -> bool {
    FileCategory::of(path) == FileCategory::Image
}

pub fn is_text_or_document(path: &Path) -> bool {
    matches!(
        FileCategory::of(path),
        FileCategory::Text | FileCategory::Document
    )
}

/// Extract plain text, or an empty string for unsupported types and failures.
pub fn extract_text(path: &Path) -> String {
    let result = match extension_of(path).as_str() {
        "pdf" => extract_pdf(path),
        "docx" => extract_docx(path),
        ext if TEXT_EXTENSIONS.contains(&ext) => read_lossy(path),
        _ => return String::new(),
    };

    result.unwrap_or_else(|e| {
        warn!(path = %path.display(), "text extraction failed: {e}");
        String::new()
    })
}

/// Undecodable bytes are replaced rather than failing the file
fn read_lossy(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn extract_pdf(path: &Path) -> Result<String> {
    let text = pdf_extract::extract_text(path).map_err(|e| Error::Extract(e.to_string()))?;
    // Pages come back separated by form feeds
    Ok(join_nonempty(text.split('\u{c}')))
}

fn extract_docx(path: &Path) -> Result<String> {
    let file = std::fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| Error::Extract(e.to_string()))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| Error::Extract(e.to_string()))?
        .read_to_string(&mut xml)?;

    Ok(docx_xml_to_text(&xml))
}

/// One entry per `<w:p>` paragraph, runs concatenated, paragraphs space-joined
fn docx_xml_to_text(xml: &str) -> String {
    let paragraphs = DOCX_PARAGRAPH_RE.find_iter(xml).map(|p| {
        DOCX_TEXT_RE
            .captures_iter(p.as_str())
            .map(|c| decode_xml_entities(&c[1]))
            .collect::<String>()
    });
    join_nonempty(paragraphs)
}

fn decode_xml_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn join_nonempty<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    parts
        .into_iter()
        .filter_map(|p| {
            let trimmed = p.as_ref().trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_categories() {
        assert_eq!(FileCategory::of(Path::new("a/notes.MD")), FileCategory::Text);
        assert_eq!(FileCategory::of(Path::new("report.pdf")), FileCategory::Document);
        assert_eq!(FileCategory::of(Path::new("cat.jpeg")), FileCategory::Image);
        assert_eq!(FileCategory::of(Path::new("song.mp3")), FileCategory::Unsupported);
        assert!(is_image(Path::new("x.png")));
        assert!(is_text_or_document(Path::new("x.docx")));
        assert!(!is_text_or_document(Path::new("x.gif")));
    }

    #[test]
    fn test_extract_plain_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pets.txt");
        std::fs::write(&path, "dogs and cats").unwrap();

        assert_eq!(extract_text(&path), "dogs and cats");
    }

    #[test]
    fn test_invalid_utf8_is_lossy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bin.txt");
        std::fs::write(&path, [b'o', b'k', 0xff, b'!']).unwrap();

        assert_eq!(extract_text(&path), "ok\u{fffd}!");
    }

    #[test]
    fn test_unsupported_and_missing_yield_empty() {
        let dir = tempfile::tempdir().unwrap();
        let song = dir.path().join("song.mp3");
        std::fs::write(&song, "not text").unwrap();

        assert_eq!(extract_text(&song), "");
        assert_eq!(extract_text(&dir.path().join("missing.txt")), "");
        assert_eq!(extract_text(&dir.path().join("broken.pdf")), "");
    }

    #[test]
    fn test_docx_extraction() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("memo.docx");

        let file = std::fs::File::create(&path)?;
        let mut writer = zip::ZipWriter::new(file);
        writer.start_file(
            "word/document.xml",
            zip::write::SimpleFileOptions::default(),
        )?;
        writer.write_all(
            br#"<w:document><w:body>
<w:p><w:r><w:t>Quarterly</w:t></w:r><w:r><w:t xml:space="preserve"> report</w:t></w:r></w:p>
<w:p><w:r><w:t>Cats &amp; dogs</w:t></w:r></w:p>
<w:p/>
</w:body></w:document>"#,
        )?;
        writer.finish()?;

        assert_eq!(extract_text(&path), "Quarterly report Cats & dogs");
        Ok(())
    }

    #[test]
    fn test_join_nonempty() {
        assert_eq!(join_nonempty(["page one\n", "", "  page two "]), "page one page two");
    }
}
