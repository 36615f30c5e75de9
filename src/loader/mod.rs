// Document loader
// Walks the source tree and turns supported files into normalized text documents


use std::fmt;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::RagError;

/// Normalized text of one source unit (a file, or one page of a PDF)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub content: String,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMetadata {
    pub source: PathBuf,
    pub file_type: FileType,
    /// 1-based page number for paged formats
    pub page: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    Pdf,
    Text,
    Markdown,
    Docx,
}

impl FileType {
    /// Detect the type from the file extension, ignoring case
    #[inline]
    pub fn from_path(path: &Path, config: &LoaderConfig) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "pdf" => Some(Self::Pdf),
            "txt" => Some(Self::Text),
            "md" | "markdown" => Some(Self::Markdown),
            "docx" if config.enable_docx => Some(Self::Docx),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Text => "text",
            Self::Markdown => "markdown",
            Self::Docx => "docx",
        }
    }
}

impl fmt::Display for FileType {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Load Word (.docx) files; skipped as unsupported otherwise
    pub enable_docx: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of a directory scan
#[derive(Debug, Default)]
pub struct LoadReport {
    pub documents: Vec<Document>,
    pub failures: Vec<LoadFailure>,
    /// Files with an unsupported extension
    pub skipped: usize,
}

impl LoadReport {
    /// Number of distinct source files that produced at least one document
    #[inline]
    pub fn source_count(&self) -> usize {
        let mut sources: Vec<&Path> = self
            .documents
            .iter()
            .map(|d| d.metadata.source.as_path())
            .collect();
        sources.dedup();
        sources.len()
    }
}

/// Load every supported file under `root`.
///
/// Unreadable or malformed files are recorded in [`LoadReport::failures`] and
/// never abort the scan. A missing root is an error.
#[inline]
pub fn load_documents(root: &Path, config: &LoaderConfig) -> crate::Result<LoadReport> {
    if !root.is_dir() {
        return Err(RagError::Ingestion(format!(
            "Source directory {} does not exist",
            root.display()
        )));
    }

    info!("Loading documents from {}", root.display());
    let mut report = LoadReport::default();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                warn!("Failed to read {}: {}", path.display(), e);
                report.failures.push(LoadFailure {
                    path,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let Some(file_type) = FileType::from_path(path, config) else {
            debug!("Skipping unsupported file {}", path.display());
            report.skipped += 1;
            continue;
        };

        match load_file(path, file_type) {
            Ok(documents) => {
                debug!("Loaded {} document(s) from {}", documents.len(), path.display());
                report.documents.extend(documents);
            }
            Err(e) => {
                warn!("Failed to load {}: {:#}", path.display(), e);
                report.failures.push(LoadFailure {
                    path: path.to_path_buf(),
                    reason: format!("{:#}", e),
                });
            }
        }
    }

    info!(
        "Loaded {} documents ({} failed, {} skipped)",
        report.documents.len(),
        report.failures.len(),
        report.skipped
    );
    Ok(report)
}

/// Load a single file of a known type
#[inline]
pub fn load_file(path: &Path, file_type: FileType) -> Result<Vec<Document>> {
    let metadata = |page| DocumentMetadata {
        source: path.to_path_buf(),
        file_type,
        page,
    };

    match file_type {
        FileType::Text | FileType::Markdown => {
            let bytes = fs::read(path).context("Failed to read file")?;
            let content = String::from_utf8(bytes).context("File is not valid UTF-8")?;
            Ok(vec![Document {
                content,
                metadata: metadata(None),
            }])
        }
        FileType::Pdf => Ok(extract_pdf_pages(path)?
            .into_iter()
            .map(|(page, content)| Document {
                content,
                metadata: metadata(Some(page)),
            })
            .collect()),
        FileType::Docx => Ok(vec![Document {
            content: extract_docx_text(path)?,
            metadata: metadata(None),
        }]),
    }
}

/// Text of each non-blank page, keyed by 1-based page number
fn extract_pdf_pages(path: &Path) -> Result<Vec<(u32, String)>> {
    let document = lopdf::Document::load(path).context("Failed to parse PDF")?;

    let mut pages = Vec::new();
    for page_number in document.get_pages().into_keys() {
        let text = document
            .extract_text(&[page_number])
            .with_context(|| format!("Failed to extract text from page {}", page_number))?;
        if text.trim().is_empty() {
            debug!("Dropping blank page {} of {}", page_number, path.display());
            continue;
        }
        pages.push((page_number, text));
    }
    Ok(pages)
}

fn extract_docx_text(path: &Path) -> Result<String> {
    let file = File::open(path).context("Failed to open file")?;
    let mut archive = zip::ZipArchive::new(file).context("File is not a valid .docx archive")?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .context("Archive has no word/document.xml")?
        .read_to_string(&mut xml)
        .context("Failed to read word/document.xml")?;
    Ok(docx_xml_to_text(&xml))
}

/// Concatenate `<w:t>` runs, one line per `<w:p>` paragraph
fn docx_xml_to_text(xml: &str) -> String {
    let mut text = String::new();
    let mut rest = xml;
    let mut in_run = false;

    while let Some(open) = rest.find('<') {
        if in_run {
            text.push_str(&unescape_xml(&rest[..open]));
        }
        let Some(close) = rest[open..].find('>') else {
            break;
        };
        let tag = &rest[open + 1..open + close];
        let name = tag
            .split(|c: char| c.is_whitespace() || c == '/')
            .find(|part| !part.is_empty())
            .unwrap_or_default();

        match name {
            "w:t" => in_run = !tag.starts_with('/') && !tag.ends_with('/'),
            "w:tab" if !tag.starts_with('/') => text.push('\t'),
            "w:br" if !tag.starts_with('/') => text.push('\n'),
            "w:p" if tag.starts_with('/') => text.push('\n'),
            _ => {}
        }

        rest = &rest[open + close + 1..];
    }

    text.trim_end().to_string()
}

/// Decode predefined and numeric (`&#NNN;`, `&#xHH;`) entities; unknown ones are kept
fn unescape_xml(raw: &str) -> String {
    let mut text = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(amp) = rest.find('&') {
        text.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail
            .find(';')
            .and_then(|end| Some((decode_entity(&tail[1..end])?, end)));
        match decoded {
            Some((c, end)) => {
                text.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                text.push('&');
                rest = &tail[1..];
            }
        }
    }

    text.push_str(rest);
    text
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "amp" => Some('&'),
        _ => {
            let reference = name.strip_prefix('#')?;
            let code = match reference.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => reference.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}
