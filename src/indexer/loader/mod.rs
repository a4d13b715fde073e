// Document loader
// File validation and text extraction for plain text and Markdown files


use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::ConfigError;
use crate::{RagError, Result};

const BYTES_PER_MB: u64 = 1024 * 1024;
const MAX_FILE_SIZE_LIMIT_MB: u64 = 1024;
const SUSPICIOUS_PATTERNS: [&str; 8] = ["..", "~", "$", "`", "|", ";", "&", "\0"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub max_file_size_mb: u64,
}

impl Default for LoaderConfig {
    #[inline]
    fn default() -> Self {
        Self {
            max_file_size_mb: 50,
        }
    }
}

impl LoaderConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_file_size_mb == 0 || self.max_file_size_mb > MAX_FILE_SIZE_LIMIT_MB {
            return Err(ConfigError::InvalidMaxFileSize(self.max_file_size_mb));
        }
        Ok(())
    }

    #[inline]
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * BYTES_PER_MB
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    PlainText,
    Markdown,
}

impl DocumentFormat {
    /// Format for a lower-case extension without the leading dot
    #[inline]
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            "txt" => Some(Self::PlainText),
            "md" | "markdown" => Some(Self::Markdown),
            _ => None,
        }
    }
}

/// Facts gathered while validating a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub path: PathBuf,
    pub file_name: String,
    pub size_bytes: u64,
    pub format: DocumentFormat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedDocument {
    pub info: FileInfo,
    pub text: String,
}

/// Check that `path` names a file we are willing to ingest
#[inline]
pub fn validate_file(path: &Path, config: &LoaderConfig) -> Result<FileInfo> {
    let path_str = path.to_string_lossy();
    if SUSPICIOUS_PATTERNS.iter().any(|p| path_str.contains(p)) {
        return Err(RagError::Validation(format!(
            "Suspicious characters detected in file path: {path_str}"
        )));
    }

    let metadata = std::fs::metadata(path).map_err(|_| {
        RagError::Validation(format!("File does not exist: {}", path.display()))
    })?;
    if !metadata.is_file() {
        return Err(RagError::Validation(format!(
            "Path is not a file: {}",
            path.display()
        )));
    }

    let size_bytes = metadata.len();
    if size_bytes == 0 {
        return Err(RagError::Validation(format!(
            "File is empty: {}",
            path.display()
        )));
    }
    if size_bytes > config.max_file_size_bytes() {
        return Err(RagError::Validation(format!(
            "File too large: {:.2}MB (max: {}MB)",
            size_bytes as f64 / BYTES_PER_MB as f64,
            config.max_file_size_mb
        )));
    }

    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    let format = DocumentFormat::from_extension(&extension).ok_or_else(|| {
        RagError::Validation(format!(
            "Unsupported file type: '.{extension}'. Allowed: .txt, .md, .markdown"
        ))
    })?;

    std::fs::File::open(path).map_err(|e| {
        RagError::Validation(format!("File is not readable: {}: {e}", path.display()))
    })?;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| RagError::Validation(format!("Path has no file name: {}", path.display())))?;

    Ok(FileInfo {
        path: std::path::absolute(path)?,
        file_name,
        size_bytes,
        format,
    })
}

/// Validate `path` and read it as text
#[inline]
pub async fn load_document(path: &Path, config: &LoaderConfig) -> Result<LoadedDocument> {
    let info = validate_file(path, config)?;
    debug!("Loading {} ({} bytes)", info.path.display(), info.size_bytes);

    let bytes = tokio::fs::read(&info.path).await?;
    let raw = String::from_utf8(bytes).map_err(|_| {
        RagError::Validation(format!("File is not valid UTF-8: {}", info.path.display()))
    })?;

    let text = match info.format {
        DocumentFormat::PlainText => raw,
        DocumentFormat::Markdown => markdown_to_text(&raw),
    };

    Ok(LoadedDocument { info, text })
}

/// Reduce Markdown to its readable text, one block per paragraph
#[inline]
pub fn markdown_to_text(markdown: &str) -> String {
    let mut text = String::with_capacity(markdown.len());

    for event in Parser::new(markdown) {
        match event {
            Event::Start(Tag::Item) => text.push_str("- "),
            Event::End(
                TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::CodeBlock | TagEnd::BlockQuote(_),
            ) => {
                if !text.ends_with('\n') {
                    text.push('\n');
                }
                text.push('\n');
            }
            Event::End(TagEnd::Item) => {
                if !text.ends_with('\n') {
                    text.push('\n');
                }
            }
            Event::Text(content) | Event::Code(content) => text.push_str(&content),
            Event::SoftBreak => text.push(' '),
            Event::HardBreak => text.push('\n'),
            _ => {}
        }
    }

    text.trim().to_string()
}
