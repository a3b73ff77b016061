use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, warn};

use crate::model::RawDocument;

/// Source of raw document text for indexing.
pub trait DocumentReader {
    fn read_documents(&self, path: &Path) -> Result<Vec<RawDocument>>;
}

/// Text extraction for one file format.
pub trait DocumentFormat {
    fn name(&self) -> &str;

    fn extensions(&self) -> &[&str];

    fn extract(&self, path: &Path) -> Result<String>;
}

pub struct PlainTextFormat;

impl DocumentFormat for PlainTextFormat {
    fn name(&self) -> &str {
        "text"
    }

    fn extensions(&self) -> &[&str] {
        &["txt", "md", "markdown"]
    }

    fn extract(&self, path: &Path) -> Result<String> {
        let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        Ok(String::from_utf8_lossy(&raw).replace('\u{0000}', ""))
    }
}

/// PDF text layer via the `pdftotext` tool from poppler.
pub struct PdfTextFormat;

impl DocumentFormat for PdfTextFormat {
    fn name(&self) -> &str {
        "pdf"
    }

    fn extensions(&self) -> &[&str] {
        &["pdf"]
    }

    fn extract(&self, path: &Path) -> Result<String> {
        let output = Command::new("pdftotext")
            .arg("-enc")
            .arg("UTF-8")
            .arg(path)
            .arg("-")
            .output()
            .with_context(|| format!("failed to execute pdftotext for {}", path.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "pdftotext returned non-zero exit status for {}: {}",
                path.display(),
                stderr.trim()
            );
        }

        let raw = String::from_utf8_lossy(&output.stdout);
        Ok(raw
            .split('\u{000C}')
            .map(|page| page.replace('\u{0000}', ""))
            .collect::<Vec<String>>()
            .join("\n\n"))
    }
}

/// Reads a single file or every supported file in a directory (recursively),
/// dispatching on the registered formats.
pub struct FormatRegistryReader {
    formats: Vec<Box<dyn DocumentFormat>>,
}

impl Default for FormatRegistryReader {
    fn default() -> Self {
        Self::new()
            .with_format(PlainTextFormat)
            .with_format(PdfTextFormat)
    }
}

impl FormatRegistryReader {
    pub fn new() -> Self {
        Self {
            formats: Vec::new(),
        }
    }

    pub fn with_format<F: DocumentFormat + 'static>(mut self, format: F) -> Self {
        self.formats.push(Box::new(format));
        self
    }

    fn format_for(&self, path: &Path) -> Option<&dyn DocumentFormat> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        self.formats
            .iter()
            .find(|format| format.extensions().contains(&extension.as_str()))
            .map(|format| format.as_ref())
    }

    fn read_one(&self, path: &Path, format: &dyn DocumentFormat) -> Result<RawDocument> {
        let size_bytes = fs::metadata(path)
            .with_context(|| format!("failed to stat {}", path.display()))?
            .len();
        let text = format.extract(path)?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(ToOwned::to_owned)
            .with_context(|| format!("invalid UTF-8 filename: {}", path.display()))?;

        debug!(file = %file_name, format = format.name(), size_bytes, "read document");
        Ok(RawDocument {
            text,
            file_name,
            size_bytes,
        })
    }
}

impl DocumentReader for FormatRegistryReader {
    fn read_documents(&self, path: &Path) -> Result<Vec<RawDocument>> {
        if !path.exists() {
            bail!("document path does not exist: {}", path.display());
        }

        if path.is_file() {
            let Some(format) = self.format_for(path) else {
                bail!("unsupported document format: {}", path.display());
            };
            return Ok(vec![self.read_one(path, format)?]);
        }

        let mut files = Vec::new();
        collect_files(path, &mut files)?;
        files.sort();

        let mut documents = Vec::with_capacity(files.len());
        for file in files {
            match self.format_for(&file) {
                Some(format) => documents.push(self.read_one(&file, format)?),
                None => debug!(path = %file.display(), "skipping unsupported file"),
            }
        }

        if documents.is_empty() {
            warn!(path = %path.display(), "no supported documents found");
        } else {
            info!(path = %path.display(), documents = documents.len(), "documents read");
        }
        Ok(documents)
    }
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;

    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read entry in {}", dir.display()))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", path.display()))?;

        let hidden = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.starts_with('.'))
            .unwrap_or(false);
        if hidden {
            continue;
        }

        if file_type.is_dir() {
            collect_files(&path, out)?;
        } else if file_type.is_file() {
            out.push(path);
        }
    }

    Ok(())
}
