//! The external-collaborator seam.
//!
//! The core consumes and produces one abstract resource: template text. How
//! that text is packaged (DOCX/ZIP, WordprocessingML runs) is the
//! collaborator's problem. The collaborator must merge formatting-run
//! fragments into one logical stream before handing text over; the scanner
//! relies on that precondition and does not guarantee it. [`merge_split_tags`]
//! exists to establish it for raw WordprocessingML payloads.

use crate::tag::is_valid_name;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A document whose template text can be extracted and replaced.
///
/// Implementations own packaging; the core only ever sees the text.
pub trait TemplateDocument {
    /// The concatenated template text of the document.
    fn extract_text(&self) -> &str;

    /// Replace the document's template text wholesale. Extracting again
    /// must reproduce `text` exactly; the packaging layer must not mutate
    /// it on the way through.
    fn replace_text(&mut self, text: String);
}

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A file-backed document whose entire content is the template text.
///
/// This is what the CLI operates on: a `word/document.xml` extracted from a
/// DOCX, or any plain text file.
#[derive(Debug, Clone)]
pub struct PlainTextDocument {
    path: PathBuf,
    text: String,
}

impl PlainTextDocument {
    /// Load a document from disk.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, DocumentError> {
        let path = path.into();
        let text = fs::read_to_string(&path)?;
        Ok(Self { path, text })
    }

    /// Construct from already-loaded text (tests, pipelines).
    pub fn from_text(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist back to the original path atomically.
    pub fn save(&self) -> Result<(), DocumentError> {
        atomic_write(&self.path, self.text.as_bytes())
    }

    /// Persist to a different path atomically.
    pub fn save_as(&self, path: impl AsRef<Path>) -> Result<(), DocumentError> {
        atomic_write(path.as_ref(), self.text.as_bytes())
    }
}

impl TemplateDocument for PlainTextDocument {
    fn extract_text(&self) -> &str {
        &self.text
    }

    fn replace_text(&mut self, text: String) {
        self.text = text;
    }
}

/// Atomic file write: tempfile + fsync + rename.
///
/// Either the full write succeeds or the original file is untouched.
fn atomic_write(path: &Path, content: &[u8]) -> Result<(), DocumentError> {
    // Tempfile in the same directory so the rename stays on one filesystem.
    let parent = path.parent().ok_or_else(|| {
        DocumentError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "path has no parent directory",
        ))
    })?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}

/// Merge template tags that word processors split across formatting runs.
///
/// Word routinely breaks a `{placeholder}` into several `<w:r>` runs, which
/// leaves XML markup between the braces and defeats the scanner. This pass
/// finds every `{` … `}` region whose interior is only text and markup,
/// strips the markup, and keeps the result when the merged body parses as a
/// tag or placeholder. Anything else is left byte-for-byte untouched.
///
/// The markup inside the braces is discarded, so the merged tag takes the
/// formatting of the run the `{` sits in.
pub fn merge_split_tags(xml: &str) -> String {
    let bytes = xml.as_bytes();
    let mut out = String::with_capacity(xml.len());
    let mut pos = 0;

    while pos < bytes.len() {
        if bytes[pos] != b'{' {
            let next = xml[pos..]
                .find('{')
                .map(|rel| pos + rel)
                .unwrap_or(bytes.len());
            out.push_str(&xml[pos..next]);
            pos = next;
            continue;
        }

        match read_split_tag(xml, pos) {
            Some((end, body)) if body_is_tag_like(&body) => {
                out.push('{');
                out.push_str(&body);
                out.push('}');
                pos = end;
            }
            _ => {
                out.push('{');
                pos += 1;
            }
        }
    }

    out
}

/// Read from a `{` at `start` to the next `}`, skipping XML elements and
/// collecting the text between them. Fails on a nested `{`, a `<` with no
/// `>`, or a missing `}`.
fn read_split_tag(xml: &str, start: usize) -> Option<(usize, String)> {
    let mut body = String::new();
    let mut chars = xml[start + 1..].char_indices();

    while let Some((rel, c)) = chars.next() {
        match c {
            '}' => return Some((start + 1 + rel + 1, body)),
            '{' => return None,
            '<' => {
                // Skip the whole XML tag.
                loop {
                    let (_, inner) = chars.next()?;
                    if inner == '>' {
                        break;
                    }
                }
            }
            _ => body.push(c),
        }
    }

    None
}

/// Does the merged body form a tag or value placeholder?
fn body_is_tag_like(body: &str) -> bool {
    match body.as_bytes().first() {
        Some(b'#') | Some(b'^') => is_valid_name(&body[1..]),
        Some(b'/') => body.len() == 1 || is_valid_name(&body[1..]),
        Some(_) => is_valid_name(body),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_extract_replace() {
        let mut doc = PlainTextDocument::from_text("test.xml", "{#a}x{/a}");
        doc.replace_text("{#a}x{/a}{#b}y{/b}".to_string());
        assert_eq!(doc.extract_text(), "{#a}x{/a}{#b}y{/b}");
    }

    #[test]
    fn test_save_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.xml");
        fs::write(&path, "{#foo}bar{/}").unwrap();

        let mut doc = PlainTextDocument::open(&path).unwrap();
        doc.replace_text("{#foo}bar{/foo}".to_string());
        doc.save().unwrap();

        let reopened = PlainTextDocument::open(&path).unwrap();
        assert_eq!(reopened.extract_text(), "{#foo}bar{/foo}");
    }

    #[test]
    fn test_merge_split_open_tag() {
        let xml = r#"<w:t>{</w:t></w:r><w:r><w:t>#clients</w:t></w:r><w:r><w:t>}</w:t>"#;
        let merged = merge_split_tags(xml);
        assert!(merged.contains("{#clients}"));
        assert!(!merged.contains("{</w:t>"));
    }

    #[test]
    fn test_merge_split_placeholder() {
        let xml = "<w:t>{first</w:t><w:t>Name}</w:t>";
        assert_eq!(merge_split_tags(xml), "<w:t>{firstName}</w:t>");
    }

    #[test]
    fn test_merge_leaves_intact_tags_alone() {
        let xml = "<w:t>{#a}text{/a}</w:t>";
        assert_eq!(merge_split_tags(xml), xml);
    }

    #[test]
    fn test_merge_leaves_non_tag_braces_alone() {
        let xml = "<w:t>set {x y} in braces</w:t>";
        assert_eq!(merge_split_tags(xml), xml);
    }

    #[test]
    fn test_merge_handles_split_anonymous_close() {
        let xml = "<w:t>{/</w:t><w:t>}</w:t>";
        assert_eq!(merge_split_tags(xml), "<w:t>{/}</w:t>");
    }

    #[test]
    fn test_merge_unterminated_brace_untouched() {
        let xml = "<w:t>{ never closes";
        assert_eq!(merge_split_tags(xml), xml);
    }
}
